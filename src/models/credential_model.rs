use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::authority::AuthorityEnvironment;
use crate::error::{ComplianceError, Result};

pub type TenantId = i64;

/// Lifecycle of a tenant's signing credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Pending,
    ComplianceIssued,
    ProductionIssued,
}

impl CredentialStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CredentialStatus::Pending => "pending",
            CredentialStatus::ComplianceIssued => "compliance_issued",
            CredentialStatus::ProductionIssued => "production_issued",
        }
    }

    /// The only legal moves are one step forward.
    pub fn advance_to(self, next: CredentialStatus) -> Result<CredentialStatus> {
        match (self, next) {
            (CredentialStatus::Pending, CredentialStatus::ComplianceIssued)
            | (CredentialStatus::ComplianceIssued, CredentialStatus::ProductionIssued) => Ok(next),
            (from, to) => Err(ComplianceError::CredentialState(format!(
                "cannot move credential from {} to {}",
                from.as_str(),
                to.as_str()
            ))),
        }
    }
}

impl FromStr for CredentialStatus {
    type Err = ComplianceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(CredentialStatus::Pending),
            "compliance_issued" => Ok(CredentialStatus::ComplianceIssued),
            "production_issued" => Ok(CredentialStatus::ProductionIssued),
            other => Err(ComplianceError::Storage(format!(
                "unknown credential status `{other}`"
            ))),
        }
    }
}

/// A certificate/secret pair issued by the authority.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Csid {
    /// `binarySecurityToken` exactly as returned.
    pub certificate: String,
    pub secret: String,
    pub request_id: String,
}

impl fmt::Debug for Csid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Csid")
            .field("request_id", &self.request_id)
            .field("secret", &"<redacted>")
            .finish_non_exhaustive()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub environment: AuthorityEnvironment,
    pub status: CredentialStatus,
    pub private_key_pem: String,
    pub public_key_pem: String,
    pub csr_pem: String,
    pub compliance: Option<Csid>,
    pub production: Option<Csid>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("id", &self.id)
            .field("tenant_id", &self.tenant_id)
            .field("environment", &self.environment)
            .field("status", &self.status)
            .field("compliance", &self.compliance)
            .field("production", &self.production)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl CredentialRecord {
    pub fn csr_base64(&self) -> String {
        use base64::{Engine, engine::general_purpose};
        general_purpose::STANDARD.encode(self.csr_pem.as_bytes())
    }

    /// What the HTTP surface may show: no key material, no secrets.
    pub fn view(&self) -> CredentialView {
        CredentialView {
            id: self.id,
            tenant_id: self.tenant_id,
            environment: self.environment,
            status: self.status,
            csr: self.csr_base64(),
            has_compliance_csid: self.compliance.is_some(),
            has_production_csid: self.production.is_some(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CredentialView {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub environment: AuthorityEnvironment,
    pub status: CredentialStatus,
    pub csr: String,
    pub has_compliance_csid: bool,
    pub has_production_csid: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Subject and extension fields of a certificate signing request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsrConfig {
    pub common_name: String,
    pub serial_number: String,
    pub organization_identifier: String,
    pub organization_name: String,
    pub organization_unit: Option<String>,
    pub country_name: String,
    pub invoice_type: String,
    pub location: String,
    pub industry: String,
    pub environment: AuthorityEnvironment,
}

/// Upper bound of X.520 name attributes such as O, OU and CN.
pub const MAX_NAME_FIELD_BYTES: usize = 64;

impl CsrConfig {
    pub fn organization_unit_or_name(&self) -> &str {
        self.organization_unit
            .as_deref()
            .filter(|ou| !ou.trim().is_empty())
            .unwrap_or(&self.organization_name)
    }

    /// Rejects anything that would produce a malformed request.
    pub fn validate(&self) -> Result<()> {
        require_non_empty("common_name", &self.common_name)?;
        require_non_empty("serial_number", &self.serial_number)?;
        require_non_empty("organization_identifier", &self.organization_identifier)?;
        require_non_empty("organization_name", &self.organization_name)?;

        check_name_length("organization_name", &self.organization_name)?;
        check_name_length("organization_unit", self.organization_unit_or_name())?;
        check_name_length("common_name", &self.common_name)?;
        check_name_length("location", &self.location)?;
        check_name_length("industry", &self.industry)?;

        let country = self.country_name.as_bytes();
        if country.len() != 2 || !country.iter().all(u8::is_ascii_alphabetic) {
            return Err(ComplianceError::format(
                "country_name",
                "must be a two letter country code",
            ));
        }
        let invoice_type = self.invoice_type.as_bytes();
        if invoice_type.len() != 4 || !invoice_type.iter().all(|b| matches!(b, b'0' | b'1')) {
            return Err(ComplianceError::format(
                "invoice_type",
                "must be four digits of 0 or 1, e.g. 1100",
            ));
        }
        Ok(())
    }
}

fn require_non_empty(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ComplianceError::format(field, "must not be empty"));
    }
    Ok(())
}

fn check_name_length(field: &'static str, value: &str) -> Result<()> {
    let bytes = value.len();
    if bytes > MAX_NAME_FIELD_BYTES {
        return Err(ComplianceError::format(
            field,
            format!(
                "{bytes} bytes long, the certificate field limit is {MAX_NAME_FIELD_BYTES} bytes; use a shorter name"
            ),
        ));
    }
    Ok(())
}
