use serde::{Deserialize, Serialize};

use crate::{
    config::authority::AuthorityEnvironment,
    models::{
        credential_model::{CredentialView, CsrConfig},
        invoice_model::Party,
    },
};

/// `POST /tenants/{id}/credentials`
#[derive(Debug, Deserialize, Serialize)]
pub struct OnboardDto {
    pub common_name: String,
    pub serial_number: String,
    pub organization_identifier: String,
    pub organization_name: String,
    #[serde(default)]
    pub organization_unit: Option<String>,
    #[serde(default = "default_country")]
    pub country_name: String,
    #[serde(default = "default_invoice_type")]
    pub invoice_type: String,
    pub location: String,
    pub industry: String,
    pub environment: AuthorityEnvironment,
}

fn default_country() -> String {
    "SA".to_string()
}

fn default_invoice_type() -> String {
    "1100".to_string()
}

impl OnboardDto {
    pub fn into_csr_config(self) -> CsrConfig {
        CsrConfig {
            common_name: self.common_name.trim().to_string(),
            serial_number: self.serial_number.trim().to_string(),
            organization_identifier: self.organization_identifier.trim().to_string(),
            organization_name: self.organization_name.trim().to_string(),
            organization_unit: self.organization_unit.map(|ou| ou.trim().to_string()),
            country_name: self.country_name.trim().to_ascii_uppercase(),
            invoice_type: self.invoice_type.trim().to_string(),
            location: self.location.trim().to_string(),
            industry: self.industry.trim().to_string(),
            environment: self.environment,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OnBoardResponseDto {
    pub message: String,
    pub credential: CredentialView,
}

/// `POST /tenants/{id}/compliance-checks`
#[derive(Debug, Deserialize)]
pub struct ComplianceCheckDto {
    pub seller: Party,
}
