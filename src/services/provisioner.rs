use std::sync::Arc;

use chrono::Utc;
use openssl::pkey::PKey;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{ComplianceError, Result},
    models::credential_model::{CredentialRecord, CredentialStatus, CsrConfig, Csid, TenantId},
    services::{
        authority_client::AuthorityApi, credential_provider::CredentialProvider,
        pki_service::decode_certificate_token, store::CredentialStore, tenant_lock::TenantLocks,
    },
};

/// Drives a tenant's credential through pending, compliance-issued and
/// production-issued.
pub struct Provisioner {
    credentials: Arc<dyn CredentialStore>,
    provider: Arc<dyn CredentialProvider>,
    authority: Arc<dyn AuthorityApi>,
    locks: Arc<TenantLocks>,
}

impl Provisioner {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        provider: Arc<dyn CredentialProvider>,
        authority: Arc<dyn AuthorityApi>,
        locks: Arc<TenantLocks>,
    ) -> Self {
        Provisioner {
            credentials,
            provider,
            authority,
            locks,
        }
    }

    pub async fn credential(&self, tenant: TenantId) -> Result<CredentialRecord> {
        self.credentials
            .active_credential(tenant)
            .await?
            .ok_or_else(|| {
                ComplianceError::CredentialState(format!("tenant {tenant} has not been onboarded"))
            })
    }

    /// Generates a fresh key pair and CSR. Any previous credential of the
    /// tenant is superseded, not deleted.
    pub async fn onboard(&self, tenant: TenantId, config: CsrConfig) -> Result<CredentialRecord> {
        config.validate()?;

        let provider = self.provider.clone();
        let request = config.clone();
        let generated = tokio::task::spawn_blocking(move || provider.generate(&request))
            .await
            .map_err(|e| ComplianceError::Crypto(format!("key generation task failed: {e}")))??;

        let now = Utc::now();
        let record = CredentialRecord {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            environment: config.environment,
            status: CredentialStatus::Pending,
            private_key_pem: generated.private_key_pem,
            public_key_pem: generated.public_key_pem,
            csr_pem: generated.csr_pem,
            compliance: None,
            production: None,
            active: true,
            created_at: now,
            updated_at: now,
        };

        let _guard = self.locks.acquire(tenant).await;
        self.credentials.supersede(&record).await?;
        info!(
            tenant,
            credential = %record.id,
            environment = record.environment.as_str(),
            "generated credential, status pending"
        );
        Ok(record)
    }

    /// Exchanges the CSR and the portal OTP for a compliance CSID.
    pub async fn issue_compliance_csid(
        &self,
        tenant: TenantId,
        otp: &str,
    ) -> Result<CredentialRecord> {
        let _guard = self.locks.acquire(tenant).await;
        let mut record = self.credential(tenant).await?;
        let next = record.status.advance_to(CredentialStatus::ComplianceIssued)?;

        let response = self
            .authority
            .compliance_csid(record.environment, &record.csr_base64(), otp)
            .await?;
        let csid = response.into_csid()?;
        ensure_certificate_matches_key(&record, &csid)?;

        record.compliance = Some(csid);
        record.status = next;
        record.updated_at = Utc::now();
        self.credentials.update_credential(&record).await?;
        info!(tenant, credential = %record.id, "compliance CSID issued");
        Ok(record)
    }

    /// Exchanges the compliance CSID for a production CSID.
    pub async fn issue_production_csid(&self, tenant: TenantId) -> Result<CredentialRecord> {
        let _guard = self.locks.acquire(tenant).await;
        let mut record = self.credential(tenant).await?;
        let next = record.status.advance_to(CredentialStatus::ProductionIssued)?;
        let compliance = record.compliance.clone().ok_or_else(|| {
            ComplianceError::CredentialState(format!(
                "credential {} has no compliance CSID",
                record.id
            ))
        })?;

        let response = self
            .authority
            .production_csid(record.environment, &compliance)
            .await?;
        let csid = response.into_csid()?;
        ensure_certificate_matches_key(&record, &csid)?;

        record.production = Some(csid);
        record.status = next;
        record.updated_at = Utc::now();
        self.credentials.update_credential(&record).await?;
        info!(tenant, credential = %record.id, "production CSID issued");
        Ok(record)
    }
}

fn ensure_certificate_matches_key(record: &CredentialRecord, csid: &Csid) -> Result<()> {
    let certificate = decode_certificate_token(&csid.certificate)?;
    let key = PKey::private_key_from_pem(record.private_key_pem.as_bytes())?;
    if !certificate.public_key()?.public_eq(&key) {
        warn!(tenant = record.tenant_id, "issued certificate does not match the tenant key");
        return Err(ComplianceError::Crypto(
            "issued certificate was not made for this tenant's key".to_string(),
        ));
    }
    Ok(())
}
