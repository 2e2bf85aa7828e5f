use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    error::{ChainIntegrityError, ComplianceError, Result},
    models::{
        credential_model::{CredentialRecord, TenantId},
        submission_model::{SubmissionFilter, SubmissionRecord},
    },
};

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn active_credential(&self, tenant: TenantId) -> Result<Option<CredentialRecord>>;

    /// Deactivates the tenant's current record, if any, and stores `record`
    /// as the active one.
    async fn supersede(&self, record: &CredentialRecord) -> Result<()>;

    /// Persists status and CSID changes of an active record.
    async fn update_credential(&self, record: &CredentialRecord) -> Result<()>;
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Latest live record with status success or warning.
    async fn last_live_success(&self, tenant: TenantId) -> Result<Option<SubmissionRecord>>;

    /// Fails with `DuplicateCounter` when a second accepted live record would
    /// claim a taken counter.
    async fn append(&self, record: &SubmissionRecord) -> Result<()>;

    /// Newest first.
    async fn list(&self, tenant: TenantId, filter: &SubmissionFilter)
    -> Result<Vec<SubmissionRecord>>;

    /// Accepted live records, oldest first.
    async fn live_history(&self, tenant: TenantId) -> Result<Vec<SubmissionRecord>>;
}

/// Process-local storage for tests and `STORAGE_BACKEND=memory`.
#[derive(Default)]
pub struct MemoryStore {
    credentials: RwLock<Vec<CredentialRecord>>,
    submissions: RwLock<Vec<SubmissionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn active_credential(&self, tenant: TenantId) -> Result<Option<CredentialRecord>> {
        let credentials = self.credentials.read().await;
        Ok(credentials
            .iter()
            .find(|c| c.tenant_id == tenant && c.active)
            .cloned())
    }

    async fn supersede(&self, record: &CredentialRecord) -> Result<()> {
        let mut credentials = self.credentials.write().await;
        let now = Utc::now();
        for old in credentials
            .iter_mut()
            .filter(|c| c.tenant_id == record.tenant_id && c.active)
        {
            old.active = false;
            old.updated_at = now;
        }
        let mut record = record.clone();
        record.active = true;
        credentials.push(record);
        Ok(())
    }

    async fn update_credential(&self, record: &CredentialRecord) -> Result<()> {
        let mut credentials = self.credentials.write().await;
        let stored = credentials
            .iter_mut()
            .find(|c| c.id == record.id && c.active)
            .ok_or_else(|| {
                ComplianceError::Storage(format!("no active credential with id {}", record.id))
            })?;
        *stored = record.clone();
        Ok(())
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn last_live_success(&self, tenant: TenantId) -> Result<Option<SubmissionRecord>> {
        let submissions = self.submissions.read().await;
        Ok(submissions
            .iter()
            .filter(|s| s.tenant_id == tenant && s.extends_live_chain())
            .max_by_key(|s| s.invoice_counter)
            .cloned())
    }

    async fn append(&self, record: &SubmissionRecord) -> Result<()> {
        let mut submissions = self.submissions.write().await;
        if record.extends_live_chain()
            && submissions.iter().any(|s| {
                s.tenant_id == record.tenant_id
                    && s.extends_live_chain()
                    && s.invoice_counter == record.invoice_counter
            })
        {
            return Err(ChainIntegrityError::DuplicateCounter {
                counter: record.invoice_counter,
            }
            .into());
        }
        submissions.push(record.clone());
        Ok(())
    }

    async fn list(
        &self,
        tenant: TenantId,
        filter: &SubmissionFilter,
    ) -> Result<Vec<SubmissionRecord>> {
        let submissions = self.submissions.read().await;
        Ok(submissions
            .iter()
            .rev()
            .filter(|s| s.tenant_id == tenant && filter.matches(s))
            .skip(filter.offset() as usize)
            .take(filter.limit() as usize)
            .cloned()
            .collect())
    }

    async fn live_history(&self, tenant: TenantId) -> Result<Vec<SubmissionRecord>> {
        let submissions = self.submissions.read().await;
        let mut history: Vec<SubmissionRecord> = submissions
            .iter()
            .filter(|s| s.tenant_id == tenant && s.extends_live_chain())
            .cloned()
            .collect();
        history.sort_by_key(|s| s.invoice_counter);
        Ok(history)
    }
}
