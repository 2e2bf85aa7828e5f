use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models::credential_model::TenantId;

/// One async mutex per tenant around every read-extend of its hash chain.
/// Different tenants never wait on each other.
#[derive(Default)]
pub struct TenantLocks {
    locks: Mutex<HashMap<TenantId, Arc<AsyncMutex<()>>>>,
}

impl TenantLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, tenant: TenantId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(tenant).or_default().clone()
        };
        lock.lock_owned().await
    }
}
