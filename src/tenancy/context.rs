use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use crate::database::store::DataStoreTarget;

use super::facts::TenantConnectionFacts;

/// Per-request tenant context, injected by the tenancy middleware.
///
/// Holds the resolved facts and the routed data-store target. Handlers read
/// the connection from here; there is no process-wide active connection.
#[derive(Clone)]
pub struct TenantContext {
    facts: Arc<TenantConnectionFacts>,
    store: Arc<Mutex<Box<dyn DataStoreTarget>>>,
}

impl TenantContext {
    pub fn new(facts: TenantConnectionFacts, store: Box<dyn DataStoreTarget>) -> Self {
        Self {
            facts: Arc::new(facts),
            store: Arc::new(Mutex::new(store)),
        }
    }

    pub fn facts(&self) -> &TenantConnectionFacts {
        &self.facts
    }

    pub async fn store(&self) -> MutexGuard<'_, Box<dyn DataStoreTarget>> {
        self.store.lock().await
    }
}

impl std::fmt::Debug for TenantContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantContext").field("facts", &self.facts).finish()
    }
}
