use thiserror::Error;

use crate::database::manager::DatabaseError;

#[derive(Debug, Error)]
pub enum TenancyError {
    #[error("Tenant not found for {0}")]
    TenantNotFound(String),

    #[error("Invalid tenant header: {0}")]
    InvalidTenantHeader(String),

    #[error("Tenant {0} has neither a dedicated host nor a schema")]
    IncompleteTenant(String),

    #[error("Tenant lookup failed: {0}")]
    Lookup(#[source] DatabaseError),

    #[error("Data store routing failed: {0}")]
    DataStore(#[source] DatabaseError),
}
