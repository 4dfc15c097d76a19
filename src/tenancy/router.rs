use tracing::debug;

use crate::database::manager::{quote_identifier, DatabaseError};
use crate::database::store::DataStoreTarget;

use super::facts::{ConnectionMode, TenantConnectionFacts};

/// Points a request's data-store target at the tenant's database.
///
/// Every call reconnects and re-applies the search path, so nothing from an
/// earlier route (or an earlier request on the same pooled connection)
/// survives it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionRouter;

impl ConnectionRouter {
    pub fn new() -> Self {
        Self
    }

    pub async fn apply_route(
        &self,
        target: &mut dyn DataStoreTarget,
        facts: &TenantConnectionFacts,
    ) -> Result<(), DatabaseError> {
        match &facts.mode {
            ConnectionMode::Dedicated(params) => {
                debug!("Routing to dedicated host {}", params.host);
                target.set_connection_params(Some(params));
                target.set_schema(facts.schema.as_deref());
                target.reconnect().await?;
                match facts.schema.as_deref() {
                    Some(schema) => Self::select_schema(target, schema).await,
                    None => target.execute("RESET search_path").await,
                }
            }
            ConnectionMode::Shared => {
                let schema = facts
                    .schema
                    .as_deref()
                    .ok_or(DatabaseError::ConfigMissing("tenant schema"))?;
                debug!("Routing to shared schema {}", schema);
                target.set_connection_params(None);
                target.set_schema(Some(schema));
                target.reconnect().await?;
                Self::select_schema(target, schema).await
            }
        }
    }

    async fn select_schema(target: &mut dyn DataStoreTarget, schema: &str) -> Result<(), DatabaseError> {
        let quoted = quote_identifier(schema);
        target
            .execute(&format!("CREATE SCHEMA IF NOT EXISTS {}", quoted))
            .await?;
        target.execute(&format!("SET search_path TO {}", quoted)).await
    }
}
