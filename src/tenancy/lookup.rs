use async_trait::async_trait;
use std::sync::Arc;

use crate::database::manager::{quote_identifier, DatabaseError, PoolRegistry};

use super::facts::{TenantKey, TenantRecord};

/// System of record for tenants. Read-only from this service's side.
#[async_trait]
pub trait TenantLookup: Send + Sync {
    async fn find_by_key(&self, key: &TenantKey) -> Result<Option<TenantRecord>, DatabaseError>;
}

/// Landlord lookup over the shared database.
///
/// Expects `<landlord>.api_keys(key, tenant_id, deleted_at)` and
/// `<landlord>.tenants(id, domain, database_schema, database_host,
/// database_port, database_user, database_pass, database_db, deleted_at)`.
pub struct PgTenantLookup {
    registry: Arc<PoolRegistry>,
    by_api_key_sql: String,
    by_hostname_sql: String,
}

impl PgTenantLookup {
    pub fn new(registry: Arc<PoolRegistry>, landlord_schema: &str) -> Self {
        let schema = quote_identifier(landlord_schema);
        let by_api_key_sql = format!(
            r#"
            SELECT t.database_schema, t.database_host, t.database_port::text AS database_port,
                   t.database_user, t.database_pass, t.database_db
            FROM {schema}.api_keys k
            JOIN {schema}.tenants t ON t.id = k.tenant_id
            WHERE k.key = $1
            AND k.deleted_at IS NULL
            AND t.deleted_at IS NULL
            LIMIT 1
            "#
        );
        let by_hostname_sql = format!(
            r#"
            SELECT t.database_schema, t.database_host, t.database_port::text AS database_port,
                   t.database_user, t.database_pass, t.database_db
            FROM {schema}.tenants t
            WHERE t.domain = $1
            AND t.deleted_at IS NULL
            LIMIT 1
            "#
        );
        Self {
            registry,
            by_api_key_sql,
            by_hostname_sql,
        }
    }
}

#[async_trait]
impl TenantLookup for PgTenantLookup {
    async fn find_by_key(&self, key: &TenantKey) -> Result<Option<TenantRecord>, DatabaseError> {
        let pool = self.registry.shared_pool().await?;
        let sql = match key {
            TenantKey::ApiKey(_) => &self.by_api_key_sql,
            TenantKey::Hostname(_) => &self.by_hostname_sql,
        };

        let record = sqlx::query_as::<_, TenantRecord>(sql)
            .bind(key.value())
            .fetch_optional(&pool)
            .await?;

        Ok(record)
    }
}
