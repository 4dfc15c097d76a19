use sqlx::{postgres::PgPoolOptions, PgPool};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;
use url::Url;

use crate::tenancy::ConnectionParams;

/// Errors from the data-store layer
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("No active connection; route the request before using the data store")]
    NotConnected,

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error(transparent)]
    Filter(#[from] crate::filter::FilterError),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl DatabaseError {
    /// True when the database could not be reached at all
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            DatabaseError::Sqlx(sqlx::Error::PoolTimedOut)
                | DatabaseError::Sqlx(sqlx::Error::PoolClosed)
                | DatabaseError::Sqlx(sqlx::Error::Io(_))
                | DatabaseError::Sqlx(sqlx::Error::Tls(_))
        )
    }
}

/// Pool settings applied to every pool the registry creates
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// Lazily created connection pools, one per distinct database URL.
///
/// The shared physical database and every dedicated tenant database get their
/// own pool; pools live for the lifetime of the registry.
pub struct PoolRegistry {
    shared_url: Url,
    settings: PoolSettings,
    pools: Arc<RwLock<HashMap<String, PgPool>>>,
}

impl PoolRegistry {
    pub fn new(shared_url: Url, settings: PoolSettings) -> Self {
        Self {
            shared_url,
            settings,
            pools: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Build a registry from `DATABASE_URL`
    pub fn from_env(settings: PoolSettings) -> Result<Self, DatabaseError> {
        let base = std::env::var("DATABASE_URL").map_err(|_| DatabaseError::ConfigMissing("DATABASE_URL"))?;
        let url = Url::parse(&base).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        Ok(Self::new(url, settings))
    }

    /// Pool for the shared physical database
    pub async fn shared_pool(&self) -> Result<PgPool, DatabaseError> {
        let url = self.shared_url.clone();
        self.get_pool(&url).await
    }

    /// Pool for the given dedicated connection, or the shared one when `None`
    pub async fn pool_for(&self, params: Option<&ConnectionParams>) -> Result<PgPool, DatabaseError> {
        let url = match params {
            Some(params) => Self::build_connection_url(&self.shared_url, params)?,
            None => self.shared_url.clone(),
        };
        self.get_pool(&url).await
    }

    /// Get existing pool or create a new one lazily
    async fn get_pool(&self, url: &Url) -> Result<PgPool, DatabaseError> {
        let key = url.as_str().to_string();

        // Fast path: try read lock
        {
            let pools = self.pools.read().await;
            if let Some(pool) = pools.get(&key) {
                return Ok(pool.clone());
            }
        }

        let pool = PgPoolOptions::new()
            .max_connections(self.settings.max_connections)
            .acquire_timeout(self.settings.acquire_timeout)
            .connect(url.as_str())
            .await?;

        // Another request may have raced us here; keep whichever landed first
        let pool = {
            let mut pools = self.pools.write().await;
            pools.entry(key).or_insert(pool).clone()
        };

        info!(
            "Created database pool for: {}{}",
            url.host_str().unwrap_or("localhost"),
            url.path()
        );
        Ok(pool)
    }

    /// Overlay dedicated connection fields on the shared URL. Fields the tenant
    /// row leaves empty keep the shared value.
    pub fn build_connection_url(base: &Url, params: &ConnectionParams) -> Result<Url, DatabaseError> {
        let mut url = base.clone();
        url.set_host(Some(&params.host)).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        if let Some(port) = params.port {
            url.set_port(Some(port)).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        }
        if let Some(user) = &params.user {
            url.set_username(user).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        }
        if let Some(password) = &params.password {
            url.set_password(Some(password)).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        }
        if let Some(database) = &params.database {
            url.set_path(&format!("/{}", database));
        }
        Ok(url)
    }

    /// Pings the shared pool to ensure connectivity
    pub async fn health_check(&self) -> Result<(), DatabaseError> {
        let pool = self.shared_pool().await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        Ok(())
    }

    /// Close and remove all pools (e.g., on shutdown)
    pub async fn close_all(&self) {
        let mut pools = self.pools.write().await;
        for (_, pool) in pools.drain() {
            pool.close().await;
        }
        info!("Closed all database pools");
    }
}

/// Quote SQL identifier to prevent injection
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal; Postgres resolves its type from the compared column
pub fn quote_literal(value: &str) -> Result<String, DatabaseError> {
    if value.contains('\0') {
        return Err(DatabaseError::QueryError("string literal contains NUL byte".to_string()));
    }
    Ok(format!("'{}'", value.replace('\'', "''")))
}

/// Accepts `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("postgres://app:pw@localhost:5432/shared?sslmode=disable").unwrap()
    }

    #[test]
    fn dedicated_fields_replace_shared_ones() {
        let params = ConnectionParams {
            host: "db.acme.internal".into(),
            port: Some(6432),
            database: Some("acme".into()),
            user: Some("acme_user".into()),
            password: Some("p@ss".into()),
        };
        let url = PoolRegistry::build_connection_url(&base(), &params).unwrap();
        assert_eq!(url.host_str(), Some("db.acme.internal"));
        assert_eq!(url.port(), Some(6432));
        assert_eq!(url.path(), "/acme");
        assert_eq!(url.username(), "acme_user");
        assert!(url.as_str().ends_with("sslmode=disable"));
    }

    #[test]
    fn missing_dedicated_fields_fall_back_to_shared() {
        let params = ConnectionParams {
            host: "db.acme.internal".into(),
            port: None,
            database: None,
            user: None,
            password: None,
        };
        let url = PoolRegistry::build_connection_url(&base(), &params).unwrap();
        assert_eq!(url.port(), Some(5432));
        assert_eq!(url.path(), "/shared");
        assert_eq!(url.username(), "app");
        assert_eq!(url.password(), Some("pw"));
    }

    #[test]
    fn quotes_identifiers_and_literals() {
        assert_eq!(quote_identifier("acme"), "\"acme\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(quote_literal("O'Brien").unwrap(), "'O''Brien'");
        assert!(quote_literal("a\0b").is_err());
    }

    #[test]
    fn validates_identifiers() {
        assert!(is_valid_identifier("created_at"));
        assert!(is_valid_identifier("_private"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("1abc"));
        assert!(!is_valid_identifier("price; DROP TABLE x"));
    }
}
