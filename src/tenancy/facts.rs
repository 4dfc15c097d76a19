use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::FromRow;

/// How a request reaches the caller's tenant.
///
/// A key names either an API key (sent in a header) or the hostname the
/// request was addressed to. Both share one cache, so the two kinds are kept
/// in separate key spaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TenantKey {
    ApiKey(String),
    Hostname(String),
}

impl TenantKey {
    /// Cache key holding the whole facts record for this tenant key
    pub fn cache_key(&self) -> String {
        match self {
            TenantKey::ApiKey(key) => format!("key:{}_facts", key),
            TenantKey::Hostname(host) => format!("host:{}_facts", host),
        }
    }

    pub fn value(&self) -> &str {
        match self {
            TenantKey::ApiKey(v) | TenantKey::Hostname(v) => v,
        }
    }
}

impl std::fmt::Display for TenantKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Never print a full API key
            TenantKey::ApiKey(key) => {
                let visible: String = key.chars().take(4).collect();
                write!(f, "api-key {}…", visible)
            }
            TenantKey::Hostname(host) => write!(f, "host {}", host),
        }
    }
}

/// Credentials and address of a dedicated tenant database.
///
/// Only `host` is guaranteed; any other missing field falls back to the value
/// of the shared connection when the target reconnects.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub host: String,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConnectionMode {
    /// Isolation by search path on the shared physical connection
    Shared,
    /// Isolation by a separate physical database
    Dedicated(ConnectionParams),
}

/// Resolved identity of a tenant's data store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantConnectionFacts {
    pub schema: Option<String>,
    pub mode: ConnectionMode,
}

impl TenantConnectionFacts {
    pub fn shared(schema: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            mode: ConnectionMode::Shared,
        }
    }

    pub fn dedicated(schema: Option<String>, params: ConnectionParams) -> Self {
        Self {
            schema,
            mode: ConnectionMode::Dedicated(params),
        }
    }

    pub fn is_dedicated(&self) -> bool {
        matches!(self.mode, ConnectionMode::Dedicated(_))
    }

    pub fn connection(&self) -> Option<&ConnectionParams> {
        match &self.mode {
            ConnectionMode::Dedicated(params) => Some(params),
            ConnectionMode::Shared => None,
        }
    }

    pub fn host(&self) -> Option<&str> {
        self.connection().map(|c| c.host.as_str())
    }

    pub fn mode_name(&self) -> &'static str {
        match self.mode {
            ConnectionMode::Shared => "shared",
            ConnectionMode::Dedicated(_) => "dedicated",
        }
    }

    /// Diagnostic view without credentials
    pub fn describe(&self) -> Value {
        match &self.mode {
            ConnectionMode::Shared => json!({
                "mode": self.mode_name(),
                "schema": self.schema,
            }),
            ConnectionMode::Dedicated(params) => json!({
                "mode": self.mode_name(),
                "schema": self.schema,
                "host": params.host,
                "port": params.port,
                "database": params.database,
                "user": params.user,
            }),
        }
    }
}

/// Tenant row as stored by the landlord database
#[derive(Debug, Clone, Default, FromRow)]
pub struct TenantRecord {
    pub database_schema: Option<String>,
    pub database_host: Option<String>,
    pub database_port: Option<String>,
    pub database_user: Option<String>,
    pub database_pass: Option<String>,
    pub database_db: Option<String>,
}

impl TenantRecord {
    /// Derive connection facts. Returns `None` for a row that names neither a
    /// dedicated host nor a schema, which cannot be routed.
    pub fn into_facts(self) -> Option<TenantConnectionFacts> {
        let schema = non_empty(self.database_schema);
        match non_empty(self.database_host) {
            Some(host) => {
                let port = non_empty(self.database_port).and_then(|p| match p.trim().parse::<u16>() {
                    Ok(port) => Some(port),
                    Err(_) => {
                        tracing::warn!("Ignoring unparsable tenant database port '{}' for host {}", p, host);
                        None
                    }
                });
                Some(TenantConnectionFacts::dedicated(
                    schema,
                    ConnectionParams {
                        host,
                        port,
                        database: non_empty(self.database_db),
                        user: non_empty(self.database_user),
                        password: non_empty(self.database_pass),
                    },
                ))
            }
            None => schema.map(TenantConnectionFacts::shared),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dedicated_row() -> TenantRecord {
        TenantRecord {
            database_schema: Some("acme".into()),
            database_host: Some("db.acme.internal".into()),
            database_port: Some("6432".into()),
            database_user: Some("acme".into()),
            database_pass: Some("s3cret".into()),
            database_db: Some("acme_prod".into()),
        }
    }

    #[test]
    fn row_with_host_is_dedicated() {
        let facts = dedicated_row().into_facts().unwrap();
        assert!(facts.is_dedicated());
        assert_eq!(facts.host(), Some("db.acme.internal"));
        assert_eq!(facts.connection().unwrap().port, Some(6432));
        assert_eq!(facts.schema.as_deref(), Some("acme"));
    }

    #[test]
    fn row_without_host_is_shared_and_drops_connection_fields() {
        let row = TenantRecord {
            database_host: Some("   ".into()),
            ..dedicated_row()
        };
        let facts = row.into_facts().unwrap();
        assert_eq!(facts, TenantConnectionFacts::shared("acme"));
        assert!(facts.connection().is_none());
    }

    #[test]
    fn row_without_host_or_schema_cannot_route() {
        let row = TenantRecord {
            database_schema: Some(String::new()),
            ..Default::default()
        };
        assert!(row.into_facts().is_none());
    }

    #[test]
    fn dedicated_row_keeps_null_schema() {
        let row = TenantRecord {
            database_schema: None,
            ..dedicated_row()
        };
        let facts = row.into_facts().unwrap();
        assert!(facts.is_dedicated());
        assert_eq!(facts.schema, None);
    }

    #[test]
    fn bad_port_is_tolerated() {
        let row = TenantRecord {
            database_port: Some("five-four-three-two".into()),
            ..dedicated_row()
        };
        let facts = row.into_facts().unwrap();
        assert_eq!(facts.connection().unwrap().port, None);
    }

    #[test]
    fn describe_and_debug_hide_password() {
        let facts = dedicated_row().into_facts().unwrap();
        assert!(!facts.describe().to_string().contains("s3cret"));
        assert!(!format!("{:?}", facts).contains("s3cret"));
    }

    #[test]
    fn api_keys_and_hostnames_use_separate_cache_keys() {
        let a = TenantKey::ApiKey("shop.example.com".into());
        let b = TenantKey::Hostname("shop.example.com".into());
        assert_ne!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key(), "key:shop.example.com_facts");

        // an api key shaped like a hostname entry still lands in its own space
        let lookalike = TenantKey::ApiKey("host:shop".into());
        let host = TenantKey::Hostname("shop".into());
        assert_ne!(lookalike.cache_key(), host.cache_key());
    }

    #[test]
    fn display_truncates_api_key() {
        let key = TenantKey::ApiKey("abcdef123456".into());
        assert_eq!(key.to_string(), "api-key abcd…");
    }
}
