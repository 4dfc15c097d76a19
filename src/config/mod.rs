use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub tenancy: TenancyConfig,
    pub database: DatabaseConfig,
    pub filter: FilterConfig,
    pub api: ApiConfig,
    pub cascade: CascadeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenancyConfig {
    /// Header carrying the tenant API key
    pub api_key_header: String,
    /// Header echoed back with the resolved schema (and read by service tenancy)
    pub tenant_header: String,
    pub echo_tenant_header: bool,
    /// Fall back to the Host header when no API key is sent
    pub resolve_by_hostname: bool,
    /// Trust an inbound tenant header from internal services instead of resolving
    pub trust_forwarded_tenant: bool,
    pub cache_ttl_secs: u64,
    pub cache_purge_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub connection_timeout: u64,
    /// Schema holding the tenants and api_keys tables
    pub landlord_schema: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    pub soft_delete_marker: String,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub enable_request_logging: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CascadeConfig {
    /// Comma separated `parent:child.foreign_key:mode` rules
    pub rules: String,
}

impl TenancyConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn cache_purge_interval(&self) -> Duration {
        Duration::from_secs(self.cache_purge_interval_secs.max(1))
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Tenancy overrides
        if let Ok(v) = env::var("TENANCY_API_KEY_HEADER") {
            self.tenancy.api_key_header = v;
        }
        if let Ok(v) = env::var("TENANCY_TENANT_HEADER") {
            self.tenancy.tenant_header = v;
        }
        if let Ok(v) = env::var("TENANCY_ECHO_TENANT_HEADER") {
            self.tenancy.echo_tenant_header = v.parse().unwrap_or(self.tenancy.echo_tenant_header);
        }
        if let Ok(v) = env::var("TENANCY_RESOLVE_BY_HOSTNAME") {
            self.tenancy.resolve_by_hostname = v.parse().unwrap_or(self.tenancy.resolve_by_hostname);
        }
        if let Ok(v) = env::var("TENANCY_TRUST_FORWARDED_TENANT") {
            self.tenancy.trust_forwarded_tenant = v.parse().unwrap_or(self.tenancy.trust_forwarded_tenant);
        }
        if let Ok(v) = env::var("TENANCY_CACHE_TTL_SECS") {
            self.tenancy.cache_ttl_secs = v.parse().unwrap_or(self.tenancy.cache_ttl_secs);
        }
        if let Ok(v) = env::var("TENANCY_CACHE_PURGE_INTERVAL_SECS") {
            self.tenancy.cache_purge_interval_secs = v.parse().unwrap_or(self.tenancy.cache_purge_interval_secs);
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Ok(v) = env::var("LANDLORD_DB_SCHEMA") {
            self.database.landlord_schema = v;
        }

        // Filter overrides
        if let Ok(v) = env::var("FILTER_SOFT_DELETE_MARKER") {
            self.filter.soft_delete_marker = v;
        }
        if let Ok(v) = env::var("FILTER_DEFAULT_PAGE_SIZE") {
            self.filter.default_page_size = v.parse().unwrap_or(self.filter.default_page_size);
        }
        if let Ok(v) = env::var("FILTER_MAX_PAGE_SIZE") {
            self.filter.max_page_size = v.parse().unwrap_or(self.filter.max_page_size);
        }

        // API overrides
        if let Some(port) = env::var("TENANCY_API_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|s| s.parse::<u16>().ok())
        {
            self.api.port = port;
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }

        if let Ok(v) = env::var("CASCADE_RULES") {
            self.cascade.rules = v;
        }

        self
    }

    fn base_tenancy() -> TenancyConfig {
        TenancyConfig {
            api_key_header: "X-Api-Key".to_string(),
            tenant_header: "X-Current-Tenant".to_string(),
            echo_tenant_header: true,
            resolve_by_hostname: false,
            trust_forwarded_tenant: false,
            cache_ttl_secs: 61 * 5,
            cache_purge_interval_secs: 60,
        }
    }

    fn base_filter() -> FilterConfig {
        FilterConfig {
            soft_delete_marker: "deleted_at".to_string(),
            default_page_size: 15,
            max_page_size: 100,
        }
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            tenancy: TenancyConfig {
                resolve_by_hostname: true,
                ..Self::base_tenancy()
            },
            database: DatabaseConfig {
                max_connections: 10,
                connection_timeout: 30,
                landlord_schema: "landlord".to_string(),
            },
            filter: FilterConfig {
                max_page_size: 1000,
                ..Self::base_filter()
            },
            api: ApiConfig {
                port: 3000,
                enable_request_logging: true,
            },
            cascade: CascadeConfig::default(),
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            tenancy: Self::base_tenancy(),
            database: DatabaseConfig {
                max_connections: 20,
                connection_timeout: 10,
                landlord_schema: "landlord".to_string(),
            },
            filter: FilterConfig {
                max_page_size: 500,
                ..Self::base_filter()
            },
            api: ApiConfig {
                port: 8080,
                enable_request_logging: true,
            },
            cascade: CascadeConfig::default(),
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            tenancy: TenancyConfig {
                echo_tenant_header: false,
                ..Self::base_tenancy()
            },
            database: DatabaseConfig {
                max_connections: 50,
                connection_timeout: 5,
                landlord_schema: "landlord".to_string(),
            },
            filter: Self::base_filter(),
            api: ApiConfig {
                port: 8080,
                enable_request_logging: false,
            },
            cascade: CascadeConfig::default(),
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_production {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Production)
    };
}
