use std::sync::Arc;

use crate::config::AppConfig;
use crate::database::cascade::CascadeRegistry;
use crate::database::manager::{DatabaseError, PoolRegistry};
use crate::database::store::{DataStoreProvider, PgDataStoreProvider};
use crate::filter::QueryFilterCompiler;
use crate::tenancy::{ConnectionRouter, PgTenantLookup, TenantCache, TenantResolver};

/// Per-request knobs read by the tenancy middleware and listing handlers
#[derive(Debug, Clone)]
pub struct RequestSettings {
    pub api_key_header: String,
    pub tenant_header: String,
    pub echo_tenant_header: bool,
    pub resolve_by_hostname: bool,
    pub trust_forwarded_tenant: bool,
    pub default_page_size: i64,
    pub max_page_size: i64,
}

impl From<&AppConfig> for RequestSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            api_key_header: config.tenancy.api_key_header.clone(),
            tenant_header: config.tenancy.tenant_header.clone(),
            echo_tenant_header: config.tenancy.echo_tenant_header,
            resolve_by_hostname: config.tenancy.resolve_by_hostname,
            trust_forwarded_tenant: config.tenancy.trust_forwarded_tenant,
            default_page_size: i64::from(config.filter.default_page_size),
            max_page_size: i64::from(config.filter.max_page_size),
        }
    }
}

/// Shared application state handed to middleware and handlers
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<TenantResolver>,
    pub router: ConnectionRouter,
    pub stores: Arc<dyn DataStoreProvider>,
    pub compiler: QueryFilterCompiler,
    pub cascades: Arc<CascadeRegistry>,
    pub settings: Arc<RequestSettings>,
}

impl AppState {
    pub fn new(
        resolver: TenantResolver,
        stores: Arc<dyn DataStoreProvider>,
        compiler: QueryFilterCompiler,
        cascades: CascadeRegistry,
        settings: RequestSettings,
    ) -> Self {
        Self {
            resolver: Arc::new(resolver),
            router: ConnectionRouter::new(),
            stores,
            compiler,
            cascades: Arc::new(cascades),
            settings: Arc::new(settings),
        }
    }

    /// Wire the Postgres-backed collaborators around the given cache
    pub fn from_config(
        config: &AppConfig,
        registry: Arc<PoolRegistry>,
        cache: Arc<dyn TenantCache>,
    ) -> Result<Self, DatabaseError> {
        let lookup = Arc::new(PgTenantLookup::new(registry.clone(), &config.database.landlord_schema));
        let resolver = TenantResolver::new(cache, lookup, config.tenancy.cache_ttl());
        let cascades = CascadeRegistry::parse(&config.cascade.rules)?;

        Ok(Self::new(
            resolver,
            Arc::new(PgDataStoreProvider::new(registry)),
            QueryFilterCompiler::new(config.filter.soft_delete_marker.clone()),
            cascades,
            RequestSettings::from(config),
        ))
    }
}
