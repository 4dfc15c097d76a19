use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::cache::TenantCache;
use super::error::TenancyError;
use super::facts::{TenantConnectionFacts, TenantKey};
use super::lookup::TenantLookup;

/// Bumped whenever the cached layout changes; older records read as a miss
const CACHE_FORMAT_VERSION: u32 = 1;

/// One cache entry per tenant key. The whole record is written at once, so a
/// reader sees either the previous record or the new one.
#[derive(Debug, Serialize, Deserialize)]
struct CachedTenant {
    version: u32,
    facts: TenantConnectionFacts,
}

/// What the cache knows about a tenant key
#[derive(Debug, PartialEq)]
enum CacheState {
    /// Dedicated connection cached; authoritative
    HostCached(TenantConnectionFacts),
    /// Shared schema cached; answered without a lookup
    SchemaOnlyCached(TenantConnectionFacts),
    Uncached,
}

/// Resolves tenant keys to connection facts, consulting the cache first
pub struct TenantResolver {
    cache: Arc<dyn TenantCache>,
    lookup: Arc<dyn TenantLookup>,
    ttl: Duration,
}

impl TenantResolver {
    pub fn new(cache: Arc<dyn TenantCache>, lookup: Arc<dyn TenantLookup>, ttl: Duration) -> Self {
        Self { cache, lookup, ttl }
    }

    pub async fn resolve(&self, key: &TenantKey) -> Result<TenantConnectionFacts, TenancyError> {
        match self.cached(key).await {
            CacheState::HostCached(facts) => {
                debug!("Tenant cache hit (dedicated) for {}", key);
                Ok(facts)
            }
            CacheState::SchemaOnlyCached(facts) => {
                debug!("Tenant cache hit (shared schema) for {}", key);
                Ok(facts)
            }
            CacheState::Uncached => self.resolve_uncached(key).await,
        }
    }

    async fn cached(&self, key: &TenantKey) -> CacheState {
        let raw = match self.cache.get(&key.cache_key()).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return CacheState::Uncached,
            Err(e) => {
                debug!("Tenant cache read failed for {}, falling back to lookup: {}", key, e);
                return CacheState::Uncached;
            }
        };

        match serde_json::from_str::<CachedTenant>(&raw) {
            Ok(cached) if cached.version == CACHE_FORMAT_VERSION => {
                if cached.facts.is_dedicated() {
                    CacheState::HostCached(cached.facts)
                } else if cached.facts.schema.is_some() {
                    CacheState::SchemaOnlyCached(cached.facts)
                } else {
                    CacheState::Uncached
                }
            }
            Ok(_) | Err(_) => {
                debug!("Ignoring unreadable tenant cache entry for {}", key);
                CacheState::Uncached
            }
        }
    }

    async fn resolve_uncached(&self, key: &TenantKey) -> Result<TenantConnectionFacts, TenancyError> {
        debug!("Tenant cache miss for {}, querying lookup", key);

        let record = self
            .lookup
            .find_by_key(key)
            .await
            .map_err(TenancyError::Lookup)?
            .ok_or_else(|| TenancyError::TenantNotFound(key.to_string()))?;

        let facts = record
            .into_facts()
            .ok_or_else(|| TenancyError::IncompleteTenant(key.to_string()))?;

        if facts.is_dedicated() && facts.schema.is_none() {
            warn!("Tenant {} uses a dedicated host without a schema", key);
        }

        self.store(key, &facts).await;
        Ok(facts)
    }

    async fn store(&self, key: &TenantKey, facts: &TenantConnectionFacts) {
        let cached = CachedTenant {
            version: CACHE_FORMAT_VERSION,
            facts: facts.clone(),
        };
        let raw = match serde_json::to_string(&cached) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to encode tenant cache entry for {}: {}", key, e);
                return;
            }
        };
        if let Err(e) = self.cache.put(&key.cache_key(), raw, self.ttl).await {
            warn!("Failed to cache tenant facts for {}: {}", key, e);
        }
    }
}
