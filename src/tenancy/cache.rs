use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache store unavailable: {0}")]
    Unavailable(String),
}

/// TTL key-value store shared by every request in the process.
///
/// Writes are visible to all holders of the same store. There is no explicit
/// delete; entries disappear when their TTL runs out.
#[async_trait]
pub trait TenantCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// In-process cache backed by a read/write locked map
#[derive(Debug, Clone, Default)]
pub struct MemoryTenantCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl MemoryTenantCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl TenantCache for MemoryTenantCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone()))
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_returns_what_was_put() {
        let cache = MemoryTenantCache::new();
        cache.put("k_facts", "v".into(), Duration::from_secs(10)).await.unwrap();
        assert_eq!(cache.get("k_facts").await.unwrap().as_deref(), Some("v"));
        assert_eq!(cache.get("other").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = MemoryTenantCache::new();
        cache.put("k", "v".into(), Duration::from_secs(305)).await.unwrap();

        tokio::time::advance(Duration::from_secs(304)).await;
        assert!(cache.get("k").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn put_replaces_value_and_ttl() {
        let cache = MemoryTenantCache::new();
        cache.put("k", "old".into(), Duration::from_secs(5)).await.unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;
        cache.put("k", "new".into(), Duration::from_secs(5)).await.unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test(start_paused = true)]
    async fn purge_removes_only_expired() {
        let cache = MemoryTenantCache::new();
        cache.put("short", "a".into(), Duration::from_secs(1)).await.unwrap();
        cache.put("long", "b".into(), Duration::from_secs(100)).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn clones_share_entries() {
        let cache = MemoryTenantCache::new();
        let other = cache.clone();
        cache.put("k", "v".into(), Duration::from_secs(10)).await.unwrap();
        assert!(other.get("k").await.unwrap().is_some());
    }
}
