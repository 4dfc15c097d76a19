//! In-memory stand-ins for the tenancy collaborators

use async_trait::async_trait;
use sqlx::PgConnection;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::database::manager::DatabaseError;
use crate::database::store::DataStoreTarget;
use crate::tenancy::{CacheError, ConnectionParams, TenantCache, TenantKey, TenantLookup, TenantRecord};

/// Lookup answering from a fixed table and counting calls
#[derive(Default)]
pub struct StaticLookup {
    records: HashMap<TenantKey, TenantRecord>,
    calls: AtomicUsize,
}

impl StaticLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: TenantKey, record: TenantRecord) -> Self {
        self.records.insert(key, record);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TenantLookup for StaticLookup {
    async fn find_by_key(&self, key: &TenantKey) -> Result<Option<TenantRecord>, DatabaseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.get(key).cloned())
    }
}

/// Cache whose every call fails
pub struct FailingCache;

#[async_trait]
impl TenantCache for FailingCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn put(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }
}

/// Data-store target that records what the router asked of it
#[derive(Debug, Default)]
pub struct RecordingTarget {
    pub params: Option<ConnectionParams>,
    pub schema: Option<String>,
    pub reconnects: usize,
    pub statements: Vec<String>,
    /// Search path in effect on the current connection
    pub active_search_path: Option<String>,
    pub fail_reconnect: bool,
}

#[async_trait]
impl DataStoreTarget for RecordingTarget {
    fn set_schema(&mut self, schema: Option<&str>) {
        self.schema = schema.map(str::to_string);
    }

    fn set_connection_params(&mut self, params: Option<&ConnectionParams>) {
        self.params = params.cloned();
    }

    async fn reconnect(&mut self) -> Result<(), DatabaseError> {
        if self.fail_reconnect {
            return Err(DatabaseError::Sqlx(sqlx::Error::PoolTimedOut));
        }
        self.reconnects += 1;
        self.active_search_path = None;
        Ok(())
    }

    async fn execute(&mut self, statement: &str) -> Result<(), DatabaseError> {
        if let Some(path) = statement.strip_prefix("SET search_path TO ") {
            self.active_search_path = Some(path.to_string());
        } else if statement == "RESET search_path" {
            self.active_search_path = None;
        }
        self.statements.push(statement.to_string());
        Ok(())
    }

    fn connection_mut(&mut self) -> Result<&mut PgConnection, DatabaseError> {
        Err(DatabaseError::NotConnected)
    }
}
