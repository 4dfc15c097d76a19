#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use axum::{body::Body, http::Request, response::Response};
use serde_json::Value;
use sqlx::PgConnection;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tenancy_api::database::manager::DatabaseError;
use tenancy_api::database::store::{DataStoreProvider, DataStoreTarget};
use tenancy_api::database::CascadeRegistry;
use tenancy_api::filter::QueryFilterCompiler;
use tenancy_api::tenancy::{
    ConnectionParams, MemoryTenantCache, TenantKey, TenantLookup, TenantRecord, TenantResolver,
};
use tenancy_api::{AppState, RequestSettings};

pub const API_KEY: &str = "acme-key-0001";
pub const DEDICATED_KEY: &str = "globex-key-0002";

/// Landlord stand-in with a call counter
#[derive(Default)]
pub struct FakeLookup {
    records: HashMap<TenantKey, TenantRecord>,
    calls: AtomicUsize,
}

impl FakeLookup {
    pub fn with(mut self, key: TenantKey, record: TenantRecord) -> Self {
        self.records.insert(key, record);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TenantLookup for FakeLookup {
    async fn find_by_key(&self, key: &TenantKey) -> Result<Option<TenantRecord>, DatabaseError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.get(key).cloned())
    }
}

/// Everything the fake targets were asked to do, across requests
#[derive(Debug, Default)]
pub struct StoreLog {
    pub statements: Vec<String>,
    pub hosts: Vec<Option<String>>,
    pub opened: usize,
}

pub struct FakeTarget {
    log: Arc<Mutex<StoreLog>>,
    params: Option<ConnectionParams>,
    fail_statements: bool,
}

#[async_trait]
impl DataStoreTarget for FakeTarget {
    fn set_schema(&mut self, _schema: Option<&str>) {}

    fn set_connection_params(&mut self, params: Option<&ConnectionParams>) {
        self.params = params.cloned();
    }

    async fn reconnect(&mut self) -> Result<(), DatabaseError> {
        let host = self.params.as_ref().map(|p| p.host.clone());
        self.log.lock().unwrap().hosts.push(host);
        Ok(())
    }

    async fn execute(&mut self, statement: &str) -> Result<(), DatabaseError> {
        if self.fail_statements {
            return Err(DatabaseError::QueryError("permission denied for database".into()));
        }
        self.log.lock().unwrap().statements.push(statement.to_string());
        Ok(())
    }

    fn connection_mut(&mut self) -> Result<&mut PgConnection, DatabaseError> {
        Err(DatabaseError::NotConnected)
    }
}

#[derive(Default)]
pub struct FakeProvider {
    pub log: Arc<Mutex<StoreLog>>,
    pub fail_statements: bool,
    pub healthy: bool,
}

#[async_trait]
impl DataStoreProvider for FakeProvider {
    fn open(&self) -> Box<dyn DataStoreTarget> {
        self.log.lock().unwrap().opened += 1;
        Box::new(FakeTarget {
            log: self.log.clone(),
            params: None,
            fail_statements: self.fail_statements,
        })
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        if self.healthy {
            Ok(())
        } else {
            Err(DatabaseError::Sqlx(sqlx::Error::PoolTimedOut))
        }
    }
}

pub fn shared_record(schema: &str) -> TenantRecord {
    TenantRecord {
        database_schema: Some(schema.to_string()),
        ..Default::default()
    }
}

pub fn dedicated_record(host: &str, schema: Option<&str>) -> TenantRecord {
    TenantRecord {
        database_schema: schema.map(str::to_string),
        database_host: Some(host.to_string()),
        database_port: Some("5432".to_string()),
        database_user: Some("globex".to_string()),
        database_pass: Some("hunter2".to_string()),
        database_db: Some("globex".to_string()),
    }
}

pub fn default_lookup() -> FakeLookup {
    FakeLookup::default()
        .with(TenantKey::ApiKey(API_KEY.into()), shared_record("tenant_acme"))
        .with(
            TenantKey::ApiKey(DEDICATED_KEY.into()),
            dedicated_record("db.globex.internal", Some("globex")),
        )
}

pub fn settings() -> RequestSettings {
    RequestSettings {
        api_key_header: "X-Api-Key".into(),
        tenant_header: "X-Current-Tenant".into(),
        echo_tenant_header: true,
        resolve_by_hostname: false,
        trust_forwarded_tenant: false,
        default_page_size: 15,
        max_page_size: 100,
    }
}

pub fn state(lookup: Arc<FakeLookup>, provider: Arc<FakeProvider>, settings: RequestSettings) -> AppState {
    let resolver = TenantResolver::new(
        Arc::new(MemoryTenantCache::new()),
        lookup,
        Duration::from_secs(305),
    );
    AppState::new(
        resolver,
        provider,
        QueryFilterCompiler::default(),
        CascadeRegistry::default(),
        settings,
    )
}

pub fn get(uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn json_body(response: Response) -> Result<Value> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}
