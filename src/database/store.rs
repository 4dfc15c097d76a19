use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{Executor, PgConnection, Postgres};
use std::sync::Arc;
use tracing::debug;

use crate::tenancy::ConnectionParams;

use super::manager::{DatabaseError, PoolRegistry};

/// The data store a request talks to, reconfigured by the connection router.
///
/// Setters only record the desired target; nothing reaches the database until
/// `reconnect` checks out a connection for it.
#[async_trait]
pub trait DataStoreTarget: Send {
    fn set_schema(&mut self, schema: Option<&str>);

    /// `None` selects the shared physical connection
    fn set_connection_params(&mut self, params: Option<&ConnectionParams>);

    async fn reconnect(&mut self) -> Result<(), DatabaseError>;

    /// Run a raw statement (schema creation, search path) on the active connection
    async fn execute(&mut self, statement: &str) -> Result<(), DatabaseError>;

    /// Routed connection for the data-access layer
    fn connection_mut(&mut self) -> Result<&mut PgConnection, DatabaseError>;
}

/// Opens an unrouted target at the start of every request
#[async_trait]
pub trait DataStoreProvider: Send + Sync {
    fn open(&self) -> Box<dyn DataStoreTarget>;

    /// Reachability of the shared physical database
    async fn health_check(&self) -> Result<(), DatabaseError>;
}

/// Postgres target backed by the pool registry
pub struct PgDataStore {
    registry: Arc<PoolRegistry>,
    params: Option<ConnectionParams>,
    schema: Option<String>,
    conn: Option<PoolConnection<Postgres>>,
}

impl PgDataStore {
    pub fn new(registry: Arc<PoolRegistry>) -> Self {
        Self {
            registry,
            params: None,
            schema: None,
            conn: None,
        }
    }
}

#[async_trait]
impl DataStoreTarget for PgDataStore {
    fn set_schema(&mut self, schema: Option<&str>) {
        self.schema = schema.map(str::to_string);
    }

    fn set_connection_params(&mut self, params: Option<&ConnectionParams>) {
        self.params = params.cloned();
    }

    async fn reconnect(&mut self) -> Result<(), DatabaseError> {
        // Return the previous checkout before taking a new one
        self.conn = None;
        let pool = self.registry.pool_for(self.params.as_ref()).await?;
        self.conn = Some(pool.acquire().await?);
        debug!(
            "Data store connected to {} connection for schema {}",
            if self.params.is_some() { "dedicated" } else { "shared" },
            self.schema.as_deref().unwrap_or("public")
        );
        Ok(())
    }

    async fn execute(&mut self, statement: &str) -> Result<(), DatabaseError> {
        let conn = self.conn.as_deref_mut().ok_or(DatabaseError::NotConnected)?;
        conn.execute(statement).await?;
        Ok(())
    }

    fn connection_mut(&mut self) -> Result<&mut PgConnection, DatabaseError> {
        self.conn.as_deref_mut().ok_or(DatabaseError::NotConnected)
    }
}

pub struct PgDataStoreProvider {
    registry: Arc<PoolRegistry>,
}

impl PgDataStoreProvider {
    pub fn new(registry: Arc<PoolRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl DataStoreProvider for PgDataStoreProvider {
    fn open(&self) -> Box<dyn DataStoreTarget> {
        Box::new(PgDataStore::new(self.registry.clone()))
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        self.registry.health_check().await
    }
}
