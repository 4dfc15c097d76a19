use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::app::app;
use crate::config::{config, AppConfig};
use crate::database::manager::{PoolRegistry, PoolSettings};
use crate::is_production;
use crate::state::AppState;
use crate::tenancy::{MemoryTenantCache, PgTenantLookup, TenantKey, TenantResolver};

#[derive(Parser)]
#[command(name = "tenancy-api")]
#[command(about = "Multi-tenant API server: tenant resolution, connection routing and filtered resources")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP server (default)")]
    Serve {
        #[arg(long, env = "TENANCY_API_PORT", help = "Port to listen on")]
        port: Option<u16>,
    },

    #[command(about = "Resolve a tenant and print its connection facts without credentials")]
    Resolve {
        #[arg(long, conflicts_with = "host", required_unless_present = "host")]
        api_key: Option<String>,

        #[arg(long)]
        host: Option<String>,
    },
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => serve(port).await,
        Commands::Resolve { api_key, host } => {
            let key = match (api_key, host) {
                (Some(key), _) => TenantKey::ApiKey(key),
                (None, Some(host)) => TenantKey::Hostname(host.to_ascii_lowercase()),
                (None, None) => anyhow::bail!("either --api-key or --host is required"),
            };
            resolve(key).await
        }
    }
}

fn pool_registry(config: &AppConfig) -> anyhow::Result<Arc<PoolRegistry>> {
    let settings = PoolSettings {
        max_connections: config.database.max_connections,
        acquire_timeout: std::time::Duration::from_secs(config.database.connection_timeout),
    };
    Ok(Arc::new(PoolRegistry::from_env(settings)?))
}

async fn serve(port: Option<u16>) -> anyhow::Result<()> {
    let config = config();
    info!("Starting Tenancy API in {:?} mode", config.environment);

    if is_production!() && config.tenancy.trust_forwarded_tenant {
        warn!("Forwarded tenant headers are trusted; expose this service to internal callers only");
    }

    let registry = pool_registry(config)?;
    let cache = MemoryTenantCache::new();
    spawn_cache_purge(cache.clone(), config.tenancy.cache_purge_interval());

    let state = AppState::from_config(config, registry.clone(), Arc::new(cache))?;
    let mut router = app(state);
    if config.api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }

    let bind_addr = format!("0.0.0.0:{}", port.unwrap_or(config.api.port));
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    info!("Tenancy API listening on http://{}", bind_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    registry.close_all().await;
    Ok(())
}

async fn resolve(key: TenantKey) -> anyhow::Result<()> {
    let config = config();
    let registry = pool_registry(config)?;
    let lookup = Arc::new(PgTenantLookup::new(registry.clone(), &config.database.landlord_schema));
    let resolver = TenantResolver::new(Arc::new(MemoryTenantCache::new()), lookup, config.tenancy.cache_ttl());

    let facts = resolver
        .resolve(&key)
        .await
        .with_context(|| format!("failed to resolve {}", key))?;
    println!("{}", serde_json::to_string_pretty(&facts.describe())?);

    registry.close_all().await;
    Ok(())
}

fn spawn_cache_purge(cache: MemoryTenantCache, every: std::time::Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let purged = cache.purge_expired().await;
            if purged > 0 {
                debug!("Purged {} expired tenant cache entries", purged);
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
