//! hero-sw entry point.
//!
//! Boots the offline worker for the configured cache version, then serves its
//! events as MCP tools on stdio. Logging goes to stderr to avoid interfering
//! with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

use hero_client::{FetchConfig, HttpTransport, OfflineWorker};
use hero_core::{AppConfig, CacheDb};

mod error;
mod handler;
mod scheduler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(cache = %config.cache_name(), db = %config.db_path.display(), "starting hero-sw on stdio transport");

    let db = CacheDb::open(&config.db_path).await?;
    let transport = Arc::new(HttpTransport::new(FetchConfig::from(&config))?);
    let worker = Arc::new(OfflineWorker::new(config, db, transport).await?);

    let state = worker.start().await?;
    tracing::info!(%state, "worker ready");

    let sync_task = scheduler::spawn(worker.clone());

    let handler = handler::HeroSwServer::new(worker);
    let server = serve_server(handler, stdio()).await?;
    server.waiting().await?;

    sync_task.abort();
    Ok(())
}
