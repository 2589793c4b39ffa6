//! astral-worker server entry point.
//!
//! Boots the offline worker and serves it as an MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use astral_client::{FetchClient, FetchConfig, OfflineWorker};
use astral_core::{AppConfig, CacheDb};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(origin = %config.origin, db = %config.db_path.display(), "Starting astral-worker on stdio transport");
    if let Err(e) = config.require_vapid_public_key() {
        tracing::warn!(error = %e, "push subscriptions disabled");
    }

    let db = CacheDb::open(&config.db_path).await?;
    let network = Arc::new(FetchClient::new(FetchConfig::from(&config))?);
    let worker = Arc::new(OfflineWorker::new(&config, db, network)?);

    let handler = handler::AstralWorkerServer::new(worker, &config.origin);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
