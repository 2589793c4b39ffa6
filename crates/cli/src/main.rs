//! astral: command-line driver for the offline worker.
//!
//! Each invocation is a fresh worker process over the configured database, so
//! `activate` runs install first. Results are printed to stdout as JSON; logs
//! go to stderr.

mod args;

use std::sync::Arc;

use anyhow::Result;
use astral_client::{FetchClient, FetchConfig, OfflineWorker, crisis};
use astral_core::{AppConfig, CacheDb};
use clap::Parser;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use args::{Cli, Commands};

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = AppConfig::load()?;
    if let Some(origin) = &cli.origin {
        config.origin = origin.clone();
    }
    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }
    config.validate()?;
    Ok(config)
}

async fn worker_for(cli: &Cli) -> Result<OfflineWorker> {
    let config = load_config(cli)?;
    tracing::debug!(origin = %config.origin, db = %config.db_path.display(), "opening worker");
    let db = CacheDb::open(&config.db_path).await?;
    let network = Arc::new(FetchClient::new(FetchConfig::from(&config))?);
    Ok(OfflineWorker::new(&config, db, network)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let output = match &cli.command {
        Commands::Detect { text } => {
            let text = text.join(" ");
            let terms = crisis::detect(&text);
            json!({ "crisis": !terms.is_empty(), "terms": terms })
        }
        Commands::Install => {
            let worker = worker_for(&cli).await?;
            serde_json::to_value(worker.install().await?)?
        }
        Commands::Activate => {
            let worker = worker_for(&cli).await?;
            let install = worker.install().await?;
            let activate = worker.activate().await?;
            json!({ "install": install, "activate": activate })
        }
        Commands::Sync { queue } => {
            let worker = worker_for(&cli).await?;
            serde_json::to_value(worker.handle_sync(queue.map(Into::into)).await?)?
        }
        Commands::Status => {
            let worker = worker_for(&cli).await?;
            serde_json::to_value(worker.status().await?)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
