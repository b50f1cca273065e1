//! Tracklink ingestion daemon (tracklinkd)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracklink_core::SessionRegistry;
use tracklink_service::{FileStore, Server, ServiceConfig, spawn_writer};

#[derive(Parser)]
#[command(name = "tracklinkd")]
#[command(about = "Receive, validate and store GPS tracker telemetry")]
#[command(version)]
struct Cli {
    /// Configuration file; written with defaults if missing
    #[arg(short, long, default_value = "tracklink.json")]
    config: PathBuf,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, default_value = "tracklink_service=debug,info")]
    log: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting tracklinkd v{}", env!("CARGO_PKG_VERSION"));

    let config = ServiceConfig::load(&cli.config)
        .await
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;
    info!(
        service = %config.service_name,
        storage_root = %config.storage_root.display(),
        min_satellites = config.min_satellites,
        "Configuration loaded"
    );

    let registry = Arc::new(SessionRegistry::new());
    let (storage, writer) = spawn_writer(
        FileStore::new(config.storage_root.clone()),
        config.storage_queue,
    );
    let server = Server::bind(&config, registry, storage).await?;

    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Error waiting for Ctrl+C: {e}");
            }
        })
        .await?;

    writer.await.context("Storage writer panicked")?;
    info!("Service stopped");
    Ok(())
}
