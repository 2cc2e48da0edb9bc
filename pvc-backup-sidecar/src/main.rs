//! PVC Backup Sidecar - Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use pvc_backup_sidecar::{api, config::Config, daemon::ShutdownCoordinator, utils};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load(args.config.as_deref())?;

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!(
        "Starting pvc-backup-sidecar v{} (data_dir: {}, backup_root: {})",
        env!("CARGO_PKG_VERSION"),
        config.postgres.data_dir.display(),
        config.storage.backup_root.display()
    );

    // Determine address
    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", config.server.listen_address, port)
        .parse()
        .with_context(|| format!("invalid listen address {}", config.server.listen_address))?;

    let shutdown_coordinator = ShutdownCoordinator::new();

    let app_state = api::AppState::from_config(&config, shutdown_coordinator.token())?;
    let app = api::create_router(app_state);

    tracing::info!("Listening on http://{}", addr);
    tracing::info!("Instance backup endpoint: {}", config.postgres.backup_endpoint);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown_coordinator.wait_for_signal().await })
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}
