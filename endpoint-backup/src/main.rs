//! Endpoint Backup Agent - Main entry point

use anyhow::Result;
use clap::Parser;
use endpoint_backup::{api, config::Config, daemon::shutdown::ShutdownCoordinator, utils, BackupManager};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

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

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref())?;

    if args.print_config {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!(
        "Starting endpoint-backup v{} (agent_id: {})",
        env!("CARGO_PKG_VERSION"),
        config.agent.id
    );

    let problems = config.validate();
    if !problems.is_empty() {
        tracing::warn!("Configuration has {} problem(s), backups may fail", problems.len());
    }

    let manager = Arc::new(BackupManager::new(config.backup_config()?));
    if config.backup.enabled {
        if let Err(e) = manager.start() {
            tracing::error!(error = %e, "Failed to start backup scheduler");
        }
    } else {
        tracing::info!("Scheduled backups disabled; on-demand runs remain available");
    }

    let port = args.port.unwrap_or(config.agent.port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = api::create_router(api::AppState::new(Arc::clone(&manager)));

    let shutdown = ShutdownCoordinator::new();
    let server_shutdown = shutdown.token();

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        server_shutdown.cancelled().await;
    });
    let server_handle = tokio::spawn(async move { server.await });

    shutdown.wait_for_signal().await;

    manager.stop().await;

    match tokio::time::timeout(std::time::Duration::from_secs(5), server_handle).await {
        Ok(Ok(Ok(()))) => tracing::info!("Server shutdown complete"),
        Ok(Ok(Err(e))) => tracing::error!("Server error during shutdown: {}", e),
        Ok(Err(e)) => tracing::error!("Server task panicked: {}", e),
        Err(_) => tracing::warn!("Server shutdown timeout, forcing exit"),
    }

    Ok(())
}
