//! SectorFlux server - transparent Ollama proxy with telemetry and a live
//! dashboard.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;

use sectorflux_server::config::Config;
use sectorflux_server::logging::{self, LogFormat, LogOptions};
use sectorflux_server::routes;
use sectorflux_server::state::AppState;

/// SectorFlux - LLM proxy and analytics.
#[derive(Parser, Debug)]
#[command(name = "sectorflux-server")]
#[command(about = "Transparent Ollama proxy with telemetry, caching, and a live dashboard")]
#[command(version)]
struct Cli {
    /// Enable verbose logging (INFO level for most targets)
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace logging (everything, including per-chunk detail)
    #[arg(long)]
    trace: bool,

    /// Quiet mode (WARN and ERROR only)
    #[arg(short, long)]
    quiet: bool,

    /// Set the log level for one target (e.g., "proxy=debug"). May be given
    /// multiple times. Bare targets are rooted under "sectorflux::".
    #[arg(long = "log", value_name = "TARGET=LEVEL")]
    log_overrides: Vec<String>,

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_options = LogOptions::from_cli(
        cli.verbose,
        cli.debug,
        cli.trace,
        cli.quiet,
        &cli.log_overrides,
        cli.log_format,
    )
    .map_err(anyhow::Error::msg)?;
    logging::init(&log_options);

    let config = Config::from_env();

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    let state = Arc::new(
        AppState::new(config.clone(), shutdown_tx).context("Failed to initialize SectorFlux")?,
    );

    state
        .broadcaster
        .spawn(state.store.clone(), config.ollama_host.clone());

    let app = routes::router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tracing::info!(
        target: "sectorflux::startup",
        "SectorFlux v{} listening on port {} (upstream {})",
        env!("CARGO_PKG_VERSION"),
        config.port,
        config.ollama_host
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_rx.recv().await;
        })
        .await?;

    // Drain queued writes before the store handle closes.
    state.store.flush().await;
    state.store.shutdown();
    tracing::info!(target: "sectorflux::startup", "SectorFlux stopped");

    Ok(())
}
