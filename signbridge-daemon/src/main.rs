//! Signbridge Daemon
//!
//! Browser-facing HTTP service. Browser code calls it; it attaches the
//! plugin's credentials and forwards the calls to the signing backend.
//!
//! # Running
//!
//! ```bash
//! cargo run -p signbridge-daemon -- --config ./daemon.toml
//! # or after install:
//! signbridged
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use signbridge_daemon::{ApiState, DaemonConfig, ServerConfig, load_config, start_server};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "signbridged")]
#[command(author, version, about = "Signbridge signing proxy daemon", long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    init_logging(&config.log_level);

    info!("Starting Signbridge daemon...");
    info!("Loaded configuration from {:?}", config.config_path);

    run_daemon(config).await
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt().with_env_filter(filter).with_target(false).init();
}

async fn run_daemon(config: DaemonConfig) -> Result<()> {
    let state = ApiState::from_config(&config).await?;
    let server_handle = start_server(&ServerConfig::from(&config), state).await?;

    info!(addr = %server_handle.local_addr(), "Daemon running. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping server...");

    server_handle.stop().await?;

    info!("Daemon stopped");
    Ok(())
}
