//! opsboard - DevOps dashboard live-update server.
//!
//! Polls host, hosting platform, CI/CD and blockchain sources and streams
//! the results to dashboards over `/ws`, with REST snapshots on `/api`.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// opsboard live-update server
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "OPSBOARD_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    opsboard_telemetry::init_logging()?;

    info!("Starting opsboard v{}", env!("CARGO_PKG_VERSION"));

    // An explicit path must exist; the default one is optional.
    let (config_path, required) = match args.config {
        Some(path) => (path, true),
        None => (opsboard::DEFAULT_CONFIG_PATH.to_string(), false),
    };
    info!(config_path = %config_path, "Loading configuration");

    let config = opsboard::AppConfig::load(&config_path, required)?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        "Configuration loaded"
    );

    let app = opsboard::Application::new(config)?;
    app.run().await?;

    Ok(())
}
