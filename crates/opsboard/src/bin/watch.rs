//! Live-update watcher.
//!
//! Connects to an opsboard server and logs every event it streams. Useful
//! for checking a deployment without a dashboard.

use anyhow::{bail, Result};
use clap::Parser;
use opsboard_client::{validate_url, ClientConfig, SocketManager};
use opsboard_core::{EventTag, ServerMessage};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(version, about = "Log every event streamed by an opsboard server")]
struct Args {
    /// Live-update URL, e.g. ws://localhost:3001/ws
    #[arg(long, env = "OPSBOARD_WS_URL")]
    url: String,

    /// Base reconnect delay (ms)
    #[arg(long, default_value_t = 3000)]
    reconnect_interval_ms: u64,

    /// Reconnect cycles before giving up
    #[arg(long, default_value_t = 5)]
    max_reconnect_attempts: u32,

    /// Heartbeat ping interval (ms)
    #[arg(long, default_value_t = 30_000)]
    heartbeat_interval_ms: u64,
}

fn summarize(msg: &ServerMessage) -> String {
    match msg {
        ServerMessage::InfrastructureServices(services) => format!("{} services", services.len()),
        ServerMessage::Metrics(metrics) => metrics
            .iter()
            .map(|m| format!("{}={:.1}{}", m.id, m.value, m.unit))
            .collect::<Vec<_>>()
            .join(" "),
        ServerMessage::Deployments(deployments) => format!("{} deployments", deployments.len()),
        ServerMessage::Pipeline(Some(pipeline)) => {
            format!("{} ({} stages)", pipeline.name, pipeline.stages.len())
        }
        ServerMessage::Pipeline(None) => "no pipeline".to_string(),
        ServerMessage::Web3Networks(networks) => networks
            .iter()
            .map(|n| format!("{}={:.1}gwei", n.id, n.gas_price.average))
            .collect::<Vec<_>>()
            .join(" "),
        ServerMessage::Alert(alert) => format!("[{:?}] {}", alert.severity, alert.title),
        ServerMessage::Pong => "pong".to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    opsboard_telemetry::init_logging()?;

    if validate_url(&args.url).is_err() {
        bail!("{:?} is not a ws:// or wss:// URL", args.url);
    }

    let manager = SocketManager::new(ClientConfig {
        reconnect_interval_ms: args.reconnect_interval_ms,
        max_reconnect_attempts: args.max_reconnect_attempts,
        heartbeat_interval_ms: args.heartbeat_interval_ms,
        ..ClientConfig::with_url(args.url.clone())
    });

    let subscriptions: Vec<_> = EventTag::ALL
        .into_iter()
        .map(|tag| {
            manager.subscribe(tag, move |msg| {
                info!(tag = %tag, "{}", summarize(msg));
            })
        })
        .collect();

    let mut status = manager.watch();
    manager.connect();
    info!(url = %args.url, "Watching live updates");

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                info!(
                    state = %current.state,
                    attempts = current.reconnect_attempts,
                    next_retry_ms = ?current.next_retry_ms,
                    error = ?current.error,
                    "Connection status"
                );
                if current.terminal {
                    warn!("Reconnect attempts exhausted, exiting");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    for subscription in &subscriptions {
        subscription.unsubscribe();
    }
    manager.disconnect().await;
    Ok(())
}
