//! opsboard-server - live-update pipeline, server side.
//!
//! - `Poller`: runs every metric source on its own interval and publishes
//!   the resulting events and threshold alerts
//! - `Broadcaster`: owns the open connections and fans events out to them
//! - Connection handshake: one snapshot per domain before incremental events
//! - axum HTTP server: `/ws`, `/api/health`, `/api/snapshot/{domain}`,
//!   `/api/history`, `/api/github/logs/{run_id}`, `/metrics`
//!
//! # Architecture
//!
//! ```text
//!  sources ──► Poller (one task per domain) ──► Broadcaster ──► connection queues
//!                  │                                                 │
//!                  └──► AlertEvaluator ──► alerts tag                ▼
//!                                       └─► Notifier          socket writer tasks
//! ```

mod alerts;
mod broadcast;
mod config;
mod error;
mod handshake;
mod notify;
mod poller;
mod server;

pub use alerts::AlertEvaluator;
pub use broadcast::{Broadcaster, ConnectionHandle, ConnectionId, PublishReport};
pub use config::{AlertConfig, NotifierConfig, PollIntervals, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use handshake::send_initial_snapshots;
pub use notify::Notifier;
pub use poller::{Poller, PollerHandle, TickReport};
pub use server::{create_router, run_server, serve, AppState, ConnectionLimiter, ConnectionPermit};
