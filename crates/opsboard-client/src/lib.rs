//! Live-update client for opsboard dashboards.
//!
//! Provides a single logical connection to the opsboard server with:
//! - Automatic reconnection with exponential backoff and a capped attempt budget
//! - URL gating: no configured `ws://`/`wss://` URL means "no live backend", not an error
//! - Heartbeat keep-alive (`ping` every 30s, optional pong timeout)
//! - Tag-keyed subscriber registry with registration-order dispatch

pub mod config;
pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod subscription;

pub use config::ClientConfig;
pub use connection::{
    backoff_delay, validate_url, ConnectionState, ConnectionStatus, SocketManager,
};
pub use error::{ClientError, ClientResult};
pub use heartbeat::Heartbeat;
pub use subscription::{SubscriberRegistry, Subscription};
