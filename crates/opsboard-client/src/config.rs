//! Client configuration.

use serde::{Deserialize, Serialize};

/// Socket manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Live-update URL (`ws://` or `wss://`). Unset means no live backend.
    #[serde(default)]
    pub url: Option<String>,
    /// Base reconnect delay; attempt `n` waits `base * 2^n`.
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    /// Failed cycles before giving up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Close the session if a pong does not arrive in time (0 = disabled).
    #[serde(default)]
    pub heartbeat_timeout_ms: u64,
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,
    /// A session must stay open this long before the attempt counter resets
    /// (0 = reset as soon as the transport opens).
    #[serde(default = "default_stable_after_ms")]
    pub stable_after_ms: u64,
    /// Outbound queue depth while connected.
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,
}

fn default_reconnect_interval_ms() -> u64 {
    3000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_stable_after_ms() -> u64 {
    1000
}

fn default_outbound_capacity() -> usize {
    64
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: None,
            reconnect_interval_ms: default_reconnect_interval_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: 0,
            auto_reconnect: default_auto_reconnect(),
            stable_after_ms: default_stable_after_ms(),
            outbound_capacity: default_outbound_capacity(),
        }
    }
}

impl ClientConfig {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }
}
