//! Server configuration.

use std::time::Duration;

use opsboard_core::Domain;
use serde::{Deserialize, Serialize};

/// Shortest poll interval accepted; smaller values are raised to this.
const MIN_POLL_INTERVAL_MS: u64 = 100;

/// HTTP / live-update server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on (REST and live updates share it).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum concurrent live-update connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Outbound queue depth per connection.
    #[serde(default = "default_connection_buffer")]
    pub connection_buffer: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_max_connections() -> usize {
    100
}

fn default_connection_buffer() -> usize {
    64
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
            connection_buffer: default_connection_buffer(),
        }
    }
}

/// Poll interval per domain, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollIntervals {
    #[serde(default = "default_infrastructure_ms")]
    pub infrastructure_ms: u64,
    #[serde(default = "default_system_ms")]
    pub system_ms: u64,
    #[serde(default = "default_ci_cd_ms")]
    pub ci_cd_ms: u64,
    #[serde(default = "default_web3_ms")]
    pub web3_ms: u64,
}

fn default_infrastructure_ms() -> u64 {
    30_000
}

fn default_system_ms() -> u64 {
    30_000
}

fn default_ci_cd_ms() -> u64 {
    60_000
}

fn default_web3_ms() -> u64 {
    15_000
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            infrastructure_ms: default_infrastructure_ms(),
            system_ms: default_system_ms(),
            ci_cd_ms: default_ci_cd_ms(),
            web3_ms: default_web3_ms(),
        }
    }
}

impl PollIntervals {
    /// Same interval for every domain.
    pub fn uniform(ms: u64) -> Self {
        Self {
            infrastructure_ms: ms,
            system_ms: ms,
            ci_cd_ms: ms,
            web3_ms: ms,
        }
    }

    pub fn for_domain(&self, domain: Domain) -> Duration {
        let ms = match domain {
            Domain::Infrastructure => self.infrastructure_ms,
            Domain::System => self.system_ms,
            Domain::CiCd => self.ci_cd_ms,
            Domain::Web3 => self.web3_ms,
        };
        Duration::from_millis(ms.max(MIN_POLL_INTERVAL_MS))
    }
}

/// Static alert thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// CPU usage percent.
    #[serde(default = "default_cpu")]
    pub cpu: f64,
    /// Memory usage percent.
    #[serde(default = "default_memory")]
    pub memory: f64,
    /// Disk usage percent.
    #[serde(default = "default_disk")]
    pub disk: f64,
    /// Average gas price in Gwei.
    #[serde(default = "default_gas_price_gwei")]
    pub gas_price_gwei: f64,
    /// Minimum time between two alerts with the same key.
    /// 0 = alert on every tick the threshold is exceeded.
    #[serde(default)]
    pub suppression_window_ms: u64,
}

fn default_cpu() -> f64 {
    80.0
}

fn default_memory() -> f64 {
    85.0
}

fn default_disk() -> f64 {
    90.0
}

fn default_gas_price_gwei() -> f64 {
    100.0
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cpu: default_cpu(),
            memory: default_memory(),
            disk: default_disk(),
            gas_price_gwei: default_gas_price_gwei(),
            suppression_window_ms: 0,
        }
    }
}

/// Alert webhook targets (empty = disabled).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifierConfig {
    #[serde(default)]
    pub discord_webhook_url: String,
    #[serde(default)]
    pub slack_webhook_url: String,
}

impl NotifierConfig {
    pub fn is_enabled(&self) -> bool {
        !self.discord_webhook_url.is_empty() || !self.slack_webhook_url.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let intervals = PollIntervals::default();
        assert_eq!(intervals.for_domain(Domain::Web3), Duration::from_secs(15));
        assert_eq!(intervals.for_domain(Domain::CiCd), Duration::from_secs(60));

        let server = ServerConfig::default();
        assert_eq!(server.port, 3001);
        assert_eq!(server.connection_buffer, 64);

        assert_eq!(AlertConfig::default().suppression_window_ms, 0);
        assert!(!NotifierConfig::default().is_enabled());
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let intervals = PollIntervals::uniform(0);
        assert_eq!(
            intervals.for_domain(Domain::System),
            Duration::from_millis(MIN_POLL_INTERVAL_MS)
        );
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let alerts: AlertConfig = serde_json::from_str(r#"{"cpu": 70.0}"#).unwrap();
        assert_eq!(alerts.cpu, 70.0);
        assert_eq!(alerts.disk, 90.0);
    }
}
