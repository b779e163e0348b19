//! Application configuration.
//!
//! Layers, lowest precedence first:
//! 1. Defaults on every field
//! 2. TOML file (`config/default.toml` unless overridden)
//! 3. `OPSBOARD__SECTION__KEY` environment variables
//! 4. Well-known deployment variables (`PORT`, `GITHUB_TOKEN`, ...)

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use opsboard_server::{AlertConfig, NotifierConfig, PollIntervals, ServerConfig};
use opsboard_sources::{GitHubConfig, VercelConfig, Web3NetworkConfig};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Blockchain networks to watch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Web3Config {
    /// Ethereum mainnet RPC endpoint (empty = not watched).
    #[serde(default)]
    pub ethereum_rpc_url: String,
    /// Polygon RPC endpoint (empty = not watched).
    #[serde(default)]
    pub polygon_rpc_url: String,
    /// Additional EVM networks.
    #[serde(default)]
    pub networks: Vec<Web3NetworkConfig>,
}

impl Web3Config {
    /// Every configured network, Ethereum and Polygon first.
    pub fn all_networks(&self) -> Vec<Web3NetworkConfig> {
        let mut networks = Vec::new();
        if !self.ethereum_rpc_url.is_empty() {
            networks.push(Web3NetworkConfig::ethereum(&self.ethereum_rpc_url));
        }
        if !self.polygon_rpc_url.is_empty() {
            networks.push(Web3NetworkConfig::polygon(&self.polygon_rpc_url));
        }
        networks.extend(self.networks.iter().cloned());
        networks
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub intervals: PollIntervals,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub vercel: VercelConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub web3: Web3Config,
}

impl AppConfig {
    /// Load from a TOML file plus the environment.
    ///
    /// A missing file is an error only when `required` is set.
    pub fn load(path: &str, required: bool) -> AppResult<Self> {
        let builder = Config::builder().add_source(File::with_name(path).required(required));
        Self::build(builder)
    }

    /// Load from TOML text plus the environment.
    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        let builder = Config::builder().add_source(File::from_str(content, FileFormat::Toml));
        Self::build(builder)
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> AppResult<Self> {
        let mut config: Self = builder
            .add_source(
                Environment::with_prefix("OPSBOARD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply well-known deployment variables. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = get("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|e| AppError::Config(format!("Invalid PORT {port:?}: {e}")))?;
        }

        let strings: [(&str, &mut String); 9] = [
            ("VERCEL_TOKEN", &mut self.vercel.token),
            ("GITHUB_TOKEN", &mut self.github.token),
            ("GITHUB_OWNER", &mut self.github.owner),
            ("GITHUB_REPO", &mut self.github.repo),
            ("ETHEREUM_RPC_URL", &mut self.web3.ethereum_rpc_url),
            ("POLYGON_RPC_URL", &mut self.web3.polygon_rpc_url),
            ("DISCORD_WEBHOOK_URL", &mut self.notifier.discord_webhook_url),
            ("SLACK_WEBHOOK_URL", &mut self.notifier.slack_webhook_url),
            ("SERVER_HOST", &mut self.server.host),
        ];
        for (key, field) in strings {
            if let Some(value) = get(key) {
                *field = value;
            }
        }

        if let Some(team) = get("VERCEL_TEAM_ID") {
            self.vercel.team_id = Some(team);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.intervals.web3_ms, 15_000);
        assert_eq!(config.alerts.gas_price_gwei, 100.0);
        assert!(!config.github.is_enabled());
        assert!(config.web3.all_networks().is_empty());
    }

    #[test]
    fn test_port_override() {
        let mut config = AppConfig::default();
        config.apply_overrides(lookup(&[("PORT", "8080")])).unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(lookup(&[("PORT", "eighty")]))
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_source_credentials_from_environment() {
        let mut config = AppConfig::default();
        config
            .apply_overrides(lookup(&[
                ("GITHUB_OWNER", "acme"),
                ("GITHUB_REPO", "platform"),
                ("VERCEL_TOKEN", "tok"),
                ("VERCEL_TEAM_ID", "team_1"),
                ("ETHEREUM_RPC_URL", "https://eth.example"),
                ("POLYGON_RPC_URL", ""),
            ]))
            .unwrap();

        assert!(config.github.is_enabled());
        assert!(config.vercel.is_enabled());
        assert_eq!(config.vercel.team_id.as_deref(), Some("team_1"));

        let networks = config.web3.all_networks();
        assert_eq!(networks.len(), 1);
        assert_eq!(networks[0].id, "ethereum");
    }

    #[test]
    fn test_all_networks_order() {
        let web3 = Web3Config {
            ethereum_rpc_url: "https://eth.example".to_string(),
            polygon_rpc_url: "https://polygon.example".to_string(),
            networks: vec![Web3NetworkConfig {
                id: "base".to_string(),
                name: "Base".to_string(),
                chain_id: 8453,
                rpc_url: "https://base.example".to_string(),
                default_block_time_secs: 2.0,
            }],
        };
        let ids: Vec<_> = web3.all_networks().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["ethereum", "polygon", "base"]);
    }
}
