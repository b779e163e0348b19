//! opsboard application.
//!
//! Wires the pieces together:
//! - Configuration from TOML and the environment
//! - Metric sources for every configured domain
//! - Poller, broadcaster and HTTP/live-update server

pub mod app;
pub mod config;
pub mod error;

pub use app::{build_sources, Application, Sources};
pub use config::{AppConfig, Web3Config, DEFAULT_CONFIG_PATH};
pub use error::{AppError, AppResult};
