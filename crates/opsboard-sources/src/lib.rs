//! Metric source adapters for opsboard.
//!
//! Each adapter wraps one external system and returns a normalized
//! [`Snapshot`](opsboard_core::Snapshot) for its domain:
//! - `SystemMetricsSource`: host CPU, memory, disk and uptime
//! - `InfrastructureSource`: host descriptor plus hosting platform services
//! - `GitHubSource`: recent workflow runs and the latest pipeline
//! - `Web3Source`: block, throughput and gas readings over JSON-RPC
//!
//! Failures surface as `SourceError`; callers decide how to recover.

pub mod error;
pub mod github;
pub mod infrastructure;
pub mod source;
pub mod system;
pub mod vercel;
pub mod web3;

pub use error::{SourceError, SourceResult};
pub use github::{GitHubConfig, GitHubSource};
pub use infrastructure::InfrastructureSource;
pub use source::{BoxFuture, MetricSource, SourceSet};
pub use system::{HistoryPoint, HostProbe, HostReading, MetricHistory, SystemMetricsSource};
pub use vercel::{VercelClient, VercelConfig};
pub use web3::{Web3NetworkConfig, Web3Source};
