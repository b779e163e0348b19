//! Normalized readings produced by the metric sources.
//!
//! Field names are camelCase on the wire so browser clients can consume the
//! payloads without a translation layer.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health of a monitored resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
    Offline,
}

impl HealthStatus {
    /// Classify a percentage against warning/critical cut-offs.
    ///
    /// Cut-offs are exclusive: a value must be strictly above them.
    pub fn from_percent(value: f64, warning: f64, critical: f64) -> Self {
        if value > critical {
            Self::Critical
        } else if value > warning {
            Self::Warning
        } else {
            Self::Healthy
        }
    }
}

/// Direction of a reading compared to its recent history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    #[default]
    Stable,
}

/// A single host metric reading (CPU, memory, disk, uptime).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub id: String,
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub status: HealthStatus,
    pub trend: Trend,
    pub timestamp: DateTime<Utc>,
}

/// A monitored infrastructure service (host, hosting platform, database).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfraService {
    pub id: String,
    pub name: String,
    pub status: HealthStatus,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instances: Option<u32>,
    /// Free-form details shown by the UI.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Outcome of a CI/CD run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failed,
    Pending,
    Running,
}

impl RunStatus {
    /// Map a GitHub Actions `status`/`conclusion` pair.
    pub fn from_github(status: &str, conclusion: Option<&str>) -> Self {
        match status {
            "completed" if conclusion == Some("success") => Self::Success,
            "completed" => Self::Failed,
            "in_progress" => Self::Running,
            _ => Self::Pending,
        }
    }
}

/// Outcome of a single pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Success,
    Failed,
    Pending,
    Running,
    Skipped,
}

impl From<RunStatus> for StageStatus {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Success => Self::Success,
            RunStatus::Failed => Self::Failed,
            RunStatus::Pending => Self::Pending,
            RunStatus::Running => Self::Running,
        }
    }
}

/// A CI/CD workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub id: String,
    pub name: String,
    pub status: RunStatus,
    pub environment: String,
    pub branch: String,
    /// Short (7 character) commit SHA.
    pub commit: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    /// Run duration in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

/// One job of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStage {
    pub id: String,
    pub name: String,
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

/// The most recent workflow run broken down into stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    pub id: String,
    pub name: String,
    pub branch: String,
    pub commit: String,
    pub author: String,
    pub status: RunStatus,
    pub stages: Vec<PipelineStage>,
    pub timestamp: DateTime<Utc>,
}

/// Gas price tiers in Gwei.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GasPrice {
    pub slow: f64,
    pub average: f64,
    pub fast: f64,
}

/// Status of one blockchain network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Web3Network {
    pub id: String,
    pub name: String,
    pub chain_id: u64,
    pub status: HealthStatus,
    pub block_number: u64,
    /// Seconds between the two most recent blocks.
    pub block_time: f64,
    pub tps: f64,
    pub gas_price: GasPrice,
    pub gas_trend: Trend,
}

impl Web3Network {
    /// Placeholder reading for a network whose RPC endpoint is unreachable.
    pub fn offline(id: impl Into<String>, name: impl Into<String>, chain_id: u64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            chain_id,
            status: HealthStatus::Offline,
            block_number: 0,
            block_time: 0.0,
            tps: 0.0,
            gas_price: GasPrice::default(),
            gas_trend: Trend::Stable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_from_percent() {
        assert_eq!(HealthStatus::from_percent(50.0, 60.0, 80.0), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_percent(60.0, 60.0, 80.0), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_percent(61.0, 60.0, 80.0), HealthStatus::Warning);
        assert_eq!(HealthStatus::from_percent(80.5, 60.0, 80.0), HealthStatus::Critical);
    }

    #[test]
    fn test_run_status_from_github() {
        assert_eq!(
            RunStatus::from_github("completed", Some("success")),
            RunStatus::Success
        );
        assert_eq!(
            RunStatus::from_github("completed", Some("cancelled")),
            RunStatus::Failed
        );
        assert_eq!(RunStatus::from_github("completed", None), RunStatus::Failed);
        assert_eq!(RunStatus::from_github("in_progress", None), RunStatus::Running);
        assert_eq!(RunStatus::from_github("queued", None), RunStatus::Pending);
    }

    #[test]
    fn test_web3_network_camel_case() {
        let network = Web3Network::offline("ethereum", "Ethereum", 1);
        let json = serde_json::to_value(&network).unwrap();

        assert_eq!(json["chainId"], 1);
        assert_eq!(json["status"], "offline");
        assert_eq!(json["gasPrice"]["average"], 0.0);
        assert_eq!(json["gasTrend"], "stable");
    }

    #[test]
    fn test_infra_service_omits_empty_metadata() {
        let service = InfraService {
            id: "backend-server".to_string(),
            name: "Backend Server".to_string(),
            status: HealthStatus::Healthy,
            region: "linux".to_string(),
            instances: None,
            metadata: BTreeMap::new(),
        };

        let json = serde_json::to_string(&service).unwrap();
        assert!(!json.contains("metadata"));
        assert!(!json.contains("instances"));
    }
}
