//! Snapshots: one poll result of one metric domain.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::event::ServerMessage;
use crate::types::{Deployment, InfraService, Metric, Pipeline, Web3Network};

/// A metric domain, each backed by one source adapter.
///
/// The declaration order is the order in which a new connection receives its
/// initial snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Domain {
    /// Hosting platform and host services.
    Infrastructure,
    /// Host CPU, memory, disk and uptime.
    System,
    /// CI/CD workflow runs.
    CiCd,
    /// Blockchain network status.
    Web3,
}

impl Domain {
    pub const ALL: [Domain; 4] = [Self::Infrastructure, Self::System, Self::CiCd, Self::Web3];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Infrastructure => "infrastructure",
            Self::System => "system",
            Self::CiCd => "ci-cd",
            Self::Web3 => "web3",
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| CoreError::UnknownDomain(s.to_string()))
    }
}

/// Domain-specific snapshot contents.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotData {
    Infrastructure(Vec<InfraService>),
    System(Vec<Metric>),
    CiCd {
        deployments: Vec<Deployment>,
        pipeline: Option<Pipeline>,
    },
    Web3(Vec<Web3Network>),
}

/// An immutable, timestamped reading of one domain.
///
/// A snapshot supersedes the previous one of the same domain; it is never
/// merged with it.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    pub data: SnapshotData,
}

impl Snapshot {
    /// Create a snapshot stamped with the current time.
    pub fn now(data: SnapshotData) -> Self {
        Self {
            taken_at: Utc::now(),
            data,
        }
    }

    pub fn domain(&self) -> Domain {
        match self.data {
            SnapshotData::Infrastructure(_) => Domain::Infrastructure,
            SnapshotData::System(_) => Domain::System,
            SnapshotData::CiCd { .. } => Domain::CiCd,
            SnapshotData::Web3(_) => Domain::Web3,
        }
    }

    /// Expand into wire events, in tag order.
    pub fn into_messages(self) -> Vec<ServerMessage> {
        match self.data {
            SnapshotData::Infrastructure(services) => {
                vec![ServerMessage::InfrastructureServices(services)]
            }
            SnapshotData::System(metrics) => vec![ServerMessage::Metrics(metrics)],
            SnapshotData::CiCd {
                deployments,
                pipeline,
            } => vec![
                ServerMessage::Deployments(deployments),
                ServerMessage::Pipeline(pipeline),
            ],
            SnapshotData::Web3(networks) => vec![ServerMessage::Web3Networks(networks)],
        }
    }
}
