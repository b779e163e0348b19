//! Core domain types for the opsboard live-update pipeline.
//!
//! This crate provides the types shared by the server and the client:
//! - `Metric`, `InfraService`, `Deployment`, `Pipeline`, `Web3Network`: normalized readings
//! - `Snapshot`, `Domain`: one poll result of a metric source
//! - `Alert`, `Severity`: threshold crossings derived from snapshots
//! - `ServerMessage`, `ClientMessage`, `EventTag`: the JSON wire protocol

pub mod alert;
pub mod error;
pub mod event;
pub mod snapshot;
pub mod types;

pub use alert::{Alert, Severity};
pub use error::{CoreError, Result};
pub use event::{ClientMessage, Envelope, EventTag, ServerMessage};
pub use snapshot::{Domain, Snapshot, SnapshotData};
pub use types::{
    Deployment, GasPrice, HealthStatus, InfraService, Metric, Pipeline, PipelineStage, RunStatus,
    StageStatus, Trend, Web3Network,
};
