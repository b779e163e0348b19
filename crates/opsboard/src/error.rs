//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration load error: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("Source error: {0}")]
    Source(#[from] opsboard_sources::SourceError),

    #[error("Server error: {0}")]
    Server(#[from] opsboard_server::ServerError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] opsboard_telemetry::TelemetryError),

    #[error("Server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type AppResult<T> = Result<T, AppError>;
