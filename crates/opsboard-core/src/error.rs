//! Error types for opsboard-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Unknown event tag: {0}")]
    UnknownTag(String),

    #[error("Unknown domain: {0}")]
    UnknownDomain(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(#[from] serde_json::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
