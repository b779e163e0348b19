//! Server error types.

use opsboard_core::CoreError;
use opsboard_sources::SourceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] CoreError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Connection {0} closed")]
    ConnectionClosed(u64),

    #[error("Webhook error: {0}")]
    Webhook(String),
}

pub type ServerResult<T> = Result<T, ServerError>;
