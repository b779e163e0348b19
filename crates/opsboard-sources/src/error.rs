//! Source adapter error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("JSON-RPC error: {0}")]
    Rpc(String),

    #[error("Response parse error: {0}")]
    Parse(String),

    #[error("Host probe failed: {0}")]
    Probe(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        Self::HttpClient(e.to_string())
    }
}

pub type SourceResult<T> = Result<T, SourceError>;
