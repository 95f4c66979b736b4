//! Poller error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PollerError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Unexpected response envelope: {0}")]
    Envelope(String),

    #[error("No price for {0}")]
    MissingPrice(String),

    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type PollerResult<T> = Result<T, PollerError>;
