//! Registry error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Catalog parse error: {0}")]
    ParseError(String),

    #[error("Subscribe rejected for {symbol}: {status}")]
    SubscribeRejected { symbol: String, status: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type RegistryResult<T> = Result<T, RegistryError>;
