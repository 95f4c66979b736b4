//! Error types for tickwire-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
