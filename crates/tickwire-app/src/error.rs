//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Registry error: {0}")]
    Registry(#[from] tickwire_registry::RegistryError),

    #[error("Poller error: {0}")]
    Poller(#[from] tickwire_poller::PollerError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] tickwire_telemetry::TelemetryError),
}

pub type AppResult<T> = Result<T, AppError>;
