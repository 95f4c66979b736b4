//! Prometheus metrics and structured logging for tickwire.
//!
//! - Structured logging with tracing (JSON in production, pretty otherwise)
//! - Prometheus counters/gauges for the tick channel, quote store and poller

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
