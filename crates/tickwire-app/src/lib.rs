//! Real-time market quote sync engine.
//!
//! Orchestrates the components:
//! - Instrument catalog and fuzzy search
//! - Tick channel with full-set resubscription
//! - Index snapshot poller with fallback
//! - Persistent watchlist driving the subscription set

pub mod app;
pub mod config;
pub mod error;
pub mod session;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use session::Session;
