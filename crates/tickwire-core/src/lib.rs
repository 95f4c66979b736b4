//! Core domain types for the tickwire quote engine.
//!
//! This crate provides the types shared by every other crate:
//! - `Instrument`: catalog entry resolvable by search
//! - `Price`: precision-safe price type
//! - `Quote`, `QuoteFields`, `Direction`: last-known quote state per key

pub mod decimal;
pub mod error;
pub mod instrument;
pub mod quote;

pub use decimal::Price;
pub use error::{CoreError, Result};
pub use instrument::{Instrument, InstrumentKey};
pub use quote::{Direction, Quote, QuoteFields};

/// Boxed future type for object-safe async trait methods.
pub type BoxFuture<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;
