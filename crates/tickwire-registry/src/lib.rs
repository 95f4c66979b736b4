//! Instrument catalog and search for tickwire.
//!
//! Loads the static instrument catalog once, builds an immutable fuzzy
//! index over it, and resolves user queries into subscribable keys.

pub mod client;
pub mod debounce;
pub mod error;
pub mod index;

pub use client::{CatalogClient, MockSymbolSubscriber, SymbolSubscriber};
pub use debounce::{Debouncer, DEFAULT_DEBOUNCE};
pub use error::{RegistryError, RegistryResult};
pub use index::{InstrumentIndex, SearchConfig, SearchService};
