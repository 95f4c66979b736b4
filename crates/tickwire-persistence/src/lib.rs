//! Watchlist persistence for tickwire.
//!
//! Stores the user's starred instruments as a JSON array so the watchlist,
//! and with it the tick subscription set, survives restarts.

pub mod error;
pub mod watchlist;

pub use error::{PersistenceError, PersistenceResult};
pub use watchlist::Watchlist;
