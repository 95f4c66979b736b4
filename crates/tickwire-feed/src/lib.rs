//! Quote store and push-frame parsing for tickwire.
//!
//! The quote store is the single place where quotes are written. Both the
//! tick channel and the snapshot poller go through it so that direction is
//! derived the same way regardless of source.

pub mod error;
pub mod parser;
pub mod quote_store;

pub use error::{FeedError, FeedResult};
pub use parser::{parse_frame, Frame, TickUpdate, CONTROL_FRAME_TYPE};
pub use quote_store::{QuoteStore, SnapshotEntry, WriteSource};
