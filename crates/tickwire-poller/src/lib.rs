//! Index snapshot poller for tickwire.
//!
//! Pulls index quotes on a timer, independent of push-channel health:
//! - Primary aggregated source, with a per-index fallback source on failure
//! - Request generations so a superseded cycle never overwrites a newer one
//! - Published `PollSummary` describing the latest accepted cycle

pub mod error;
pub mod poller;
pub mod source;
pub mod summary;

pub use error::{PollerError, PollerResult};
pub use poller::{PollerConfig, SnapshotPoller};
pub use source::{
    parse_fallback, parse_primary, BoxFuture, FallbackQuote, HttpFallbackSource,
    HttpPrimarySource, MockQuoteSource, MockSnapshotSource, PrimaryEntry, PrimarySnapshot,
    QuoteSource, RawSummary, SnapshotSource, TrackedIndex, DEFAULT_FALLBACK_URL,
};
pub use summary::{IndexCard, PollStatus, PollSummary, SummarySource};
