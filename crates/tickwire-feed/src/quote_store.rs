//! In-memory quote store.
//!
//! Maps instrument key to the last known quote. Writes go through a single
//! private entry point, [`QuoteStore::write`], which derives direction from
//! the previous price stored under the exact same key before overwriting it.
//!
//! Lookups tolerate the push channel and the REST side keying the same
//! instrument differently (`NSE_EQ|INE467B01029` vs `TCS`): when no exact
//! key exists, keys are matched by case-insensitive containment in both
//! directions.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tickwire_core::{Direction, InstrumentKey, Price, Quote, QuoteFields};
use tickwire_telemetry::Metrics;
use tracing::trace;

/// Producer of a write, for metrics and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteSource {
    Tick,
    Snapshot,
}

impl WriteSource {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Tick => "tick",
            Self::Snapshot => "snapshot",
        }
    }
}

/// One normalized snapshot entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry {
    pub price: Price,
    pub fields: QuoteFields,
}

impl SnapshotEntry {
    pub fn new(price: Price, fields: QuoteFields) -> Self {
        Self { price, fields }
    }
}

/// Quote store shared by the tick channel and the snapshot poller.
///
/// Each key lives in a `DashMap` shard; a write holds the shard lock for the
/// whole read-derive-overwrite sequence so readers never see a torn quote.
#[derive(Debug, Default)]
pub struct QuoteStore {
    quotes: DashMap<InstrumentKey, Quote>,
}

impl QuoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a last-traded-price tick.
    pub fn apply_tick(&self, key: &str, price: Price) -> Direction {
        self.write(key, price, QuoteFields::default(), WriteSource::Tick)
    }

    /// Apply a tick that also carries OHLC fields.
    pub fn apply_tick_fields(&self, key: &str, price: Price, fields: QuoteFields) -> Direction {
        self.write(key, price, fields, WriteSource::Tick)
    }

    /// Apply a pulled snapshot. Returns the number of entries written.
    pub fn apply_snapshot<I>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = (InstrumentKey, SnapshotEntry)>,
    {
        let mut written = 0;
        for (key, entry) in entries {
            self.write(&key, entry.price, entry.fields, WriteSource::Snapshot);
            written += 1;
        }
        written
    }

    fn write(&self, key: &str, price: Price, fields: QuoteFields, source: WriteSource) -> Direction {
        let direction = match self.quotes.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let quote = occupied.get_mut();
                quote.advance(price, fields);
                quote.direction
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Quote::first(key, price, fields));
                Direction::Neutral
            }
        };

        trace!(key, %price, %direction, source = source.as_str(), "Quote written");
        Metrics::quote_write(source.as_str(), self.quotes.len());
        direction
    }

    /// Exact-key lookup.
    pub fn get(&self, key: &str) -> Option<Quote> {
        self.quotes.get(key).map(|q| q.value().clone())
    }

    /// Lookup tolerant of differing key schemes.
    ///
    /// Exact key first; otherwise every stored key that contains `partial`
    /// or is contained in it (case-insensitive), ordered by key.
    pub fn find_matching(&self, partial: &str) -> Vec<Quote> {
        let partial = partial.trim();
        if partial.is_empty() {
            return Vec::new();
        }
        if let Some(exact) = self.get(partial) {
            return vec![exact];
        }

        let needle = partial.to_uppercase();
        let mut matches: Vec<Quote> = self
            .quotes
            .iter()
            .filter(|entry| {
                let stored = entry.key().to_uppercase();
                stored.contains(&needle) || needle.contains(&stored)
            })
            .map(|entry| entry.value().clone())
            .collect();
        matches.sort_by(|a, b| a.key.cmp(&b.key));
        matches
    }

    /// First quote returned by [`find_matching`](Self::find_matching).
    pub fn resolve(&self, partial: &str) -> Option<Quote> {
        self.find_matching(partial).into_iter().next()
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Vec<InstrumentKey> {
        let mut keys: Vec<_> = self.quotes.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}
