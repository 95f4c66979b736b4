//! Snapshot poller.
//!
//! Runs a poll cycle immediately and then on a fixed interval. Every cycle:
//!
//! 1. Bumps the request generation and cancels the previous cycle's token.
//! 2. Queries the primary source (bounded by `request_timeout`, raced with
//!    the cycle token).
//! 3. On primary failure, queries the fallback source once per tracked
//!    index; a failed index becomes [`IndexCard::Unavailable`].
//! 4. Commits store writes and publishes the summary only if its generation
//!    is still the latest. A superseded cycle is dropped without side effects.

use crate::error::PollerError;
use crate::source::{PrimarySnapshot, QuoteSource, SnapshotSource, TrackedIndex};
use crate::summary::{IndexCard, PollStatus, PollSummary};
use futures_util::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tickwire_core::{Direction, InstrumentKey};
use tickwire_feed::{QuoteStore, SnapshotEntry};
use tickwire_telemetry::Metrics;
use tokio::sync::{watch, Notify};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Poller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Seconds between cycles.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Indices queried from the fallback source.
    #[serde(default = "TrackedIndex::defaults")]
    pub indices: Vec<TrackedIndex>,
}

fn default_interval_secs() -> u64 {
    300
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            request_timeout_ms: default_request_timeout_ms(),
            indices: TrackedIndex::defaults(),
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

type CycleOutcome = (Vec<(InstrumentKey, SnapshotEntry)>, PollSummary);

/// Periodic index snapshot poller.
pub struct SnapshotPoller {
    config: PollerConfig,
    store: Arc<QuoteStore>,
    primary: Arc<dyn SnapshotSource>,
    fallback: Arc<dyn QuoteSource>,
    /// Latest issued generation.
    generation: AtomicU64,
    /// Token of the in-flight cycle.
    in_flight: Mutex<CancellationToken>,
    /// Serializes the generation check with the store write.
    commit: Mutex<()>,
    trigger: Notify,
    summary_tx: watch::Sender<Option<PollSummary>>,
    shutdown_token: CancellationToken,
}

impl SnapshotPoller {
    pub fn new(
        config: PollerConfig,
        store: Arc<QuoteStore>,
        primary: Arc<dyn SnapshotSource>,
        fallback: Arc<dyn QuoteSource>,
    ) -> Self {
        let (summary_tx, _summary_rx) = watch::channel(None);
        Self {
            config,
            store,
            primary,
            fallback,
            generation: AtomicU64::new(0),
            in_flight: Mutex::new(CancellationToken::new()),
            commit: Mutex::new(()),
            trigger: Notify::new(),
            summary_tx,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Receiver of the latest accepted summary.
    pub fn summary(&self) -> watch::Receiver<Option<PollSummary>> {
        self.summary_tx.subscribe()
    }

    /// Latest accepted summary, if any cycle completed.
    pub fn latest(&self) -> Option<PollSummary> {
        self.summary_tx.borrow().clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Force a new cycle. An in-flight cycle is superseded.
    pub fn trigger(&self) {
        debug!("Poll cycle triggered");
        self.trigger.notify_one();
    }

    /// Stop the poller and cancel the in-flight cycle.
    pub fn shutdown(&self) {
        info!("SnapshotPoller shutdown requested");
        self.shutdown_token.cancel();
        self.in_flight.lock().cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Run cycles until shutdown: one immediately, then every `interval`.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_secs = self.config.interval_secs,
            indices = self.config.indices.len(),
            "Snapshot poller started"
        );

        'outer: loop {
            tokio::select! {
                biased;
                () = self.shutdown_token.cancelled() => break,
                () = self.trigger.notified() => {}
                _ = ticker.tick() => {}
            }

            // A trigger during a cycle abandons it and starts a fresh one.
            loop {
                tokio::select! {
                    biased;
                    () = self.shutdown_token.cancelled() => break 'outer,
                    () = self.trigger.notified() => {
                        debug!("Superseding in-flight poll cycle");
                        continue;
                    }
                    _ = self.poll_once() => break,
                }
            }
        }

        info!("Snapshot poller stopped");
    }

    /// Run one cycle. Returns the published summary, or `None` when the
    /// cycle was superseded or cancelled.
    pub async fn poll_once(&self) -> Option<PollSummary> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = self.shutdown_token.child_token();
        let previous = std::mem::replace(&mut *self.in_flight.lock(), token.clone());
        previous.cancel();

        debug!(generation, "Poll cycle started");

        let primary = tokio::select! {
            biased;
            () = token.cancelled() => {
                debug!(generation, "Poll cycle cancelled during primary request");
                Metrics::poll_cycle("superseded");
                return None;
            }
            result = tokio::time::timeout(self.config.request_timeout(), self.primary.fetch()) => {
                result.unwrap_or(Err(PollerError::Timeout(self.config.request_timeout_ms)))
            }
        };

        let (entries, summary) = match primary {
            Ok(snapshot) => self.primary_outcome(snapshot),
            Err(e) => {
                warn!(generation, error = %e, "Primary index source failed, using fallback");
                tokio::select! {
                    () = self.shutdown_token.cancelled() => return None,
                    outcome = self.fallback_outcome() => outcome,
                }
            }
        };

        self.commit(generation, entries, summary)
    }

    fn primary_outcome(&self, snapshot: PrimarySnapshot) -> CycleOutcome {
        let summary = PollSummary::from_primary(&snapshot);
        let entries = snapshot
            .entries
            .into_iter()
            .filter_map(|entry| {
                let price = entry.price?;
                Some((entry.symbol, SnapshotEntry::new(price, entry.fields)))
            })
            .collect();
        (entries, summary)
    }

    async fn fallback_outcome(&self) -> CycleOutcome {
        let timeout = self.config.request_timeout();
        let requests = self.config.indices.iter().map(|index| async move {
            let result = tokio::time::timeout(timeout, self.fallback.fetch_quote(&index.symbol))
                .await
                .unwrap_or(Err(PollerError::Timeout(self.config.request_timeout_ms)));
            (index, result)
        });

        let mut entries = Vec::new();
        let mut cards = Vec::with_capacity(self.config.indices.len());
        for (index, result) in join_all(requests).await {
            match result {
                Ok(quote) => {
                    let direction = Direction::from_change(quote.change());
                    cards.push(IndexCard::Available {
                        name: index.display.clone(),
                        symbol: index.symbol.clone(),
                        price: quote.price,
                        change: Some(quote.change()),
                        percent: Some(quote.percent()),
                        direction,
                    });
                    let mut fields = quote.fields;
                    fields.display_name = Some(index.display.clone());
                    entries.push((index.symbol.clone(), SnapshotEntry::new(quote.price, fields)));
                }
                Err(e) => {
                    warn!(symbol = %index.symbol, error = %e, "Fallback quote unavailable");
                    Metrics::poll_fallback_failure(&index.symbol);
                    cards.push(IndexCard::Unavailable {
                        name: index.display.clone(),
                        symbol: index.symbol.clone(),
                    });
                }
            }
        }

        (entries, PollSummary::from_fallback(cards))
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn commit(
        &self,
        generation: u64,
        entries: Vec<(InstrumentKey, SnapshotEntry)>,
        summary: PollSummary,
    ) -> Option<PollSummary> {
        let _guard = self.commit.lock();
        if !self.is_current(generation) || self.is_shutdown() {
            debug!(
                generation,
                latest = self.generation(),
                "Discarding superseded poll result"
            );
            Metrics::poll_cycle("superseded");
            return None;
        }

        let written = self.store.apply_snapshot(entries);
        self.summary_tx.send_replace(Some(summary.clone()));

        let outcome = match summary.status {
            PollStatus::Online => "primary",
            PollStatus::Degraded => "fallback",
            PollStatus::Offline => "offline",
        };
        Metrics::poll_cycle(outcome);
        info!(
            generation,
            written,
            status = %summary.status,
            title = %summary.title,
            "Poll cycle committed"
        );
        Some(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{FallbackQuote, MockQuoteSource, MockSnapshotSource, PrimaryEntry};
    use crate::summary::UNAVAILABLE_TITLE;
    use rust_decimal_macros::dec;
    use tickwire_core::{Price, QuoteFields};

    fn config() -> PollerConfig {
        PollerConfig {
            interval_secs: 3600,
            request_timeout_ms: 1000,
            indices: TrackedIndex::defaults(),
        }
    }

    fn snapshot(symbol: &str, close: f64) -> PrimarySnapshot {
        PrimarySnapshot {
            entries: vec![PrimaryEntry {
                name: "Nifty 50".to_string(),
                symbol: symbol.to_string(),
                price: Price::from_f64(close).ok(),
                fields: QuoteFields {
                    close: Some(close),
                    percent: Some(0.25),
                    ..Default::default()
                },
                direction: Some("up".to_string()),
            }],
            market_summary: None,
            as_of: None,
        }
    }

    fn fallback_quote(price: f64) -> FallbackQuote {
        let mut quote = FallbackQuote::new(Price::from_f64(price).unwrap());
        quote.fields.change = Some(-5.0);
        quote
    }

    struct Fixture {
        store: Arc<QuoteStore>,
        primary: Arc<MockSnapshotSource>,
        fallback: Arc<MockQuoteSource>,
        poller: Arc<SnapshotPoller>,
    }

    fn fixture(config: PollerConfig) -> Fixture {
        let store = Arc::new(QuoteStore::new());
        let primary = Arc::new(MockSnapshotSource::new());
        let fallback = Arc::new(MockQuoteSource::new());
        let poller = Arc::new(SnapshotPoller::new(
            config,
            store.clone(),
            primary.clone(),
            fallback.clone(),
        ));
        Fixture {
            store,
            primary,
            fallback,
            poller,
        }
    }

    #[tokio::test]
    async fn test_primary_success_writes_store_and_publishes() {
        let f = fixture(config());
        f.primary.push_ok(snapshot("^NSEI", 22100.5));

        let summary = f.poller.poll_once().await.unwrap();
        assert_eq!(summary.status, PollStatus::Online);
        assert_eq!(summary.title, "▲ Market Gain");

        let quote = f.store.get("^NSEI").unwrap();
        assert_eq!(quote.last_price, Price::new(dec!(22100.5)));
        assert_eq!(quote.fields.display_name.as_deref(), Some("Nifty 50"));
        assert_eq!(f.poller.latest(), Some(summary));
        assert_eq!(f.fallback.call_count(), 0);
    }

    #[tokio::test]
    async fn test_primary_failure_uses_fallback_per_index() {
        let f = fixture(config());
        f.primary.push_err("status is \"error\"");
        f.fallback.set_quote("^NSEI", fallback_quote(22000.0));
        f.fallback.set_quote("^BSESN", fallback_quote(73000.0));
        f.fallback.set_quote("^NSEBANK", fallback_quote(48000.0));

        let summary = f.poller.poll_once().await.unwrap();
        assert_eq!(summary.status, PollStatus::Degraded);
        assert_eq!(summary.cards.len(), 4);
        assert_eq!(summary.available_count(), 3);

        let failed = summary
            .cards
            .iter()
            .find(|c| c.symbol() == "^NSMIDCP")
            .unwrap();
        assert!(!failed.is_available());
        assert_eq!(failed.name(), "Nifty Next 50");

        assert_eq!(f.store.len(), 3);
        assert!(f.store.get("^NSMIDCP").is_none());
        assert_eq!(f.fallback.call_count(), 4);
    }

    #[tokio::test]
    async fn test_everything_failing_is_offline() {
        let f = fixture(config());
        f.primary.push_err("down");

        let summary = f.poller.poll_once().await.unwrap();
        assert_eq!(summary.status, PollStatus::Offline);
        assert!(summary.cards.iter().all(|c| !c.is_available()));
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn test_primary_without_prices_is_offline() {
        let f = fixture(config());
        let mut unpriced = snapshot("^NSEI", 22000.0);
        unpriced.entries[0].price = None;
        f.primary.push_ok(unpriced);

        let summary = f.poller.poll_once().await.unwrap();
        assert_eq!(summary.status, PollStatus::Offline);
        assert_eq!(summary.title, UNAVAILABLE_TITLE);
        assert!(f.store.is_empty());
        assert_eq!(f.fallback.call_count(), 0);

        f.primary.push_ok(PrimarySnapshot::default());
        let summary = f.poller.poll_once().await.unwrap();
        assert_eq!(summary.status, PollStatus::Offline);
        assert!(summary.cards.is_empty());
    }

    #[tokio::test]
    async fn test_primary_timeout_falls_back() {
        let f = fixture(PollerConfig {
            request_timeout_ms: 50,
            ..config()
        });
        f.primary
            .push_delayed(Duration::from_millis(500), Ok(snapshot("^NSEI", 1.0)));
        f.fallback.set_quote("^NSEI", fallback_quote(22000.0));

        let summary = f.poller.poll_once().await.unwrap();
        assert_eq!(summary.status, PollStatus::Degraded);
        assert_eq!(
            f.store.get("^NSEI").unwrap().last_price,
            Price::new(dec!(22000))
        );
    }

    #[tokio::test]
    async fn test_superseded_primary_cycle_is_cancelled() {
        let f = fixture(config());
        f.primary
            .push_delayed(Duration::from_millis(300), Ok(snapshot("^NSEI", 100.0)));
        f.primary.push_ok(snapshot("^NSEI", 200.0));

        let slow = {
            let poller = f.poller.clone();
            tokio::spawn(async move { poller.poll_once().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let fast = f.poller.poll_once().await;

        assert!(fast.is_some());
        assert!(slow.await.unwrap().is_none());
        assert_eq!(
            f.store.get("^NSEI").unwrap().last_price,
            Price::new(dec!(200))
        );
        assert_eq!(f.poller.generation(), 2);
    }

    #[tokio::test]
    async fn test_stale_fallback_never_overwrites_newer_cycle() {
        let f = fixture(config());
        f.primary.push_err("down");
        f.primary.push_ok(snapshot("^NSEI", 200.0));
        f.fallback.set_quote("^NSEI", fallback_quote(100.0));
        f.fallback.set_delay(Duration::from_millis(300));

        let stale = {
            let poller = f.poller.clone();
            tokio::spawn(async move { poller.poll_once().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let fresh = f.poller.poll_once().await.unwrap();
        assert_eq!(fresh.status, PollStatus::Online);

        assert!(stale.await.unwrap().is_none());
        let quote = f.store.get("^NSEI").unwrap();
        assert_eq!(quote.last_price, Price::new(dec!(200)));
        assert_eq!(f.poller.latest().unwrap().status, PollStatus::Online);
    }

    #[tokio::test]
    async fn test_run_trigger_and_shutdown() {
        let f = fixture(config());
        f.primary.push_ok(snapshot("^NSEI", 1.0));
        f.primary.push_ok(snapshot("^NSEI", 2.0));

        let mut summaries = f.poller.summary();
        let runner = {
            let poller = f.poller.clone();
            tokio::spawn(async move { poller.run().await })
        };

        tokio::time::timeout(Duration::from_secs(2), summaries.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(f.primary.call_count(), 1);

        f.poller.trigger();
        tokio::time::timeout(Duration::from_secs(2), summaries.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(f.primary.call_count(), 2);
        assert_eq!(
            f.store.get("^NSEI").unwrap().last_price,
            Price::new(dec!(2))
        );

        f.poller.shutdown();
        let finished = tokio::time::timeout(Duration::from_secs(2), runner).await;
        assert!(finished.is_ok(), "run() should return after shutdown");
    }

    #[tokio::test]
    async fn test_shutdown_cancels_in_flight_cycle() {
        let f = fixture(config());
        f.primary
            .push_delayed(Duration::from_secs(5), Ok(snapshot("^NSEI", 1.0)));

        let cycle = {
            let poller = f.poller.clone();
            tokio::spawn(async move { poller.poll_once().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        f.poller.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(1), cycle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_none());
        assert!(f.store.is_empty());
    }
}
