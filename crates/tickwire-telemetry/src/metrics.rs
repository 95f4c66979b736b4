//! Prometheus metrics for tickwire.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A registration failure means a
//! duplicate metric name, which is a programming error that should surface
//! at first use during startup.

use once_cell::sync::Lazy;
use prometheus::{
    register_gauge, register_gauge_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Gauge, GaugeVec, IntCounter, IntCounterVec, IntGauge,
};

/// Tick channel connection state (1 = open, 0 = otherwise).
pub static WS_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("tickwire_ws_connected", "Tick channel open (1=open)").unwrap()
});

/// Tick channel state machine current state.
/// Labels: state (idle/connecting/open/closed)
pub static WS_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "tickwire_ws_state",
        "Tick channel state machine current state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

/// Total reconnection attempts.
pub static WS_RECONNECT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickwire_ws_reconnect_total",
        "Total tick channel reconnection attempts",
        &["reason"]
    )
    .unwrap()
});

/// Subscribe frames sent.
pub static WS_SUBSCRIBE_SENT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickwire_ws_subscribe_sent_total",
        "Subscribe frames sent to the tick server",
        &["trigger"]
    )
    .unwrap()
});

/// Current subscription set size.
pub static SUBSCRIPTION_SET_SIZE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "tickwire_subscription_set_size",
        "Number of instrument keys in the subscription set"
    )
    .unwrap()
});

/// Frames dropped because they could not be parsed.
pub static MALFORMED_FRAME_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "tickwire_malformed_frame_total",
        "Push frames dropped as malformed"
    )
    .unwrap()
});

/// Heartbeat/control frames ignored.
pub static CONTROL_FRAME_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "tickwire_control_frame_total",
        "Heartbeat/control frames ignored"
    )
    .unwrap()
});

/// Quote store writes.
/// Labels: source (tick/snapshot)
pub static QUOTE_WRITES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickwire_quote_writes_total",
        "Quote store writes by producer",
        &["source"]
    )
    .unwrap()
});

/// Distinct keys held by the quote store.
pub static QUOTE_STORE_KEYS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("tickwire_quote_store_keys", "Distinct keys in the quote store").unwrap()
});

/// Poll cycles by outcome.
/// Labels: outcome (primary/fallback/offline/superseded)
pub static POLL_CYCLES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickwire_poll_cycles_total",
        "Snapshot poll cycles by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Fallback per-instrument failures.
pub static POLL_FALLBACK_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tickwire_poll_fallback_failures_total",
        "Fallback quote requests that yielded an unavailable placeholder",
        &["symbol"]
    )
    .unwrap()
});

/// Metrics helper.
pub struct Metrics;

impl Metrics {
    /// Set tick channel state. Only the active state is 1.
    pub fn ws_state_set(state: &str) {
        for s in &["idle", "connecting", "open", "closed"] {
            WS_STATE.with_label_values(&[s]).set(0.0);
        }
        WS_STATE.with_label_values(&[state]).set(1.0);
        WS_CONNECTED.set(if state == "open" { 1.0 } else { 0.0 });
    }

    /// Record a reconnection attempt.
    pub fn ws_reconnect(reason: &str) {
        WS_RECONNECT_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Record a subscribe frame ("open" or "change").
    pub fn subscribe_sent(trigger: &str, set_size: usize) {
        WS_SUBSCRIBE_SENT_TOTAL.with_label_values(&[trigger]).inc();
        SUBSCRIPTION_SET_SIZE.set(set_size as i64);
    }

    pub fn malformed_frame() {
        MALFORMED_FRAME_TOTAL.inc();
    }

    pub fn control_frame() {
        CONTROL_FRAME_TOTAL.inc();
    }

    /// Record a quote store write.
    pub fn quote_write(source: &str, store_len: usize) {
        QUOTE_WRITES_TOTAL.with_label_values(&[source]).inc();
        QUOTE_STORE_KEYS.set(store_len as i64);
    }

    /// Record a completed or discarded poll cycle.
    pub fn poll_cycle(outcome: &str) {
        POLL_CYCLES_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn poll_fallback_failure(symbol: &str) {
        POLL_FALLBACK_FAILURES_TOTAL
            .with_label_values(&[symbol])
            .inc();
    }
}
