//! Tick channel lifecycle integration tests.
//!
//! Runs a real `TickChannel` against a local mock tick server:
//! - Full-set subscribe on open (including the empty set)
//! - Resubscription on every effective subscription change
//! - Resubscription with the current set after a server-side close
//! - Tick dispatch into the quote store, heartbeat and garbage tolerance
//! - Shutdown

mod common;
use common::MockTickServer;

use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tickwire_core::{Direction, Price};
use tickwire_feed::QuoteStore;
use tickwire_ws::{ChannelConfig, ConnectionState, SubscriptionSet, TickChannel};
use tokio::task::JoinHandle;
use tokio::time::timeout;

struct Harness {
    channel: Arc<TickChannel>,
    store: Arc<QuoteStore>,
    subscriptions: Arc<SubscriptionSet>,
    handle: JoinHandle<()>,
}

fn start_channel(url: String, subscriptions: SubscriptionSet) -> Harness {
    start_channel_with_delay(url, subscriptions, 100)
}

fn start_channel_with_delay(
    url: String,
    subscriptions: SubscriptionSet,
    reconnect_delay_ms: u64,
) -> Harness {
    let store = Arc::new(QuoteStore::new());
    let subscriptions = Arc::new(subscriptions);
    let config = ChannelConfig {
        url,
        reconnect_delay_ms,
        connect_timeout_ms: 2000,
    };
    let channel = Arc::new(TickChannel::new(
        config,
        store.clone(),
        subscriptions.clone(),
    ));

    let runner = channel.clone();
    let handle = tokio::spawn(async move { runner.run().await });

    Harness {
        channel,
        store,
        subscriptions,
        handle,
    }
}

async fn wait_until<F: Fn() -> bool>(what: &str, condition: F) {
    let ok = timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(ok.is_ok(), "timed out waiting for {what}");
}

fn subscribe_keys(frame: &str) -> Vec<String> {
    let value: serde_json::Value = serde_json::from_str(frame).unwrap();
    serde_json::from_value(value["subscribe"].clone()).unwrap()
}

#[tokio::test]
async fn test_subscribes_full_set_on_open() {
    let server = MockTickServer::start().await;
    let h = start_channel(
        server.url(),
        SubscriptionSet::from_keys(["NSE_EQ|TCS", "NSE_EQ|INFY"]),
    );

    let msgs = server.wait_for_messages(1).await;
    assert_eq!(subscribe_keys(&msgs[0]), vec!["NSE_EQ|TCS", "NSE_EQ|INFY"]);
    wait_until("open state", || h.channel.state() == ConnectionState::Open).await;

    h.channel.shutdown();
    let _ = timeout(Duration::from_secs(2), h.handle).await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_empty_set_is_sent_on_open() {
    let server = MockTickServer::start().await;
    let h = start_channel(server.url(), SubscriptionSet::new());

    let msgs = server.wait_for_messages(1).await;
    assert!(subscribe_keys(&msgs[0]).is_empty());

    h.channel.shutdown();
    let _ = timeout(Duration::from_secs(2), h.handle).await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_resubscribes_on_change() {
    let server = MockTickServer::start().await;
    let h = start_channel(server.url(), SubscriptionSet::from_keys(["A"]));
    server.wait_for_messages(1).await;

    h.subscriptions.insert("B");
    let msgs = server.wait_for_messages(2).await;
    assert_eq!(subscribe_keys(&msgs[1]), vec!["A", "B"]);

    h.subscriptions.remove("A");
    let msgs = server.wait_for_messages(3).await;
    assert_eq!(subscribe_keys(&msgs[2]), vec!["B"]);

    h.channel.shutdown();
    let _ = timeout(Duration::from_secs(2), h.handle).await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_reconnect_resends_current_set() {
    let server = MockTickServer::start().await;
    let h = start_channel_with_delay(server.url(), SubscriptionSet::from_keys(["A"]), 500);
    let msgs = server.wait_for_messages(1).await;
    assert_eq!(subscribe_keys(&msgs[0]), vec!["A"]);

    server.close_all();
    wait_until("closed before reconnect", || {
        h.channel.reconnect_count() >= 1 && h.channel.state() == ConnectionState::Closed
    })
    .await;

    // No connection is live, so the change can only arrive with the reopen.
    h.subscriptions.insert("C");
    assert_eq!(server.connection_count().await, 1);

    let msgs = server.wait_for_messages(2).await;
    assert_eq!(server.connection_count().await, 2);
    assert_eq!(subscribe_keys(&msgs[1]), vec!["A", "C"]);

    // The reopen already carried the change; no follow-up resubscribe.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.received().await.len(), 2);

    h.channel.shutdown();
    let _ = timeout(Duration::from_secs(2), h.handle).await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_ticks_reach_store_and_garbage_is_ignored() {
    let server = MockTickServer::start().await;
    let h = start_channel(server.url(), SubscriptionSet::from_keys(["NSE_EQ|TCS"]));
    server.wait_for_messages(1).await;
    wait_until("open state", || h.channel.state() == ConnectionState::Open).await;

    server.push(r#"{"feeds": {"NSE_EQ|TCS": {"ltpc": {"ltp": 100.0}}}}"#);
    server.push("definitely not json");
    server.push(r#"{"data": {"type": "market_info"}}"#);
    server.push(r#"{"feeds": {"NSE_EQ|TCS": {"ltpc": {"ltp": 95.0}}}}"#);

    let store = h.store.clone();
    wait_until("two ticks", || h.channel.ticks_applied() >= 2).await;

    let quote = store.get("NSE_EQ|TCS").unwrap();
    assert_eq!(quote.last_price, Price::new(dec!(95)));
    assert_eq!(quote.direction, Direction::Down);
    assert_eq!(h.channel.state(), ConnectionState::Open);

    h.channel.shutdown();
    let _ = timeout(Duration::from_secs(2), h.handle).await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_run_and_ignores_later_frames() {
    let server = MockTickServer::start().await;
    let h = start_channel(server.url(), SubscriptionSet::from_keys(["K"]));
    server.wait_for_messages(1).await;

    h.channel.shutdown();
    let finished = timeout(Duration::from_secs(2), h.handle).await;
    assert!(finished.is_ok(), "run() should return after shutdown");
    assert_eq!(h.channel.state(), ConnectionState::Closed);

    server.push(r#"{"feeds": {"K": {"ltpc": {"ltp": 1.0}}}}"#);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.store.is_empty());

    server.shutdown().await;
}
