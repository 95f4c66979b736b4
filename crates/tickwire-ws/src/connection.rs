//! Tick channel connection manager.
//!
//! Owns the push-connection lifecycle:
//!
//! ```text
//! Idle -> Connecting -> Open -> Closed -> (fixed delay) -> Connecting -> ...
//! ```
//!
//! On every transition to `Open` the full current subscription set is sent.
//! While open, every effective subscription change triggers another full
//! send. Data frames are dispatched into the quote store in arrival order;
//! heartbeat frames and malformed frames are dropped without affecting the
//! connection. Nothing here is fatal: `run()` returns only after
//! `shutdown()`.

use crate::error::{WsError, WsResult};
use crate::message::SubscribeRequest;
use crate::subscription::SubscriptionSet;
use futures_util::{Sink, SinkExt, StreamExt};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tickwire_core::InstrumentKey;
use tickwire_feed::{parse_frame, Frame, QuoteStore};
use tickwire_telemetry::Metrics;
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Lower bound for the reconnect delay. A zero delay would turn a flapping
/// server into a reconnect storm.
pub const MIN_RECONNECT_DELAY_MS: u64 = 100;

/// Tick channel configuration.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// WebSocket URL of the tick server.
    pub url: String,
    /// Fixed delay between a close and the next connect attempt.
    pub reconnect_delay_ms: u64,
    /// Upper bound for the WebSocket handshake.
    pub connect_timeout_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            reconnect_delay_ms: 2000,
            connect_timeout_ms: 10_000,
        }
    }
}

/// Connection state. Owned by [`TickChannel`]; other components only read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tick channel manager.
pub struct TickChannel {
    config: ChannelConfig,
    state: Arc<RwLock<ConnectionState>>,
    store: Arc<QuoteStore>,
    subscriptions: Arc<SubscriptionSet>,
    reconnect_count: AtomicU32,
    ticks_applied: AtomicU64,
    shutdown_token: CancellationToken,
}

impl TickChannel {
    /// Create a new tick channel. Nothing connects until [`run`](Self::run).
    pub fn new(
        mut config: ChannelConfig,
        store: Arc<QuoteStore>,
        subscriptions: Arc<SubscriptionSet>,
    ) -> Self {
        if config.reconnect_delay_ms < MIN_RECONNECT_DELAY_MS {
            warn!(
                configured = config.reconnect_delay_ms,
                min = MIN_RECONNECT_DELAY_MS,
                "Reconnect delay below floor, clamping"
            );
            config.reconnect_delay_ms = MIN_RECONNECT_DELAY_MS;
        }

        Self {
            config,
            state: Arc::new(RwLock::new(ConnectionState::Idle)),
            store,
            subscriptions,
            reconnect_count: AtomicU32::new(0),
            ticks_applied: AtomicU64::new(0),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Number of reconnect attempts since start.
    pub fn reconnect_count(&self) -> u32 {
        self.reconnect_count.load(Ordering::Relaxed)
    }

    /// Number of ticks forwarded to the quote store.
    pub fn ticks_applied(&self) -> u64 {
        self.ticks_applied.load(Ordering::Relaxed)
    }

    /// Effective reconnect delay after clamping.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.config.reconnect_delay_ms)
    }

    /// Signal shutdown.
    ///
    /// Closes the active connection (or aborts a pending reconnect wait) and
    /// makes [`run`](Self::run) return. No tick is applied after `run`
    /// has returned.
    pub fn shutdown(&self) {
        info!("TickChannel shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        if previous != state {
            debug!(from = %previous, to = %state, "Tick channel state");
            Metrics::ws_state_set(state.as_str());
        }
    }

    /// Run the connect/reconnect loop until shutdown.
    pub async fn run(&self) {
        loop {
            if self.is_shutdown() {
                break;
            }

            let reason = match self.try_connect().await {
                Ok(()) => {
                    info!("Tick channel connection ended");
                    "stream_ended"
                }
                Err(e) => {
                    warn!(error = %e, "Tick channel connection lost");
                    e.reason()
                }
            };

            if self.is_shutdown() {
                break;
            }

            self.set_state(ConnectionState::Closed);
            let attempt = self.reconnect_count.fetch_add(1, Ordering::Relaxed) + 1;
            Metrics::ws_reconnect(reason);

            let delay = self.reconnect_delay();
            warn!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown requested during reconnect wait");
                    break;
                }
            }
        }

        self.set_state(ConnectionState::Closed);
        info!("Tick channel stopped");
    }

    async fn try_connect(&self) -> WsResult<()> {
        self.set_state(ConnectionState::Connecting);
        info!(url = %self.config.url, "Connecting to tick server");

        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let connect = connect_async_tls_with_config(&self.config.url, None, true, None);
        let ws_stream = tokio::select! {
            result = tokio::time::timeout(timeout, connect) => {
                let (stream, _response) = result
                    .map_err(|_| WsError::ConnectTimeout(self.config.connect_timeout_ms))??;
                stream
            }
            () = self.shutdown_token.cancelled() => return Ok(()),
        };
        let (mut write, mut read) = ws_stream.split();

        self.set_state(ConnectionState::Open);
        info!("Tick channel open");

        // Marking the current value as seen before sending means a change
        // racing with the open is picked up by the loop below.
        let mut subscription_rx = self.subscriptions.watch();
        let keys = subscription_rx.borrow_and_update().clone();
        self.send_subscribe(&mut write, keys, "open").await?;

        loop {
            tokio::select! {
                biased;

                () = self.shutdown_token.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(error = %e, "Failed to send Close frame during shutdown");
                    }
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(&text),
                        Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                            Ok(text) => self.handle_text(text),
                            Err(_) => {
                                Metrics::malformed_frame();
                                warn!(len = bytes.len(), "Dropping non-UTF-8 binary frame");
                            }
                        },
                        Some(Ok(Message::Ping(data))) => {
                            trace!("Received ping, sending pong");
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (u16::from(f.code), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "Tick channel closed by server");
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "Tick channel read error");
                            return Err(e.into());
                        }
                        None => {
                            warn!("Tick channel stream ended");
                            return Ok(());
                        }
                        _ => {}
                    }
                }

                Ok(()) = subscription_rx.changed() => {
                    let keys = subscription_rx.borrow_and_update().clone();
                    self.send_subscribe(&mut write, keys, "change").await?;
                }
            }
        }
    }

    async fn send_subscribe<S>(
        &self,
        write: &mut S,
        keys: Vec<InstrumentKey>,
        trigger: &str,
    ) -> WsResult<()>
    where
        S: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    {
        let count = keys.len();
        let text = SubscribeRequest::new(keys).to_json()?;
        write.send(Message::Text(text)).await?;
        Metrics::subscribe_sent(trigger, count);
        info!(count, trigger, "Subscribe sent");
        Ok(())
    }

    /// Classify one text frame and dispatch its ticks.
    fn handle_text(&self, text: &str) {
        match parse_frame(text) {
            Ok(Frame::Control) => {
                Metrics::control_frame();
                trace!("Heartbeat frame ignored");
            }
            Ok(Frame::Ticks(ticks)) => {
                for tick in ticks {
                    let direction = self
                        .store
                        .apply_tick_fields(&tick.key, tick.price, tick.fields);
                    trace!(key = %tick.key, price = %tick.price, %direction, "Tick applied");
                    self.ticks_applied.fetch_add(1, Ordering::Relaxed);
                }
            }
            Ok(Frame::Other(kind)) => {
                debug!(?kind, "Non-data frame ignored");
            }
            Err(e) => {
                Metrics::malformed_frame();
                warn!(error = %e, len = text.len(), "Dropping malformed frame");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tickwire_core::{Direction, Price};

    fn channel(config: ChannelConfig) -> TickChannel {
        TickChannel::new(
            config,
            Arc::new(QuoteStore::new()),
            Arc::new(SubscriptionSet::new()),
        )
    }

    #[test]
    fn test_default_config() {
        let config = ChannelConfig::default();
        assert_eq!(config.reconnect_delay_ms, 2000);
        assert_eq!(config.connect_timeout_ms, 10_000);
    }

    #[test]
    fn test_zero_reconnect_delay_is_clamped() {
        let ch = channel(ChannelConfig {
            reconnect_delay_ms: 0,
            ..Default::default()
        });
        assert_eq!(
            ch.reconnect_delay(),
            Duration::from_millis(MIN_RECONNECT_DELAY_MS)
        );
    }

    #[test]
    fn test_initial_state_is_idle() {
        let ch = channel(ChannelConfig::default());
        assert_eq!(ch.state(), ConnectionState::Idle);
        assert_eq!(ch.reconnect_count(), 0);
    }

    #[test]
    fn test_handle_text_dispatches_ticks_in_order() {
        let ch = channel(ChannelConfig::default());
        ch.handle_text(r#"{"feeds": {"NSE_EQ|TCS": {"ltpc": {"ltp": 100.0}}}}"#);
        ch.handle_text(r#"{"feeds": {"NSE_EQ|TCS": {"ltpc": {"ltp": 95.0}}}}"#);

        let quote = ch.store.get("NSE_EQ|TCS").unwrap();
        assert_eq!(quote.last_price, Price::new(dec!(95)));
        assert_eq!(quote.direction, Direction::Down);
        assert_eq!(ch.ticks_applied(), 2);
    }

    #[test]
    fn test_handle_text_survives_garbage_and_heartbeats() {
        let ch = channel(ChannelConfig::default());
        ch.handle_text("{{{ not json");
        ch.handle_text(r#"{"type": "market_info"}"#);
        ch.handle_text(r#"{"data": {"type": "market_info"}}"#);
        assert!(ch.store.is_empty());
        assert_eq!(ch.ticks_applied(), 0);

        ch.handle_text(r#"{"feeds": {"K": {"ltpc": {"ltp": 1.0}}}}"#);
        assert_eq!(ch.ticks_applied(), 1);
    }

    #[tokio::test]
    async fn test_run_returns_promptly_after_shutdown() {
        let ch = Arc::new(channel(ChannelConfig {
            // Nothing listens on port 9; connects fail and the loop waits.
            url: "ws://127.0.0.1:9".to_string(),
            reconnect_delay_ms: 60_000,
            connect_timeout_ms: 500,
        }));

        let runner = {
            let ch = ch.clone();
            tokio::spawn(async move { ch.run().await })
        };

        tokio::time::sleep(Duration::from_millis(200)).await;
        ch.shutdown();

        let finished = tokio::time::timeout(Duration::from_secs(2), runner).await;
        assert!(finished.is_ok(), "run() should return after shutdown");
        assert_eq!(ch.state(), ConnectionState::Closed);
    }
}
