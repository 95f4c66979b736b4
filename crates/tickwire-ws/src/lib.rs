//! Tick channel client for tickwire.
//!
//! Provides the push-channel side of the engine:
//! - Connection lifecycle with fixed-delay reconnection
//! - Full-set resubscription on open and on every subscription change
//! - Heartbeat filtering and tick dispatch into the quote store

pub mod connection;
pub mod error;
pub mod message;
pub mod subscription;

pub use connection::{ChannelConfig, ConnectionState, TickChannel, MIN_RECONNECT_DELAY_MS};
pub use error::{WsError, WsResult};
pub use message::SubscribeRequest;
pub use subscription::SubscriptionSet;

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any `wss://` connection is made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
