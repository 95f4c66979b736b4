//! Application configuration.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use tickwire_poller::{PollerConfig, DEFAULT_FALLBACK_URL};
use tickwire_registry::SearchConfig;
use tickwire_ws::{ChannelConfig, MIN_RECONNECT_DELAY_MS};

/// Tick channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Delay between a close and the next connect attempt (ms). Default: 2,000.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// WebSocket handshake timeout (ms). Default: 10,000.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_reconnect_delay_ms() -> u64 {
    2_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl ChannelSettings {
    pub fn to_channel_config(&self, url: &str) -> ChannelConfig {
        ChannelConfig {
            url: url.to_string(),
            reconnect_delay_ms: self.reconnect_delay_ms,
            connect_timeout_ms: self.connect_timeout_ms,
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Tick server WebSocket URL.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// Backend REST base URL (catalog, index summary, ad-hoc subscribe).
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Per-symbol quote endpoint used when the index summary fails.
    #[serde(default = "default_fallback_quote_url")]
    pub fallback_quote_url: String,
    /// Watchlist JSON file.
    #[serde(default = "default_watchlist_path")]
    pub watchlist_path: String,
    /// Seconds between status log lines.
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,
    #[serde(default)]
    pub channel: ChannelSettings,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

fn default_ws_url() -> String {
    "ws://localhost:9000".to_string()
}

fn default_api_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_fallback_quote_url() -> String {
    DEFAULT_FALLBACK_URL.to_string()
}

fn default_watchlist_path() -> String {
    "data/watchlist.json".to_string()
}

fn default_status_interval_secs() -> u64 {
    60
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            api_base_url: default_api_base_url(),
            fallback_quote_url: default_fallback_quote_url(),
            watchlist_path: default_watchlist_path(),
            status_interval_secs: default_status_interval_secs(),
            channel: ChannelSettings::default(),
            poller: PollerConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load and validate configuration from a TOML file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make a component spin or never fire.
    pub fn validate(&self) -> AppResult<()> {
        if !(self.ws_url.starts_with("ws://") || self.ws_url.starts_with("wss://")) {
            return Err(AppError::Config(format!(
                "ws_url must be a ws:// or wss:// URL, got {:?}",
                self.ws_url
            )));
        }
        if self.api_base_url.trim().is_empty() {
            return Err(AppError::Config("api_base_url is empty".to_string()));
        }
        if self.fallback_quote_url.trim().is_empty() {
            return Err(AppError::Config("fallback_quote_url is empty".to_string()));
        }
        if self.watchlist_path.trim().is_empty() {
            return Err(AppError::Config("watchlist_path is empty".to_string()));
        }
        if self.channel.reconnect_delay_ms < MIN_RECONNECT_DELAY_MS {
            return Err(AppError::Config(format!(
                "channel.reconnect_delay_ms must be at least {MIN_RECONNECT_DELAY_MS}"
            )));
        }
        if self.channel.connect_timeout_ms == 0 {
            return Err(AppError::Config(
                "channel.connect_timeout_ms must be positive".to_string(),
            ));
        }
        if self.poller.interval_secs == 0 {
            return Err(AppError::Config(
                "poller.interval_secs must be positive".to_string(),
            ));
        }
        if self.poller.request_timeout_ms == 0 {
            return Err(AppError::Config(
                "poller.request_timeout_ms must be positive".to_string(),
            ));
        }
        if self.poller.indices.is_empty() {
            return Err(AppError::Config("poller.indices is empty".to_string()));
        }
        if self.search.default_limit == 0 {
            return Err(AppError::Config(
                "search.default_limit must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.search.threshold) {
            return Err(AppError::Config(format!(
                "search.threshold must be within [0, 1], got {}",
                self.search.threshold
            )));
        }
        if self.status_interval_secs == 0 {
            return Err(AppError::Config(
                "status_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
