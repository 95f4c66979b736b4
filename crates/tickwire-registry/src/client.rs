//! HTTP client for the instrument catalog.
//!
//! The catalog is fetched once at startup from `GET {api_base}/api/instruments`.
//! Ad-hoc subscriptions for instruments outside the watchlist go through
//! `GET {api_base}/api/ws-subscribe?symbol=..`.

use crate::error::{RegistryError, RegistryResult};
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tickwire_core::{BoxFuture, Instrument};
use tracing::{debug, info, warn};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Status value the backend returns for an accepted ad-hoc subscription.
const SUBSCRIBED_STATUS: &str = "subscribed";

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    #[serde(default)]
    instruments: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SubscribeResponse {
    #[serde(default)]
    status: Option<String>,
}

/// Client for catalog and ad-hoc subscribe endpoints.
pub struct CatalogClient {
    client: Client,
    api_base: String,
}

impl CatalogClient {
    /// Create a new catalog client.
    ///
    /// # Arguments
    /// * `api_base` - Backend base URL (e.g., "http://localhost:8000")
    pub fn new(api_base: impl Into<String>) -> RegistryResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| RegistryError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the instrument catalog.
    ///
    /// Never fails: any transport or decode error yields an empty catalog,
    /// which the search index treats as "nothing matches".
    pub async fn fetch_catalog(&self) -> Arc<[Instrument]> {
        match self.try_fetch_catalog().await {
            Ok(instruments) => {
                info!(count = instruments.len(), "Instrument catalog loaded");
                instruments.into()
            }
            Err(e) => {
                warn!(error = %e, "Failed to load instrument catalog, continuing with empty catalog");
                Arc::from(Vec::new())
            }
        }
    }

    async fn try_fetch_catalog(&self) -> RegistryResult<Vec<Instrument>> {
        let url = format!("{}/api/instruments", self.api_base);
        debug!(url = %url, "Fetching instrument catalog");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RegistryError::HttpClient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::HttpClient(format!("HTTP {status}: {body}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RegistryError::HttpClient(format!("Failed to read response: {e}")))?;
        parse_catalog(&body)
    }

    /// Ask the backend to add `symbol` to its upstream feed subscription.
    ///
    /// Returns `true` only when the backend answers `{"status": "subscribed"}`.
    pub async fn subscribe_symbol(&self, symbol: &str) -> bool {
        match self.try_subscribe_symbol(symbol).await {
            Ok(()) => {
                info!(symbol, "Ad-hoc subscription accepted");
                true
            }
            Err(e) => {
                warn!(symbol, error = %e, "Ad-hoc subscription failed");
                false
            }
        }
    }

    async fn try_subscribe_symbol(&self, symbol: &str) -> RegistryResult<()> {
        let url = format!("{}/api/ws-subscribe", self.api_base);

        let response = self
            .client
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await
            .map_err(|e| RegistryError::HttpClient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::HttpClient(format!("HTTP {status}")));
        }

        let body: SubscribeResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::HttpClient(format!("Failed to parse response: {e}")))?;
        check_subscribed(symbol, body)
    }
}

/// Backend-side subscription for instruments outside the watchlist.
pub trait SymbolSubscriber: Send + Sync {
    /// Resolves to `true` when the backend accepted the subscription.
    fn subscribe<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, bool>;
}

impl SymbolSubscriber for CatalogClient {
    fn subscribe<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(self.subscribe_symbol(symbol))
    }
}

/// Subscriber that records requests and answers with a fixed result.
pub struct MockSymbolSubscriber {
    requests: Mutex<Vec<String>>,
    accept: Mutex<bool>,
}

impl Default for MockSymbolSubscriber {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSymbolSubscriber {
    /// Accepts every request until told otherwise.
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            accept: Mutex::new(true),
        }
    }

    pub fn set_accept(&self, accept: bool) {
        *self.accept.lock() = accept;
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

impl SymbolSubscriber for MockSymbolSubscriber {
    fn subscribe<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            self.requests.lock().push(symbol.to_string());
            *self.accept.lock()
        })
    }
}

/// Decode a catalog body, skipping entries that are not valid instruments.
fn parse_catalog(body: &str) -> RegistryResult<Vec<Instrument>> {
    let response: CatalogResponse = serde_json::from_str(body)?;

    let mut instruments = Vec::with_capacity(response.instruments.len());
    for (idx, raw) in response.instruments.into_iter().enumerate() {
        match serde_json::from_value::<Instrument>(raw) {
            Ok(inst) if !inst.key.is_empty() => instruments.push(inst),
            Ok(_) => debug!(idx, "Skipping catalog entry with empty key"),
            Err(e) => debug!(idx, error = %e, "Skipping undecodable catalog entry"),
        }
    }

    if instruments.is_empty() {
        return Err(RegistryError::ParseError(
            "catalog contains no usable instruments".to_string(),
        ));
    }
    Ok(instruments)
}

fn check_subscribed(symbol: &str, body: SubscribeResponse) -> RegistryResult<()> {
    match body.status.as_deref() {
        Some(SUBSCRIBED_STATUS) => Ok(()),
        other => Err(RegistryError::SubscribeRejected {
            symbol: symbol.to_string(),
            status: other.unwrap_or("missing").to_string(),
        }),
    }
}
