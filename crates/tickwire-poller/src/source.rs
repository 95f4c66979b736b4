//! Index data sources.
//!
//! The poller talks to two sources through traits so that tests can inject
//! fakes:
//! - [`SnapshotSource`]: one request returning every index at once
//! - [`QuoteSource`]: one request per index symbol, used as the fallback

use crate::error::{PollerError, PollerResult};
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

pub use tickwire_core::BoxFuture;
use tickwire_core::{Price, QuoteFields};

/// Public per-symbol quote endpoint used by the fallback source.
pub const DEFAULT_FALLBACK_URL: &str = "https://query1.finance.yahoo.com/v7/finance/quote";

/// Index tracked by the poller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedIndex {
    /// Canonical name (e.g. "NIFTY 50").
    pub name: String,
    /// Quote symbol (e.g. "^NSEI").
    pub symbol: String,
    /// Label shown to the user.
    pub display: String,
}

impl TrackedIndex {
    pub fn new(
        name: impl Into<String>,
        symbol: impl Into<String>,
        display: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            display: display.into(),
        }
    }

    /// The four headline Indian indices.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("NIFTY 50", "^NSEI", "Nifty 50"),
            Self::new("SENSEX", "^BSESN", "Sensex"),
            Self::new("BANK NIFTY", "^NSEBANK", "Bank Nifty"),
            Self::new("NIFTY NEXT 50", "^NSMIDCP", "Nifty Next 50"),
        ]
    }
}

// ============================================================================
// Primary source
// ============================================================================

/// One index from the primary source.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryEntry {
    /// Display name as keyed by the source.
    pub name: String,
    pub symbol: String,
    /// Last price (`close`). `None` when the source had no data.
    pub price: Option<Price>,
    pub fields: QuoteFields,
    /// Direction reported by the source, if any.
    pub direction: Option<String>,
}

/// Market-wide summary reported by the primary source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSummary {
    pub title: Option<String>,
    pub direction: Option<String>,
    pub avg_percent: Option<f64>,
}

/// Decoded primary response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrimarySnapshot {
    /// Entries in source order. Entries without a symbol are already dropped.
    pub entries: Vec<PrimaryEntry>,
    pub market_summary: Option<RawSummary>,
    pub as_of: Option<String>,
}

/// Source returning every tracked index in one request.
pub trait SnapshotSource: Send + Sync {
    fn fetch(&self) -> BoxFuture<'_, PollerResult<PrimarySnapshot>>;
}

#[derive(Debug, Deserialize)]
struct RawPrimaryResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    indices: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(rename = "marketSummary", default)]
    market_summary: Option<RawMarketSummary>,
    #[serde(rename = "asOf", default)]
    as_of: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMarketSummary {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    direction: Option<String>,
    /// Number when computed, `"--"` when the backend had nothing.
    #[serde(default)]
    avg_percent: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIndexEntry {
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    open: Option<f64>,
    #[serde(default)]
    high: Option<f64>,
    #[serde(default)]
    low: Option<f64>,
    #[serde(default)]
    close: Option<f64>,
    #[serde(default)]
    prev_close: Option<f64>,
    #[serde(default)]
    change: Option<f64>,
    #[serde(default)]
    percent: Option<f64>,
    #[serde(default)]
    direction: Option<String>,
}

/// Decode the primary envelope.
///
/// Anything other than `status == "success"` with an `indices` object is an
/// error, which makes the poller switch to the fallback source.
pub fn parse_primary(body: &str) -> PollerResult<PrimarySnapshot> {
    let raw: RawPrimaryResponse = serde_json::from_str(body)?;

    if raw.status.as_deref() != Some("success") {
        return Err(PollerError::Envelope(format!(
            "status is {:?}",
            raw.status.as_deref().unwrap_or("missing")
        )));
    }
    let indices = raw
        .indices
        .ok_or_else(|| PollerError::Envelope("missing indices".to_string()))?;

    let mut entries = Vec::with_capacity(indices.len());
    for (name, value) in indices {
        let entry: RawIndexEntry = match serde_json::from_value(value) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(name = %name, error = %e, "Skipping undecodable index entry");
                continue;
            }
        };
        let Some(symbol) = entry.symbol.filter(|s| !s.is_empty()) else {
            debug!(name = %name, "Skipping index entry without symbol");
            continue;
        };

        let price = entry.close.and_then(|close| Price::from_f64(close).ok());
        entries.push(PrimaryEntry {
            fields: QuoteFields {
                open: entry.open,
                high: entry.high,
                low: entry.low,
                close: entry.close,
                prev_close: entry.prev_close,
                change: entry.change,
                percent: entry.percent,
                display_name: Some(name.clone()),
            },
            name,
            symbol,
            price,
            direction: entry.direction,
        });
    }

    Ok(PrimarySnapshot {
        entries,
        market_summary: raw.market_summary.map(|s| RawSummary {
            title: s.title,
            direction: s.direction,
            avg_percent: s.avg_percent.and_then(|v| v.as_f64()),
        }),
        as_of: raw.as_of,
    })
}

/// Primary source over HTTP: `GET {api_base}/api/index-summary`.
pub struct HttpPrimarySource {
    client: Client,
    url: String,
}

impl HttpPrimarySource {
    pub fn new(api_base: &str, timeout: Duration) -> PollerResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PollerError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: format!("{}/api/index-summary", api_base.trim_end_matches('/')),
        })
    }

    async fn fetch_inner(&self) -> PollerResult<PrimarySnapshot> {
        let response = self
            .client
            .get(&self.url)
            .header("Cache-Control", "no-store")
            .send()
            .await
            .map_err(|e| PollerError::HttpClient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PollerError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| PollerError::HttpClient(format!("Failed to read response: {e}")))?;
        parse_primary(&body)
    }
}

impl SnapshotSource for HttpPrimarySource {
    fn fetch(&self) -> BoxFuture<'_, PollerResult<PrimarySnapshot>> {
        Box::pin(self.fetch_inner())
    }
}

// ============================================================================
// Fallback source
// ============================================================================

/// One quote from the fallback source.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackQuote {
    pub price: Price,
    pub fields: QuoteFields,
}

impl FallbackQuote {
    pub fn new(price: Price) -> Self {
        Self {
            price,
            fields: QuoteFields::default(),
        }
    }

    /// Signed change, 0 when the source did not report one.
    pub fn change(&self) -> f64 {
        self.fields.change.unwrap_or(0.0)
    }

    /// Percent change, 0 when the source did not report one.
    pub fn percent(&self) -> f64 {
        self.fields.percent.unwrap_or(0.0)
    }
}

/// Source returning one symbol per request.
pub trait QuoteSource: Send + Sync {
    fn fetch_quote<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, PollerResult<FallbackQuote>>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQuoteEnvelope {
    #[serde(default)]
    quote_response: Option<RawQuoteResponse>,
}

#[derive(Debug, Deserialize)]
struct RawQuoteResponse {
    #[serde(default)]
    result: Vec<RawQuote>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQuote {
    #[serde(default)]
    regular_market_price: Option<f64>,
    #[serde(default)]
    regular_market_open: Option<f64>,
    #[serde(default)]
    regular_market_day_high: Option<f64>,
    #[serde(default)]
    regular_market_day_low: Option<f64>,
    #[serde(default)]
    regular_market_previous_close: Option<f64>,
    #[serde(default)]
    regular_market_change: Option<f64>,
    #[serde(default)]
    regular_market_change_percent: Option<f64>,
}

/// Decode a fallback quote body for `symbol`. A result without a price is an
/// error so the caller renders the index as unavailable.
pub fn parse_fallback(symbol: &str, body: &str) -> PollerResult<FallbackQuote> {
    let envelope: RawQuoteEnvelope = serde_json::from_str(body)?;
    let quote = envelope
        .quote_response
        .and_then(|r| r.result.into_iter().next())
        .unwrap_or_default();

    let price = quote
        .regular_market_price
        .ok_or_else(|| PollerError::MissingPrice(symbol.to_string()))
        .and_then(|p| {
            Price::from_f64(p).map_err(|_| PollerError::MissingPrice(symbol.to_string()))
        })?;

    Ok(FallbackQuote {
        price,
        fields: QuoteFields {
            open: quote.regular_market_open,
            high: quote.regular_market_day_high,
            low: quote.regular_market_day_low,
            close: quote.regular_market_price,
            prev_close: quote.regular_market_previous_close,
            change: quote.regular_market_change,
            percent: quote.regular_market_change_percent,
            display_name: None,
        },
    })
}

/// Fallback source over HTTP: `GET {base_url}?symbols={symbol}`.
pub struct HttpFallbackSource {
    client: Client,
    base_url: String,
}

impl HttpFallbackSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> PollerResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PollerError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    async fn fetch_inner(&self, symbol: &str) -> PollerResult<FallbackQuote> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("symbols", symbol)])
            .send()
            .await
            .map_err(|e| PollerError::HttpClient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PollerError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| PollerError::HttpClient(format!("Failed to read response: {e}")))?;
        parse_fallback(symbol, &body)
    }
}

impl QuoteSource for HttpFallbackSource {
    fn fetch_quote<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, PollerResult<FallbackQuote>> {
        Box::pin(self.fetch_inner(symbol))
    }
}

// ============================================================================
// Mocks
// ============================================================================

/// Scripted primary source for testing.
///
/// Each `fetch` pops the next scripted response; an exhausted script fails.
#[derive(Default)]
pub struct MockSnapshotSource {
    script: Mutex<VecDeque<(Duration, Result<PrimarySnapshot, String>)>>,
    calls: AtomicUsize,
}

impl MockSnapshotSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response.
    pub fn push_ok(&self, snapshot: PrimarySnapshot) {
        self.push_delayed(Duration::ZERO, Ok(snapshot));
    }

    /// Queue a failure.
    pub fn push_err(&self, message: impl Into<String>) {
        self.push_delayed(Duration::ZERO, Err(message.into()));
    }

    /// Queue a response delivered after `delay`.
    pub fn push_delayed(&self, delay: Duration, response: Result<PrimarySnapshot, String>) {
        self.script.lock().push_back((delay, response));
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SnapshotSource for MockSnapshotSource {
    fn fetch(&self) -> BoxFuture<'_, PollerResult<PrimarySnapshot>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().pop_front();
        Box::pin(async move {
            let (delay, response) =
                next.unwrap_or((Duration::ZERO, Err("no scripted response".to_string())));
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            response.map_err(PollerError::HttpClient)
        })
    }
}

/// Per-symbol fallback source for testing. Unknown symbols fail.
#[derive(Default)]
pub struct MockQuoteSource {
    quotes: Mutex<HashMap<String, FallbackQuote>>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
}

impl MockQuoteSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_quote(&self, symbol: impl Into<String>, quote: FallbackQuote) {
        self.quotes.lock().insert(symbol.into(), quote);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl QuoteSource for MockQuoteSource {
    fn fetch_quote<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, PollerResult<FallbackQuote>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let quote = self.quotes.lock().get(symbol).cloned();
        let delay = *self.delay.lock();
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            quote.ok_or_else(|| PollerError::HttpClient(format!("no quote for {symbol}")))
        })
    }
}
