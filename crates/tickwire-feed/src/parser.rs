//! Push-frame parsing.
//!
//! Data frames carry a feed map keyed by instrument key, either at the top
//! level or nested under `data`:
//!
//! ```json
//! {"type": "live_feed", "feeds": {"NSE_EQ|INE467B01029": {"fullFeed": {"marketFF": {"ltpc": {"ltp": 3521.4}}}}}}
//! ```
//!
//! Recognized per-entry price locations, in order:
//! 1. `ltpc.ltp`
//! 2. `fullFeed.marketFF.ltpc.ltp` (+ `marketOHLC.ohlc[0]`)
//! 3. `fullFeed.indexFF.ltpc.ltp`
//!
//! A flat `{"instrument_key"|"symbol": .., "ltp": ..}` frame is accepted as a
//! single tick. Frames whose `type` is [`CONTROL_FRAME_TYPE`] are heartbeats.

use crate::error::{FeedError, FeedResult};
use serde::Deserialize;
use tickwire_core::{InstrumentKey, Price, QuoteFields};
use tracing::debug;

/// Message-type tag of heartbeat/control frames.
pub const CONTROL_FRAME_TYPE: &str = "market_info";

/// One price update extracted from a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TickUpdate {
    pub key: InstrumentKey,
    pub price: Price,
    pub fields: QuoteFields,
}

/// Classified push frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Heartbeat/control frame, to be ignored.
    Control,
    /// Data frame with zero or more ticks, in feed-map order.
    Ticks(Vec<TickUpdate>),
    /// Well-formed JSON that is neither (e.g. subscription ACK).
    Other(Option<String>),
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    feeds: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default, alias = "instrumentKey")]
    instrument_key: Option<String>,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    ltp: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFeed {
    #[serde(default)]
    ltpc: Option<RawLtpc>,
    #[serde(default)]
    full_feed: Option<RawFullFeed>,
}

#[derive(Debug, Default, Deserialize)]
struct RawFullFeed {
    #[serde(rename = "marketFF", default)]
    market_ff: Option<RawMarketFull>,
    #[serde(rename = "indexFF", default)]
    index_ff: Option<RawIndexFull>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMarketFull {
    #[serde(default)]
    ltpc: Option<RawLtpc>,
    #[serde(rename = "marketOHLC", default)]
    market_ohlc: Option<RawOhlcList>,
}

#[derive(Debug, Default, Deserialize)]
struct RawIndexFull {
    #[serde(default)]
    ltpc: Option<RawLtpc>,
    #[serde(rename = "marketOHLC", default)]
    market_ohlc: Option<RawOhlcList>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLtpc {
    #[serde(default)]
    ltp: Option<f64>,
    /// Previous close.
    #[serde(default)]
    cp: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawOhlcList {
    #[serde(default)]
    ohlc: Vec<RawOhlc>,
}

#[derive(Debug, Default, Deserialize)]
struct RawOhlc {
    #[serde(default)]
    open: Option<f64>,
    #[serde(default)]
    high: Option<f64>,
    #[serde(default)]
    low: Option<f64>,
    #[serde(default)]
    close: Option<f64>,
}

impl RawFeed {
    fn into_tick(self, key: String) -> Option<TickUpdate> {
        let (ltpc, ohlc) = if let Some(ltpc) = self.ltpc {
            (ltpc, None)
        } else {
            let full = self.full_feed?;
            if let Some(market) = full.market_ff {
                (market.ltpc?, market.market_ohlc)
            } else {
                let index = full.index_ff?;
                (index.ltpc?, index.market_ohlc)
            }
        };

        let price = Price::from_f64(ltpc.ltp?).ok()?;
        let mut fields = QuoteFields {
            prev_close: ltpc.cp,
            ..Default::default()
        };
        if let Some(bar) = ohlc.and_then(|list| list.ohlc.into_iter().next()) {
            fields.open = bar.open;
            fields.high = bar.high;
            fields.low = bar.low;
            fields.close = bar.close;
        }

        Some(TickUpdate { key, price, fields })
    }
}

/// Parse one text frame.
///
/// Returns an error only for frames that are not valid JSON objects;
/// feed entries without a usable price are skipped individually.
pub fn parse_frame(text: &str) -> FeedResult<Frame> {
    let raw: RawFrame = serde_json::from_str(text)?;
    classify(raw)
}

fn classify(raw: RawFrame) -> FeedResult<Frame> {
    if raw.kind.as_deref() == Some(CONTROL_FRAME_TYPE) {
        return Ok(Frame::Control);
    }

    if let Some(feeds) = raw.feeds {
        return Ok(Frame::Ticks(extract_feeds(feeds)));
    }

    if let Some(data) = raw.data {
        if data.is_object() {
            let nested: RawFrame = serde_json::from_value(data)?;
            return classify(nested);
        }
        return Err(FeedError::InvalidData(
            "data field is not an object".to_string(),
        ));
    }

    if let Some(ltp) = raw.ltp {
        let key = raw
            .instrument_key
            .or(raw.symbol)
            .ok_or_else(|| FeedError::InvalidData("flat tick without key".to_string()))?;
        let price = Price::from_f64(ltp).map_err(|e| FeedError::ParseError(e.to_string()))?;
        return Ok(Frame::Ticks(vec![TickUpdate {
            key,
            price,
            fields: QuoteFields::default(),
        }]));
    }

    Ok(Frame::Other(raw.kind))
}

fn extract_feeds(feeds: serde_json::Map<String, serde_json::Value>) -> Vec<TickUpdate> {
    let mut ticks = Vec::with_capacity(feeds.len());
    for (key, value) in feeds {
        let feed: RawFeed = match serde_json::from_value(value) {
            Ok(feed) => feed,
            Err(e) => {
                debug!(key = %key, error = %e, "Skipping undecodable feed entry");
                continue;
            }
        };
        match feed.into_tick(key.clone()) {
            Some(tick) => ticks.push(tick),
            None => debug!(key = %key, "Feed entry without last traded price"),
        }
    }
    ticks
}
