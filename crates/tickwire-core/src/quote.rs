//! Quote state kept per instrument key.

use crate::{InstrumentKey, Price};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Price movement relative to the previous stored price of the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    /// Only ever produced for the first write of a key.
    #[default]
    Neutral,
}

impl Direction {
    /// Derive the direction of `new` against the previously stored price.
    ///
    /// Ties count as `Up`.
    #[inline]
    pub fn derive(previous: Option<Price>, new: Price) -> Self {
        match previous {
            None => Self::Neutral,
            Some(prev) if prev <= new => Self::Up,
            Some(_) => Self::Down,
        }
    }

    /// Direction of a signed change value (`>= 0` is up).
    pub fn from_change(change: f64) -> Self {
        if change >= 0.0 {
            Self::Up
        } else {
            Self::Down
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
            Self::Neutral => write!(f, "neutral"),
        }
    }
}

/// Optional quote fields carried by snapshots and full-feed ticks.
///
/// Updates are partial: merging never clears a field the update lacks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_close: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl QuoteFields {
    /// Overlay the fields present in `update`.
    pub fn merge(&mut self, update: QuoteFields) {
        fn take<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }
        take(&mut self.open, update.open);
        take(&mut self.high, update.high);
        take(&mut self.low, update.low);
        take(&mut self.close, update.close);
        take(&mut self.prev_close, update.prev_close);
        take(&mut self.change, update.change);
        take(&mut self.percent, update.percent);
        take(&mut self.display_name, update.display_name);
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Last known quote for one instrument key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub key: InstrumentKey,
    pub last_price: Price,
    pub direction: Direction,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub fields: QuoteFields,
}

impl Quote {
    /// First observation of a key.
    pub fn first(key: impl Into<InstrumentKey>, price: Price, fields: QuoteFields) -> Self {
        Self {
            key: key.into(),
            last_price: price,
            direction: Direction::Neutral,
            updated_at: Utc::now(),
            fields,
        }
    }

    /// Apply a new observation, deriving direction from the stored price
    /// before it is overwritten.
    pub fn advance(&mut self, price: Price, fields: QuoteFields) {
        self.direction = Direction::derive(Some(self.last_price), price);
        self.last_price = price;
        self.updated_at = Utc::now();
        self.fields.merge(fields);
    }
}
