//! Poll cycle summary.

use crate::source::PrimarySnapshot;
use serde::Serialize;
use std::fmt;
use tickwire_core::{Direction, Price};

/// Title used when no index produced a value.
pub const UNAVAILABLE_TITLE: &str = "Market Data Unavailable";

/// Title used for summaries built from the fallback source.
pub const FALLBACK_TITLE: &str = "▲ Market Data (Fallback)";

/// Health of the latest accepted cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PollStatus {
    /// Primary source answered.
    Online,
    /// Primary failed, fallback produced at least one value.
    Degraded,
    /// No usable data at all.
    Offline,
}

impl fmt::Display for PollStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Degraded => write!(f, "degraded"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// Source that produced a summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SummarySource {
    Primary,
    Fallback,
}

/// Per-index display card.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum IndexCard {
    Available {
        name: String,
        symbol: String,
        price: Price,
        change: Option<f64>,
        percent: Option<f64>,
        direction: Direction,
    },
    /// Rendered as a placeholder, never as zero.
    Unavailable { name: String, symbol: String },
}

impl IndexCard {
    pub fn name(&self) -> &str {
        match self {
            Self::Available { name, .. } | Self::Unavailable { name, .. } => name,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Self::Available { symbol, .. } | Self::Unavailable { symbol, .. } => symbol,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available { .. })
    }

    pub fn percent(&self) -> Option<f64> {
        match self {
            Self::Available { percent, .. } => *percent,
            Self::Unavailable { .. } => None,
        }
    }
}

impl fmt::Display for IndexCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available {
                name,
                price,
                percent,
                direction,
                ..
            } => match percent {
                Some(pct) => write!(f, "{name}: {price} ({pct:+.2}%, {direction})"),
                None => write!(f, "{name}: {price} ({direction})"),
            },
            Self::Unavailable { name, .. } => write!(f, "{name}: --"),
        }
    }
}

/// Result of one accepted poll cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollSummary {
    pub title: String,
    pub direction: Direction,
    /// `None` renders as a placeholder.
    pub avg_percent: Option<f64>,
    pub as_of: String,
    pub source: SummarySource,
    pub status: PollStatus,
    pub cards: Vec<IndexCard>,
}

impl PollSummary {
    /// Summary of a primary snapshot. The source's own market summary is
    /// passed through when present; otherwise it is computed from the cards.
    /// A snapshot without a single priced index is offline.
    pub fn from_primary(snapshot: &PrimarySnapshot) -> Self {
        let cards: Vec<IndexCard> = snapshot
            .entries
            .iter()
            .map(|entry| match entry.price {
                Some(price) => IndexCard::Available {
                    name: entry.name.clone(),
                    symbol: entry.symbol.clone(),
                    price,
                    change: entry.fields.change,
                    percent: entry.fields.percent,
                    direction: entry
                        .direction
                        .as_deref()
                        .map(parse_direction)
                        .or_else(|| entry.fields.change.map(Direction::from_change))
                        .unwrap_or_default(),
                },
                None => IndexCard::Unavailable {
                    name: entry.name.clone(),
                    symbol: entry.symbol.clone(),
                },
            })
            .collect();

        let (title, direction, avg_percent) = match &snapshot.market_summary {
            Some(summary) if summary.title.is_some() => (
                summary.title.clone().unwrap_or_default(),
                summary
                    .direction
                    .as_deref()
                    .map(parse_direction)
                    .unwrap_or_default(),
                summary.avg_percent,
            ),
            _ => computed_summary(&cards),
        };

        let status = if cards.iter().any(IndexCard::is_available) {
            PollStatus::Online
        } else {
            PollStatus::Offline
        };

        Self {
            title,
            direction,
            avg_percent,
            as_of: snapshot.as_of.clone().unwrap_or_else(now_rfc3339),
            source: SummarySource::Primary,
            status,
            cards,
        }
    }

    /// Summary of a fallback cycle. Degraded with at least one value,
    /// offline otherwise.
    pub fn from_fallback(cards: Vec<IndexCard>) -> Self {
        let any_available = cards.iter().any(IndexCard::is_available);
        let (title, status) = if any_available {
            (FALLBACK_TITLE.to_string(), PollStatus::Degraded)
        } else {
            (UNAVAILABLE_TITLE.to_string(), PollStatus::Offline)
        };

        Self {
            title,
            direction: Direction::Neutral,
            avg_percent: None,
            as_of: now_rfc3339(),
            source: SummarySource::Fallback,
            status,
            cards,
        }
    }

    pub fn available_count(&self) -> usize {
        self.cards.iter().filter(|c| c.is_available()).count()
    }
}

/// Average percent over cards that report one; `Up` if the average is >= 0.
fn computed_summary(cards: &[IndexCard]) -> (String, Direction, Option<f64>) {
    let percents: Vec<f64> = cards.iter().filter_map(IndexCard::percent).collect();
    if percents.is_empty() {
        return (UNAVAILABLE_TITLE.to_string(), Direction::Neutral, None);
    }

    let avg = percents.iter().sum::<f64>() / percents.len() as f64;
    let avg = (avg * 100.0).round() / 100.0;
    let direction = Direction::from_change(avg);
    let title = match direction {
        Direction::Down => "▼ Market Loss",
        _ => "▲ Market Gain",
    };
    (title.to_string(), direction, Some(avg))
}

fn parse_direction(label: &str) -> Direction {
    match label.to_ascii_lowercase().as_str() {
        "up" => Direction::Up,
        "down" => Direction::Down,
        _ => Direction::Neutral,
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{PrimaryEntry, RawSummary};
    use rust_decimal_macros::dec;
    use tickwire_core::QuoteFields;

    fn entry(name: &str, symbol: &str, close: Option<f64>, percent: Option<f64>) -> PrimaryEntry {
        PrimaryEntry {
            name: name.to_string(),
            symbol: symbol.to_string(),
            price: close.and_then(|c| Price::from_f64(c).ok()),
            fields: QuoteFields {
                close,
                percent,
                ..Default::default()
            },
            direction: None,
        }
    }

    #[test]
    fn test_primary_summary_computed_from_cards() {
        let snapshot = PrimarySnapshot {
            entries: vec![
                entry("Nifty 50", "^NSEI", Some(22000.0), Some(0.5)),
                entry("Sensex", "^BSESN", Some(73000.0), Some(-1.5)),
                entry("Bank Nifty", "^NSEBANK", None, None),
            ],
            market_summary: None,
            as_of: Some("2024-05-02T15:30:00+05:30".to_string()),
        };

        let summary = PollSummary::from_primary(&snapshot);
        assert_eq!(summary.status, PollStatus::Online);
        assert_eq!(summary.avg_percent, Some(-0.5));
        assert_eq!(summary.direction, Direction::Down);
        assert_eq!(summary.title, "▼ Market Loss");
        assert_eq!(summary.available_count(), 2);
        assert!(!summary.cards[2].is_available());
        assert_eq!(summary.as_of, "2024-05-02T15:30:00+05:30");
    }

    #[test]
    fn test_primary_summary_passthrough() {
        let snapshot = PrimarySnapshot {
            entries: vec![entry("Nifty 50", "^NSEI", Some(22000.0), Some(-3.0))],
            market_summary: Some(RawSummary {
                title: Some("▲ Market Gain".to_string()),
                direction: Some("up".to_string()),
                avg_percent: Some(0.42),
            }),
            as_of: None,
        };

        let summary = PollSummary::from_primary(&snapshot);
        assert_eq!(summary.title, "▲ Market Gain");
        assert_eq!(summary.direction, Direction::Up);
        assert_eq!(summary.avg_percent, Some(0.42));
    }

    #[test]
    fn test_primary_without_percents_is_unavailable_title() {
        let snapshot = PrimarySnapshot {
            entries: vec![entry("Nifty 50", "^NSEI", None, None)],
            ..Default::default()
        };
        let summary = PollSummary::from_primary(&snapshot);
        assert_eq!(summary.title, UNAVAILABLE_TITLE);
        assert_eq!(summary.direction, Direction::Neutral);
        assert_eq!(summary.avg_percent, None);
    }

    #[test]
    fn test_primary_without_prices_is_offline() {
        let unpriced = PrimarySnapshot {
            entries: vec![entry("Nifty 50", "^NSEI", None, None)],
            ..Default::default()
        };
        let summary = PollSummary::from_primary(&unpriced);
        assert_eq!(summary.status, PollStatus::Offline);
        assert_eq!(summary.source, SummarySource::Primary);
        assert_eq!(summary.available_count(), 0);

        let empty = PollSummary::from_primary(&PrimarySnapshot::default());
        assert_eq!(empty.status, PollStatus::Offline);
        assert!(empty.cards.is_empty());
    }

    #[test]
    fn test_zero_average_counts_as_gain() {
        let snapshot = PrimarySnapshot {
            entries: vec![
                entry("A", "A", Some(1.0), Some(1.0)),
                entry("B", "B", Some(1.0), Some(-1.0)),
            ],
            ..Default::default()
        };
        let summary = PollSummary::from_primary(&snapshot);
        assert_eq!(summary.direction, Direction::Up);
        assert_eq!(summary.title, "▲ Market Gain");
    }

    #[test]
    fn test_fallback_summary_status() {
        let available = IndexCard::Available {
            name: "Nifty 50".to_string(),
            symbol: "^NSEI".to_string(),
            price: Price::new(dec!(22000)),
            change: Some(10.0),
            percent: Some(0.05),
            direction: Direction::Up,
        };
        let unavailable = IndexCard::Unavailable {
            name: "Sensex".to_string(),
            symbol: "^BSESN".to_string(),
        };

        let degraded = PollSummary::from_fallback(vec![available, unavailable.clone()]);
        assert_eq!(degraded.status, PollStatus::Degraded);
        assert_eq!(degraded.title, FALLBACK_TITLE);
        assert_eq!(degraded.direction, Direction::Neutral);
        assert_eq!(degraded.avg_percent, None);

        let offline = PollSummary::from_fallback(vec![unavailable]);
        assert_eq!(offline.status, PollStatus::Offline);
        assert_eq!(offline.title, UNAVAILABLE_TITLE);
    }

    #[test]
    fn test_card_display() {
        let card = IndexCard::Unavailable {
            name: "Sensex".to_string(),
            symbol: "^BSESN".to_string(),
        };
        assert_eq!(card.to_string(), "Sensex: --");
    }
}
