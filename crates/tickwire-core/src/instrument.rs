//! Instrument catalog entries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable instrument identifier as used by the push channel
/// (e.g. `NSE_EQ|INE467B01029`).
///
/// The REST side frequently keys the same instrument by bare symbol, so
/// keys are plain strings and matched loosely by the quote store.
pub type InstrumentKey = String;

/// A tradable instrument from the static catalog.
///
/// Accepts both the camel-case wire form and the backend's snake-case form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    /// Unique, stable identifier.
    #[serde(alias = "instrument_key")]
    pub key: InstrumentKey,
    /// Trading symbol (e.g. "TCS").
    #[serde(default)]
    pub symbol: String,
    /// Full company name.
    #[serde(default)]
    pub name: String,
    /// Optional short display name.
    #[serde(
        rename = "shortName",
        alias = "short_name",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub short_name: Option<String>,
}

impl Instrument {
    pub fn new(key: impl Into<String>, symbol: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            symbol: symbol.into(),
            name: name.into(),
            short_name: None,
        }
    }

    pub fn with_short_name(mut self, short_name: impl Into<String>) -> Self {
        self.short_name = Some(short_name.into());
        self
    }

    /// Whether two entries refer to the same symbol (case-insensitive).
    pub fn same_symbol(&self, other: &Instrument) -> bool {
        self.symbol.eq_ignore_ascii_case(&other.symbol)
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.symbol, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_backend_form() {
        let json = r#"{
            "instrument_key": "NSE_EQ|INE467B01029",
            "symbol": "TCS",
            "name": "TATA CONSULTANCY SERV LT",
            "short_name": "Tata Consultancy",
            "exchange": "NSE"
        }"#;
        let inst: Instrument = serde_json::from_str(json).unwrap();
        assert_eq!(inst.key, "NSE_EQ|INE467B01029");
        assert_eq!(inst.short_name.as_deref(), Some("Tata Consultancy"));
    }

    #[test]
    fn test_deserialize_wire_form_without_short_name() {
        let json = r#"{"key": "NSE_EQ|X", "symbol": "INFY", "name": "Infosys"}"#;
        let inst: Instrument = serde_json::from_str(json).unwrap();
        assert_eq!(inst.symbol, "INFY");
        assert!(inst.short_name.is_none());
    }

    #[test]
    fn test_serialize_uses_wire_names() {
        let inst = Instrument::new("K", "TCS", "Tata").with_short_name("TCS Ltd");
        let value = serde_json::to_value(&inst).unwrap();
        assert_eq!(value["key"], "K");
        assert_eq!(value["shortName"], "TCS Ltd");
    }

    #[test]
    fn test_same_symbol_ignores_case() {
        let a = Instrument::new("A", "tcs", "x");
        let b = Instrument::new("B", "TCS", "y");
        assert!(a.same_symbol(&b));
    }
}
