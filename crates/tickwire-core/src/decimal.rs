//! Precision-safe decimal price type.
//!
//! Feeds deliver prices as JSON floats. They are converted once at the
//! boundary so that direction comparisons in the quote store are exact.

use crate::error::{CoreError, Result};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Price with exact decimal precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(pub Decimal);

impl Price {
    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Convert a feed float into a price.
    ///
    /// NaN and infinities are rejected rather than mapped to zero, since a
    /// zero price would flip the direction of the next tick.
    pub fn from_f64(value: f64) -> Result<Self> {
        if !value.is_finite() {
            return Err(CoreError::InvalidPrice(value.to_string()));
        }
        Decimal::from_f64(value)
            .map(|d| Self(d.normalize()))
            .ok_or_else(|| CoreError::InvalidPrice(value.to_string()))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_from_f64_exact_for_feed_values() {
        assert_eq!(Price::from_f64(3521.45).unwrap(), Price::new(dec!(3521.45)));
        assert_eq!(Price::from_f64(100.0).unwrap(), Price::new(dec!(100)));
    }

    #[test]
    fn test_from_f64_rejects_non_finite() {
        assert!(Price::from_f64(f64::NAN).is_err());
        assert!(Price::from_f64(f64::INFINITY).is_err());
    }

    #[test]
    fn test_ordering_ignores_trailing_zeros() {
        let a = Price::new(dec!(95.10));
        let b = Price::new(dec!(95.1));
        assert!(a <= b && b <= a);
        assert!(Price::new(dec!(95)) < b);
    }
}
