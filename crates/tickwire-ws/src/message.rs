//! Client-to-server wire messages.

use serde::{Deserialize, Serialize};
use tickwire_core::InstrumentKey;

/// Full-set subscription request: `{"subscribe": [key, ...]}`.
///
/// Always carries the complete current set, never a diff, so that one
/// delivered message recovers from any number of missed ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub subscribe: Vec<InstrumentKey>,
}

impl SubscribeRequest {
    pub fn new(keys: Vec<InstrumentKey>) -> Self {
        Self { subscribe: keys }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_wire_format() {
        let req = SubscribeRequest::new(vec!["NSE_EQ|A".to_string(), "NSE_EQ|B".to_string()]);
        assert_eq!(req.to_json().unwrap(), r#"{"subscribe":["NSE_EQ|A","NSE_EQ|B"]}"#);
    }

    #[test]
    fn test_empty_set_is_still_sent_as_array() {
        let req = SubscribeRequest::new(Vec::new());
        assert_eq!(req.to_json().unwrap(), r#"{"subscribe":[]}"#);
    }
}
