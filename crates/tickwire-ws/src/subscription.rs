//! Subscription set.
//!
//! The ordered, deduplicated set of instrument keys the tick channel keeps
//! the server subscribed to. Mutations are published through a
//! `tokio::sync::watch` channel; the tick channel resends the full set
//! whenever it observes a change. Mutations that leave the set unchanged do
//! not notify, which keeps resubscription idempotent.

use tickwire_core::InstrumentKey;
use tokio::sync::watch;
use tracing::debug;

/// Shared subscription set. Wrap in `Arc` to share between the session
/// (writer) and the tick channel (reader).
#[derive(Debug)]
pub struct SubscriptionSet {
    tx: watch::Sender<Vec<InstrumentKey>>,
}

impl Default for SubscriptionSet {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionSet {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Vec::new());
        Self { tx }
    }

    /// Create a set pre-populated with `keys` (deduplicated, order kept).
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<InstrumentKey>,
    {
        let set = Self::new();
        set.replace(keys);
        set
    }

    /// Add a key. Returns `true` if it was not already present.
    pub fn insert(&self, key: impl Into<InstrumentKey>) -> bool {
        let key = key.into();
        let added = self.tx.send_if_modified(|keys| {
            if keys.contains(&key) {
                false
            } else {
                keys.push(key.clone());
                true
            }
        });
        if added {
            debug!(key = %key, "Subscription added");
        }
        added
    }

    /// Remove a key. Returns `true` if it was present.
    pub fn remove(&self, key: &str) -> bool {
        let removed = self.tx.send_if_modified(|keys| {
            let before = keys.len();
            keys.retain(|k| k != key);
            keys.len() != before
        });
        if removed {
            debug!(key, "Subscription removed");
        }
        removed
    }

    /// Replace the whole set. Returns `true` if the contents changed.
    pub fn replace<I, S>(&self, keys: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<InstrumentKey>,
    {
        let mut next: Vec<InstrumentKey> = Vec::new();
        for key in keys {
            let key = key.into();
            if !next.contains(&key) {
                next.push(key);
            }
        }
        self.tx.send_if_modified(|keys| {
            if *keys == next {
                false
            } else {
                *keys = next;
                true
            }
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.tx.borrow().iter().any(|k| k == key)
    }

    /// Current keys, in insertion order.
    pub fn snapshot(&self) -> Vec<InstrumentKey> {
        self.tx.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }

    /// Receiver that observes every effective change.
    pub fn watch(&self) -> watch::Receiver<Vec<InstrumentKey>> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_deduplicates() {
        let set = SubscriptionSet::new();
        assert!(set.insert("A"));
        assert!(!set.insert("A"));
        assert!(set.insert("B"));
        assert_eq!(set.snapshot(), vec!["A", "B"]);
    }

    #[test]
    fn test_remove() {
        let set = SubscriptionSet::from_keys(["A", "B", "A"]);
        assert_eq!(set.len(), 2);
        assert!(set.remove("A"));
        assert!(!set.remove("A"));
        assert_eq!(set.snapshot(), vec!["B"]);
    }

    #[tokio::test]
    async fn test_effective_change_notifies() {
        let set = SubscriptionSet::new();
        let mut rx = set.watch();

        set.insert("A");
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), vec!["A"]);
    }

    #[tokio::test]
    async fn test_noop_mutations_do_not_notify() {
        let set = SubscriptionSet::from_keys(["A", "B"]);
        let mut rx = set.watch();
        rx.borrow_and_update();

        assert!(!set.insert("A"));
        assert!(!set.remove("Z"));
        assert!(!set.replace(["A", "B", "B"]));
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_replace_changes_contents() {
        let set = SubscriptionSet::from_keys(["A"]);
        assert!(set.replace(["B", "C"]));
        assert!(!set.contains("A"));
        assert!(set.contains("C"));
    }
}
