//! Registry of live per-key value channels.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::watch;
use tracing::warn;

/// One replay-latest channel per observed cache key.
///
/// Slots are created on first subscription and dropped once no receiver
/// is left, so the map only holds keys somebody is watching.
#[derive(Debug, Default)]
pub(crate) struct SlotRegistry {
    slots: Mutex<HashMap<String, watch::Sender<Option<Value>>>>,
}

impl SlotRegistry {
    pub(crate) fn subscribe(&self, key: &str) -> watch::Receiver<Option<Value>> {
        let mut slots = match self.slots.lock() {
            Ok(slots) => slots,
            Err(poisoned) => {
                warn!(key = key, "Slot registry lock poisoned, recovering");
                poisoned.into_inner()
            }
        };
        slots.retain(|_, tx| tx.receiver_count() > 0);
        slots
            .entry(key.to_string())
            .or_insert_with(|| watch::channel(None).0)
            .subscribe()
    }

    /// Push a new value to the slot for `key`, if anyone is watching it.
    pub(crate) fn publish(&self, key: &str, value: Option<Value>) {
        let mut slots = match self.slots.lock() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(tx) = slots.get(key) {
            if tx.receiver_count() == 0 {
                slots.remove(key);
            } else {
                tx.send_replace(value);
            }
        }
    }

    /// Mark every live slot as absent.
    pub(crate) fn publish_all_absent(&self) {
        let mut slots = match self.slots.lock() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        };
        slots.retain(|_, tx| tx.receiver_count() > 0);
        for tx in slots.values() {
            tx.send_replace(None);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_publish_reaches_subscriber() {
        let registry = SlotRegistry::default();
        let mut rx = registry.subscribe("terms");
        registry.publish("terms", Some(json!([1, 2])));
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), Some(json!([1, 2])));
    }

    #[test]
    fn test_publish_without_subscriber_creates_nothing() {
        let registry = SlotRegistry::default();
        registry.publish("terms", Some(json!(1)));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let registry = SlotRegistry::default();
        let rx = registry.subscribe("a");
        drop(rx);
        let _other = registry.subscribe("b");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_publish_all_absent() {
        let registry = SlotRegistry::default();
        let mut a = registry.subscribe("a");
        let mut b = registry.subscribe("b");
        registry.publish("a", Some(json!(1)));
        registry.publish("b", Some(json!(2)));
        registry.publish_all_absent();
        assert_eq!(*a.borrow_and_update(), None);
        assert_eq!(*b.borrow_and_update(), None);
    }
}
