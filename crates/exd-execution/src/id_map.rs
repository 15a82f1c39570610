//! Local ↔ broker order-id mapping.
//!
//! Cancel and replace must target the **broker** id — sending the local id
//! to a live broker cancels the wrong order or 404s. Fills arrive keyed by
//! broker id and must be attributed back to the local order. This map is
//! the single translation point between the two identity spaces.
//!
//! Invariant: for every live mapping, `get_local(get_broker(l)) == l`.
//! `add` maintains this under overwrite by evicting the stale reverse
//! entry; `remove` clears both directions.

use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
struct Maps {
    local_to_broker: HashMap<String, String>,
    broker_to_local: HashMap<String, String>,
}

/// Thread-safe bidirectional id map.
#[derive(Debug, Default)]
pub struct OrderIdMap {
    inner: RwLock<Maps>,
}

impl OrderIdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mapping. Re-registering a local id (idempotent retry the
    /// broker accepted again) overwrites the previous broker id.
    pub fn add(&self, local: &str, broker: &str) {
        let mut maps = self.inner.write().expect("id map lock poisoned");
        if let Some(old_broker) = maps.local_to_broker.insert(local.to_string(), broker.to_string())
        {
            if old_broker != broker {
                maps.broker_to_local.remove(&old_broker);
            }
        }
        maps.broker_to_local
            .insert(broker.to_string(), local.to_string());
    }

    pub fn get_broker(&self, local: &str) -> Option<String> {
        let maps = self.inner.read().expect("id map lock poisoned");
        maps.local_to_broker.get(local).cloned()
    }

    pub fn get_local(&self, broker: &str) -> Option<String> {
        let maps = self.inner.read().expect("id map lock poisoned");
        maps.broker_to_local.get(broker).cloned()
    }

    /// Drop both directions of a mapping. Unknown local ids are ignored.
    pub fn remove(&self, local: &str) {
        let mut maps = self.inner.write().expect("id map lock poisoned");
        if let Some(broker) = maps.local_to_broker.remove(local) {
            maps.broker_to_local.remove(&broker);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("id map lock poisoned").local_to_broker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_lookup_both_directions() {
        let map = OrderIdMap::new();
        map.add("ORD_1", "BRK_1");

        assert_eq!(map.get_broker("ORD_1").as_deref(), Some("BRK_1"));
        assert_eq!(map.get_local("BRK_1").as_deref(), Some("ORD_1"));
    }

    #[test]
    fn remove_clears_both_directions() {
        let map = OrderIdMap::new();
        map.add("ORD_1", "BRK_1");
        map.remove("ORD_1");

        assert!(map.get_broker("ORD_1").is_none());
        assert!(map.get_local("BRK_1").is_none());
        assert!(map.is_empty());
    }

    #[test]
    fn overwrite_evicts_stale_reverse_entry() {
        let map = OrderIdMap::new();
        map.add("ORD_1", "BRK_1");
        map.add("ORD_1", "BRK_2");

        assert_eq!(map.get_broker("ORD_1").as_deref(), Some("BRK_2"));
        assert_eq!(map.get_local("BRK_2").as_deref(), Some("ORD_1"));
        assert!(map.get_local("BRK_1").is_none(), "stale reverse mapping");
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn round_trip_invariant_holds_for_live_mappings() {
        let map = OrderIdMap::new();
        map.add("ORD_1", "BRK_1");
        map.add("ORD_2", "BRK_2");

        for local in ["ORD_1", "ORD_2"] {
            let broker = map.get_broker(local).unwrap();
            assert_eq!(map.get_local(&broker).as_deref(), Some(local));
        }
    }

    #[test]
    fn remove_unknown_local_is_a_noop() {
        let map = OrderIdMap::new();
        map.add("ORD_1", "BRK_1");
        map.remove("ORD_GHOST");
        assert_eq!(map.len(), 1);
    }
}
