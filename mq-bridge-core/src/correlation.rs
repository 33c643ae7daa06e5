use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};
use tracing::warn;

#[derive(Debug, Clone)]
struct CorrelationEntry {
    id: String,
    inserted_at: Instant,
}

/// Pending command correlation ids, one FIFO per command key.
///
/// Every access first drops entries older than the configured maximum age,
/// so a command whose response never arrives cannot claim a later response.
/// All operations are atomic against each other; the lock is never held
/// across I/O.
#[derive(Clone)]
pub struct CorrelationStore {
    max_age: Duration,
    inner: Arc<Mutex<HashMap<String, VecDeque<CorrelationEntry>>>>,
}

impl CorrelationStore {
    pub fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Append a correlation id to the tail of the key's FIFO.
    pub fn store(&self, key: &str, correlation_id: &str) {
        let mut map = self.inner.lock().unwrap();
        Self::evict_expired(&mut map, key, self.max_age);
        map.entry(key.to_string())
            .or_default()
            .push_back(CorrelationEntry {
                id: correlation_id.to_string(),
                inserted_at: Instant::now(),
            });
    }

    /// Remove all entries with the given id, e.g. after a failed publish.
    pub fn remove(&self, key: &str, correlation_id: &str) {
        let mut map = self.inner.lock().unwrap();
        Self::evict_expired(&mut map, key, self.max_age);
        if let Some(list) = map.get_mut(key) {
            list.retain(|entry| entry.id != correlation_id);
            if list.is_empty() {
                map.remove(key);
            }
        }
    }

    /// Take the oldest pending id for the key, if any.
    pub fn pop(&self, key: &str) -> Option<String> {
        let mut map = self.inner.lock().unwrap();
        Self::evict_expired(&mut map, key, self.max_age);
        let list = map.get_mut(key)?;
        let entry = list.pop_front();
        if list.is_empty() {
            map.remove(key);
        }
        entry.map(|e| e.id)
    }

    /// Number of pending entries for a key after eviction.
    pub fn pending(&self, key: &str) -> usize {
        let mut map = self.inner.lock().unwrap();
        Self::evict_expired(&mut map, key, self.max_age);
        map.get(key).map(|list| list.len()).unwrap_or(0)
    }

    fn evict_expired(
        map: &mut HashMap<String, VecDeque<CorrelationEntry>>,
        key: &str,
        max_age: Duration,
    ) {
        let Some(list) = map.get_mut(key) else {
            return;
        };
        list.retain(|entry| {
            let expired = entry.inserted_at.elapsed() > max_age;
            if expired {
                warn!(
                    "drop correlation id {} because it is older than the configured maximum age",
                    entry.id
                );
            }
            !expired
        });
        if list.is_empty() {
            map.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let store = CorrelationStore::new(Duration::from_secs(60));
        store.store("k", "c1");
        store.store("k", "c2");
        store.store("k", "c3");
        assert_eq!(store.pop("k"), Some("c1".to_string()));
        assert_eq!(store.pop("k"), Some("c2".to_string()));
        assert_eq!(store.pop("k"), Some("c3".to_string()));
        assert_eq!(store.pop("k"), None);
    }

    #[test]
    fn test_keys_are_independent() {
        let store = CorrelationStore::new(Duration::from_secs(60));
        store.store("a", "c1");
        store.store("b", "c2");
        assert_eq!(store.pop("b"), Some("c2".to_string()));
        assert_eq!(store.pop("a"), Some("c1".to_string()));
    }

    #[test]
    fn test_store_then_remove_is_idempotent() {
        let store = CorrelationStore::new(Duration::from_secs(60));
        store.store("k", "c1");
        store.store("k", "c2");
        store.remove("k", "c2");
        assert_eq!(store.pending("k"), 1);
        assert_eq!(store.pop("k"), Some("c1".to_string()));
        assert_eq!(store.pop("k"), None);
    }

    #[test]
    fn test_remove_unknown_id_is_noop() {
        let store = CorrelationStore::new(Duration::from_secs(60));
        store.store("k", "c1");
        store.remove("k", "other");
        assert_eq!(store.pop("k"), Some("c1".to_string()));
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let store = CorrelationStore::new(Duration::from_millis(20));
        store.store("k", "c1");
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(store.pop("k"), None);

        // a fresh entry after expiry is matched normally
        store.store("k", "c2");
        assert_eq!(store.pop("k"), Some("c2".to_string()));
    }

    #[test]
    fn test_mixed_expiry_keeps_fresh_tail() {
        let store = CorrelationStore::new(Duration::from_millis(50));
        store.store("k", "c1");
        std::thread::sleep(Duration::from_millis(60));
        store.store("k", "c2");
        assert_eq!(store.pop("k"), Some("c2".to_string()));
        assert_eq!(store.pop("k"), None);
    }
}
