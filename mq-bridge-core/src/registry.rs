use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

/// Mutexed string-keyed map shared between the reconciler and the inbound
/// handlers.
///
/// `with` runs a closure under the internal lock, so compound read-modify
/// operations stay race-free; none of the operations are ever held across
/// I/O.
#[derive(Clone)]
pub struct SharedRegistry<T> {
    inner: Arc<Mutex<HashMap<String, T>>>,
}

impl<T: Clone> SharedRegistry<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut HashMap<String, T>) -> R) -> R {
        let mut map = self.inner.lock().unwrap();
        f(&mut map)
    }

    pub fn set(&self, key: impl Into<String>, value: T) {
        let key = key.into();
        self.with(|map| {
            map.insert(key, value);
        })
    }

    pub fn remove(&self, key: &str) {
        self.with(|map| {
            map.remove(key);
        })
    }

    pub fn get(&self, key: &str) -> Option<T> {
        self.with(|map| map.get(key).cloned())
    }

    pub fn keys(&self) -> Vec<String> {
        self.with(|map| map.keys().cloned().collect())
    }

    pub fn get_all(&self) -> HashMap<String, T> {
        self.with(|map| map.clone())
    }
}

impl<T: Clone> Default for SharedRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
