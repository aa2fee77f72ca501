//! A reader/writer-locked map from string keys to arbitrary values
//!
//! Readers run concurrently, writers are exclusive. Iteration is done either
//! through `get_copy` (stable snapshot) or `read` (extended read lock held for
//! the lifetime of the returned guard).

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard};

/// RwLock-guarded string-keyed map.
pub struct LockedMap<V> {
    inner: RwLock<HashMap<String, V>>,
}

impl<V: Clone> LockedMap<V> {
    /// Create an empty map
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Create a map seeded with initial entries
    pub fn with_initial(initial: HashMap<String, V>) -> Self {
        Self {
            inner: RwLock::new(initial),
        }
    }

    /// Get a value from the map
    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.read().unwrap().get(key).cloned()
    }

    /// Check whether a key exists in the map
    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().unwrap().contains_key(key)
    }

    /// Put a key, value into the map, returning the previous value
    pub fn put(&self, key: impl Into<String>, value: V) -> Option<V> {
        self.inner.write().unwrap().insert(key.into(), value)
    }

    /// Remove a key from the map, returning the removed value
    pub fn delete(&self, key: &str) -> Option<V> {
        self.inner.write().unwrap().remove(key)
    }

    /// List all keys in the map
    pub fn keys(&self) -> Vec<String> {
        self.inner.read().unwrap().keys().cloned().collect()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().is_empty()
    }

    /// Remove all entries
    pub fn clear(&self) {
        self.inner.write().unwrap().clear();
    }

    /// Copy the map into a plain HashMap snapshot
    pub fn get_copy(&self) -> HashMap<String, V> {
        self.inner.read().unwrap().clone()
    }

    /// Take an extended read lock over the map for iteration.
    ///
    /// The lock is released when the guard is dropped, on every exit path.
    pub fn read(&self) -> RwLockReadGuard<'_, HashMap<String, V>> {
        self.inner.read().unwrap()
    }
}

impl<V: Clone + std::fmt::Debug> LockedMap<V> {
    /// Dump the map as a string, for diagnostics
    pub fn dump(&self) -> String {
        let guard = self.read();
        let mut out = String::new();
        for (k, v) in guard.iter() {
            out.push_str(&format!("(key: {}, value: {:?})\n", k, v));
        }
        out
    }
}

impl<V: Clone> Default for LockedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}
