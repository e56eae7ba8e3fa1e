//! Per-tab key/value state shared by the client managers
//!
//! The transport persists its credential rotation index here, the router its
//! redirect restoration path, the session store its session rows and the
//! spool its sealed entries. Values are plain strings so every backing store
//! stays trivial to implement.

use std::collections::HashMap;
use std::sync::Mutex;

/// A small string keyed store for per-tab state
pub trait StateStore: Send + Sync {
    /// Get the value stored under a key if one exists
    ///
    /// # Arguments
    ///
    /// * `key` - The key to read
    fn get(&self, key: &str) -> Option<String>;

    /// Set the value stored under a key
    ///
    /// # Arguments
    ///
    /// * `key` - The key to write
    /// * `value` - The value to store
    fn set(&self, key: &str, value: &str);

    /// Remove a key returning its prior value if one existed
    ///
    /// # Arguments
    ///
    /// * `key` - The key to remove
    fn remove(&self, key: &str) -> Option<String>;
}

/// An in memory [`StateStore`]
///
/// This is the transient per-tab store; it holds nothing across restarts.
#[derive(Default)]
pub struct MemoryStateStore {
    /// The values in this store
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStateStore {
    /// Create a new empty in memory state store
    #[must_use]
    pub fn new() -> Self {
        MemoryStateStore::default()
    }
}

impl StateStore for MemoryStateStore {
    /// Get the value stored under a key if one exists
    fn get(&self, key: &str) -> Option<String> {
        self.map.lock().unwrap().get(key).cloned()
    }

    /// Set the value stored under a key
    fn set(&self, key: &str, value: &str) {
        self.map
            .lock()
            .unwrap()
            .insert(key.to_owned(), value.to_owned());
    }

    /// Remove a key returning its prior value if one existed
    fn remove(&self, key: &str) -> Option<String> {
        self.map.lock().unwrap().remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove() {
        let store = MemoryStateStore::new();
        // nothing is set yet
        assert_eq!(store.get("redirect_path"), None);
        // set and read a value back
        store.set("redirect_path", "/manage/E1");
        assert_eq!(store.get("redirect_path"), Some("/manage/E1".to_owned()));
        // removing hands back the prior value exactly once
        assert_eq!(store.remove("redirect_path"), Some("/manage/E1".to_owned()));
        assert_eq!(store.remove("redirect_path"), None);
    }
}
