//! In-memory `GroupStoreBackend`, for tests and ephemeral clients.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use serde_json::Value;

use crate::{backend::GroupStoreBackend, error::StoreError};

/// `HashMap`-backed store. Cheap to `Clone`: every clone shares the same
/// underlying map via `Arc<Mutex<_>>`, matching
/// `lockframe_server::storage::memory::MemoryStorage`.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<HashMap<String, Value>>>,
}

impl MemoryBackend {
    /// Create a new, empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl GroupStoreBackend for MemoryBackend {
    #[allow(clippy::expect_used)]
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.inner.lock().expect("mutex poisoned").get(key).cloned())
    }

    #[allow(clippy::expect_used)]
    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.inner.lock().expect("mutex poisoned").insert(key.to_owned(), value);
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.inner.lock().expect("mutex poisoned").remove(key);
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn clear(&self) -> Result<(), StoreError> {
        self.inner.lock().expect("mutex poisoned").clear();
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.inner.lock().expect("mutex poisoned").keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn set_then_get() {
        let backend = MemoryBackend::new();
        backend.set("a", json!({"epoch": 3})).unwrap();
        assert_eq!(backend.get("a").unwrap(), Some(json!({"epoch": 3})));
    }

    #[test]
    fn missing_key_is_none() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.get("missing").unwrap(), None);
    }

    #[test]
    fn clone_shares_state() {
        let backend = MemoryBackend::new();
        let clone = backend.clone();
        backend.set("shared", json!(1)).unwrap();
        assert_eq!(clone.get("shared").unwrap(), Some(json!(1)));
    }

    #[test]
    fn remove_and_clear() {
        let backend = MemoryBackend::new();
        backend.set("a", json!(1)).unwrap();
        backend.set("b", json!(2)).unwrap();
        backend.remove("a").unwrap();
        assert_eq!(backend.keys().unwrap(), vec!["b".to_owned()]);

        backend.clear().unwrap();
        assert!(backend.keys().unwrap().is_empty());
    }
}
