//! The `GroupStoreBackend` trait and the `GroupStore` wrapper around it.

use std::sync::Arc;

use serde_json::Value;

use crate::error::StoreError;

/// A synchronous, cloneable key-value backend over JSON values.
///
/// Implementations are expected to be cheap to `Clone` (an `Arc` around
/// shared state), matching `lockframe_server::storage::Storage`.
pub trait GroupStoreBackend: Clone + Send + Sync {
    /// Fetch the value stored at `key`, if any.
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    /// Store `value` at `key`, replacing any existing value.
    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
    /// Remove the value at `key`, if any.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
    /// Remove every key this backend holds.
    fn clear(&self) -> Result<(), StoreError>;
    /// List every key currently stored.
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

/// A keyed, optionally-prefixed view over a [`GroupStoreBackend`], with an
/// optional update-notification callback fired after every `set`/`remove`.
#[derive(Clone)]
pub struct GroupStore<B: GroupStoreBackend> {
    backend: B,
    prefix: Option<String>,
    on_update: Option<Arc<dyn Fn(&str) + Send + Sync>>,
}

impl<B: GroupStoreBackend> GroupStore<B> {
    /// Build a store with no key prefix.
    pub fn new(backend: B) -> Self {
        Self { backend, prefix: None, on_update: None }
    }

    /// Build a store where every key is namespaced under `prefix`.
    pub fn with_prefix(backend: B, prefix: impl Into<String>) -> Self {
        Self { backend, prefix: Some(prefix.into()), on_update: None }
    }

    /// Register a callback invoked with the unprefixed key after every
    /// successful `set` or `remove`.
    pub fn set_on_update(&mut self, callback: impl Fn(&str) + Send + Sync + 'static) {
        self.on_update = Some(Arc::new(callback));
    }

    fn full_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{key}"),
            None => key.to_owned(),
        }
    }

    /// Fetch the value stored at `key`, if any.
    pub fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        self.backend.get(&self.full_key(key))
    }

    /// Store `value` at `key`, replacing any existing value, then notify.
    pub fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        self.backend.set(&self.full_key(key), value)?;
        tracing::debug!(key, "group store upsert");
        if let Some(cb) = &self.on_update {
            cb(key);
        }
        Ok(())
    }

    /// Remove the value at `key`, if any, then notify.
    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        self.backend.remove(&self.full_key(key))?;
        tracing::debug!(key, "group store remove");
        if let Some(cb) = &self.on_update {
            cb(key);
        }
        Ok(())
    }

    /// Remove every key under this store's prefix.
    pub fn clear(&self) -> Result<(), StoreError> {
        for key in self.keys()? {
            self.backend.remove(&self.full_key(&key))?;
        }
        Ok(())
    }

    /// List every key under this store's prefix, with the prefix stripped.
    pub fn keys(&self) -> Result<Vec<String>, StoreError> {
        let raw = self.backend.keys()?;
        Ok(match &self.prefix {
            Some(prefix) => {
                let needle = format!("{prefix}:");
                raw.into_iter().filter_map(|k| k.strip_prefix(&needle).map(str::to_owned)).collect()
            }
            None => raw,
        })
    }

    /// Whether `key` currently has a value.
    pub fn has(&self, key: &str) -> Result<bool, StoreError> {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        Ok(self.backend.get(&self.full_key(key))?.is_some())
    }

    /// Count the keys under this store's prefix.
    pub fn count(&self) -> Result<usize, StoreError> {
        Ok(self.keys()?.len())
    }
}
