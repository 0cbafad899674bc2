//! Keyed store for raw key-package bytes, with LRU eviction at capacity.
//!
//! Grounded on `lockframe_server::key_package_registry::KeyPackageRegistry`:
//! same `Arc<Mutex<_>>`-sharing `Clone` design and LRU-eviction-at-capacity
//! shape, but keyed by the hex-encoded SHA-256 hash of the published key
//! package rather than by `user_id`, and without `take`'s consume-on-fetch
//! semantics — a key package may legitimately be fetched by more than one
//! prospective group member before it is published again.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

/// Default maximum number of key packages to retain.
pub const DEFAULT_MAX_CAPACITY: usize = 1000;

/// Outcome of a [`KeyPackageStore::store`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// Stored without evicting anything.
    Stored,
    /// Stored, and the least-recently-stored entry was evicted to make room.
    Evicted,
}

/// A raw key package plus the metadata needed to serve and expire it.
#[derive(Debug, Clone)]
pub struct KeyPackageEntry {
    /// TLS-serialized MLS `KeyPackage`.
    pub bytes: Vec<u8>,
    /// Unix timestamp (seconds) the entry was stored.
    pub stored_at_secs: u64,
}

/// In-memory registry of published key packages, keyed by the hex SHA-256
/// hash of the package. Cheap to `Clone`: clones share the same storage.
#[derive(Clone)]
pub struct KeyPackageStore {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    entries: HashMap<String, KeyPackageEntry>,
    lru_order: VecDeque<String>,
    max_capacity: usize,
}

impl Default for KeyPackageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyPackageStore {
    /// Create an empty store with [`DEFAULT_MAX_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_CAPACITY)
    }

    /// Create an empty store with the given capacity.
    #[must_use]
    pub fn with_capacity(max_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                lru_order: VecDeque::new(),
                max_capacity,
            })),
        }
    }

    /// Store or replace the entry at `hash_ref`, evicting the oldest entry
    /// if the store is at capacity and `hash_ref` is new.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn store(&self, hash_ref: String, entry: KeyPackageEntry) -> StoreOutcome {
        let mut inner = self.inner.lock().expect("KeyPackageStore mutex poisoned");

        let is_new = !inner.entries.contains_key(&hash_ref);
        if !is_new {
            inner.lru_order.retain(|k| k != &hash_ref);
        }

        let outcome = if is_new && inner.entries.len() >= inner.max_capacity {
            if let Some(oldest) = inner.lru_order.pop_front() {
                inner.entries.remove(&oldest);
            }
            StoreOutcome::Evicted
        } else {
            StoreOutcome::Stored
        };

        inner.entries.insert(hash_ref.clone(), entry);
        inner.lru_order.push_back(hash_ref);
        outcome
    }

    /// Fetch the entry at `hash_ref`, without removing it.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn get(&self, hash_ref: &str) -> Option<KeyPackageEntry> {
        self.inner.lock().expect("KeyPackageStore mutex poisoned").entries.get(hash_ref).cloned()
    }

    /// Remove the entry at `hash_ref`, e.g. on explicit revocation.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn remove(&self, hash_ref: &str) {
        let mut inner = self.inner.lock().expect("KeyPackageStore mutex poisoned");
        inner.entries.remove(hash_ref);
        inner.lru_order.retain(|k| k != hash_ref);
    }

    /// Number of entries currently stored.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn count(&self) -> usize {
        self.inner.lock().expect("KeyPackageStore mutex poisoned").entries.len()
    }
}
