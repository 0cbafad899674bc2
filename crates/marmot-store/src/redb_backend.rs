//! Durable `GroupStoreBackend` backed by `redb`.
//!
//! Uses a single table keyed by the store's (already-prefixed) string key,
//! with values stored as JSON bytes. Grounded on
//! `lockframe_server::storage::redb::RedbStorage`'s use of `redb`'s ACID
//! transactions, simplified from that teacher's four domain-specific tables
//! down to one generic key/value table since `GroupStoreBackend` has no
//! notion of rooms or frames.

use std::{path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition};
use serde_json::Value;

use crate::{backend::GroupStoreBackend, error::StoreError};

const ENTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("group_store_entries");

/// Durable storage backed by `redb`. Clone is cheap (`Arc<Database>`).
#[derive(Clone)]
pub struct RedbBackend {
    db: Arc<Database>,
}

impl RedbBackend {
    /// Open or create a `redb` database at `path`, creating the entries
    /// table if it does not already exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the database cannot be opened or
    /// the table cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref()).map_err(|e| StoreError::Backend(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StoreError::Backend(e.to_string()))?;
        {
            let _ = txn.open_table(ENTRIES).map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Backend(e.to_string()))?;

        tracing::debug!(path = %path.as_ref().display(), "opened redb group store");
        Ok(Self { db: Arc::new(db) })
    }
}

impl GroupStoreBackend for RedbBackend {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Backend(e.to_string()))?;
        let table = txn.open_table(ENTRIES).map_err(|e| StoreError::Backend(e.to_string()))?;
        match table.get(key).map_err(|e| StoreError::Backend(e.to_string()))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes.value())?)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(&value)?;
        let txn = self.db.begin_write().map_err(|e| StoreError::Backend(e.to_string()))?;
        {
            let mut table = txn.open_table(ENTRIES).map_err(|e| StoreError::Backend(e.to_string()))?;
            table.insert(key, bytes.as_slice()).map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let txn = self.db.begin_write().map_err(|e| StoreError::Backend(e.to_string()))?;
        {
            let mut table = txn.open_table(ENTRIES).map_err(|e| StoreError::Backend(e.to_string()))?;
            table.remove(key).map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let keys = self.keys()?;
        let txn = self.db.begin_write().map_err(|e| StoreError::Backend(e.to_string()))?;
        {
            let mut table = txn.open_table(ENTRIES).map_err(|e| StoreError::Backend(e.to_string()))?;
            for key in &keys {
                table.remove(key.as_str()).map_err(|e| StoreError::Backend(e.to_string()))?;
            }
        }
        txn.commit().map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Backend(e.to_string()))?;
        let table = txn.open_table(ENTRIES).map_err(|e| StoreError::Backend(e.to_string()))?;
        let mut out = Vec::new();
        for entry in table.iter().map_err(|e| StoreError::Backend(e.to_string()))? {
            let (key, _) = entry.map_err(|e| StoreError::Backend(e.to_string()))?;
            out.push(key.value().to_owned());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let backend = RedbBackend::open(dir.path().join("store.redb")).unwrap();

        backend.set("key", json!({"epoch": 7, "members": [1, 2, 3]})).unwrap();
        assert_eq!(backend.get("key").unwrap(), Some(json!({"epoch": 7, "members": [1, 2, 3]})));

        backend.remove("key").unwrap();
        assert_eq!(backend.get("key").unwrap(), None);
    }

    #[test]
    fn survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.redb");

        {
            let backend = RedbBackend::open(&path).unwrap();
            backend.set("persisted", json!(42)).unwrap();
        }

        let reopened = RedbBackend::open(&path).unwrap();
        assert_eq!(reopened.get("persisted").unwrap(), Some(json!(42)));
    }

    #[test]
    fn keys_and_clear() {
        let dir = tempdir().unwrap();
        let backend = RedbBackend::open(dir.path().join("store.redb")).unwrap();
        backend.set("a", json!(1)).unwrap();
        backend.set("b", json!(2)).unwrap();

        let mut keys = backend.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a".to_owned(), "b".to_owned()]);

        backend.clear().unwrap();
        assert!(backend.keys().unwrap().is_empty());
    }
}
