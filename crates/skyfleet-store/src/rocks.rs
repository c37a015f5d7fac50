//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::path::Path;
use std::sync::Arc;

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::Store;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::debug!("Opened metadata store");
        Ok(Self { db: Arc::new(db) })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }
}

impl Store for RocksStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let cf = self.cf(cf::METADATA)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let cf = self.cf(cf::METADATA)?;
        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn delete(&self, key: &str) -> Result<()> {
        let cf = self.cf(cf::METADATA)?;
        if self.get(key)?.is_none() {
            return Err(StoreError::NotFound(key.to_string()));
        }
        self.db
            .delete_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn list(&self, prefix: &str, recursive: bool) -> Result<Vec<(String, Vec<u8>)>> {
        let cf = self.cf(cf::METADATA)?;
        let start = format!("{prefix}/");

        let mut entries = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(start.as_bytes(), Direction::Forward));

        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            // Stop if we're past the prefix
            if !key.starts_with(start.as_bytes()) {
                break;
            }

            let key = String::from_utf8(key.into_vec())
                .map_err(|e| StoreError::Database(format!("non-UTF-8 key: {e}")))?;
            if keys::is_under(prefix, &key, recursive) {
                entries.push((key, value.into_vec()));
            }
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    #[test]
    fn raw_crud() {
        let (store, _dir) = create_test_store();

        store.put("/ns/a/mcis/f", b"one").unwrap();
        assert_eq!(store.get("/ns/a/mcis/f").unwrap().as_deref(), Some(&b"one"[..]));

        store.put("/ns/a/mcis/f", b"two").unwrap();
        assert_eq!(store.get("/ns/a/mcis/f").unwrap().as_deref(), Some(&b"two"[..]));

        store.delete("/ns/a/mcis/f").unwrap();
        assert!(store.get("/ns/a/mcis/f").unwrap().is_none());
        assert!(matches!(
            store.delete("/ns/a/mcis/f"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn list_by_prefix() {
        let (store, _dir) = create_test_store();
        store.put("/ns/a/mcis/f1", b"").unwrap();
        store.put("/ns/a/mcis/f1/vm/v1", b"").unwrap();
        store.put("/ns/a/mcis/f1/vm/v2", b"").unwrap();
        store.put("/ns/a/mcis/f2", b"").unwrap();
        store.put("/ns/a/mcis/f10/vm/v1", b"").unwrap();
        store.put("/ns/b/mcis/f1", b"").unwrap();

        let fleets: Vec<_> = store
            .list("/ns/a/mcis", false)
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(fleets, vec!["/ns/a/mcis/f1", "/ns/a/mcis/f2"]);

        let vms = store.list("/ns/a/mcis/f1/vm", false).unwrap();
        assert_eq!(vms.len(), 2);

        let everything = store.list("/ns/a/mcis", true).unwrap();
        assert_eq!(everything.len(), 5);
    }

    #[test]
    fn survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = RocksStore::open(dir.path()).unwrap();
            store.put("/scheduledjob/x", b"job").unwrap();
        }
        let store = RocksStore::open(dir.path()).unwrap();
        assert_eq!(store.list("/scheduledjob", false).unwrap().len(), 1);
    }
}
