//! In-memory storage implementation.
//!
//! Used by tests and by embedders that don't need durability.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::{Result, StoreError};
use crate::keys;
use crate::Store;

/// A `Store` backed by an ordered in-memory map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries
            .write()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn list(&self, prefix: &str, recursive: bool) -> Result<Vec<(String, Vec<u8>)>> {
        let start = format!("{prefix}/");
        Ok(self
            .entries
            .read()
            .range(start.clone()..)
            .take_while(|(key, _)| key.starts_with(&start))
            .filter(|(key, _)| keys::is_under(prefix, key, recursive))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_rocks_listing_semantics() {
        let store = MemoryStore::new();
        store.put("/ns/a/mcis/f1", b"").unwrap();
        store.put("/ns/a/mcis/f1/vm/v1", b"").unwrap();
        store.put("/ns/a/mcis/f10", b"").unwrap();
        store.put("/ns/ab/mcis/f1", b"").unwrap();

        let direct: Vec<_> = store
            .list("/ns/a/mcis", false)
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(direct, vec!["/ns/a/mcis/f1", "/ns/a/mcis/f10"]);
        assert_eq!(store.list("/ns/a/mcis", true).unwrap().len(), 3);
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn delete_missing_key() {
        let store = MemoryStore::new();
        assert!(matches!(store.delete("/nope"), Err(StoreError::NotFound(_))));
        assert!(store.is_empty());
    }
}
