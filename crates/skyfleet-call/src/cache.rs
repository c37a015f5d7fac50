//! Response cache for idempotent gateway reads.
//!
//! The gateway stores raw response bodies under a key derived from the
//! request. Entries carry an absolute expiry. An expired entry is dropped
//! when it is read, and every insert evicts whatever has expired.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;

/// A TTL cache of response bodies.
///
/// Implementations must be safe to share between concurrent calls.
pub trait ResponseCache: Send + Sync {
    /// Get a live entry.
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Insert or replace an entry that expires after `ttl`.
    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration);

    /// Remove an entry.
    fn delete(&self, key: &str);
}

#[derive(Debug)]
struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// The default in-memory [`ResponseCache`].
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryCache {
    /// Create a new empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.write().retain(|_, entry| entry.expires_at > now);
    }
}

impl ResponseCache for MemoryCache {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.entries.write().remove(key);
        None
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        self.purge_expired();
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().insert(key.to_string(), entry);
    }

    fn delete(&self, key: &str) {
        self.entries.write().remove(key);
    }
}
