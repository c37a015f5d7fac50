//! Key-value metadata store for skyfleet.
//!
//! Fleets, their member VMs, scheduled jobs and geo-location reference data
//! are stored as CBOR-encoded records under hierarchical string keys:
//!
//! - `/ns/{ns}/mcis/{mci}`: MCI records
//! - `/ns/{ns}/mcis/{mci}/vm/{vm}`: member VM records
//! - `/scheduledjob/{job}`: scheduled job records
//! - `/cloudtype/{cloud}/region/{region}`: geo-location records
//!
//! The [`Store`] trait is the raw byte-level contract; [`RecordStore`] layers
//! typed accessors on top of any implementation.
//!
//! # Example
//!
//! ```no_run
//! use skyfleet_store::{RecordStore, RocksStore};
//! use skyfleet_core::NsId;
//!
//! let store = RocksStore::open("/tmp/skyfleet-db").unwrap();
//!
//! let ns = NsId::new("default").unwrap();
//! let fleets = store.list_mcis(&ns).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod memory;
pub mod records;
pub mod rocks;
pub mod schema;
pub mod types;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use records::RecordStore;
pub use rocks::RocksStore;
pub use types::{
    GeoLocation, JobStatus, JobType, Mci, ProviderVm, ScheduledJob, Vm, VmSpec,
};

/// The storage trait defining raw key-value operations.
///
/// This trait abstracts the storage layer, allowing for different
/// implementations (e.g., `RocksDB`, in-memory for testing).
pub trait Store: Send + Sync {
    /// Get the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Insert or replace the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Delete the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the key doesn't exist.
    fn delete(&self, key: &str) -> Result<()>;

    /// List every entry under `prefix`, ordered by key.
    ///
    /// With `recursive` false only direct children of `prefix` are returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list(&self, prefix: &str, recursive: bool) -> Result<Vec<(String, Vec<u8>)>>;
}
