//! Database schema definitions and column families.
//!
//! Records are addressed by hierarchical string keys (see [`crate::keys`]), so
//! a single column family holds every record and prefix scans stay ordered.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Every metadata record, keyed by its hierarchical path.
    pub const METADATA: &str = "metadata";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![cf::METADATA]
}
