//! Geo-location catalog of provider regions.
//!
//! Maps `(provider, native region)` to a latitude, longitude and short
//! address. The reference table ships with the crate as a CSV file and is
//! copied into the store the first time a lookup misses.

use std::sync::Arc;

use parking_lot::Mutex;
use skyfleet_store::{GeoLocation, RecordStore, Store};

use crate::error::{ControlError, Result};

/// The packaged reference table.
const CLOUD_LOCATIONS: &str = include_str!("../data/cloudlocation.csv");

/// Parse the reference table.
///
/// Expects a header row followed by
/// `CloudType,NativeRegion,BriefAddr,Latitude,Longitude` rows. Blank lines and
/// lines starting with `#` are skipped.
///
/// # Errors
///
/// Returns `ControlError::Internal` naming the first malformed line.
pub fn parse_locations(csv: &str) -> Result<Vec<GeoLocation>> {
    let malformed = |line: usize, what: &str| {
        ControlError::Internal(format!("cloudlocation.csv line {line}: {what}"))
    };

    csv.lines()
        .enumerate()
        .skip(1)
        .filter(|(_, row)| !row.trim().is_empty() && !row.starts_with('#'))
        .map(|(index, row)| {
            let line = index + 1;
            let fields: Vec<&str> = row.split(',').map(str::trim).collect();
            let [cloud_type, native_region, brief_addr, latitude, longitude] = fields[..] else {
                return Err(malformed(line, "expected 5 fields"));
            };
            Ok(GeoLocation {
                cloud_type: cloud_type.to_ascii_lowercase(),
                native_region: native_region.to_ascii_lowercase(),
                brief_addr: brief_addr.to_string(),
                latitude: latitude
                    .parse()
                    .map_err(|_| malformed(line, "invalid latitude"))?,
                longitude: longitude
                    .parse()
                    .map_err(|_| malformed(line, "invalid longitude"))?,
            })
        })
        .collect()
}

/// Looks up provider region locations, seeding the store on first miss.
pub struct GeoCatalog<S: Store + ?Sized> {
    store: Arc<S>,
    seeded: Mutex<bool>,
}

impl<S: Store + ?Sized> GeoCatalog<S> {
    /// Create a catalog over `store`.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            seeded: Mutex::new(false),
        }
    }

    /// Find the location of a provider region.
    ///
    /// Returns `None` for regions missing from the reference table.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the packaged table is malformed.
    pub fn locate(&self, cloud_type: &str, native_region: &str) -> Result<Option<GeoLocation>> {
        if let Some(location) = self.store.get_geo(cloud_type, native_region)? {
            return Ok(Some(location));
        }
        if !self.seed()? {
            return Ok(None);
        }
        Ok(self.store.get_geo(cloud_type, native_region)?)
    }

    /// Copy the packaged table into the store once.
    ///
    /// Returns true if this call did the seeding.
    fn seed(&self) -> Result<bool> {
        let mut seeded = self.seeded.lock();
        if *seeded {
            return Ok(false);
        }
        let locations = parse_locations(CLOUD_LOCATIONS)?;
        for location in &locations {
            self.store.put_geo(location)?;
        }
        *seeded = true;
        tracing::info!(count = locations.len(), "Seeded geo-location catalog");
        Ok(true)
    }
}
