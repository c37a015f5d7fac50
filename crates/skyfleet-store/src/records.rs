//! Typed record access on top of a raw [`Store`].
//!
//! Every record is CBOR-encoded. `RecordStore` is implemented for every
//! `Store`, including trait objects.

use skyfleet_core::{JobId, MciId, NsId, VmId};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::types::{GeoLocation, Mci, ScheduledJob, Vm};
use crate::Store;

/// Serialize a value using CBOR.
fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

/// Deserialize a value from CBOR.
fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
    ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Typed accessors for skyfleet records.
pub trait RecordStore: Store {
    // =========================================================================
    // Generic Operations
    // =========================================================================

    /// Get and decode the record stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read or the decoding fails.
    fn get_record<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get(key)?.map(|data| deserialize(&data)).transpose()
    }

    /// Encode and store `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the encoding or the write fails.
    fn put_record<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.put(key, &serialize(value)?)
    }

    // =========================================================================
    // MCI Operations
    // =========================================================================

    /// Insert or update an MCI record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_mci(&self, mci: &Mci) -> Result<()> {
        self.put_record(&keys::mci_key(&mci.ns_id, &mci.id), mci)
    }

    /// Get an MCI by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_mci(&self, ns_id: &NsId, mci_id: &MciId) -> Result<Option<Mci>> {
        self.get_record(&keys::mci_key(ns_id, mci_id))
    }

    /// Delete an MCI record. Member VM records are left untouched.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the MCI doesn't exist.
    fn delete_mci(&self, ns_id: &NsId, mci_id: &MciId) -> Result<()> {
        self.delete(&keys::mci_key(ns_id, mci_id))
    }

    /// List every MCI of a namespace, ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_mcis(&self, ns_id: &NsId) -> Result<Vec<Mci>> {
        self.list(&keys::mci_prefix(ns_id), false)?
            .iter()
            .map(|(_, data)| deserialize(data))
            .collect()
    }

    // =========================================================================
    // VM Operations
    // =========================================================================

    /// Insert or update a VM record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_vm(&self, vm: &Vm) -> Result<()> {
        self.put_record(&keys::vm_key(&vm.ns_id, &vm.mci_id, &vm.id), vm)
    }

    /// Get a VM by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_vm(&self, ns_id: &NsId, mci_id: &MciId, vm_id: &VmId) -> Result<Option<Vm>> {
        self.get_record(&keys::vm_key(ns_id, mci_id, vm_id))
    }

    /// Delete a VM record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the VM doesn't exist.
    fn delete_vm(&self, ns_id: &NsId, mci_id: &MciId, vm_id: &VmId) -> Result<()> {
        self.delete(&keys::vm_key(ns_id, mci_id, vm_id))
    }

    /// List every member VM of an MCI, ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_vms(&self, ns_id: &NsId, mci_id: &MciId) -> Result<Vec<Vm>> {
        self.list(&keys::vm_prefix(ns_id, mci_id), false)?
            .iter()
            .map(|(_, data)| deserialize(data))
            .collect()
    }

    // =========================================================================
    // Scheduled Job Operations
    // =========================================================================

    /// Insert or update a scheduled job record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_job(&self, job: &ScheduledJob) -> Result<()> {
        self.put_record(&keys::job_key(&job.id), job)
    }

    /// Get a scheduled job by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_job(&self, job_id: &JobId) -> Result<Option<ScheduledJob>> {
        self.get_record(&keys::job_key(job_id))
    }

    /// Delete a scheduled job record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the job doesn't exist.
    fn delete_job(&self, job_id: &JobId) -> Result<()> {
        self.delete(&keys::job_key(job_id))
    }

    /// List every scheduled job.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_jobs(&self) -> Result<Vec<ScheduledJob>> {
        self.list(keys::JOB_PREFIX, false)?
            .iter()
            .map(|(_, data)| deserialize(data))
            .collect()
    }

    // =========================================================================
    // Geo-location Operations
    // =========================================================================

    /// Insert or update a geo-location record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_geo(&self, location: &GeoLocation) -> Result<()> {
        self.put_record(
            &keys::geo_key(&location.cloud_type, &location.native_region),
            location,
        )
    }

    /// Get the geo-location of a provider region.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_geo(&self, cloud_type: &str, native_region: &str) -> Result<Option<GeoLocation>> {
        self.get_record(&keys::geo_key(cloud_type, native_region))
    }
}

impl<S: Store + ?Sized> RecordStore for S {}
