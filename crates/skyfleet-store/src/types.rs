//! Domain types stored in the database.
//!
//! These types represent the persisted state of fleets (MCIs), their member
//! VMs, scheduled jobs and geo-location reference data.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skyfleet_core::{FleetStatus, Intent, JobId, MciId, NsId, VmId, VmStatus};

/// A Multi-Cloud Infrastructure (fleet) record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mci {
    /// Owning namespace.
    pub ns_id: NsId,
    /// Identifier, unique per namespace.
    pub id: MciId,
    /// Human-readable name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// User labels.
    #[serde(default)]
    pub label: BTreeMap<String, String>,
    /// Last aggregated status. Recomputed on every status read.
    pub status: FleetStatus,
    /// Operation in flight, `None` once every member converged.
    pub intent: Option<Intent>,
    /// Last fleet-level error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

/// The resource references a VM is built from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmSpec {
    /// Connection profile used for every gateway call.
    pub connection_name: String,
    /// Image reference.
    pub image_id: String,
    /// Instance spec reference.
    pub spec_id: String,
    /// Virtual network reference.
    pub vnet_id: String,
    /// Subnet reference.
    pub subnet_id: String,
    /// Security group references.
    pub security_group_ids: Vec<String>,
    /// SSH key reference.
    pub ssh_key_id: String,
    /// Root disk type. Empty means the provider default.
    #[serde(default)]
    pub root_disk_type: String,
    /// Root disk size in GB. Empty means the provider default.
    #[serde(default)]
    pub root_disk_size: String,
    /// Login account on the VM.
    #[serde(default)]
    pub vm_user_account: String,
}

/// A member VM of an MCI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vm {
    /// Owning namespace.
    pub ns_id: NsId,
    /// Owning MCI.
    pub mci_id: MciId,
    /// Identifier, unique per MCI.
    pub id: VmId,
    /// Human-readable name.
    pub name: String,
    /// Request group this VM was expanded from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_group: Option<String>,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Resource references.
    pub spec: VmSpec,
    /// Last reconciled status.
    pub status: VmStatus,
    /// Operation in flight, `None` once the VM converged.
    pub intent: Option<Intent>,
    /// Last descriptor returned by the CSP gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderVm>,
    /// Geographic location of the VM's region.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoLocation>,
    /// Last error reported for this VM.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
    /// The last dispatched action failed. The status stays `Failed` until a
    /// new action is stamped.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dispatch_failed: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Provider-side view of a VM, as last returned by the CSP gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderVm {
    /// Name the gateway knows the VM by; used in gateway URLs.
    pub csp_vm_name: String,
    /// Provider-native VM identifier.
    pub csp_vm_id: String,
    /// Provider-native region.
    pub region: String,
    /// Provider-native zone.
    #[serde(default)]
    pub zone: String,
    /// Public IP address.
    #[serde(default)]
    pub public_ip: String,
    /// Public DNS name.
    #[serde(default)]
    pub public_dns: String,
    /// Private IP address.
    #[serde(default)]
    pub private_ip: String,
    /// Private DNS name.
    #[serde(default)]
    pub private_dns: String,
    /// Boot disk type.
    #[serde(default)]
    pub root_disk_type: String,
    /// Boot disk size in GB.
    #[serde(default)]
    pub root_disk_size: String,
    /// Boot device name.
    #[serde(default)]
    pub root_device_name: String,
    /// Login account.
    #[serde(default)]
    pub vm_user_account: String,
    /// `ip:port` for SSH access.
    #[serde(default)]
    pub ssh_access_point: String,
}

/// Geographic location of a provider region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoLocation {
    /// Provider type (e.g. `aws`).
    pub cloud_type: String,
    /// Provider-native region name.
    pub native_region: String,
    /// Short address, e.g. `Virginia`.
    pub brief_addr: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

/// Kind of registration a scheduled job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobType {
    /// Register native resources of a single connection.
    RegisterCspResources,
    /// Register native resources of every connection.
    RegisterCspResourcesAll,
}

impl JobType {
    /// Return the wire name of the job type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RegisterCspResources => "registerCspResources",
            Self::RegisterCspResourcesAll => "registerCspResourcesAll",
        }
    }
}

/// Scheduler-visible state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    /// Waiting for the next tick.
    Scheduled,
    /// An execution is in progress.
    Executing,
    /// The job was deleted. Never persisted.
    Stopped,
}

/// A recurring registration job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledJob {
    /// Identifier.
    pub id: JobId,
    /// Registration kind.
    pub job_type: JobType,
    /// Namespace the registered resources land in.
    pub ns_id: NsId,
    /// Connection profile to register from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_name: Option<String>,
    /// Name prefix of the MCI the registered VMs are grouped into.
    pub name_prefix: String,
    /// Free-form registration option.
    #[serde(default)]
    pub option: String,
    /// Whether registered VMs are grouped into an MCI.
    #[serde(default)]
    pub mci_flag: bool,
    /// Seconds between executions.
    pub interval_seconds: u64,
    /// Disabled jobs stay scheduled but never execute.
    pub enabled: bool,
    /// Current scheduler state.
    pub status: JobStatus,
    /// Total executions.
    pub execution_count: u64,
    /// Successful executions.
    pub success_count: u64,
    /// Failed executions.
    pub failure_count: u64,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Set when the job disabled itself after repeated failures.
    pub auto_disabled: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Start of the execution in progress.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_started_at: Option<DateTime<Utc>>,
    /// End of the last execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_executed_at: Option<DateTime<Utc>>,
    /// When the next execution is due.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_execution_at: Option<DateTime<Utc>>,
    /// Error of the last failed execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Summary of the last successful execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_result: Option<String>,
    /// Hash of the job's configuration, used to reject duplicates.
    pub config_fingerprint: String,
}
