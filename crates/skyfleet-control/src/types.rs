//! Request and response types for control plane operations.
//!
//! These types define the API contracts for MCI and VM management. Responses
//! render the in-flight intent as `targetAction`/`targetStatus`, with
//! `Complete`/`None` once nothing is in flight.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skyfleet_core::status::{target_action_label, target_status_label};
use skyfleet_core::{FleetStatus, MciId, VmId, VmStatus};
use skyfleet_store::{GeoLocation, Mci, ProviderVm, Vm, VmSpec};

use crate::reconcile::StatusCount;

/// Request to create a new MCI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMciRequest {
    /// MCI name, also used as its identifier.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// User labels.
    #[serde(default)]
    pub label: BTreeMap<String, String>,
    /// Member VMs to create.
    #[serde(default)]
    pub vm: Vec<VmRequest>,
}

impl CreateMciRequest {
    /// Create a request with the given name and no VMs.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            label: BTreeMap::new(),
            vm: Vec::new(),
        }
    }

    /// Add a VM request.
    #[must_use]
    pub fn with_vm(mut self, vm: VmRequest) -> Self {
        self.vm.push(vm);
        self
    }
}

/// Request to create one VM, or a sub-group of identical VMs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmRequest {
    /// VM name. Sub-group members are named `<name>-1 … <name>-n`.
    pub name: String,
    /// Number of VMs to create from this request. `0` and `1` create a
    /// single VM named `name`.
    #[serde(default)]
    pub sub_group_size: u32,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Connection profile.
    #[serde(default)]
    pub connection_name: String,
    /// Image reference.
    #[serde(default)]
    pub image_id: String,
    /// Instance spec reference.
    #[serde(default)]
    pub spec_id: String,
    /// Virtual network reference.
    #[serde(default)]
    pub vnet_id: String,
    /// Subnet reference.
    #[serde(default)]
    pub subnet_id: String,
    /// Security group references.
    #[serde(default)]
    pub security_group_ids: Vec<String>,
    /// SSH key reference.
    #[serde(default)]
    pub ssh_key_id: String,
    /// Root disk type.
    #[serde(default)]
    pub root_disk_type: String,
    /// Root disk size in GB.
    #[serde(default)]
    pub root_disk_size: String,
    /// Login account.
    #[serde(default)]
    pub vm_user_account: String,
}

impl VmRequest {
    /// Returns the first required field that is empty or blank, if any.
    ///
    /// `securityGroupIds` is missing when it is empty or holds a blank ID.
    #[must_use]
    pub fn missing_field(&self) -> Option<&'static str> {
        let blank = |value: &str| value.trim().is_empty();
        [
            ("name", blank(&self.name)),
            ("connectionName", blank(&self.connection_name)),
            ("imageId", blank(&self.image_id)),
            ("specId", blank(&self.spec_id)),
            ("vnetId", blank(&self.vnet_id)),
            ("subnetId", blank(&self.subnet_id)),
            (
                "securityGroupIds",
                self.security_group_ids.is_empty()
                    || self.security_group_ids.iter().any(|id| blank(id)),
            ),
            ("sshKeyId", blank(&self.ssh_key_id)),
        ]
        .into_iter()
        .find_map(|(field, missing)| missing.then_some(field))
    }

    /// The resource references of the VMs built from this request.
    #[must_use]
    pub fn spec(&self) -> VmSpec {
        VmSpec {
            connection_name: self.connection_name.clone(),
            image_id: self.image_id.clone(),
            spec_id: self.spec_id.clone(),
            vnet_id: self.vnet_id.clone(),
            subnet_id: self.subnet_id.clone(),
            security_group_ids: self.security_group_ids.clone(),
            ssh_key_id: self.ssh_key_id.clone(),
            root_disk_type: self.root_disk_type.clone(),
            root_disk_size: self.root_disk_size.clone(),
            vm_user_account: self.vm_user_account.clone(),
        }
    }

    /// The names of the VMs this request expands into.
    #[must_use]
    pub fn expanded_names(&self) -> Vec<String> {
        if self.sub_group_size <= 1 {
            return vec![self.name.clone()];
        }
        (1..=self.sub_group_size)
            .map(|i| format!("{}-{i}", self.name))
            .collect()
    }
}

/// Outcome of one per-VM unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmResult {
    /// The VM the work was done on.
    pub vm_id: VmId,
    /// The VM status after the work.
    pub status: VmStatus,
    /// Error, if the work failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VmResult {
    /// A successful result.
    #[must_use]
    pub const fn ok(vm_id: VmId, status: VmStatus) -> Self {
        Self {
            vm_id,
            status,
            error: None,
        }
    }

    /// A failed result.
    #[must_use]
    pub fn failed(vm_id: VmId, error: impl Into<String>) -> Self {
        Self {
            vm_id,
            status: VmStatus::Failed,
            error: Some(error.into()),
        }
    }
}

/// Result of a control request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlOutcome {
    /// User-facing progress message.
    pub message: String,
    /// One entry per VM the action was dispatched to.
    pub results: Vec<VmResult>,
}

impl ControlOutcome {
    /// Errors embedded in the per-VM results.
    pub fn errors(&self) -> impl Iterator<Item = &VmResult> {
        self.results.iter().filter(|r| r.error.is_some())
    }
}

/// A VM as returned to API clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VmView {
    /// Identifier.
    pub id: VmId,
    /// Name.
    pub name: String,
    /// Request group the VM was expanded from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_group: Option<String>,
    /// Description.
    pub description: String,
    /// Resource references.
    #[serde(flatten)]
    pub spec: VmSpec,
    /// Reconciled status.
    pub status: VmStatus,
    /// In-flight action, `Complete` when none.
    pub target_action: String,
    /// In-flight target status, `None` when none.
    pub target_status: String,
    /// Provider-side descriptor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderVm>,
    /// Geographic location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoLocation>,
    /// Last error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl From<Vm> for VmView {
    fn from(vm: Vm) -> Self {
        Self {
            target_action: target_action_label(vm.intent.as_ref()).to_string(),
            target_status: target_status_label(vm.intent.as_ref()).to_string(),
            id: vm.id,
            name: vm.name,
            sub_group: vm.sub_group,
            description: vm.description,
            spec: vm.spec,
            status: vm.status,
            provider: vm.provider,
            location: vm.location,
            system_message: vm.system_message,
            created_at: vm.created_at,
            updated_at: vm.updated_at,
        }
    }
}

/// An MCI with its members, as returned to API clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MciView {
    /// Identifier.
    pub id: MciId,
    /// Name.
    pub name: String,
    /// Description.
    pub description: String,
    /// User labels.
    pub label: BTreeMap<String, String>,
    /// Aggregated status.
    pub status: FleetStatus,
    /// Member counts per status.
    pub status_count: StatusCount,
    /// In-flight action, `Complete` when none.
    pub target_action: String,
    /// In-flight target status, `None` when none.
    pub target_status: String,
    /// Last fleet-level error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
    /// Members.
    pub vm: Vec<VmView>,
    /// Errors raised while creating members, if this view answers a create.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub new_vm_errors: Vec<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl MciView {
    /// Build a view from a reconciled MCI and its members.
    #[must_use]
    pub fn new(mci: Mci, vms: Vec<Vm>) -> Self {
        let status_count = StatusCount::from_statuses(vms.iter().map(|vm| vm.status));
        Self {
            target_action: target_action_label(mci.intent.as_ref()).to_string(),
            target_status: target_status_label(mci.intent.as_ref()).to_string(),
            id: mci.id,
            name: mci.name,
            description: mci.description,
            label: mci.label,
            status: mci.status,
            status_count,
            system_message: mci.system_message,
            vm: vms.into_iter().map(VmView::from).collect(),
            new_vm_errors: Vec::new(),
            created_at: mci.created_at,
            updated_at: mci.updated_at,
        }
    }
}

/// Status of one VM.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VmStatusInfo {
    /// Identifier.
    pub id: VmId,
    /// Name.
    pub name: String,
    /// Provider-native identifier, empty if the VM never reached the CSP.
    pub csp_vm_id: String,
    /// Reconciled status.
    pub status: VmStatus,
    /// In-flight action, `Complete` when none.
    pub target_action: String,
    /// In-flight target status, `None` when none.
    pub target_status: String,
    /// Public IP address.
    pub public_ip: String,
    /// Private IP address.
    pub private_ip: String,
    /// Geographic location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoLocation>,
    /// Last error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
}

impl From<&Vm> for VmStatusInfo {
    fn from(vm: &Vm) -> Self {
        let provider = vm.provider.clone().unwrap_or_default();
        Self {
            id: vm.id.clone(),
            name: vm.name.clone(),
            csp_vm_id: provider.csp_vm_id,
            status: vm.status,
            target_action: target_action_label(vm.intent.as_ref()).to_string(),
            target_status: target_status_label(vm.intent.as_ref()).to_string(),
            public_ip: provider.public_ip,
            private_ip: provider.private_ip,
            location: vm.location.clone(),
            system_message: vm.system_message.clone(),
        }
    }
}

/// Status of an MCI and each of its members.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MciStatusInfo {
    /// Identifier.
    pub id: MciId,
    /// Name.
    pub name: String,
    /// Aggregated status.
    pub status: FleetStatus,
    /// Member counts per status.
    pub status_count: StatusCount,
    /// In-flight action, `Complete` when none.
    pub target_action: String,
    /// In-flight target status, `None` when none.
    pub target_status: String,
    /// Per-member status.
    pub vm: Vec<VmStatusInfo>,
}

impl MciStatusInfo {
    /// Build the status of a reconciled MCI.
    #[must_use]
    pub fn new(mci: &Mci, vms: &[Vm]) -> Self {
        Self {
            id: mci.id.clone(),
            name: mci.name.clone(),
            status: mci.status,
            status_count: StatusCount::from_statuses(vms.iter().map(|vm| vm.status)),
            target_action: target_action_label(mci.intent.as_ref()).to_string(),
            target_status: target_status_label(mci.intent.as_ref()).to_string(),
            vm: vms.iter().map(VmStatusInfo::from).collect(),
        }
    }
}

/// Configuration for the control plane service.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfig {
    /// Largest sub-group a single VM request may expand into.
    #[serde(default = "ControlConfig::default_max_sub_group_size")]
    pub max_sub_group_size: u32,
}

impl ControlConfig {
    const fn default_max_sub_group_size() -> u32 {
        100
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            max_sub_group_size: Self::default_max_sub_group_size(),
        }
    }
}
