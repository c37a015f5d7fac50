//! Concurrent per-VM dispatch.
//!
//! Every affected VM gets its own spawned task; the fan-out joins all of them
//! before returning one [`VmResult`] per VM. A failing VM is recorded as
//! `Failed` with the error in its system message and never affects its
//! siblings.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use skyfleet_core::{Action, Intent, VmId, VmStatus};
use skyfleet_store::{RecordStore, Store, Vm};
use tokio::task::JoinHandle;

use crate::csp::{CreateVmRequest, CspClient};
use crate::error::Result;
use crate::geo::GeoCatalog;
use crate::types::VmResult;

/// Name the CSP gateway knows a VM by.
#[must_use]
pub fn csp_vm_name(vm: &Vm) -> String {
    format!("{}-{}-{}", vm.ns_id, vm.mci_id, vm.id)
}

/// Dispatches per-VM work concurrently.
pub struct FanOut<S: Store + ?Sized, C: CspClient + ?Sized> {
    store: Arc<S>,
    csp: Arc<C>,
    geo: Arc<GeoCatalog<S>>,
}

impl<S: Store + ?Sized, C: CspClient + ?Sized> Clone for FanOut<S, C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            csp: Arc::clone(&self.csp),
            geo: Arc::clone(&self.geo),
        }
    }
}

impl<S, C> FanOut<S, C>
where
    S: Store + ?Sized + 'static,
    C: CspClient + ?Sized + 'static,
{
    /// Create a fan-out over the given store, gateway client and geo catalog.
    #[must_use]
    pub const fn new(store: Arc<S>, csp: Arc<C>, geo: Arc<GeoCatalog<S>>) -> Self {
        Self { store, csp, geo }
    }

    /// Create every VM on the provider.
    ///
    /// The VMs must already pass field validation.
    pub async fn create(&self, vms: Vec<Vm>) -> Vec<VmResult> {
        let handles = vms
            .into_iter()
            .map(|vm| {
                let this = self.clone();
                let vm_id = vm.id.clone();
                (vm_id, tokio::spawn(async move { this.create_one(vm).await }))
            })
            .collect();
        join(handles).await
    }

    /// Dispatch a control action to every VM.
    pub async fn control(&self, vms: Vec<Vm>, action: Action) -> Vec<VmResult> {
        let handles = vms
            .into_iter()
            .map(|vm| {
                let this = self.clone();
                let vm_id = vm.id.clone();
                (
                    vm_id,
                    tokio::spawn(async move { this.control_one(vm, action).await }),
                )
            })
            .collect();
        join(handles).await
    }

    async fn create_one(&self, vm: Vm) -> VmResult {
        let vm_id = vm.id.clone();
        self.try_create(vm)
            .await
            .unwrap_or_else(|e| VmResult::failed(vm_id, e.to_string()))
    }

    async fn try_create(&self, mut vm: Vm) -> Result<VmResult> {
        vm.status = VmStatus::Creating;
        vm.intent = Some(Intent::for_action(Action::Create));
        vm.dispatch_failed = false;
        vm.updated_at = Utc::now();
        self.store.put_vm(&vm)?;

        let request = CreateVmRequest {
            connection_name: vm.spec.connection_name.clone(),
            csp_vm_name: csp_vm_name(&vm),
            image_name: vm.spec.image_id.clone(),
            spec_name: vm.spec.spec_id.clone(),
            vpc_name: vm.spec.vnet_id.clone(),
            subnet_name: vm.spec.subnet_id.clone(),
            security_group_names: vm.spec.security_group_ids.clone(),
            key_pair_name: vm.spec.ssh_key_id.clone(),
            root_disk_type: vm.spec.root_disk_type.clone(),
            root_disk_size: vm.spec.root_disk_size.clone(),
            vm_user_id: vm.spec.vm_user_account.clone(),
        };

        let provider = match self.csp.create_vm(&request).await {
            Ok(provider) => provider,
            Err(e) => {
                tracing::warn!(vm_id = %vm.id, error = %e, "VM creation failed");
                return self.mark_failed(vm, e.to_string());
            }
        };

        vm.location = self.locate(&vm, &provider.region).await;
        vm.provider = Some(provider);
        vm.updated_at = Utc::now();
        self.store.put_vm(&vm)?;
        tracing::info!(vm_id = %vm.id, mci_id = %vm.mci_id, "Created VM");
        Ok(VmResult::ok(vm.id, vm.status))
    }

    /// Resolve the VM's geo-location from its connection profile.
    ///
    /// Lookup failures are logged and leave the location empty.
    async fn locate(&self, vm: &Vm, region: &str) -> Option<skyfleet_store::GeoLocation> {
        let connection = match self.csp.connection(&vm.spec.connection_name).await {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!(vm_id = %vm.id, error = %e, "Failed to resolve connection profile");
                return None;
            }
        };
        let region = if region.is_empty() {
            connection.region_name.as_str()
        } else {
            region
        };
        match self.geo.locate(&connection.provider_name, region) {
            Ok(location) => location,
            Err(e) => {
                tracing::warn!(vm_id = %vm.id, error = %e, "Geo-location lookup failed");
                None
            }
        }
    }

    async fn control_one(&self, vm: Vm, action: Action) -> VmResult {
        let vm_id = vm.id.clone();
        self.try_control(vm, action)
            .await
            .unwrap_or_else(|e| VmResult::failed(vm_id, e.to_string()))
    }

    async fn try_control(&self, mut vm: Vm, action: Action) -> Result<VmResult> {
        vm.status = action.transitional_status();
        vm.intent = Some(Intent::for_action(action));
        vm.system_message = None;
        vm.dispatch_failed = false;
        vm.updated_at = Utc::now();
        self.store.put_vm(&vm)?;

        let Some(provider) = vm.provider.as_ref() else {
            if action == Action::Terminate {
                vm.status = VmStatus::Terminated;
                vm.intent = None;
                vm.updated_at = Utc::now();
                self.store.put_vm(&vm)?;
                return Ok(VmResult::ok(vm.id, vm.status));
            }
            return self.mark_failed(vm, "VM has no provider-side instance".to_string());
        };

        let outcome = self
            .csp
            .control_vm(&vm.spec.connection_name, &provider.csp_vm_name, action)
            .await;
        match outcome {
            Ok(()) => {
                tracing::debug!(vm_id = %vm.id, action = %action, "Dispatched VM action");
                Ok(VmResult::ok(vm.id, vm.status))
            }
            Err(e) if action == Action::Terminate && e.is_not_found() => {
                tracing::debug!(vm_id = %vm.id, "VM already gone from provider");
                Ok(VmResult::ok(vm.id, vm.status))
            }
            Err(e) => {
                tracing::warn!(vm_id = %vm.id, action = %action, error = %e, "VM action failed");
                self.mark_failed(vm, e.to_string())
            }
        }
    }

    fn mark_failed(&self, mut vm: Vm, message: String) -> Result<VmResult> {
        vm.status = VmStatus::Failed;
        vm.intent = None;
        vm.system_message = Some(message.clone());
        vm.dispatch_failed = true;
        vm.updated_at = Utc::now();
        self.store.put_vm(&vm)?;
        Ok(VmResult::failed(vm.id, message))
    }
}

/// Wait for every task, turning a panicked task into a failed result.
async fn join(handles: Vec<(VmId, JoinHandle<VmResult>)>) -> Vec<VmResult> {
    let (ids, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
    join_all(handles)
        .await
        .into_iter()
        .zip(ids)
        .map(|(joined, vm_id)| {
            joined.unwrap_or_else(|e| {
                tracing::error!(vm_id = %vm_id, error = %e, "VM task aborted");
                VmResult::failed(vm_id, format!("task aborted: {e}"))
            })
        })
        .collect()
}
