//! Control plane service implementation.
//!
//! This module provides the `ControlPlane` trait and `ControlPlaneService`
//! implementation that coordinates MCI and VM lifecycle operations.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use skyfleet_core::{Action, FleetStatus, Intent, MciId, NsId, VmId, VmStatus};
use skyfleet_store::{Mci, RecordStore, Store, Vm};

use crate::csp::CspClient;
use crate::error::{ControlError, Result};
use crate::fanout::FanOut;
use crate::geo::GeoCatalog;
use crate::lifecycle::{self, Scope};
use crate::reconcile;
use crate::types::{
    ControlConfig, ControlOutcome, CreateMciRequest, MciStatusInfo, MciView, VmRequest, VmResult,
    VmStatusInfo, VmView,
};

/// Message returned when a control request addresses no VM.
pub const NO_VM_TO_OPERATE: &str = "No VM to operate";

/// Trait defining the control plane operations.
///
/// Every read reconciles the addressed records against the CSP gateway before
/// answering.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    // =========================================================================
    // MCI Operations
    // =========================================================================

    /// Create an MCI and its member VMs.
    ///
    /// Invalid VM requests do not fail the operation; they are recorded as
    /// `Failed` members and reported in `new_vm_errors`.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Conflict` if the MCI already exists.
    async fn create_mci(&self, ns_id: &NsId, request: CreateMciRequest) -> Result<MciView>;

    /// Get a reconciled MCI with its members.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::MciNotFound` if the MCI doesn't exist.
    async fn get_mci(&self, ns_id: &NsId, mci_id: &MciId) -> Result<MciView>;

    /// List every MCI of a namespace, reconciled.
    async fn list_mcis(&self, ns_id: &NsId) -> Result<Vec<MciView>>;

    /// List the MCI identifiers of a namespace.
    async fn list_mci_ids(&self, ns_id: &NsId) -> Result<Vec<MciId>>;

    /// Delete an MCI and every member record.
    ///
    /// With `terminate`, every non-terminated member is terminated on the
    /// provider first, without transition checks.
    async fn delete_mci(&self, ns_id: &NsId, mci_id: &MciId, terminate: bool)
        -> Result<ControlOutcome>;

    /// Get the reconciled status of an MCI and its members.
    async fn get_mci_status(&self, ns_id: &NsId, mci_id: &MciId) -> Result<MciStatusInfo>;

    /// Dispatch an action to every member of an MCI.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InvalidTransition` if the MCI status forbids the
    /// action and `force` is not set. Nothing is modified in that case.
    async fn control_mci(
        &self,
        ns_id: &NsId,
        mci_id: &MciId,
        action: Action,
        force: bool,
    ) -> Result<ControlOutcome>;

    // =========================================================================
    // VM Operations
    // =========================================================================

    /// Add VMs to an existing MCI.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InvalidTransition` if the MCI is terminated or
    /// busy.
    async fn add_vms(
        &self,
        ns_id: &NsId,
        mci_id: &MciId,
        requests: Vec<VmRequest>,
    ) -> Result<MciView>;

    /// Get a reconciled VM.
    async fn get_vm(&self, ns_id: &NsId, mci_id: &MciId, vm_id: &VmId) -> Result<VmView>;

    /// Get the reconciled status of a VM.
    async fn get_vm_status(
        &self,
        ns_id: &NsId,
        mci_id: &MciId,
        vm_id: &VmId,
    ) -> Result<VmStatusInfo>;

    /// Dispatch an action to a single VM.
    async fn control_vm(
        &self,
        ns_id: &NsId,
        mci_id: &MciId,
        vm_id: &VmId,
        action: Action,
        force: bool,
    ) -> Result<ControlOutcome>;

    /// Delete a VM record, terminating it on the provider first if asked.
    ///
    /// Provider termination is best effort: its failure is reported in the
    /// outcome and the record is removed regardless.
    async fn delete_vm(
        &self,
        ns_id: &NsId,
        mci_id: &MciId,
        vm_id: &VmId,
        terminate: bool,
    ) -> Result<ControlOutcome>;
}

/// The main control plane service implementation.
pub struct ControlPlaneService<S: Store + ?Sized, C: CspClient + ?Sized> {
    store: Arc<S>,
    csp: Arc<C>,
    fanout: FanOut<S, C>,
    config: ControlConfig,
}

impl<S, C> ControlPlaneService<S, C>
where
    S: Store + ?Sized + 'static,
    C: CspClient + ?Sized + 'static,
{
    /// Create a new control plane service.
    #[must_use]
    pub fn new(store: Arc<S>, csp: Arc<C>, config: ControlConfig) -> Self {
        let geo = Arc::new(GeoCatalog::new(Arc::clone(&store)));
        let fanout = FanOut::new(Arc::clone(&store), Arc::clone(&csp), geo);
        Self {
            store,
            csp,
            fanout,
            config,
        }
    }

    /// Create with default configuration.
    #[must_use]
    pub fn with_defaults(store: Arc<S>, csp: Arc<C>) -> Self {
        Self::new(store, csp, ControlConfig::default())
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get a reference to the CSP gateway client.
    #[must_use]
    pub fn csp(&self) -> &C {
        &self.csp
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &ControlConfig {
        &self.config
    }

    async fn reconciled(&self, ns_id: &NsId, mci_id: &MciId) -> Result<(Mci, Vec<Vm>)> {
        reconcile::reconcile_mci(self.store.as_ref(), self.csp.as_ref(), ns_id, mci_id).await
    }

    fn find_mci(&self, ns_id: &NsId, mci_id: &MciId) -> Result<Mci> {
        self.store
            .get_mci(ns_id, mci_id)?
            .ok_or_else(|| ControlError::MciNotFound {
                ns_id: ns_id.clone(),
                mci_id: mci_id.clone(),
            })
    }

    fn find_vm(&self, ns_id: &NsId, mci_id: &MciId, vm_id: &VmId) -> Result<Vm> {
        self.find_mci(ns_id, mci_id)?;
        self.store
            .get_vm(ns_id, mci_id, vm_id)?
            .ok_or_else(|| ControlError::VmNotFound {
                mci_id: mci_id.clone(),
                vm_id: vm_id.clone(),
            })
    }

    async fn reconciled_vm(&self, ns_id: &NsId, mci_id: &MciId, vm_id: &VmId) -> Result<Vm> {
        let vm = self.find_vm(ns_id, mci_id, vm_id)?;
        reconcile::reconcile_vm(self.store.as_ref(), self.csp.as_ref(), vm).await
    }

    /// Expand and validate VM requests into member records.
    ///
    /// Returns the VMs ready for creation and one error per rejected VM.
    /// Requests missing a required field are stored as `Failed` members.
    fn prepare_vms(
        &self,
        ns_id: &NsId,
        mci_id: &MciId,
        requests: &[VmRequest],
        existing: &[Vm],
    ) -> Result<(Vec<Vm>, Vec<String>)> {
        if let Some(request) = requests
            .iter()
            .find(|r| r.sub_group_size > self.config.max_sub_group_size)
        {
            return Err(ControlError::Validation(format!(
                "subGroupSize of {} exceeds the limit of {}",
                request.name, self.config.max_sub_group_size
            )));
        }

        let mut taken: HashSet<String> = existing.iter().map(|vm| vm.id.to_string()).collect();
        let mut ready = Vec::new();
        let mut errors = Vec::new();

        for (index, request) in requests.iter().enumerate() {
            if request.name.is_empty() {
                errors.push(format!("VM request #{index}: missing required field name"));
                continue;
            }
            let missing = request.missing_field();
            let sub_group = (request.sub_group_size > 1).then(|| request.name.clone());

            for name in request.expanded_names() {
                let vm_id = match VmId::new(name.as_str()) {
                    Ok(vm_id) => vm_id,
                    Err(e) => {
                        errors.push(format!("VM {name}: {e}"));
                        continue;
                    }
                };
                if !taken.insert(vm_id.to_string()) {
                    errors.push(format!("VM {vm_id} already exists"));
                    continue;
                }

                let now = Utc::now();
                let mut vm = Vm {
                    ns_id: ns_id.clone(),
                    mci_id: mci_id.clone(),
                    id: vm_id,
                    name,
                    sub_group: sub_group.clone(),
                    description: request.description.clone(),
                    spec: request.spec(),
                    status: VmStatus::Creating,
                    intent: None,
                    provider: None,
                    location: None,
                    system_message: None,
                    dispatch_failed: false,
                    created_at: now,
                    updated_at: now,
                };

                if let Some(field) = missing {
                    let message = format!("missing required field {field}");
                    errors.push(format!("VM {}: {message}", vm.id));
                    vm.status = VmStatus::Failed;
                    vm.system_message = Some(message);
                    self.store.put_vm(&vm)?;
                } else {
                    ready.push(vm);
                }
            }
        }

        Ok((ready, errors))
    }

    /// Create prepared VMs, then reconcile the MCI into a view.
    async fn provision(
        &self,
        mut mci: Mci,
        ready: Vec<Vm>,
        mut errors: Vec<String>,
    ) -> Result<MciView> {
        if !ready.is_empty() {
            mci.intent = Some(Intent::for_action(Action::Create));
            mci.updated_at = Utc::now();
            self.store.put_mci(&mci)?;
        }

        let results = self.fanout.create(ready).await;
        errors.extend(results.iter().filter_map(|r| {
            r.error
                .as_ref()
                .map(|error| format!("VM {}: {error}", r.vm_id))
        }));

        let (mci, vms) = self.reconciled(&mci.ns_id, &mci.id).await?;
        let mut view = MciView::new(mci, vms);
        view.new_vm_errors = errors;
        Ok(view)
    }

    fn stamp_mci(&self, mci: &mut Mci, action: Action) -> Result<()> {
        mci.status = FleetStatus::Uniform(action.transitional_status());
        mci.intent = Some(Intent::for_action(action));
        mci.updated_at = Utc::now();
        self.store.put_mci(mci)?;
        Ok(())
    }
}

fn reject_create(action: Action) -> Result<()> {
    if action == Action::Create {
        return Err(ControlError::Validation(
            "Create is not a control action; add VMs to the MCI instead".to_string(),
        ));
    }
    Ok(())
}

#[async_trait]
impl<S, C> ControlPlane for ControlPlaneService<S, C>
where
    S: Store + ?Sized + 'static,
    C: CspClient + ?Sized + 'static,
{
    // =========================================================================
    // MCI Operations
    // =========================================================================

    async fn create_mci(&self, ns_id: &NsId, request: CreateMciRequest) -> Result<MciView> {
        let mci_id = MciId::new(request.name.as_str())?;
        if self.store.get_mci(ns_id, &mci_id)?.is_some() {
            return Err(ControlError::Conflict(format!("MCI {mci_id}")));
        }

        let now = Utc::now();
        let mci = Mci {
            ns_id: ns_id.clone(),
            id: mci_id.clone(),
            name: request.name,
            description: request.description,
            label: request.label,
            status: FleetStatus::Empty,
            intent: None,
            system_message: None,
            created_at: now,
            updated_at: now,
        };
        let (ready, errors) = self.prepare_vms(ns_id, &mci_id, &request.vm, &[])?;
        self.store.put_mci(&mci)?;

        tracing::info!(
            ns_id = %ns_id,
            mci_id = %mci_id,
            vms = ready.len(),
            rejected = errors.len(),
            "Creating MCI"
        );

        self.provision(mci, ready, errors).await
    }

    async fn get_mci(&self, ns_id: &NsId, mci_id: &MciId) -> Result<MciView> {
        let (mci, vms) = self.reconciled(ns_id, mci_id).await?;
        Ok(MciView::new(mci, vms))
    }

    async fn list_mcis(&self, ns_id: &NsId) -> Result<Vec<MciView>> {
        let ids = self.list_mci_ids(ns_id).await?;
        join_all(ids.iter().map(|mci_id| self.get_mci(ns_id, mci_id)))
            .await
            .into_iter()
            .collect()
    }

    async fn list_mci_ids(&self, ns_id: &NsId) -> Result<Vec<MciId>> {
        Ok(self
            .store
            .list_mcis(ns_id)?
            .into_iter()
            .map(|mci| mci.id)
            .collect())
    }

    async fn delete_mci(
        &self,
        ns_id: &NsId,
        mci_id: &MciId,
        terminate: bool,
    ) -> Result<ControlOutcome> {
        let (_, vms) = self.reconciled(ns_id, mci_id).await?;

        let results = if terminate {
            let targets: Vec<Vm> = vms
                .iter()
                .filter(|vm| vm.status != VmStatus::Terminated && vm.provider.is_some())
                .cloned()
                .collect();
            self.fanout.control(targets, Action::Terminate).await
        } else {
            Vec::new()
        };
        for failure in results.iter().filter(|r| r.error.is_some()) {
            tracing::warn!(
                mci_id = %mci_id,
                vm_id = %failure.vm_id,
                error = failure.error.as_deref().unwrap_or_default(),
                "Termination failed; removing record anyway"
            );
        }

        for vm in &vms {
            self.store.delete_vm(ns_id, mci_id, &vm.id)?;
        }
        self.store.delete_mci(ns_id, mci_id)?;

        tracing::info!(ns_id = %ns_id, mci_id = %mci_id, vms = vms.len(), "Deleted MCI");

        Ok(ControlOutcome {
            message: format!("Deleted the MCI {mci_id}"),
            results,
        })
    }

    async fn get_mci_status(&self, ns_id: &NsId, mci_id: &MciId) -> Result<MciStatusInfo> {
        let (mci, vms) = self.reconciled(ns_id, mci_id).await?;
        Ok(MciStatusInfo::new(&mci, &vms))
    }

    async fn control_mci(
        &self,
        ns_id: &NsId,
        mci_id: &MciId,
        action: Action,
        force: bool,
    ) -> Result<ControlOutcome> {
        reject_create(action)?;
        let (mut mci, vms) = self.reconciled(ns_id, mci_id).await?;
        if !force {
            lifecycle::validate_fleet(mci_id.as_str(), &mci.status, action)?;
        }

        let targets: Vec<Vm> = vms
            .into_iter()
            .filter(|vm| vm.status != VmStatus::Terminated)
            .collect();
        if targets.is_empty() {
            return Ok(ControlOutcome {
                message: NO_VM_TO_OPERATE.to_string(),
                results: Vec::new(),
            });
        }

        self.stamp_mci(&mut mci, action)?;
        tracing::info!(
            mci_id = %mci_id,
            action = %action,
            vms = targets.len(),
            force,
            "Dispatching MCI action"
        );

        let results = self.fanout.control(targets, action).await;
        Ok(ControlOutcome {
            message: lifecycle::progress_message(action, Scope::Mci),
            results,
        })
    }

    // =========================================================================
    // VM Operations
    // =========================================================================

    async fn add_vms(
        &self,
        ns_id: &NsId,
        mci_id: &MciId,
        requests: Vec<VmRequest>,
    ) -> Result<MciView> {
        let (mci, vms) = self.reconciled(ns_id, mci_id).await?;
        lifecycle::validate_fleet(mci_id.as_str(), &mci.status, Action::Create)?;

        let (ready, errors) = self.prepare_vms(ns_id, mci_id, &requests, &vms)?;
        tracing::info!(
            mci_id = %mci_id,
            vms = ready.len(),
            rejected = errors.len(),
            "Adding VMs to MCI"
        );

        self.provision(mci, ready, errors).await
    }

    async fn get_vm(&self, ns_id: &NsId, mci_id: &MciId, vm_id: &VmId) -> Result<VmView> {
        Ok(self.reconciled_vm(ns_id, mci_id, vm_id).await?.into())
    }

    async fn get_vm_status(
        &self,
        ns_id: &NsId,
        mci_id: &MciId,
        vm_id: &VmId,
    ) -> Result<VmStatusInfo> {
        let vm = self.reconciled_vm(ns_id, mci_id, vm_id).await?;
        Ok(VmStatusInfo::from(&vm))
    }

    async fn control_vm(
        &self,
        ns_id: &NsId,
        mci_id: &MciId,
        vm_id: &VmId,
        action: Action,
        force: bool,
    ) -> Result<ControlOutcome> {
        reject_create(action)?;
        let vm = self.reconciled_vm(ns_id, mci_id, vm_id).await?;
        if !force {
            lifecycle::validate(vm_id.as_str(), vm.status, action)?;
        }

        let mut mci = self.find_mci(ns_id, mci_id)?;
        mci.intent = Some(Intent::for_action(action));
        mci.updated_at = Utc::now();
        self.store.put_mci(&mci)?;

        tracing::info!(mci_id = %mci_id, vm_id = %vm_id, action = %action, force, "Dispatching VM action");

        let results = self.fanout.control(vec![vm], action).await;
        Ok(ControlOutcome {
            message: lifecycle::progress_message(action, Scope::Vm),
            results,
        })
    }

    async fn delete_vm(
        &self,
        ns_id: &NsId,
        mci_id: &MciId,
        vm_id: &VmId,
        terminate: bool,
    ) -> Result<ControlOutcome> {
        let vm = self.find_vm(ns_id, mci_id, vm_id)?;

        let mut result = VmResult::ok(vm_id.clone(), VmStatus::Terminated);
        if let Some(provider) = vm.provider.as_ref().filter(|_| terminate) {
            if vm.status != VmStatus::Terminated {
                match self
                    .csp
                    .terminate_vm(&vm.spec.connection_name, &provider.csp_vm_name)
                    .await
                {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(e) => {
                        tracing::warn!(
                            vm_id = %vm_id,
                            error = %e,
                            "Termination failed; removing record anyway"
                        );
                        result = VmResult::failed(vm_id.clone(), e.to_string());
                    }
                }
            }
        }

        self.store.delete_vm(ns_id, mci_id, vm_id)?;
        let (mci, vms) = reconcile::load_mci(self.store.as_ref(), ns_id, mci_id)?;
        reconcile::refresh_mci(self.store.as_ref(), mci, &vms)?;

        tracing::info!(mci_id = %mci_id, vm_id = %vm_id, "Deleted VM");

        Ok(ControlOutcome {
            message: format!("Deleted the VM {vm_id}"),
            results: vec![result],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csp::mock::MockCspClient;
    use skyfleet_store::MemoryStore;

    type Service = ControlPlaneService<MemoryStore, MockCspClient>;

    fn setup() -> (Service, Arc<MemoryStore>, Arc<MockCspClient>) {
        let store = Arc::new(MemoryStore::new());
        let csp = Arc::new(MockCspClient::new());
        csp.add_connection("aws-east", "aws", "us-east-1");
        csp.add_connection("gcp-asia", "gcp", "asia-northeast3");
        let service = ControlPlaneService::with_defaults(Arc::clone(&store), Arc::clone(&csp));
        (service, store, csp)
    }

    fn ns() -> NsId {
        NsId::new("ns01").unwrap()
    }

    fn mci_id(name: &str) -> MciId {
        MciId::new(name).unwrap()
    }

    fn vm_id(name: &str) -> VmId {
        VmId::new(name).unwrap()
    }

    fn vm_request(name: &str) -> VmRequest {
        VmRequest {
            name: name.to_string(),
            connection_name: "aws-east".into(),
            image_id: "ubuntu22".into(),
            spec_id: "t3-small".into(),
            vnet_id: "vnet01".into(),
            subnet_id: "subnet01".into(),
            security_group_ids: vec!["sg01".into()],
            ssh_key_id: "key01".into(),
            ..VmRequest::default()
        }
    }

    async fn fleet(service: &Service, name: &str, vms: &[&str]) -> MciView {
        let request = vms
            .iter()
            .fold(CreateMciRequest::new(name), |request, vm| {
                request.with_vm(vm_request(vm))
            });
        service.create_mci(&ns(), request).await.unwrap()
    }

    #[tokio::test]
    async fn create_with_one_invalid_vm() {
        let (service, _store, csp) = setup();

        let mut broken = vm_request("vm-3");
        broken.image_id.clear();
        let request = CreateMciRequest::new("fleet")
            .with_vm(vm_request("vm-1"))
            .with_vm(vm_request("vm-2"))
            .with_vm(broken);

        let view = service.create_mci(&ns(), request).await.unwrap();

        assert_eq!(view.vm.len(), 3);
        assert_eq!(view.status_count.running, 2);
        assert_eq!(view.status_count.failed, 1);
        assert_eq!(view.status, FleetStatus::Failed { count: 1, total: 3 });
        assert_eq!(view.new_vm_errors.len(), 1);
        assert!(view.new_vm_errors[0].contains("imageId"));
        assert_eq!(view.target_action, "Complete");
        assert_eq!(csp.vm_count(), 2);
    }

    #[tokio::test]
    async fn create_populates_location() {
        let (service, _store, _csp) = setup();

        let mut request = vm_request("vm-1");
        request.connection_name = "gcp-asia".into();
        let view = service
            .create_mci(&ns(), CreateMciRequest::new("fleet").with_vm(request))
            .await
            .unwrap();

        let location = view.vm[0].location.clone().unwrap();
        assert_eq!(location.brief_addr, "Seoul");
        assert_eq!(view.status, FleetStatus::Uniform(VmStatus::Running));
    }

    #[tokio::test]
    async fn create_rejects_existing_mci() {
        let (service, _store, _csp) = setup();
        fleet(&service, "fleet", &[]).await;

        let err = service
            .create_mci(&ns(), CreateMciRequest::new("fleet"))
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Conflict(_)));
        assert_eq!(err.http_status_code(), 409);
    }

    #[tokio::test]
    async fn create_rejects_invalid_mci_name() {
        let (service, _store, _csp) = setup();

        let err = service
            .create_mci(&ns(), CreateMciRequest::new("Bad Name"))
            .await
            .unwrap_err();
        assert_eq!(err.http_status_code(), 400);
    }

    #[tokio::test]
    async fn empty_mci_has_empty_status() {
        let (service, _store, _csp) = setup();

        let view = fleet(&service, "fleet", &[]).await;
        assert_eq!(view.status, FleetStatus::Empty);
        assert!(view.vm.is_empty());
    }

    #[tokio::test]
    async fn sub_groups_expand_and_duplicates_are_reported() {
        let (service, _store, _csp) = setup();

        let mut group = vm_request("web");
        group.sub_group_size = 3;
        let request = CreateMciRequest::new("fleet")
            .with_vm(group)
            .with_vm(vm_request("web-2"));

        let view = service.create_mci(&ns(), request).await.unwrap();

        let mut names: Vec<_> = view.vm.iter().map(|vm| vm.id.to_string()).collect();
        names.sort();
        assert_eq!(names, vec!["web-1", "web-2", "web-3"]);
        assert!(view.vm.iter().all(|vm| vm.sub_group.as_deref() == Some("web")));
        assert_eq!(view.new_vm_errors, vec!["VM web-2 already exists".to_string()]);
    }

    #[tokio::test]
    async fn oversized_sub_group_is_rejected() {
        let (service, store, _csp) = setup();

        let mut group = vm_request("web");
        group.sub_group_size = 1000;
        let err = service
            .create_mci(&ns(), CreateMciRequest::new("fleet").with_vm(group))
            .await
            .unwrap_err();

        assert!(matches!(err, ControlError::Validation(_)));
        assert!(store.list_vms(&ns(), &mci_id("fleet")).unwrap().is_empty());
    }

    #[tokio::test]
    async fn suspend_then_resume() {
        let (service, _store, _csp) = setup();
        fleet(&service, "fleet", &["vm-1", "vm-2"]).await;

        let outcome = service
            .control_mci(&ns(), &mci_id("fleet"), Action::Suspend, false)
            .await
            .unwrap();
        assert_eq!(outcome.message, "Suspending the MCI");
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.errors().count(), 0);

        let view = service.get_mci(&ns(), &mci_id("fleet")).await.unwrap();
        assert_eq!(view.status, FleetStatus::Uniform(VmStatus::Suspended));
        assert_eq!(view.target_action, "Complete");
        assert_eq!(view.target_status, "None");

        let err = service
            .control_mci(&ns(), &mci_id("fleet"), Action::Reboot, false)
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::InvalidTransition { .. }));

        service
            .control_mci(&ns(), &mci_id("fleet"), Action::Resume, false)
            .await
            .unwrap();
        let status = service.get_mci_status(&ns(), &mci_id("fleet")).await.unwrap();
        assert_eq!(status.status, FleetStatus::Uniform(VmStatus::Running));
    }

    #[tokio::test]
    async fn terminate_while_suspending_is_rejected_without_mutation() {
        let (service, store, csp) = setup();
        fleet(&service, "fleet", &["vm-1", "vm-2"]).await;
        service
            .control_mci(&ns(), &mci_id("fleet"), Action::Suspend, false)
            .await
            .unwrap();
        for vm in ["vm-1", "vm-2"] {
            csp.set_native_status(&format!("ns01-fleet-{vm}"), "Suspending");
        }
        let calls = csp.control_calls();

        let err = service
            .control_mci(&ns(), &mci_id("fleet"), Action::Terminate, false)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ControlError::InvalidTransition {
                status: VmStatus::Suspending,
                action: Action::Terminate,
                ..
            }
        ));
        assert_eq!(csp.control_calls(), calls);
        let mci = store.get_mci(&ns(), &mci_id("fleet")).unwrap().unwrap();
        assert_eq!(mci.status, FleetStatus::Uniform(VmStatus::Suspending));
        assert_eq!(mci.intent, Some(Intent::for_action(Action::Suspend)));
        assert!(store
            .list_vms(&ns(), &mci_id("fleet"))
            .unwrap()
            .iter()
            .all(|vm| vm.intent == Some(Intent::for_action(Action::Suspend))));
    }

    #[tokio::test]
    async fn force_bypasses_validation() {
        let (service, _store, csp) = setup();
        fleet(&service, "fleet", &["vm-1"]).await;
        csp.set_native_status("ns01-fleet-vm-1", "Suspending");

        let outcome = service
            .control_mci(&ns(), &mci_id("fleet"), Action::Terminate, true)
            .await
            .unwrap();

        assert_eq!(outcome.message, "Terminating the MCI");
        assert_eq!(csp.vm_count(), 0);
        let view = service.get_mci(&ns(), &mci_id("fleet")).await.unwrap();
        assert_eq!(view.status, FleetStatus::Uniform(VmStatus::Terminated));
    }

    #[tokio::test]
    async fn terminating_an_empty_fleet_is_a_no_op() {
        let (service, store, _csp) = setup();
        fleet(&service, "fleet", &[]).await;
        let before = store.get_mci(&ns(), &mci_id("fleet")).unwrap().unwrap();

        let outcome = service
            .control_mci(&ns(), &mci_id("fleet"), Action::Terminate, false)
            .await
            .unwrap();

        assert_eq!(outcome.message, NO_VM_TO_OPERATE);
        assert!(outcome.results.is_empty());
        let after = store.get_mci(&ns(), &mci_id("fleet")).unwrap().unwrap();
        assert_eq!(after.updated_at, before.updated_at);
        assert_eq!(after.intent, None);
    }

    #[tokio::test]
    async fn one_failing_vm_does_not_fail_the_operation() {
        let (service, _store, csp) = setup();
        fleet(&service, "fleet", &["vm-1", "vm-2", "vm-3"]).await;
        csp.fail_vm("ns01-fleet-vm-2");

        let outcome = service
            .control_mci(&ns(), &mci_id("fleet"), Action::Suspend, false)
            .await
            .unwrap();

        let errors: Vec<_> = outcome.errors().collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].vm_id, vm_id("vm-2"));

        let status = service.get_mci_status(&ns(), &mci_id("fleet")).await.unwrap();
        assert_eq!(status.status_count.suspended, 2);
        assert_eq!(status.status, FleetStatus::Failed { count: 1, total: 3 });
        let failed = status.vm.iter().find(|vm| vm.id == vm_id("vm-2")).unwrap();
        assert_eq!(failed.status, VmStatus::Failed);

        // A later read must not overwrite the failed dispatch.
        let status = service.get_mci_status(&ns(), &mci_id("fleet")).await.unwrap();
        assert_eq!(status.status, FleetStatus::Failed { count: 1, total: 3 });
    }

    #[tokio::test]
    async fn create_is_not_a_control_action() {
        let (service, _store, _csp) = setup();
        fleet(&service, "fleet", &["vm-1"]).await;

        let err = service
            .control_mci(&ns(), &mci_id("fleet"), Action::Create, true)
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Validation(_)));
    }

    #[tokio::test]
    async fn single_vm_control() {
        let (service, _store, _csp) = setup();
        fleet(&service, "fleet", &["vm-1", "vm-2"]).await;

        let outcome = service
            .control_vm(&ns(), &mci_id("fleet"), &vm_id("vm-1"), Action::Suspend, false)
            .await
            .unwrap();
        assert_eq!(outcome.message, "Suspending the VM");

        let vm = service
            .get_vm_status(&ns(), &mci_id("fleet"), &vm_id("vm-1"))
            .await
            .unwrap();
        assert_eq!(vm.status, VmStatus::Suspended);

        let view = service.get_mci(&ns(), &mci_id("fleet")).await.unwrap();
        assert_eq!(
            view.status,
            FleetStatus::Partial {
                status: VmStatus::Running,
                count: 1,
                total: 2
            }
        );
        assert_eq!(view.target_action, "Complete");

        let err = service
            .control_vm(&ns(), &mci_id("fleet"), &vm_id("vm-1"), Action::Reboot, false)
            .await
            .unwrap_err();
        assert_eq!(err.http_status_code(), 400);
    }

    #[tokio::test]
    async fn add_vms_to_existing_fleet() {
        let (service, _store, csp) = setup();
        fleet(&service, "fleet", &["vm-1"]).await;

        let view = service
            .add_vms(&ns(), &mci_id("fleet"), vec![vm_request("vm-2"), vm_request("vm-1")])
            .await
            .unwrap();

        assert_eq!(view.vm.len(), 2);
        assert_eq!(view.new_vm_errors, vec!["VM vm-1 already exists".to_string()]);
        assert_eq!(csp.vm_count(), 2);
    }

    #[tokio::test]
    async fn add_vms_to_terminated_fleet_is_rejected() {
        let (service, _store, _csp) = setup();
        fleet(&service, "fleet", &["vm-1"]).await;
        service
            .control_mci(&ns(), &mci_id("fleet"), Action::Terminate, false)
            .await
            .unwrap();

        let err = service
            .add_vms(&ns(), &mci_id("fleet"), vec![vm_request("vm-2")])
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn delete_mci_terminates_members() {
        let (service, store, csp) = setup();
        fleet(&service, "fleet", &["vm-1", "vm-2"]).await;

        let outcome = service
            .delete_mci(&ns(), &mci_id("fleet"), true)
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 2);
        assert_eq!(csp.vm_count(), 0);
        assert!(store.get_mci(&ns(), &mci_id("fleet")).unwrap().is_none());
        assert!(store.list_vms(&ns(), &mci_id("fleet")).unwrap().is_empty());
        assert!(service.list_mci_ids(&ns()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_mci_without_terminate_leaves_provider_alone() {
        let (service, _store, csp) = setup();
        fleet(&service, "fleet", &["vm-1"]).await;

        service
            .delete_mci(&ns(), &mci_id("fleet"), false)
            .await
            .unwrap();

        assert_eq!(csp.vm_count(), 1);
        let err = service.get_mci(&ns(), &mci_id("fleet")).await.unwrap_err();
        assert_eq!(err.http_status_code(), 404);
    }

    #[tokio::test]
    async fn delete_vm_is_best_effort() {
        let (service, store, csp) = setup();
        fleet(&service, "fleet", &["vm-1", "vm-2"]).await;
        csp.fail_vm("ns01-fleet-vm-2");

        let ok = service
            .delete_vm(&ns(), &mci_id("fleet"), &vm_id("vm-1"), true)
            .await
            .unwrap();
        assert_eq!(ok.errors().count(), 0);

        let failed = service
            .delete_vm(&ns(), &mci_id("fleet"), &vm_id("vm-2"), true)
            .await
            .unwrap();
        assert_eq!(failed.errors().count(), 1);

        assert!(store.list_vms(&ns(), &mci_id("fleet")).unwrap().is_empty());
        assert_eq!(
            store.get_mci(&ns(), &mci_id("fleet")).unwrap().unwrap().status,
            FleetStatus::Empty
        );
    }

    #[tokio::test]
    async fn list_mcis_reconciles_each() {
        let (service, _store, _csp) = setup();
        fleet(&service, "alpha", &["vm-1"]).await;
        fleet(&service, "beta", &[]).await;

        let views = service.list_mcis(&ns()).await.unwrap();
        let ids: Vec<_> = views.iter().map(|v| v.id.to_string()).collect();
        assert_eq!(ids, vec!["alpha", "beta"]);
        assert_eq!(views[0].status, FleetStatus::Uniform(VmStatus::Running));
    }

    #[tokio::test]
    async fn missing_vm_is_not_found() {
        let (service, _store, _csp) = setup();
        fleet(&service, "fleet", &[]).await;

        let err = service
            .get_vm(&ns(), &mci_id("fleet"), &vm_id("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::VmNotFound { .. }));
    }
}
