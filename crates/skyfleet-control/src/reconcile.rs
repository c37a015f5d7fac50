//! Status reconciliation.
//!
//! Statuses are never trusted from the store alone: every status read asks
//! the CSP gateway for the live native status of each member, maps it onto
//! the canonical set, disambiguates it with the intent in flight and then
//! aggregates the fleet status from the results.

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use skyfleet_core::{FleetStatus, MciId, NsId, VmStatus};
use skyfleet_store::{Mci, RecordStore, Store, Vm};

use crate::csp::CspClient;
use crate::error::{ControlError, Result};
use crate::lifecycle;

/// Native status reported for VMs the gateway does not know.
const NOT_EXIST: &str = "NotExist";

/// Number of fleet members in each canonical status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct StatusCount {
    pub total: usize,
    pub creating: usize,
    pub running: usize,
    pub suspending: usize,
    pub suspended: usize,
    pub resuming: usize,
    pub rebooting: usize,
    pub terminating: usize,
    pub terminated: usize,
    pub failed: usize,
    pub undefined: usize,
}

impl StatusCount {
    /// Count the given statuses.
    #[must_use]
    pub fn from_statuses(statuses: impl IntoIterator<Item = VmStatus>) -> Self {
        let mut count = Self::default();
        for status in statuses {
            *count.slot(status) += 1;
            count.total += 1;
        }
        count
    }

    /// Number of members in `status`.
    #[must_use]
    pub const fn get(&self, status: VmStatus) -> usize {
        match status {
            VmStatus::Creating => self.creating,
            VmStatus::Running => self.running,
            VmStatus::Suspending => self.suspending,
            VmStatus::Suspended => self.suspended,
            VmStatus::Resuming => self.resuming,
            VmStatus::Rebooting => self.rebooting,
            VmStatus::Terminating => self.terminating,
            VmStatus::Terminated => self.terminated,
            VmStatus::Failed => self.failed,
            VmStatus::Undefined => self.undefined,
        }
    }

    fn slot(&mut self, status: VmStatus) -> &mut usize {
        match status {
            VmStatus::Creating => &mut self.creating,
            VmStatus::Running => &mut self.running,
            VmStatus::Suspending => &mut self.suspending,
            VmStatus::Suspended => &mut self.suspended,
            VmStatus::Resuming => &mut self.resuming,
            VmStatus::Rebooting => &mut self.rebooting,
            VmStatus::Terminating => &mut self.terminating,
            VmStatus::Terminated => &mut self.terminated,
            VmStatus::Failed => &mut self.failed,
            VmStatus::Undefined => &mut self.undefined,
        }
    }
}

/// Aggregate member statuses into a fleet status.
///
/// `Failed` members take priority over `Undefined` ones, which take priority
/// over the majority status. Majority ties resolve to the status that comes
/// first in canonical order.
#[must_use]
pub fn aggregate(statuses: &[VmStatus]) -> FleetStatus {
    let total = statuses.len();
    if total == 0 {
        return FleetStatus::Empty;
    }

    let counts = StatusCount::from_statuses(statuses.iter().copied());
    if counts.failed > 0 {
        return FleetStatus::Failed {
            count: counts.failed,
            total,
        };
    }
    if counts.undefined > 0 {
        return FleetStatus::Undefined {
            count: counts.undefined,
            total,
        };
    }

    let mut majority = (VmStatus::ALL[0], 0);
    for status in VmStatus::ALL {
        let count = counts.get(status);
        if count > majority.1 {
            majority = (status, count);
        }
    }

    let (status, count) = majority;
    if count == total {
        FleetStatus::Uniform(status)
    } else {
        FleetStatus::Partial {
            status,
            count,
            total,
        }
    }
}

/// Reconcile one VM against the CSP gateway and persist any change.
///
/// VMs that never reached the provider, VMs that are terminated with no
/// operation in flight, and VMs whose last dispatched action failed are
/// returned unchanged without a gateway call.
///
/// # Errors
///
/// Returns an error only if persisting the VM fails. Gateway errors are
/// folded into the VM status.
pub async fn reconcile_vm<S, C>(store: &S, csp: &C, mut vm: Vm) -> Result<Vm>
where
    S: Store + ?Sized,
    C: CspClient + ?Sized,
{
    let Some(provider) = vm.provider.as_ref() else {
        return Ok(vm);
    };
    if vm.intent.is_none() && (vm.status == VmStatus::Terminated || vm.dispatch_failed) {
        return Ok(vm);
    }

    let mut system_message = vm.system_message.clone();
    let native = match csp
        .vm_status(&vm.spec.connection_name, &provider.csp_vm_name)
        .await
    {
        Ok(native) => native,
        Err(e) if e.is_not_found() => NOT_EXIST.to_string(),
        Err(e) => {
            tracing::warn!(vm_id = %vm.id, error = %e, "Failed to read VM status");
            system_message = Some(e.to_string());
            VmStatus::Failed.as_str().to_string()
        }
    };

    let status = lifecycle::disambiguate(VmStatus::from_native(&native), vm.intent.as_ref());
    let intent = lifecycle::settle(status, vm.intent);

    if status != vm.status || intent != vm.intent || system_message != vm.system_message {
        tracing::debug!(
            vm_id = %vm.id,
            from = %vm.status,
            to = %status,
            native = %native,
            "Reconciled VM status"
        );
        vm.status = status;
        vm.intent = intent;
        vm.system_message = system_message;
        vm.updated_at = Utc::now();
        store.put_vm(&vm)?;
    }
    Ok(vm)
}

/// Recompute the fleet status from already reconciled members.
///
/// Clears the fleet intent once no member has an operation in flight, and
/// persists the MCI if anything changed.
///
/// # Errors
///
/// Returns an error if persisting the MCI fails.
pub fn refresh_mci<S: Store + ?Sized>(store: &S, mut mci: Mci, vms: &[Vm]) -> Result<Mci> {
    let statuses: Vec<VmStatus> = vms.iter().map(|vm| vm.status).collect();
    let status = aggregate(&statuses);
    let intent = if vms.iter().all(|vm| vm.intent.is_none()) {
        None
    } else {
        mci.intent
    };

    if status != mci.status || intent != mci.intent {
        mci.status = status;
        mci.intent = intent;
        mci.updated_at = Utc::now();
        store.put_mci(&mci)?;
    }
    Ok(mci)
}

/// Load an MCI and its members without reconciling them.
///
/// # Errors
///
/// Returns `ControlError::MciNotFound` if the MCI does not exist.
pub fn load_mci<S: Store + ?Sized>(
    store: &S,
    ns_id: &NsId,
    mci_id: &MciId,
) -> Result<(Mci, Vec<Vm>)> {
    let mci = store
        .get_mci(ns_id, mci_id)?
        .ok_or_else(|| ControlError::MciNotFound {
            ns_id: ns_id.clone(),
            mci_id: mci_id.clone(),
        })?;
    let vms = store.list_vms(ns_id, mci_id)?;
    Ok((mci, vms))
}

/// Reconcile every member of an MCI concurrently, then the MCI itself.
///
/// # Errors
///
/// Returns `ControlError::MciNotFound` if the MCI does not exist, or a store
/// error if persisting fails.
pub async fn reconcile_mci<S, C>(
    store: &S,
    csp: &C,
    ns_id: &NsId,
    mci_id: &MciId,
) -> Result<(Mci, Vec<Vm>)>
where
    S: Store + ?Sized,
    C: CspClient + ?Sized,
{
    let (mci, vms) = load_mci(store, ns_id, mci_id)?;
    let vms = join_all(vms.into_iter().map(|vm| reconcile_vm(store, csp, vm)))
        .await
        .into_iter()
        .collect::<Result<Vec<_>>>()?;
    let mci = refresh_mci(store, mci, &vms)?;
    Ok((mci, vms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csp::mock::MockCspClient;
    use skyfleet_call::CallError;
    use skyfleet_core::{Action, Intent, VmId};
    use skyfleet_store::{MemoryStore, ProviderVm, VmSpec};

    fn ns() -> NsId {
        NsId::new("ns01").unwrap()
    }

    fn mci_id() -> MciId {
        MciId::new("fleet").unwrap()
    }

    fn mci() -> Mci {
        let now = Utc::now();
        Mci {
            ns_id: ns(),
            id: mci_id(),
            name: "fleet".into(),
            description: String::new(),
            label: std::collections::BTreeMap::new(),
            status: FleetStatus::Empty,
            intent: None,
            system_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn vm(id: &str, status: VmStatus, intent: Option<Intent>) -> Vm {
        let now = Utc::now();
        Vm {
            ns_id: ns(),
            mci_id: mci_id(),
            id: VmId::new(id).unwrap(),
            name: id.into(),
            sub_group: None,
            description: String::new(),
            spec: VmSpec {
                connection_name: "aws-east".into(),
                ..VmSpec::default()
            },
            status,
            intent,
            provider: Some(ProviderVm {
                csp_vm_name: format!("csp-{id}"),
                csp_vm_id: format!("i-csp-{id}"),
                ..ProviderVm::default()
            }),
            location: None,
            system_message: None,
            dispatch_failed: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn aggregation_priorities() {
        use VmStatus::*;

        assert_eq!(aggregate(&[]), FleetStatus::Empty);
        assert_eq!(
            aggregate(&[Running, Running, Failed]),
            FleetStatus::Failed { count: 1, total: 3 }
        );
        assert_eq!(
            aggregate(&[Running, Undefined, Suspended]),
            FleetStatus::Undefined { count: 1, total: 3 }
        );
        assert_eq!(
            aggregate(&[Failed, Undefined]),
            FleetStatus::Failed { count: 1, total: 2 }
        );
        assert_eq!(aggregate(&[Running, Running]), FleetStatus::Uniform(Running));
        assert_eq!(
            aggregate(&[Suspended, Running, Suspended]),
            FleetStatus::Partial {
                status: Suspended,
                count: 2,
                total: 3
            }
        );
    }

    #[test]
    fn majority_ties_follow_canonical_order() {
        use VmStatus::*;

        assert_eq!(
            aggregate(&[Suspended, Running]),
            FleetStatus::Partial {
                status: Running,
                count: 1,
                total: 2
            }
        );
        assert_eq!(
            aggregate(&[Terminated, Creating, Terminated, Creating]),
            FleetStatus::Partial {
                status: Creating,
                count: 2,
                total: 4
            }
        );
    }

    #[test]
    fn aggregated_proportions_are_bounded() {
        use VmStatus::*;

        let samples: [&[VmStatus]; 4] = [
            &[Running, Suspended, Suspended, Rebooting],
            &[Failed, Failed, Failed],
            &[Undefined, Creating],
            &[Terminated],
        ];
        for statuses in samples {
            let status = aggregate(statuses);
            if let Some((count, total)) = status.proportion() {
                assert!(count <= total, "{status}");
                assert_eq!(total, statuses.len());
            }
            assert_eq!(status.to_string().parse::<FleetStatus>().unwrap(), status);
        }
    }

    #[test]
    fn status_count_totals() {
        let count = StatusCount::from_statuses([
            VmStatus::Running,
            VmStatus::Running,
            VmStatus::Failed,
        ]);
        assert_eq!(count.total, 3);
        assert_eq!(count.get(VmStatus::Running), 2);
        assert_eq!(count.get(VmStatus::Failed), 1);
        assert_eq!(count.get(VmStatus::Suspended), 0);
    }

    #[tokio::test]
    async fn reconcile_settles_reached_intent() {
        let store = MemoryStore::new();
        let csp = MockCspClient::new();
        csp.add_native_vm("aws-east", "csp-vm-1", "Suspended");

        let suspending = vm("vm-1", VmStatus::Suspending, Some(Intent::for_action(Action::Suspend)));
        let reconciled = reconcile_vm(&store, &csp, suspending).await.unwrap();

        assert_eq!(reconciled.status, VmStatus::Suspended);
        assert_eq!(reconciled.intent, None);
        let stored = store.get_vm(&ns(), &mci_id(), &reconciled.id).unwrap().unwrap();
        assert_eq!(stored.status, VmStatus::Suspended);
    }

    #[tokio::test]
    async fn reconcile_is_idempotent() {
        let store = MemoryStore::new();
        let csp = MockCspClient::new();
        csp.add_native_vm("aws-east", "csp-vm-1", "Running");

        let first = reconcile_vm(&store, &csp, vm("vm-1", VmStatus::Creating, None))
            .await
            .unwrap();
        let second = reconcile_vm(&store, &csp, first.clone()).await.unwrap();

        assert_eq!(first.status, VmStatus::Running);
        assert_eq!(second.status, first.status);
        assert_eq!(second.intent, None);
        assert_eq!(second.updated_at, first.updated_at);
    }

    #[tokio::test]
    async fn missing_vm_under_terminate_is_terminated() {
        let store = MemoryStore::new();
        let csp = MockCspClient::new();

        let terminating = vm(
            "vm-1",
            VmStatus::Terminating,
            Some(Intent::for_action(Action::Terminate)),
        );
        let reconciled = reconcile_vm(&store, &csp, terminating).await.unwrap();

        assert_eq!(reconciled.status, VmStatus::Terminated);
        assert_eq!(reconciled.intent, None);
        assert_eq!(reconciled.system_message, None);
    }

    #[tokio::test]
    async fn gateway_errors_mark_the_vm_failed() {
        let store = MemoryStore::new();
        let csp = MockCspClient::new();
        csp.add_native_vm("aws-east", "csp-vm-1", "Running");
        csp.fail_status(
            "csp-vm-1",
            CallError::Http {
                status: 500,
                url: "spider/vmstatus/csp-vm-1".into(),
                message: "provider timeout".into(),
            },
        );

        let reconciled = reconcile_vm(&store, &csp, vm("vm-1", VmStatus::Running, None))
            .await
            .unwrap();

        assert_eq!(reconciled.status, VmStatus::Failed);
        assert!(reconciled
            .system_message
            .as_deref()
            .is_some_and(|m| m.contains("provider timeout")));
    }

    #[tokio::test]
    async fn unreachable_and_settled_vms_are_not_queried() {
        let store = MemoryStore::new();
        let csp = MockCspClient::new();

        let mut never_created = vm("vm-1", VmStatus::Failed, None);
        never_created.provider = None;
        let terminated = vm("vm-2", VmStatus::Terminated, None);

        let a = reconcile_vm(&store, &csp, never_created).await.unwrap();
        let b = reconcile_vm(&store, &csp, terminated).await.unwrap();

        assert_eq!(a.status, VmStatus::Failed);
        assert_eq!(b.status, VmStatus::Terminated);
        assert_eq!(csp.status_calls(), 0);
    }

    #[tokio::test]
    async fn failed_dispatch_survives_reconciliation() {
        let store = MemoryStore::new();
        let csp = MockCspClient::new();
        csp.add_native_vm("aws-east", "csp-vm-1", "Running");

        let mut rejected = vm("vm-1", VmStatus::Failed, None);
        rejected.dispatch_failed = true;
        rejected.system_message = Some("suspend rejected".into());
        let reconciled = reconcile_vm(&store, &csp, rejected).await.unwrap();

        assert_eq!(reconciled.status, VmStatus::Failed);
        assert_eq!(reconciled.system_message.as_deref(), Some("suspend rejected"));
        assert_eq!(csp.status_calls(), 0);
    }

    #[tokio::test]
    async fn gateway_failures_recover_on_the_next_read() {
        let store = MemoryStore::new();
        let csp = MockCspClient::new();
        csp.add_native_vm("aws-east", "csp-vm-1", "Running");

        let mut failed = vm("vm-1", VmStatus::Failed, None);
        failed.system_message = Some("provider timeout".into());
        let reconciled = reconcile_vm(&store, &csp, failed).await.unwrap();

        assert_eq!(reconciled.status, VmStatus::Running);
        assert_eq!(csp.status_calls(), 1);
    }

    #[tokio::test]
    async fn fleet_reconciliation_clears_intent_when_members_converge() {
        let store = MemoryStore::new();
        let csp = MockCspClient::new();
        let resume = Intent::for_action(Action::Resume);

        let mut fleet = mci();
        fleet.intent = Some(resume);
        fleet.status = FleetStatus::Uniform(VmStatus::Resuming);
        store.put_mci(&fleet).unwrap();
        for id in ["vm-1", "vm-2"] {
            csp.add_native_vm("aws-east", &format!("csp-{id}"), "Running");
            store.put_vm(&vm(id, VmStatus::Resuming, Some(resume))).unwrap();
        }

        let (fleet, vms) = reconcile_mci(&store, &csp, &ns(), &mci_id()).await.unwrap();

        assert_eq!(fleet.status, FleetStatus::Uniform(VmStatus::Running));
        assert_eq!(fleet.intent, None);
        assert!(vms.iter().all(|vm| vm.intent.is_none()));
        assert_eq!(
            store.get_mci(&ns(), &mci_id()).unwrap().unwrap().status,
            FleetStatus::Uniform(VmStatus::Running)
        );
    }

    #[tokio::test]
    async fn fleet_intent_survives_while_a_member_is_in_flight() {
        let store = MemoryStore::new();
        let csp = MockCspClient::new();
        let suspend = Intent::for_action(Action::Suspend);

        let mut fleet = mci();
        fleet.intent = Some(suspend);
        store.put_mci(&fleet).unwrap();
        csp.add_native_vm("aws-east", "csp-vm-1", "Suspended");
        csp.add_native_vm("aws-east", "csp-vm-2", "Suspending");
        store.put_vm(&vm("vm-1", VmStatus::Suspending, Some(suspend))).unwrap();
        store.put_vm(&vm("vm-2", VmStatus::Suspending, Some(suspend))).unwrap();

        let (fleet, _) = reconcile_mci(&store, &csp, &ns(), &mci_id()).await.unwrap();

        assert_eq!(fleet.intent, Some(suspend));
        assert_eq!(
            fleet.status,
            FleetStatus::Partial {
                status: VmStatus::Suspending,
                count: 1,
                total: 2
            }
        );
    }

    #[tokio::test]
    async fn missing_fleet_is_not_found() {
        let store = MemoryStore::new();
        let csp = MockCspClient::new();

        let err = reconcile_mci(&store, &csp, &ns(), &mci_id()).await.unwrap_err();
        assert!(matches!(err, ControlError::MciNotFound { .. }));
    }
}
