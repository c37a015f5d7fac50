//! Registration of provider-native VMs.
//!
//! Imports VMs that exist on a provider but were not created through skyfleet
//! into MCIs of a namespace, so they can be observed and controlled like any
//! other member.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use skyfleet_core::ids::MAX_NAME_LEN;
use skyfleet_core::{FleetStatus, MciId, NsId, VmId, VmStatus};
use skyfleet_store::{Mci, ProviderVm, RecordStore, Store, Vm, VmSpec};

use crate::csp::{ConnectionConfig, CspClient};
use crate::error::{ControlError, Result};
use crate::geo::GeoCatalog;
use crate::reconcile;

/// Registration option that skips VM import.
pub const EXCEPT_VM: &str = "exceptVm";

/// What to register and where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    /// Namespace the VMs are registered into.
    pub ns_id: NsId,
    /// Connection to scan; every connection when `None`.
    pub connection_name: Option<String>,
    /// Prefix of the MCI names.
    pub name_prefix: String,
    /// `exceptVm` skips VM import; any other value imports VMs.
    #[serde(default)]
    pub option: String,
    /// Group every registered VM into one MCI named after the prefix.
    /// Otherwise each VM gets its own MCI named `<prefix>-<vm>`.
    #[serde(default)]
    pub mci_flag: bool,
}

/// Outcome of one registration run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationReport {
    /// Connections scanned.
    pub connections: usize,
    /// `mci/vm` paths of the newly registered VMs.
    pub registered: Vec<String>,
    /// VMs skipped because they are already registered.
    pub skipped: usize,
    /// Errors of the connections or VMs that could not be registered.
    pub errors: Vec<String>,
}

impl RegistrationReport {
    /// One-line summary suitable for a job's last result.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "registered {} VMs from {} connections ({} already known, {} errors)",
            self.registered.len(),
            self.connections,
            self.skipped,
            self.errors.len()
        )
    }
}

/// Turn a provider-side name into a valid resource name.
///
/// Lowercases, replaces invalid characters with `-`, collapses repeated
/// dashes and prefixes names that do not start with a letter.
#[must_use]
pub fn sanitize_name(raw: &str) -> String {
    let mut name = String::with_capacity(raw.len());
    for c in raw.chars().map(|c| c.to_ascii_lowercase()) {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() {
            c
        } else {
            '-'
        };
        if c == '-' && (name.is_empty() || name.ends_with('-')) {
            continue;
        }
        name.push(c);
    }
    if !name.starts_with(|c: char| c.is_ascii_lowercase()) {
        name.insert_str(0, "r-");
    }
    name.truncate(MAX_NAME_LEN);
    while name.ends_with('-') {
        name.pop();
    }
    name
}

/// Imports provider-native VMs into the store.
pub struct Registrar<S: Store + ?Sized, C: CspClient + ?Sized> {
    store: Arc<S>,
    csp: Arc<C>,
    geo: GeoCatalog<S>,
}

impl<S, C> Registrar<S, C>
where
    S: Store + ?Sized,
    C: CspClient + ?Sized,
{
    /// Create a registrar over the given store and gateway client.
    #[must_use]
    pub fn new(store: Arc<S>, csp: Arc<C>) -> Self {
        let geo = GeoCatalog::new(Arc::clone(&store));
        Self { store, csp, geo }
    }

    /// Register every unknown VM reachable through the requested connections.
    ///
    /// Per-connection and per-VM failures are collected in the report.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection list cannot be read, if every
    /// scanned connection failed, or if the store fails.
    pub async fn register(&self, request: &RegistrationRequest) -> Result<RegistrationReport> {
        let connections = match &request.connection_name {
            Some(name) => vec![self.csp.connection(name).await?],
            None => self.csp.list_connections().await?,
        };
        let mut report = RegistrationReport {
            connections: connections.len(),
            ..RegistrationReport::default()
        };
        if request.option == EXCEPT_VM {
            return Ok(report);
        }

        let mut known = self.known_provider_ids(&request.ns_id)?;
        let mut touched = BTreeSet::new();
        let mut first_failure = None;
        let mut failed_connections = 0;

        for connection in &connections {
            let native = match self.csp.list_vms(&connection.config_name).await {
                Ok(native) => native,
                Err(e) => {
                    tracing::warn!(
                        connection = %connection.config_name,
                        error = %e,
                        "Failed to list provider VMs"
                    );
                    report
                        .errors
                        .push(format!("connection {}: {e}", connection.config_name));
                    failed_connections += 1;
                    first_failure.get_or_insert(e);
                    continue;
                }
            };

            for provider in native {
                if !known.insert(provider.csp_vm_id.clone()) {
                    report.skipped += 1;
                    continue;
                }
                match self.register_vm(request, connection, provider).await {
                    Ok(vm) => {
                        report.registered.push(format!("{}/{}", vm.mci_id, vm.id));
                        touched.insert(vm.mci_id);
                    }
                    Err(e) => report.errors.push(e.to_string()),
                }
            }
        }

        for mci_id in &touched {
            let (mci, vms) = reconcile::load_mci(self.store.as_ref(), &request.ns_id, mci_id)?;
            reconcile::refresh_mci(self.store.as_ref(), mci, &vms)?;
        }

        if let Some(e) = first_failure.filter(|_| failed_connections == connections.len()) {
            return Err(e.into());
        }

        tracing::info!(
            ns_id = %request.ns_id,
            registered = report.registered.len(),
            skipped = report.skipped,
            errors = report.errors.len(),
            "Registered provider VMs"
        );
        Ok(report)
    }

    /// Provider ids of every VM already registered in the namespace.
    fn known_provider_ids(&self, ns_id: &NsId) -> Result<HashSet<String>> {
        let mut known = HashSet::new();
        for mci in self.store.list_mcis(ns_id)? {
            for vm in self.store.list_vms(ns_id, &mci.id)? {
                if let Some(provider) = vm.provider {
                    known.insert(provider.csp_vm_id);
                }
            }
        }
        Ok(known)
    }

    async fn register_vm(
        &self,
        request: &RegistrationRequest,
        connection: &ConnectionConfig,
        provider: ProviderVm,
    ) -> Result<Vm> {
        let vm_name = sanitize_name(&provider.csp_vm_name);
        let vm_id = VmId::new(vm_name.as_str())?;
        let mci_name = if request.mci_flag {
            sanitize_name(&request.name_prefix)
        } else {
            sanitize_name(&format!("{}-{vm_name}", request.name_prefix))
        };
        let mci_id = MciId::new(mci_name.as_str())?;

        let ns_id = &request.ns_id;
        let now = Utc::now();
        if self.store.get_mci(ns_id, &mci_id)?.is_none() {
            self.store.put_mci(&Mci {
                ns_id: ns_id.clone(),
                id: mci_id.clone(),
                name: mci_name,
                description: format!("Registered from {}", connection.config_name),
                label: std::iter::once(("sys.registered".to_string(), "true".to_string()))
                    .collect(),
                status: FleetStatus::Empty,
                intent: None,
                system_message: None,
                created_at: now,
                updated_at: now,
            })?;
        }
        if self.store.get_vm(ns_id, &mci_id, &vm_id)?.is_some() {
            return Err(ControlError::Conflict(format!("VM {mci_id}/{vm_id}")));
        }

        let location = self
            .geo
            .locate(&connection.provider_name, &provider.region)
            .unwrap_or_else(|e| {
                tracing::warn!(vm_id = %vm_id, error = %e, "Geo-location lookup failed");
                None
            });

        let vm = Vm {
            ns_id: ns_id.clone(),
            mci_id,
            id: vm_id,
            name: provider.csp_vm_name.clone(),
            sub_group: None,
            description: format!("Registered from {}", connection.config_name),
            spec: VmSpec {
                connection_name: connection.config_name.clone(),
                root_disk_type: provider.root_disk_type.clone(),
                root_disk_size: provider.root_disk_size.clone(),
                vm_user_account: provider.vm_user_account.clone(),
                ..VmSpec::default()
            },
            status: VmStatus::Undefined,
            intent: None,
            provider: Some(provider),
            location,
            system_message: None,
            dispatch_failed: false,
            created_at: now,
            updated_at: now,
        };
        self.store.put_vm(&vm)?;

        reconcile::reconcile_vm(self.store.as_ref(), self.csp.as_ref(), vm).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csp::mock::MockCspClient;
    use skyfleet_store::MemoryStore;

    fn ns() -> NsId {
        NsId::new("ns01").unwrap()
    }

    fn request(connection: Option<&str>, mci_flag: bool) -> RegistrationRequest {
        RegistrationRequest {
            ns_id: ns(),
            connection_name: connection.map(str::to_string),
            name_prefix: "imported".into(),
            option: String::new(),
            mci_flag,
        }
    }

    fn setup() -> (Registrar<MemoryStore, MockCspClient>, Arc<MemoryStore>, Arc<MockCspClient>) {
        let store = Arc::new(MemoryStore::new());
        let csp = Arc::new(MockCspClient::new());
        csp.add_connection("aws-east", "aws", "us-east-1");
        csp.add_connection("gcp-asia", "gcp", "asia-northeast3");
        csp.add_native_vm("aws-east", "legacy-web", "Running");
        csp.add_native_vm("aws-east", "Legacy_DB", "Suspended");
        csp.add_native_vm("gcp-asia", "batch", "Running");
        let registrar = Registrar::new(Arc::clone(&store), Arc::clone(&csp));
        (registrar, store, csp)
    }

    #[test]
    fn names_are_sanitized() {
        assert_eq!(sanitize_name("Legacy_DB"), "legacy-db");
        assert_eq!(sanitize_name("--web  01--"), "web-01");
        assert_eq!(sanitize_name("1st"), "r-1st");
        assert!(sanitize_name(&"x".repeat(100)).len() <= MAX_NAME_LEN);
    }

    #[tokio::test]
    async fn registers_one_connection_into_one_mci() {
        let (registrar, store, _csp) = setup();

        let report = registrar.register(&request(Some("aws-east"), true)).await.unwrap();

        assert_eq!(report.connections, 1);
        assert_eq!(report.registered, vec!["imported/legacy-db", "imported/legacy-web"]);
        assert!(report.errors.is_empty());

        let mci_id = MciId::new("imported").unwrap();
        let mci = store.get_mci(&ns(), &mci_id).unwrap().unwrap();
        assert_eq!(
            mci.status,
            FleetStatus::Partial {
                status: VmStatus::Running,
                count: 1,
                total: 2
            }
        );
        let db = store
            .get_vm(&ns(), &mci_id, &VmId::new("legacy-db").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(db.status, VmStatus::Suspended);
        assert_eq!(db.location.unwrap().brief_addr, "Virginia");
    }

    #[tokio::test]
    async fn registration_skips_known_vms() {
        let (registrar, _store, _csp) = setup();

        let first = registrar.register(&request(None, false)).await.unwrap();
        assert_eq!(first.connections, 2);
        assert_eq!(first.registered.len(), 3);
        assert!(first.registered.contains(&"imported-batch/batch".to_string()));

        let second = registrar.register(&request(None, false)).await.unwrap();
        assert!(second.registered.is_empty());
        assert_eq!(second.skipped, 3);
        assert_eq!(second.summary(), "registered 0 VMs from 2 connections (3 already known, 0 errors)");
    }

    #[tokio::test]
    async fn partial_connection_failures_are_reported() {
        let (registrar, _store, csp) = setup();
        csp.fail_vm("gcp-asia");

        let report = registrar.register(&request(None, true)).await.unwrap();

        assert_eq!(report.registered.len(), 2);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("connection gcp-asia"));
    }

    #[tokio::test]
    async fn failing_every_connection_is_an_error() {
        let (registrar, _store, csp) = setup();
        csp.fail_vm("aws-east");

        let err = registrar
            .register(&request(Some("aws-east"), true))
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Gateway(_)));
    }

    #[tokio::test]
    async fn unknown_connection_is_an_error() {
        let (registrar, _store, _csp) = setup();

        let err = registrar
            .register(&request(Some("azure-west"), true))
            .await
            .unwrap_err();
        assert_eq!(err.http_status_code(), 502);
    }

    #[tokio::test]
    async fn except_vm_registers_nothing() {
        let (registrar, store, _csp) = setup();
        let mut request = request(None, true);
        request.option = EXCEPT_VM.to_string();

        let report = registrar.register(&request).await.unwrap();

        assert!(report.registered.is_empty());
        assert!(store.list_mcis(&ns()).unwrap().is_empty());
    }
}
