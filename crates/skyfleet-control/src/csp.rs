//! Client for the CSP gateway.
//!
//! This module provides the `CspClient` trait, the typed boundary over the
//! CSP gateway endpoints, and `HttpCspClient`, its implementation on top of
//! the [`CallGateway`]. Every call carries the connection profile
//! (`ConnectionName`) the VM was created with.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use skyfleet_call::{CallError, CallGateway, Result};
use skyfleet_core::Action;
use skyfleet_store::ProviderVm;

/// How long connection profiles are cached.
const CONNECTION_TTL: Duration = Duration::from_secs(60);

/// Trait for CSP gateway communication.
///
/// This trait abstracts the gateway interface, allowing for mock
/// implementations in tests.
#[async_trait]
pub trait CspClient: Send + Sync {
    /// Provision a VM and return its provider descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway call fails.
    async fn create_vm(&self, request: &CreateVmRequest) -> Result<ProviderVm>;

    /// Terminate a VM.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway call fails.
    async fn terminate_vm(&self, connection: &str, csp_vm_name: &str) -> Result<()>;

    /// Suspend, resume or reboot a VM. `Terminate` is forwarded to
    /// [`CspClient::terminate_vm`].
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway call fails, or for `Create`.
    async fn control_vm(&self, connection: &str, csp_vm_name: &str, action: Action) -> Result<()>;

    /// Return the provider-native status string of a VM.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway call fails.
    async fn vm_status(&self, connection: &str, csp_vm_name: &str) -> Result<String>;

    /// Look up a connection profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway call fails.
    async fn connection(&self, name: &str) -> Result<ConnectionConfig>;

    /// List every connection profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway call fails.
    async fn list_connections(&self) -> Result<Vec<ConnectionConfig>>;

    /// List the provider-native VMs reachable through a connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway call fails.
    async fn list_vms(&self, connection: &str) -> Result<Vec<ProviderVm>>;
}

/// A connection profile: which provider and region calls are routed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConnectionConfig {
    /// Profile name.
    pub config_name: String,
    /// Provider type, e.g. `AWS`.
    pub provider_name: String,
    /// Region of the profile.
    #[serde(default)]
    pub region_name: String,
}

/// Parameters for provisioning a VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateVmRequest {
    /// Connection profile.
    pub connection_name: String,
    /// Name the VM gets on the provider.
    pub csp_vm_name: String,
    /// Image reference.
    pub image_name: String,
    /// Instance spec reference.
    pub spec_name: String,
    /// Virtual network reference.
    pub vpc_name: String,
    /// Subnet reference.
    pub subnet_name: String,
    /// Security group references.
    pub security_group_names: Vec<String>,
    /// SSH key reference.
    pub key_pair_name: String,
    /// Root disk type.
    pub root_disk_type: String,
    /// Root disk size in GB.
    pub root_disk_size: String,
    /// Login account.
    pub vm_user_id: String,
}

// =========================================================================
// Wire format
// =========================================================================

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ConnectionBody<'a> {
    connection_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreateVmBody<'a> {
    connection_name: &'a str,
    req_info: CreateVmInfo<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreateVmInfo<'a> {
    name: &'a str,
    image_name: &'a str,
    #[serde(rename = "VPCName")]
    vpc_name: &'a str,
    subnet_name: &'a str,
    security_group_names: &'a [String],
    #[serde(rename = "VMSpecName")]
    vm_spec_name: &'a str,
    key_pair_name: &'a str,
    root_disk_type: &'a str,
    root_disk_size: &'a str,
    #[serde(rename = "VMUserId")]
    vm_user_id: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Iid {
    #[serde(default)]
    name_id: String,
    #[serde(default)]
    system_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RegionInfo {
    #[serde(default)]
    region: String,
    #[serde(default)]
    zone: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VmInfo {
    #[serde(rename = "IId", default)]
    iid: Iid,
    #[serde(default)]
    region: RegionInfo,
    #[serde(rename = "PublicIP", default)]
    public_ip: String,
    #[serde(rename = "PublicDNS", default)]
    public_dns: String,
    #[serde(rename = "PrivateIP", default)]
    private_ip: String,
    #[serde(rename = "PrivateDNS", default)]
    private_dns: String,
    #[serde(default)]
    root_disk_type: String,
    #[serde(default)]
    root_disk_size: String,
    #[serde(default)]
    root_device_name: String,
    #[serde(rename = "VMUserId", default)]
    vm_user_id: String,
    #[serde(rename = "SSHAccessPoint", default)]
    ssh_access_point: String,
}

impl From<VmInfo> for ProviderVm {
    fn from(info: VmInfo) -> Self {
        Self {
            csp_vm_name: info.iid.name_id,
            csp_vm_id: info.iid.system_id,
            region: info.region.region,
            zone: info.region.zone,
            public_ip: info.public_ip,
            public_dns: info.public_dns,
            private_ip: info.private_ip,
            private_dns: info.private_dns,
            root_disk_type: info.root_disk_type,
            root_disk_size: info.root_disk_size,
            root_device_name: info.root_device_name,
            vm_user_account: info.vm_user_id,
            ssh_access_point: info.ssh_access_point,
        }
    }
}

#[derive(Deserialize)]
struct StatusResponse {
    #[serde(rename = "Status")]
    status: String,
}

#[derive(Deserialize)]
struct ConnectionList {
    #[serde(rename = "connectionconfig", default)]
    connections: Vec<ConnectionConfig>,
}

#[derive(Deserialize)]
struct VmList {
    #[serde(rename = "vm", default)]
    vms: Vec<VmInfo>,
}

/// HTTP client for the CSP gateway.
#[derive(Debug, Clone)]
pub struct HttpCspClient {
    gateway: CallGateway,
    base_url: String,
}

impl HttpCspClient {
    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `gateway` - The call gateway requests go through
    /// * `base_url` - The base URL of the CSP gateway (e.g., "http://spider:1024/spider")
    #[must_use]
    pub fn new(gateway: CallGateway, base_url: impl Into<String>) -> Self {
        Self {
            gateway,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Get the base URL of the CSP gateway.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Join percent-encoded path segments and query pairs onto the base URL.
    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<String> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| CallError::payload(&self.base_url, &e))?;
        url.path_segments_mut()
            .map_err(|()| CallError::Payload {
                url: self.base_url.clone(),
                message: "base URL cannot carry a path".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url.into())
    }
}

#[async_trait]
impl CspClient for HttpCspClient {
    async fn create_vm(&self, request: &CreateVmRequest) -> Result<ProviderVm> {
        let url = self.url(&["vm"], &[])?;
        let body = CreateVmBody {
            connection_name: &request.connection_name,
            req_info: CreateVmInfo {
                name: &request.csp_vm_name,
                image_name: &request.image_name,
                vpc_name: &request.vpc_name,
                subnet_name: &request.subnet_name,
                security_group_names: &request.security_group_names,
                vm_spec_name: &request.spec_name,
                key_pair_name: &request.key_pair_name,
                root_disk_type: &request.root_disk_type,
                root_disk_size: &request.root_disk_size,
                vm_user_id: &request.vm_user_id,
            },
        };

        let info: VmInfo = self.gateway.post(&url, &body).await?;
        tracing::debug!(vm = %request.csp_vm_name, connection = %request.connection_name, "Created VM via CSP gateway");
        Ok(info.into())
    }

    async fn terminate_vm(&self, connection: &str, csp_vm_name: &str) -> Result<()> {
        let url = self.url(&["vm", csp_vm_name], &[])?;
        let body = serde_json::to_value(ConnectionBody {
            connection_name: connection,
        })
        .map_err(|e| CallError::payload(&url, &e))?;

        let _: serde_json::Value = self
            .gateway
            .execute(skyfleet_call::Method::DELETE, &url, Some(body), Duration::ZERO)
            .await?;
        tracing::debug!(vm = %csp_vm_name, connection = %connection, "Terminated VM via CSP gateway");
        Ok(())
    }

    async fn control_vm(&self, connection: &str, csp_vm_name: &str, action: Action) -> Result<()> {
        let verb = match action {
            Action::Terminate => return self.terminate_vm(connection, csp_vm_name).await,
            Action::Suspend => "suspend",
            Action::Resume => "resume",
            Action::Reboot => "reboot",
            Action::Create => {
                return Err(CallError::Payload {
                    url: format!("controlvm/{csp_vm_name}"),
                    message: "Create is not a control action".to_string(),
                })
            }
        };

        let url = self.url(
            &["controlvm", csp_vm_name],
            &[("ConnectionName", connection), ("action", verb)],
        )?;
        let _: serde_json::Value = self.gateway.get(&url, Duration::ZERO).await?;
        tracing::debug!(vm = %csp_vm_name, action = %action, "Controlled VM via CSP gateway");
        Ok(())
    }

    async fn vm_status(&self, connection: &str, csp_vm_name: &str) -> Result<String> {
        let url = self.url(&["vmstatus", csp_vm_name], &[("ConnectionName", connection)])?;
        let response: StatusResponse = self.gateway.get(&url, Duration::ZERO).await?;
        Ok(response.status)
    }

    async fn connection(&self, name: &str) -> Result<ConnectionConfig> {
        let url = self.url(&["connectionconfig", name], &[])?;
        self.gateway.get(&url, CONNECTION_TTL).await
    }

    async fn list_connections(&self) -> Result<Vec<ConnectionConfig>> {
        let url = self.url(&["connectionconfig"], &[])?;
        let list: ConnectionList = self.gateway.get(&url, CONNECTION_TTL).await?;
        Ok(list.connections)
    }

    async fn list_vms(&self, connection: &str) -> Result<Vec<ProviderVm>> {
        let url = self.url(&["allvm"], &[("ConnectionName", connection)])?;
        let list: VmList = self.gateway.get(&url, Duration::ZERO).await?;
        Ok(list.vms.into_iter().map(ProviderVm::from).collect())
    }
}

/// A mock CSP gateway for testing without a real cloud.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};

    /// A mock CSP client that keeps VMs in memory.
    ///
    /// Connections must be registered with [`MockCspClient::add_connection`]
    /// before VMs can be created through them.
    #[derive(Default)]
    pub struct MockCspClient {
        state: Mutex<MockState>,
    }

    #[derive(Default)]
    struct MockState {
        connections: HashMap<String, ConnectionConfig>,
        vms: HashMap<String, MockVm>,
        failing: HashSet<String>,
        status_errors: HashMap<String, CallError>,
        control_calls: usize,
        status_calls: usize,
    }

    struct MockVm {
        connection: String,
        native_status: String,
        provider: ProviderVm,
    }

    fn failure(csp_vm_name: &str) -> CallError {
        CallError::Http {
            status: 500,
            url: format!("mock/vm/{csp_vm_name}"),
            message: format!("injected failure for {csp_vm_name}"),
        }
    }

    fn not_found(csp_vm_name: &str) -> CallError {
        CallError::Http {
            status: 404,
            url: format!("mock/vm/{csp_vm_name}"),
            message: format!("{csp_vm_name} does not exist"),
        }
    }

    impl MockCspClient {
        /// Create a new mock client.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Register a connection profile.
        pub fn add_connection(&self, name: &str, provider: &str, region: &str) {
            self.state.lock().connections.insert(
                name.to_string(),
                ConnectionConfig {
                    config_name: name.to_string(),
                    provider_name: provider.to_string(),
                    region_name: region.to_string(),
                },
            );
        }

        /// Add a provider-native VM that skyfleet did not create.
        pub fn add_native_vm(&self, connection: &str, csp_vm_name: &str, native_status: &str) {
            let provider = self.descriptor(connection, csp_vm_name);
            self.state.lock().vms.insert(
                csp_vm_name.to_string(),
                MockVm {
                    connection: connection.to_string(),
                    native_status: native_status.to_string(),
                    provider,
                },
            );
        }

        /// Make every call for a VM fail.
        pub fn fail_vm(&self, csp_vm_name: &str) {
            self.state.lock().failing.insert(csp_vm_name.to_string());
        }

        /// Make only status reads for a VM fail with `error`.
        pub fn fail_status(&self, csp_vm_name: &str, error: CallError) {
            self.state
                .lock()
                .status_errors
                .insert(csp_vm_name.to_string(), error);
        }

        /// Override the native status of a VM.
        pub fn set_native_status(&self, csp_vm_name: &str, native_status: &str) {
            if let Some(vm) = self.state.lock().vms.get_mut(csp_vm_name) {
                vm.native_status = native_status.to_string();
            }
        }

        /// Number of VMs that exist on the mock provider.
        #[must_use]
        pub fn vm_count(&self) -> usize {
            self.state.lock().vms.len()
        }

        /// Returns true if the VM exists on the mock provider.
        #[must_use]
        pub fn has_vm(&self, csp_vm_name: &str) -> bool {
            self.state.lock().vms.contains_key(csp_vm_name)
        }

        /// Number of control and terminate calls received.
        #[must_use]
        pub fn control_calls(&self) -> usize {
            self.state.lock().control_calls
        }

        /// Number of status reads received.
        #[must_use]
        pub fn status_calls(&self) -> usize {
            self.state.lock().status_calls
        }

        fn descriptor(&self, connection: &str, csp_vm_name: &str) -> ProviderVm {
            let region = self
                .state
                .lock()
                .connections
                .get(connection)
                .map(|c| c.region_name.clone())
                .unwrap_or_default();
            ProviderVm {
                csp_vm_name: csp_vm_name.to_string(),
                csp_vm_id: format!("i-{csp_vm_name}"),
                region,
                zone: String::new(),
                public_ip: "203.0.113.10".to_string(),
                private_ip: "10.0.0.10".to_string(),
                vm_user_account: "cb-user".to_string(),
                ..ProviderVm::default()
            }
        }
    }

    #[async_trait]
    impl CspClient for MockCspClient {
        async fn create_vm(&self, request: &CreateVmRequest) -> Result<ProviderVm> {
            if self.state.lock().failing.contains(&request.csp_vm_name) {
                return Err(failure(&request.csp_vm_name));
            }
            let provider = self.descriptor(&request.connection_name, &request.csp_vm_name);
            self.state.lock().vms.insert(
                request.csp_vm_name.clone(),
                MockVm {
                    connection: request.connection_name.clone(),
                    native_status: "Running".to_string(),
                    provider: provider.clone(),
                },
            );
            Ok(provider)
        }

        async fn terminate_vm(&self, _connection: &str, csp_vm_name: &str) -> Result<()> {
            let mut state = self.state.lock();
            state.control_calls += 1;
            if state.failing.contains(csp_vm_name) {
                return Err(failure(csp_vm_name));
            }
            state
                .vms
                .remove(csp_vm_name)
                .map(|_| ())
                .ok_or_else(|| not_found(csp_vm_name))
        }

        async fn control_vm(
            &self,
            connection: &str,
            csp_vm_name: &str,
            action: Action,
        ) -> Result<()> {
            let native = match action {
                Action::Terminate => return self.terminate_vm(connection, csp_vm_name).await,
                Action::Suspend => "Suspended",
                Action::Resume | Action::Reboot => "Running",
                Action::Create => {
                    return Err(CallError::Payload {
                        url: format!("mock/controlvm/{csp_vm_name}"),
                        message: "Create is not a control action".to_string(),
                    })
                }
            };

            let mut state = self.state.lock();
            state.control_calls += 1;
            if state.failing.contains(csp_vm_name) {
                return Err(failure(csp_vm_name));
            }
            let vm = state
                .vms
                .get_mut(csp_vm_name)
                .ok_or_else(|| not_found(csp_vm_name))?;
            vm.native_status = native.to_string();
            Ok(())
        }

        async fn vm_status(&self, _connection: &str, csp_vm_name: &str) -> Result<String> {
            let mut state = self.state.lock();
            state.status_calls += 1;
            if let Some(error) = state.status_errors.get(csp_vm_name) {
                return Err(error.clone());
            }
            state
                .vms
                .get(csp_vm_name)
                .map(|vm| vm.native_status.clone())
                .ok_or_else(|| not_found(csp_vm_name))
        }

        async fn connection(&self, name: &str) -> Result<ConnectionConfig> {
            self.state
                .lock()
                .connections
                .get(name)
                .cloned()
                .ok_or_else(|| CallError::Http {
                    status: 404,
                    url: format!("mock/connectionconfig/{name}"),
                    message: format!("connection {name} does not exist"),
                })
        }

        async fn list_connections(&self) -> Result<Vec<ConnectionConfig>> {
            let mut connections: Vec<_> =
                self.state.lock().connections.values().cloned().collect();
            connections.sort_by(|a, b| a.config_name.cmp(&b.config_name));
            Ok(connections)
        }

        async fn list_vms(&self, connection: &str) -> Result<Vec<ProviderVm>> {
            let state = self.state.lock();
            if state.failing.contains(connection) {
                return Err(failure(connection));
            }
            let mut vms: Vec<_> = state
                .vms
                .values()
                .filter(|vm| vm.connection == connection)
                .map(|vm| vm.provider.clone())
                .collect();
            vms.sort_by(|a, b| a.csp_vm_name.cmp(&b.csp_vm_name));
            Ok(vms)
        }
    }
}
