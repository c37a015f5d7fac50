//! MCI and VM endpoints.
//!
//! Lifecycle actions are selected with the `action` query parameter on the
//! resource itself: `GET /ns/{ns}/mci/{mci}?action=suspend`. The pseudo
//! action `status` returns the reconciled status view instead of the full
//! record.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use skyfleet_control::{ControlPlane, CreateMciRequest, MciView, VmRequest};
use skyfleet_core::{Action, MciId, NsId, VmId};
use skyfleet_jobs::JobScheduler;

use crate::error::ApiError;
use crate::state::ApiState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Query parameters selecting a lifecycle action.
#[derive(Debug, Default, Deserialize)]
pub struct ActionQuery {
    /// `suspend`, `resume`, `reboot`, `terminate` or `status`.
    #[serde(default)]
    pub action: Option<String>,
    /// Skip transition validation.
    #[serde(default)]
    pub force: bool,
}

/// Query parameters for listing MCIs.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// `id` to list identifiers only.
    #[serde(default)]
    pub option: Option<String>,
}

/// Query parameters for deletions.
#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    /// Terminate provider-side instances before deleting records.
    #[serde(default = "DeleteQuery::default_terminate")]
    pub terminate: bool,
}

impl DeleteQuery {
    const fn default_terminate() -> bool {
        true
    }
}

/// Response for an MCI list.
#[derive(Debug, Serialize)]
pub struct ListMcisResponse {
    /// The MCIs of the namespace.
    pub mci: Vec<MciView>,
}

/// Response for an MCI identifier list.
#[derive(Debug, Serialize)]
pub struct ListIdsResponse {
    /// The MCI identifiers of the namespace.
    pub ids: Vec<MciId>,
}

/// What a request on a resource asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Requested {
    Record,
    Status,
    Control(Action),
}

impl Requested {
    fn parse(action: Option<&str>) -> Result<Self, ApiError> {
        match action.map(str::trim) {
            None | Some("") => Ok(Self::Record),
            Some(s) if s.eq_ignore_ascii_case("status") => Ok(Self::Status),
            Some(s) => s
                .parse::<Action>()
                .map(Self::Control)
                .map_err(|_| ApiError::BadRequest(format!("unknown action: {s}"))),
        }
    }
}

// =============================================================================
// MCI Handlers
// =============================================================================

/// Create an MCI and its VMs.
///
/// Invalid VM requests are reported in `newVmErrors` without failing the
/// request.
///
/// # Errors
///
/// Returns an error if the MCI exists already or the request is malformed.
pub async fn create_mci<C, J>(
    State(state): State<Arc<ApiState<C, J>>>,
    Path(ns_id): Path<String>,
    Json(body): Json<CreateMciRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    J: JobScheduler + 'static,
{
    let ns_id = NsId::new(ns_id)?;
    let view = state.control.create_mci(&ns_id, body).await?;

    Ok(Json(view))
}

/// List the MCIs of a namespace.
///
/// # Errors
///
/// Returns an error if the control plane operation fails.
pub async fn list_mcis<C, J>(
    State(state): State<Arc<ApiState<C, J>>>,
    Path(ns_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError>
where
    C: ControlPlane + 'static,
    J: JobScheduler + 'static,
{
    let ns_id = NsId::new(ns_id)?;

    if query.option.as_deref() == Some("id") {
        let ids = state.control.list_mci_ids(&ns_id).await?;
        return Ok(Json(ListIdsResponse { ids }).into_response());
    }

    let mci = state.control.list_mcis(&ns_id).await?;
    Ok(Json(ListMcisResponse { mci }).into_response())
}

/// Get an MCI, its status, or dispatch a lifecycle action to it.
///
/// # Errors
///
/// Returns an error if the MCI is not found, the action is unknown, or the
/// transition is not allowed.
pub async fn get_mci<C, J>(
    State(state): State<Arc<ApiState<C, J>>>,
    Path((ns_id, mci_id)): Path<(String, String)>,
    Query(query): Query<ActionQuery>,
) -> Result<Response, ApiError>
where
    C: ControlPlane + 'static,
    J: JobScheduler + 'static,
{
    let ns_id = NsId::new(ns_id)?;
    let mci_id = MciId::new(mci_id)?;

    let response = match Requested::parse(query.action.as_deref())? {
        Requested::Record => Json(state.control.get_mci(&ns_id, &mci_id).await?).into_response(),
        Requested::Status => {
            Json(state.control.get_mci_status(&ns_id, &mci_id).await?).into_response()
        }
        Requested::Control(action) => {
            tracing::info!(
                ns_id = %ns_id,
                mci_id = %mci_id,
                action = action.as_str(),
                force = query.force,
                "MCI action requested"
            );
            let outcome = state
                .control
                .control_mci(&ns_id, &mci_id, action, query.force)
                .await?;
            Json(outcome).into_response()
        }
    };

    Ok(response)
}

/// Delete an MCI, terminating its VMs first unless `terminate=false`.
///
/// # Errors
///
/// Returns an error if the MCI is not found.
pub async fn delete_mci<C, J>(
    State(state): State<Arc<ApiState<C, J>>>,
    Path((ns_id, mci_id)): Path<(String, String)>,
    Query(query): Query<DeleteQuery>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    J: JobScheduler + 'static,
{
    let ns_id = NsId::new(ns_id)?;
    let mci_id = MciId::new(mci_id)?;
    let outcome = state
        .control
        .delete_mci(&ns_id, &mci_id, query.terminate)
        .await?;

    Ok(Json(outcome))
}

// =============================================================================
// VM Handlers
// =============================================================================

/// Add a VM, or a sub-group of VMs, to an existing MCI.
///
/// # Errors
///
/// Returns an error if the MCI is not found or does not accept new VMs.
pub async fn add_vm<C, J>(
    State(state): State<Arc<ApiState<C, J>>>,
    Path((ns_id, mci_id)): Path<(String, String)>,
    Json(body): Json<VmRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    J: JobScheduler + 'static,
{
    let ns_id = NsId::new(ns_id)?;
    let mci_id = MciId::new(mci_id)?;
    let view = state.control.add_vms(&ns_id, &mci_id, vec![body]).await?;

    Ok(Json(view))
}

/// Get a VM, its status, or dispatch a lifecycle action to it.
///
/// # Errors
///
/// Returns an error if the VM is not found, the action is unknown, or the
/// transition is not allowed.
pub async fn get_vm<C, J>(
    State(state): State<Arc<ApiState<C, J>>>,
    Path((ns_id, mci_id, vm_id)): Path<(String, String, String)>,
    Query(query): Query<ActionQuery>,
) -> Result<Response, ApiError>
where
    C: ControlPlane + 'static,
    J: JobScheduler + 'static,
{
    let ns_id = NsId::new(ns_id)?;
    let mci_id = MciId::new(mci_id)?;
    let vm_id = VmId::new(vm_id)?;

    let response = match Requested::parse(query.action.as_deref())? {
        Requested::Record => {
            Json(state.control.get_vm(&ns_id, &mci_id, &vm_id).await?).into_response()
        }
        Requested::Status => {
            Json(state.control.get_vm_status(&ns_id, &mci_id, &vm_id).await?).into_response()
        }
        Requested::Control(action) => {
            let outcome = state
                .control
                .control_vm(&ns_id, &mci_id, &vm_id, action, query.force)
                .await?;
            Json(outcome).into_response()
        }
    };

    Ok(response)
}

/// Delete a VM, terminating it first unless `terminate=false`.
///
/// # Errors
///
/// Returns an error if the VM is not found.
pub async fn delete_vm<C, J>(
    State(state): State<Arc<ApiState<C, J>>>,
    Path((ns_id, mci_id, vm_id)): Path<(String, String, String)>,
    Query(query): Query<DeleteQuery>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    J: JobScheduler + 'static,
{
    let ns_id = NsId::new(ns_id)?;
    let mci_id = MciId::new(mci_id)?;
    let vm_id = VmId::new(vm_id)?;
    let outcome = state
        .control
        .delete_vm(&ns_id, &mci_id, &vm_id, query.terminate)
        .await?;

    Ok(Json(outcome))
}
