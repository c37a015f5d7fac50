//! Scheduled job endpoints.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use skyfleet_control::ControlPlane;
use skyfleet_core::{JobId, NsId};
use skyfleet_jobs::{CreateJobRequest, JobScheduler, JobStatus, ScheduledJob, UpdateJobRequest};

use crate::error::ApiError;
use crate::state::ApiState;

/// Query parameters for listing jobs.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListJobsQuery {
    /// Only list jobs of this namespace.
    #[serde(default)]
    pub ns_id: Option<String>,
}

/// Response for a job list.
#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    /// The scheduled jobs.
    pub jobs: Vec<ScheduledJob>,
}

/// Response for a deleted job.
#[derive(Debug, Serialize)]
pub struct DeletedJobResponse {
    /// The deleted job.
    pub id: JobId,
    /// Always `Stopped`.
    pub status: JobStatus,
    /// Human-readable confirmation.
    pub message: String,
}

/// Schedule a registration job. Its first execution runs before this
/// returns.
///
/// # Errors
///
/// Returns an error if the request is incomplete or an identical job exists.
pub async fn create_job<C, J>(
    State(state): State<Arc<ApiState<C, J>>>,
    Json(body): Json<CreateJobRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    J: JobScheduler + 'static,
{
    let job = state.jobs.create_job(body).await?;
    Ok(Json(job))
}

/// List scheduled jobs.
///
/// # Errors
///
/// Returns an error if the namespace filter is malformed or the store fails.
pub async fn list_jobs<C, J>(
    State(state): State<Arc<ApiState<C, J>>>,
    Query(query): Query<ListJobsQuery>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    J: JobScheduler + 'static,
{
    let ns_id = query.ns_id.map(NsId::new).transpose()?;
    let jobs = state.jobs.list_jobs(ns_id.as_ref()).await?;
    Ok(Json(ListJobsResponse { jobs }))
}

/// Get a scheduled job.
///
/// # Errors
///
/// Returns an error if the job is not found.
pub async fn get_job<C, J>(
    State(state): State<Arc<ApiState<C, J>>>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    J: JobScheduler + 'static,
{
    let job_id = parse_job_id(&job_id)?;
    Ok(Json(state.jobs.get_job(job_id).await?))
}

/// Change a job's interval or enabled flag.
///
/// # Errors
///
/// Returns an error if the job is not found.
pub async fn update_job<C, J>(
    State(state): State<Arc<ApiState<C, J>>>,
    Path(job_id): Path<String>,
    Json(body): Json<UpdateJobRequest>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    J: JobScheduler + 'static,
{
    let job_id = parse_job_id(&job_id)?;
    Ok(Json(state.jobs.update_job(job_id, body).await?))
}

/// Pause a job.
///
/// # Errors
///
/// Returns an error if the job is not found.
pub async fn pause_job<C, J>(
    State(state): State<Arc<ApiState<C, J>>>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    J: JobScheduler + 'static,
{
    let job_id = parse_job_id(&job_id)?;
    Ok(Json(state.jobs.pause_job(job_id).await?))
}

/// Resume a paused or auto-disabled job.
///
/// # Errors
///
/// Returns an error if the job is not found.
pub async fn resume_job<C, J>(
    State(state): State<Arc<ApiState<C, J>>>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    J: JobScheduler + 'static,
{
    let job_id = parse_job_id(&job_id)?;
    Ok(Json(state.jobs.resume_job(job_id).await?))
}

/// Delete a job.
///
/// # Errors
///
/// Returns an error if the job is not found.
pub async fn delete_job<C, J>(
    State(state): State<Arc<ApiState<C, J>>>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    J: JobScheduler + 'static,
{
    let job_id = parse_job_id(&job_id)?;
    state.jobs.delete_job(job_id).await?;

    Ok(Json(DeletedJobResponse {
        id: job_id,
        status: JobStatus::Stopped,
        message: format!("scheduled job {job_id} deleted"),
    }))
}

/// Delete every job.
///
/// # Errors
///
/// Returns an error if the job list cannot be read.
pub async fn delete_all_jobs<C, J>(
    State(state): State<Arc<ApiState<C, J>>>,
) -> Result<impl IntoResponse, ApiError>
where
    C: ControlPlane + 'static,
    J: JobScheduler + 'static,
{
    Ok(Json(state.jobs.delete_all_jobs().await?))
}

fn parse_job_id(s: &str) -> Result<JobId, ApiError> {
    s.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid job ID: {s}")))
}
