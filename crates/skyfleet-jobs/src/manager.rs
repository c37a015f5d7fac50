//! The scheduled job manager.
//!
//! Each job owns a timer task that sleeps for the job's interval and then
//! executes it. Job records are read-modify-written under a manager-wide lock
//! that is never held across an await point, so an update racing an
//! execution is never lost.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use skyfleet_core::{JobId, NsId};
use skyfleet_store::{JobStatus, JobType, RecordStore, ScheduledJob, Store};
use tokio::task::JoinHandle;

use crate::config::JobConfig;
use crate::error::{JobError, Result};
use crate::registrar::ResourceRegistrar;
use crate::types::{
    fingerprint, registration_request, CreateJobRequest, DeleteAllReport, UpdateJobRequest,
};

/// Error recorded for executions cut short by a process restart.
const INTERRUPTED: &str = "execution interrupted by a restart";

/// Manages recurring registration jobs.
pub struct JobManager<S: Store + ?Sized, R: ResourceRegistrar + ?Sized> {
    inner: Arc<Inner<S, R>>,
}

impl<S: Store + ?Sized, R: ResourceRegistrar + ?Sized> Clone for JobManager<S, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<S: ?Sized, R: ?Sized> {
    store: Arc<S>,
    registrar: Arc<R>,
    config: JobConfig,
    records: Mutex<()>,
    timers: Mutex<HashMap<JobId, JoinHandle<()>>>,
    running: Mutex<HashSet<JobId>>,
}

/// Releases a job's running slot when its execution ends or is dropped.
struct RunningGuard<'a> {
    running: &'a Mutex<HashSet<JobId>>,
    job_id: JobId,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.running.lock().remove(&self.job_id);
    }
}

/// `from + interval_secs`, or `None` if it overflows.
fn next_after(from: DateTime<Utc>, interval_secs: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(interval_secs).ok()?;
    from.checked_add_signed(TimeDelta::try_seconds(secs)?)
}

/// Record the outcome of an execution on a job.
fn apply_outcome(
    job: &mut ScheduledJob,
    outcome: std::result::Result<String, String>,
    max_consecutive_failures: u32,
) {
    let now = Utc::now();
    job.status = JobStatus::Scheduled;
    job.execution_count += 1;
    job.execution_started_at = None;
    job.last_executed_at = Some(now);
    job.next_execution_at = next_after(now, job.interval_seconds);

    match outcome {
        Ok(summary) => {
            job.success_count += 1;
            job.consecutive_failures = 0;
            job.auto_disabled = false;
            job.last_result = Some(summary);
            job.last_error = None;
        }
        Err(error) => {
            job.failure_count += 1;
            job.consecutive_failures += 1;
            job.last_error = Some(error);
            if job.consecutive_failures >= max_consecutive_failures {
                job.auto_disabled = true;
                job.enabled = false;
                tracing::warn!(
                    job_id = %job.id,
                    failures = job.consecutive_failures,
                    "Disabled job after repeated failures"
                );
            }
        }
    }
}

impl<S, R> Inner<S, R>
where
    S: Store + ?Sized + 'static,
    R: ResourceRegistrar + ?Sized + 'static,
{
    /// Read-modify-write a job record under the records lock.
    fn modify<T>(
        &self,
        job_id: JobId,
        f: impl FnOnce(&mut ScheduledJob) -> T,
    ) -> Result<(ScheduledJob, T)> {
        let _guard = self.records.lock();
        let mut job = self
            .store
            .get_job(&job_id)?
            .ok_or(JobError::NotFound(job_id))?;
        let out = f(&mut job);
        self.store.put_job(&job)?;
        Ok((job, out))
    }

    /// Move a job to `Executing`, unless it is disabled or already running.
    fn begin(&self, job_id: JobId) -> Result<Option<ScheduledJob>> {
        let _guard = self.records.lock();
        let mut job = self
            .store
            .get_job(&job_id)?
            .ok_or(JobError::NotFound(job_id))?;
        if !job.enabled || !self.running.lock().insert(job_id) {
            return Ok(None);
        }
        job.status = JobStatus::Executing;
        job.execution_started_at = Some(Utc::now());
        if let Err(e) = self.store.put_job(&job) {
            self.running.lock().remove(&job_id);
            return Err(e.into());
        }
        Ok(Some(job))
    }

    /// Run one execution of a job.
    ///
    /// Returns false if the job was skipped because it is disabled or
    /// already executing.
    async fn execute(&self, job_id: JobId) -> Result<bool> {
        let Some(job) = self.begin(job_id)? else {
            return Ok(false);
        };
        let _running = RunningGuard {
            running: &self.running,
            job_id,
        };

        tracing::debug!(job_id = %job_id, job_type = job.job_type.as_str(), "Executing job");
        let request = registration_request(&job);
        let timeout = self.config.execution_timeout();
        let outcome =
            match tokio::time::timeout(timeout, self.registrar.register(&request)).await {
                Ok(Ok(report)) => Ok(report.summary()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!(
                    "execution timed out after {}s",
                    self.config.execution_timeout_secs
                )),
            };

        // The slot is released under the records lock so a concurrent read
        // never sees `Executing` without a running execution.
        let (job, ()) = self.modify(job_id, |job| {
            self.running.lock().remove(&job_id);
            apply_outcome(job, outcome, self.config.max_consecutive_failures);
        })?;

        match &job.last_error {
            Some(error) if job.consecutive_failures > 0 => {
                tracing::warn!(job_id = %job_id, error = %error, "Job execution failed");
            }
            _ => tracing::info!(
                job_id = %job_id,
                executions = job.execution_count,
                "Job execution succeeded"
            ),
        }
        Ok(true)
    }

    /// Fail an execution that is recorded as running but is not running in
    /// this process.
    fn settle_interrupted(&self, job: ScheduledJob) -> Result<ScheduledJob> {
        if job.status != JobStatus::Executing {
            return Ok(job);
        }
        let _guard = self.records.lock();
        let mut job = self
            .store
            .get_job(&job.id)?
            .ok_or(JobError::NotFound(job.id))?;
        if job.status != JobStatus::Executing || self.running.lock().contains(&job.id) {
            return Ok(job);
        }
        apply_outcome(
            &mut job,
            Err(INTERRUPTED.to_string()),
            self.config.max_consecutive_failures,
        );
        self.store.put_job(&job)?;
        tracing::warn!(job_id = %job.id, "Marked interrupted execution as failed");
        Ok(job)
    }

    /// Run one execution on its own task.
    ///
    /// The execution completes even if the caller stops waiting for it or
    /// the job's timer is restarted.
    fn spawn_execution(self: &Arc<Self>, job_id: JobId) -> JoinHandle<Result<bool>> {
        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.execute(job_id).await })
    }

    /// Start, or restart, the timer of a job.
    fn arm(self: &Arc<Self>, job_id: JobId, interval_secs: u64) {
        let inner = Arc::clone(self);
        let interval = Duration::from_secs(interval_secs);
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match inner.spawn_execution(job_id).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(JobError::NotFound(_))) => break,
                    Ok(Err(e)) => tracing::error!(job_id = %job_id, error = %e, "Job tick failed"),
                    Err(e) => tracing::error!(job_id = %job_id, error = %e, "Job execution aborted"),
                }
            }
        });
        if let Some(previous) = self.timers.lock().insert(job_id, handle) {
            previous.abort();
        }
    }

    fn disarm(&self, job_id: JobId) {
        if let Some(handle) = self.timers.lock().remove(&job_id) {
            handle.abort();
        }
        self.running.lock().remove(&job_id);
    }
}

impl<S, R> JobManager<S, R>
where
    S: Store + ?Sized + 'static,
    R: ResourceRegistrar + ?Sized + 'static,
{
    /// Create a new job manager.
    #[must_use]
    pub fn new(store: Arc<S>, registrar: Arc<R>, config: JobConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                registrar,
                config,
                records: Mutex::new(()),
                timers: Mutex::new(HashMap::new()),
                running: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Create with default configuration.
    #[must_use]
    pub fn with_defaults(store: Arc<S>, registrar: Arc<R>) -> Self {
        Self::new(store, registrar, JobConfig::default())
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &JobConfig {
        &self.inner.config
    }

    /// Schedule a job.
    ///
    /// An enabled job executes once before this returns; later executions
    /// follow every `interval_seconds`. The job stays scheduled, and its
    /// first execution still completes, if the caller stops waiting.
    ///
    /// # Errors
    ///
    /// Returns `JobError::Validation` for incomplete requests and
    /// `JobError::Duplicate` if a job with the same configuration exists.
    pub async fn create(&self, request: CreateJobRequest) -> Result<ScheduledJob> {
        if request.name_prefix.trim().is_empty() {
            return Err(JobError::Validation("namePrefix is required".into()));
        }
        let connection_name = match request.job_type {
            JobType::RegisterCspResources => match request.connection_name {
                Some(name) if !name.trim().is_empty() => Some(name),
                _ => {
                    return Err(JobError::Validation(
                        "connectionName is required for registerCspResources".into(),
                    ))
                }
            },
            JobType::RegisterCspResourcesAll => None,
        };

        let config_fingerprint = fingerprint(
            request.job_type,
            &request.ns_id,
            connection_name.as_deref(),
            &request.name_prefix,
            &request.option,
            request.mci_flag,
        );
        let interval_seconds = self.inner.config.clamp_interval(request.interval_seconds);
        let now = Utc::now();
        let job = ScheduledJob {
            id: JobId::generate(),
            job_type: request.job_type,
            ns_id: request.ns_id,
            connection_name,
            name_prefix: request.name_prefix,
            option: request.option,
            mci_flag: request.mci_flag,
            interval_seconds,
            enabled: request.enabled,
            status: JobStatus::Scheduled,
            execution_count: 0,
            success_count: 0,
            failure_count: 0,
            consecutive_failures: 0,
            auto_disabled: false,
            created_at: now,
            execution_started_at: None,
            last_executed_at: None,
            next_execution_at: next_after(now, interval_seconds),
            last_error: None,
            last_result: None,
            config_fingerprint,
        };

        {
            let _guard = self.inner.records.lock();
            if let Some(existing) = self
                .inner
                .store
                .list_jobs()?
                .into_iter()
                .find(|j| j.config_fingerprint == job.config_fingerprint)
            {
                return Err(JobError::Duplicate {
                    existing: existing.id,
                });
            }
            self.inner.store.put_job(&job)?;
        }

        tracing::info!(
            job_id = %job.id,
            job_type = job.job_type.as_str(),
            ns_id = %job.ns_id,
            interval_seconds,
            "Scheduled job"
        );

        let first = self.inner.spawn_execution(job.id);
        self.inner.arm(job.id, interval_seconds);
        match first.await {
            Ok(outcome) => {
                outcome?;
            }
            Err(e) => tracing::error!(job_id = %job.id, error = %e, "Job execution aborted"),
        }
        self.get(job.id)
    }

    /// Get a job.
    ///
    /// An execution left `Executing` by a previous process is marked failed.
    ///
    /// # Errors
    ///
    /// Returns `JobError::NotFound` if the job doesn't exist.
    pub fn get(&self, job_id: JobId) -> Result<ScheduledJob> {
        let job = self
            .inner
            .store
            .get_job(&job_id)?
            .ok_or(JobError::NotFound(job_id))?;
        self.inner.settle_interrupted(job)
    }

    /// List jobs, optionally only those of one namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn list(&self, ns_id: Option<&NsId>) -> Result<Vec<ScheduledJob>> {
        self.inner
            .store
            .list_jobs()?
            .into_iter()
            .filter(|job| ns_id.is_none() || ns_id == Some(&job.ns_id))
            .map(|job| self.inner.settle_interrupted(job))
            .collect()
    }

    /// Change a job's interval and/or enabled flag.
    ///
    /// The interval is raised to the configured minimum, and the next
    /// execution is recomputed from the last one. Re-enabling a job resets
    /// its consecutive failure count.
    ///
    /// # Errors
    ///
    /// Returns `JobError::NotFound` if the job doesn't exist.
    pub fn update(&self, job_id: JobId, request: &UpdateJobRequest) -> Result<ScheduledJob> {
        let interval = request
            .interval_seconds
            .map(|secs| self.inner.config.clamp_interval(secs));
        let (job, ()) = self.inner.modify(job_id, |job| {
            if let Some(interval) = interval {
                job.interval_seconds = interval;
                job.next_execution_at =
                    next_after(job.last_executed_at.unwrap_or(job.created_at), interval);
            }
            if let Some(enabled) = request.enabled {
                if enabled && !job.enabled {
                    job.consecutive_failures = 0;
                }
                job.enabled = enabled;
            }
        })?;

        if let Some(interval) = interval {
            self.inner.arm(job_id, interval);
        }
        tracing::info!(
            job_id = %job_id,
            interval_seconds = job.interval_seconds,
            enabled = job.enabled,
            "Updated job"
        );
        Ok(job)
    }

    /// Stop executing a job without losing its state.
    ///
    /// # Errors
    ///
    /// Returns `JobError::NotFound` if the job doesn't exist.
    pub fn pause(&self, job_id: JobId) -> Result<ScheduledJob> {
        self.update(
            job_id,
            &UpdateJobRequest {
                enabled: Some(false),
                ..UpdateJobRequest::default()
            },
        )
    }

    /// Resume executing a paused or auto-disabled job.
    ///
    /// # Errors
    ///
    /// Returns `JobError::NotFound` if the job doesn't exist.
    pub fn resume(&self, job_id: JobId) -> Result<ScheduledJob> {
        self.update(
            job_id,
            &UpdateJobRequest {
                enabled: Some(true),
                ..UpdateJobRequest::default()
            },
        )
    }

    /// Stop a job's timer and remove all of its state.
    ///
    /// # Errors
    ///
    /// Returns `JobError::NotFound` if the job doesn't exist.
    pub fn delete(&self, job_id: JobId) -> Result<()> {
        self.inner.disarm(job_id);
        {
            let _guard = self.inner.records.lock();
            if self.inner.store.get_job(&job_id)?.is_none() {
                return Err(JobError::NotFound(job_id));
            }
            self.inner.store.delete_job(&job_id)?;
        }
        tracing::info!(job_id = %job_id, "Deleted job");
        Ok(())
    }

    /// Delete every job, continuing past individual failures.
    ///
    /// # Errors
    ///
    /// Returns an error only if the job list cannot be read.
    pub fn delete_all(&self) -> Result<DeleteAllReport> {
        let mut report = DeleteAllReport::default();
        let mut failures = Vec::new();
        for job in self.inner.store.list_jobs()? {
            match self.delete(job.id) {
                Ok(()) => report.deleted += 1,
                Err(e) => failures.push(format!("{}: {e}", job.id)),
            }
        }
        if !failures.is_empty() {
            report.warning = Some(format!(
                "failed to delete {} jobs: {}",
                failures.len(),
                failures.join("; ")
            ));
        }
        Ok(report)
    }

    /// Re-arm the timers of every persisted job.
    ///
    /// Call once at start-up. Executions interrupted by the previous process
    /// are marked failed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn restore(&self) -> Result<usize> {
        let jobs = self.inner.store.list_jobs()?;
        for job in jobs.iter().cloned() {
            let job = self.inner.settle_interrupted(job)?;
            self.inner.arm(job.id, job.interval_seconds);
        }
        tracing::info!(count = jobs.len(), "Restored scheduled jobs");
        Ok(jobs.len())
    }
}

/// Trait for scheduled job operations.
///
/// This trait abstracts the job manager, allowing the HTTP surface to be
/// tested against any implementation.
#[async_trait]
pub trait JobScheduler: Send + Sync {
    /// Schedule a job and run its first execution.
    async fn create_job(&self, request: CreateJobRequest) -> Result<ScheduledJob>;

    /// Get a job.
    async fn get_job(&self, job_id: JobId) -> Result<ScheduledJob>;

    /// List jobs, optionally only those of one namespace.
    async fn list_jobs(&self, ns_id: Option<&NsId>) -> Result<Vec<ScheduledJob>>;

    /// Change a job's interval and/or enabled flag.
    async fn update_job(&self, job_id: JobId, request: UpdateJobRequest) -> Result<ScheduledJob>;

    /// Stop executing a job.
    async fn pause_job(&self, job_id: JobId) -> Result<ScheduledJob>;

    /// Resume a paused or auto-disabled job.
    async fn resume_job(&self, job_id: JobId) -> Result<ScheduledJob>;

    /// Delete a job.
    async fn delete_job(&self, job_id: JobId) -> Result<()>;

    /// Delete every job.
    async fn delete_all_jobs(&self) -> Result<DeleteAllReport>;
}

#[async_trait]
impl<S, R> JobScheduler for JobManager<S, R>
where
    S: Store + ?Sized + 'static,
    R: ResourceRegistrar + ?Sized + 'static,
{
    async fn create_job(&self, request: CreateJobRequest) -> Result<ScheduledJob> {
        self.create(request).await
    }

    async fn get_job(&self, job_id: JobId) -> Result<ScheduledJob> {
        self.get(job_id)
    }

    async fn list_jobs(&self, ns_id: Option<&NsId>) -> Result<Vec<ScheduledJob>> {
        self.list(ns_id)
    }

    async fn update_job(&self, job_id: JobId, request: UpdateJobRequest) -> Result<ScheduledJob> {
        self.update(job_id, &request)
    }

    async fn pause_job(&self, job_id: JobId) -> Result<ScheduledJob> {
        self.pause(job_id)
    }

    async fn resume_job(&self, job_id: JobId) -> Result<ScheduledJob> {
        self.resume(job_id)
    }

    async fn delete_job(&self, job_id: JobId) -> Result<()> {
        self.delete(job_id)
    }

    async fn delete_all_jobs(&self) -> Result<DeleteAllReport> {
        self.delete_all()
    }
}
