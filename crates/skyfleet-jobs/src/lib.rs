//! Scheduled registration jobs for skyfleet.
//!
//! A job periodically registers resources that already exist at a cloud
//! provider into a namespace. Jobs are persisted in the store, survive
//! restarts via [`JobManager::restore`], and disable themselves after a run
//! of consecutive failures.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use skyfleet_jobs::{CreateJobRequest, JobManager, JobType};
//! # use skyfleet_jobs::ResourceRegistrar;
//! # use skyfleet_store::MemoryStore;
//!
//! # async fn example<R: ResourceRegistrar + 'static>(registrar: Arc<R>) -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStore::new());
//! let jobs = JobManager::with_defaults(store, registrar);
//! jobs.restore()?;
//!
//! let job = jobs
//!     .create(CreateJobRequest {
//!         job_type: JobType::RegisterCspResourcesAll,
//!         ns_id: "default".parse()?,
//!         connection_name: None,
//!         name_prefix: "imported".into(),
//!         option: String::new(),
//!         mci_flag: true,
//!         interval_seconds: 3600,
//!         enabled: true,
//!     })
//!     .await?;
//! println!("job {} ran {} times", job.id, job.execution_count);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod manager;
pub mod registrar;
pub mod types;

pub use config::JobConfig;
pub use error::{JobError, Result};
pub use manager::{JobManager, JobScheduler};
pub use registrar::ResourceRegistrar;
pub use types::{CreateJobRequest, DeleteAllReport, UpdateJobRequest};

#[cfg(any(test, feature = "test-utils"))]
pub use registrar::mock::MockRegistrar;

pub use skyfleet_core::JobId;
pub use skyfleet_store::{JobStatus, JobType, ScheduledJob};
