//! Error types for scheduled jobs.

use skyfleet_core::JobId;
use thiserror::Error;

/// A result type using `JobError`.
pub type Result<T> = std::result::Result<T, JobError>;

/// Errors that can occur in job management.
#[derive(Debug, Error)]
pub enum JobError {
    /// A request field is missing or malformed.
    #[error("invalid job request: {0}")]
    Validation(String),

    /// The requested job was not found.
    #[error("scheduled job not found: {0}")]
    NotFound(JobId),

    /// A job with the same configuration is already scheduled.
    #[error("an identical job is already scheduled: {existing}")]
    Duplicate {
        /// The job sharing the configuration.
        existing: JobId,
    },

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] skyfleet_store::StoreError),
}

impl JobError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::Duplicate { .. } => 409,
            Self::Store(_) => 500,
        }
    }
}
