//! Shared state available to all request handlers.

use std::sync::Arc;

use skyfleet_control::ControlPlane;
use skyfleet_jobs::JobScheduler;

use crate::config::ApiConfig;

/// Shared application state for the API.
pub struct ApiState<C, J>
where
    C: ControlPlane,
    J: JobScheduler,
{
    /// The control plane for MCI and VM operations.
    pub control: Arc<C>,
    /// The scheduled job manager.
    pub jobs: Arc<J>,
    /// API configuration.
    pub config: ApiConfig,
}

impl<C, J> ApiState<C, J>
where
    C: ControlPlane,
    J: JobScheduler,
{
    /// Create a new API state.
    #[must_use]
    pub fn new(control: Arc<C>, jobs: Arc<J>, config: ApiConfig) -> Self {
        Self {
            control,
            jobs,
            config,
        }
    }
}

impl<C, J> Clone for ApiState<C, J>
where
    C: ControlPlane,
    J: JobScheduler,
{
    fn clone(&self) -> Self {
        Self {
            control: Arc::clone(&self.control),
            jobs: Arc::clone(&self.jobs),
            config: self.config.clone(),
        }
    }
}
