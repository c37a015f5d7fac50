//! The registration use case a job executes.

use async_trait::async_trait;
use skyfleet_control::{CspClient, Registrar, RegistrationReport, RegistrationRequest};
use skyfleet_store::Store;

/// Trait for the work a scheduled job performs.
///
/// This trait abstracts the control plane's registrar, allowing for mock
/// implementations in tests.
#[async_trait]
pub trait ResourceRegistrar: Send + Sync {
    /// Register provider-native resources.
    ///
    /// # Errors
    ///
    /// Returns an error if the registration failed as a whole.
    async fn register(
        &self,
        request: &RegistrationRequest,
    ) -> skyfleet_control::Result<RegistrationReport>;
}

#[async_trait]
impl<S, C> ResourceRegistrar for Registrar<S, C>
where
    S: Store + ?Sized + 'static,
    C: CspClient + ?Sized + 'static,
{
    async fn register(
        &self,
        request: &RegistrationRequest,
    ) -> skyfleet_control::Result<RegistrationReport> {
        Registrar::register(self, request).await
    }
}

/// A mock registrar for testing the scheduler without a CSP gateway.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;
    use skyfleet_control::ControlError;
    use std::time::Duration;

    /// A registrar that records requests and returns canned outcomes.
    #[derive(Default)]
    pub struct MockRegistrar {
        state: Mutex<MockState>,
    }

    #[derive(Default)]
    struct MockState {
        requests: Vec<RegistrationRequest>,
        failing: bool,
        delay: Option<Duration>,
    }

    impl MockRegistrar {
        /// Create a new mock registrar.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every following registration fail, or succeed again.
        pub fn set_failing(&self, failing: bool) {
            self.state.lock().failing = failing;
        }

        /// Delay every following registration.
        pub fn set_delay(&self, delay: Duration) {
            self.state.lock().delay = Some(delay);
        }

        /// Number of registrations received.
        #[must_use]
        pub fn calls(&self) -> usize {
            self.state.lock().requests.len()
        }

        /// The last registration received.
        #[must_use]
        pub fn last_request(&self) -> Option<RegistrationRequest> {
            self.state.lock().requests.last().cloned()
        }
    }

    #[async_trait]
    impl ResourceRegistrar for MockRegistrar {
        async fn register(
            &self,
            request: &RegistrationRequest,
        ) -> skyfleet_control::Result<RegistrationReport> {
            let (failing, delay) = {
                let mut state = self.state.lock();
                state.requests.push(request.clone());
                (state.failing, state.delay)
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if failing {
                return Err(ControlError::Internal("injected registration failure".into()));
            }
            Ok(RegistrationReport {
                connections: 1,
                registered: vec![format!("{}/vm-1", request.name_prefix)],
                ..RegistrationReport::default()
            })
        }
    }
}
