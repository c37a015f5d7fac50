//! Call gateway configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the [`CallGateway`](crate::CallGateway).
#[derive(Debug, Clone, Deserialize)]
pub struct CallConfig {
    /// Total request timeout in seconds.
    #[serde(default = "CallConfig::default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Connect timeout in seconds.
    #[serde(default = "CallConfig::default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Maximum number of identical cacheable requests in flight at once.
    #[serde(default = "CallConfig::default_max_in_flight")]
    pub max_in_flight: usize,

    /// How many times a caller over the in-flight ceiling polls the cache.
    #[serde(default = "CallConfig::default_duplicate_retries")]
    pub duplicate_retries: u32,

    /// Pause between cache polls in milliseconds.
    #[serde(default = "CallConfig::default_duplicate_backoff_ms")]
    pub duplicate_backoff_ms: u64,
}

impl CallConfig {
    const fn default_request_timeout_secs() -> u64 {
        60
    }

    const fn default_connect_timeout_secs() -> u64 {
        5
    }

    const fn default_max_in_flight() -> usize {
        10
    }

    const fn default_duplicate_retries() -> u32 {
        20
    }

    const fn default_duplicate_backoff_ms() -> u64 {
        250
    }

    /// Total request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Connect timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Pause between cache polls.
    #[must_use]
    pub const fn duplicate_backoff(&self) -> Duration {
        Duration::from_millis(self.duplicate_backoff_ms)
    }
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: Self::default_request_timeout_secs(),
            connect_timeout_secs: Self::default_connect_timeout_secs(),
            max_in_flight: Self::default_max_in_flight(),
            duplicate_retries: Self::default_duplicate_retries(),
            duplicate_backoff_ms: Self::default_duplicate_backoff_ms(),
        }
    }
}
