//! Job manager configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the scheduled job manager.
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// Consecutive failures after which a job disables itself.
    #[serde(default = "JobConfig::default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Longest an execution may run before it is marked failed.
    #[serde(default = "JobConfig::default_execution_timeout_secs")]
    pub execution_timeout_secs: u64,

    /// Shortest allowed interval between executions.
    #[serde(default = "JobConfig::default_min_interval_secs")]
    pub min_interval_secs: u64,
}

impl JobConfig {
    const fn default_max_consecutive_failures() -> u32 {
        5
    }

    const fn default_execution_timeout_secs() -> u64 {
        30 * 60
    }

    const fn default_min_interval_secs() -> u64 {
        10
    }

    /// Execution timeout as a [`Duration`].
    #[must_use]
    pub const fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }

    /// Raise `interval_secs` to the configured minimum.
    #[must_use]
    pub fn clamp_interval(&self, interval_secs: u64) -> u64 {
        interval_secs.max(self.min_interval_secs)
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: Self::default_max_consecutive_failures(),
            execution_timeout_secs: Self::default_execution_timeout_secs(),
            min_interval_secs: Self::default_min_interval_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = JobConfig::default();
        assert_eq!(config.max_consecutive_failures, 5);
        assert_eq!(config.execution_timeout(), Duration::from_secs(1800));
        assert_eq!(config.clamp_interval(3), 10);
        assert_eq!(config.clamp_interval(600), 600);
    }

    #[test]
    fn partial_config_uses_defaults() {
        let config: JobConfig = serde_json::from_str(r#"{"min_interval_secs": 30}"#).unwrap();
        assert_eq!(config.min_interval_secs, 30);
        assert_eq!(config.max_consecutive_failures, 5);
    }
}
