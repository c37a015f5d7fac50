//! Request and response types for scheduled jobs.

use serde::{Deserialize, Serialize};
use skyfleet_control::RegistrationRequest;
use skyfleet_core::NsId;
use skyfleet_store::{JobType, ScheduledJob};

/// Request to schedule a registration job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    /// Registration kind.
    pub job_type: JobType,
    /// Namespace the registered resources land in.
    pub ns_id: NsId,
    /// Connection to register from. Required for `registerCspResources`,
    /// ignored for `registerCspResourcesAll`.
    #[serde(default)]
    pub connection_name: Option<String>,
    /// Prefix of the MCI names.
    pub name_prefix: String,
    /// Registration option.
    #[serde(default)]
    pub option: String,
    /// Group every registered VM into one MCI.
    #[serde(default)]
    pub mci_flag: bool,
    /// Seconds between executions.
    pub interval_seconds: u64,
    /// Whether the job starts enabled.
    #[serde(default = "CreateJobRequest::default_enabled")]
    pub enabled: bool,
}

impl CreateJobRequest {
    const fn default_enabled() -> bool {
        true
    }
}

/// Request to change a job. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateJobRequest {
    /// New interval in seconds.
    #[serde(default)]
    pub interval_seconds: Option<u64>,
    /// New enabled flag.
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// Result of deleting every job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAllReport {
    /// Number of jobs deleted.
    pub deleted: usize,
    /// Aggregated failures, if any job could not be deleted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Fingerprint a job configuration.
///
/// Each field is hashed with its length prefixed so that shifting characters
/// between adjacent fields changes the digest.
#[must_use]
pub fn fingerprint(
    job_type: JobType,
    ns_id: &NsId,
    connection_name: Option<&str>,
    name_prefix: &str,
    option: &str,
    mci_flag: bool,
) -> String {
    let mut hasher = blake3::Hasher::new();
    for field in [
        job_type.as_str(),
        ns_id.as_str(),
        connection_name.unwrap_or_default(),
        name_prefix,
        option,
        if mci_flag { "true" } else { "false" },
    ] {
        hasher.update(&(field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize().as_bytes())
}

/// The registration a job performs on every execution.
#[must_use]
pub fn registration_request(job: &ScheduledJob) -> RegistrationRequest {
    RegistrationRequest {
        ns_id: job.ns_id.clone(),
        connection_name: match job.job_type {
            JobType::RegisterCspResources => job.connection_name.clone(),
            JobType::RegisterCspResourcesAll => None,
        },
        name_prefix: job.name_prefix.clone(),
        option: job.option.clone(),
        mci_flag: job.mci_flag,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns() -> NsId {
        NsId::new("ns01").unwrap()
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let a = fingerprint(JobType::RegisterCspResources, &ns(), Some("aws"), "imp", "", true);
        let b = fingerprint(JobType::RegisterCspResources, &ns(), Some("aws"), "imp", "", true);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn fingerprint_separates_fields() {
        let a = fingerprint(JobType::RegisterCspResources, &ns(), Some("aws"), "imp", "", true);
        let shifted = fingerprint(JobType::RegisterCspResources, &ns(), Some("aw"), "simp", "", true);
        let flag = fingerprint(JobType::RegisterCspResources, &ns(), Some("aws"), "imp", "", false);
        let kind = fingerprint(JobType::RegisterCspResourcesAll, &ns(), Some("aws"), "imp", "", true);
        assert_ne!(a, shifted);
        assert_ne!(a, flag);
        assert_ne!(a, kind);
    }

    #[test]
    fn create_request_defaults_to_enabled() {
        let request: CreateJobRequest = serde_json::from_str(
            r#"{"jobType":"registerCspResourcesAll","nsId":"ns01","namePrefix":"imp","intervalSeconds":60}"#,
        )
        .unwrap();
        assert!(request.enabled);
        assert!(!request.mci_flag);
        assert_eq!(request.connection_name, None);
    }
}
