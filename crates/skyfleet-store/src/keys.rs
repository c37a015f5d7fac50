//! Key encoding utilities.
//!
//! Keys are slash-separated paths so that every fleet owns a contiguous key
//! range: `/ns/{ns}/mcis/{mci}` for the fleet record and
//! `/ns/{ns}/mcis/{mci}/vm/{vm}` for each member.

use skyfleet_core::{JobId, MciId, NsId, VmId};

/// Prefix under which every scheduled job is stored.
pub const JOB_PREFIX: &str = "/scheduledjob";

/// Prefix for all MCIs of a namespace.
#[must_use]
pub fn mci_prefix(ns_id: &NsId) -> String {
    format!("/ns/{ns_id}/mcis")
}

/// Key of an MCI record.
#[must_use]
pub fn mci_key(ns_id: &NsId, mci_id: &MciId) -> String {
    format!("/ns/{ns_id}/mcis/{mci_id}")
}

/// Prefix for all member VMs of an MCI.
#[must_use]
pub fn vm_prefix(ns_id: &NsId, mci_id: &MciId) -> String {
    format!("/ns/{ns_id}/mcis/{mci_id}/vm")
}

/// Key of a VM record.
#[must_use]
pub fn vm_key(ns_id: &NsId, mci_id: &MciId, vm_id: &VmId) -> String {
    format!("/ns/{ns_id}/mcis/{mci_id}/vm/{vm_id}")
}

/// Key of a scheduled job record.
#[must_use]
pub fn job_key(job_id: &JobId) -> String {
    format!("{JOB_PREFIX}/{job_id}")
}

/// Key of a geo-location reference record. Both parts are lowercased.
#[must_use]
pub fn geo_key(cloud_type: &str, native_region: &str) -> String {
    format!(
        "/cloudtype/{}/region/{}",
        cloud_type.trim().to_ascii_lowercase(),
        native_region.trim().to_ascii_lowercase()
    )
}

/// Returns true if `key` lives under `prefix`.
///
/// With `recursive` false only direct children match, so listing
/// `/ns/a/mcis` yields fleets but not their member VMs.
#[must_use]
pub fn is_under(prefix: &str, key: &str, recursive: bool) -> bool {
    let Some(rest) = key
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
    else {
        return false;
    };
    !rest.is_empty() && (recursive || !rest.contains('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (NsId, MciId, VmId) {
        (
            NsId::new("ns01").unwrap(),
            MciId::new("fleet").unwrap(),
            VmId::new("vm-1").unwrap(),
        )
    }

    #[test]
    fn hierarchical_layout() {
        let (ns, mci, vm) = ids();
        assert_eq!(mci_key(&ns, &mci), "/ns/ns01/mcis/fleet");
        assert_eq!(vm_key(&ns, &mci, &vm), "/ns/ns01/mcis/fleet/vm/vm-1");
        assert!(vm_key(&ns, &mci, &vm).starts_with(&mci_key(&ns, &mci)));
    }

    #[test]
    fn direct_children_only() {
        let (ns, mci, vm) = ids();
        let prefix = mci_prefix(&ns);
        assert!(is_under(&prefix, &mci_key(&ns, &mci), false));
        assert!(!is_under(&prefix, &vm_key(&ns, &mci, &vm), false));
        assert!(is_under(&prefix, &vm_key(&ns, &mci, &vm), true));
    }

    #[test]
    fn sibling_prefixes_do_not_match() {
        // "/ns/ns01/mcis/fleet2" must not be treated as a child of "fleet".
        let (ns, mci, _) = ids();
        let other = MciId::new("fleet2").unwrap();
        assert!(!is_under(&mci_key(&ns, &mci), &mci_key(&ns, &other), true));
    }

    #[test]
    fn geo_key_is_case_insensitive() {
        assert_eq!(geo_key("AWS", "US-East-1"), geo_key("aws", "us-east-1"));
    }
}
