//! Lifecycle vocabulary shared by every skyfleet crate.
//!
//! VMs report one of the canonical [`VmStatus`] values. A control request
//! carries an [`Action`]; while it is in flight the affected record holds an
//! [`Intent`] naming the action and the status it is expected to end in.
//! Fleets summarize their members with a [`FleetStatus`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical VM status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VmStatus {
    /// The VM is being provisioned.
    Creating,
    /// The VM is up.
    Running,
    /// A suspend request is in progress.
    Suspending,
    /// The VM is stopped but retained.
    Suspended,
    /// A resume request is in progress.
    Resuming,
    /// A reboot request is in progress.
    Rebooting,
    /// A terminate request is in progress.
    Terminating,
    /// The VM no longer exists on the provider.
    Terminated,
    /// The last operation on the VM failed.
    Failed,
    /// The provider status could not be interpreted.
    Undefined,
}

impl VmStatus {
    /// Every canonical status, in tie-break order.
    pub const ALL: [Self; 10] = [
        Self::Creating,
        Self::Running,
        Self::Suspending,
        Self::Suspended,
        Self::Resuming,
        Self::Rebooting,
        Self::Terminating,
        Self::Terminated,
        Self::Failed,
        Self::Undefined,
    ];

    /// Return the canonical name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Creating => "Creating",
            Self::Running => "Running",
            Self::Suspending => "Suspending",
            Self::Suspended => "Suspended",
            Self::Resuming => "Resuming",
            Self::Rebooting => "Rebooting",
            Self::Terminating => "Terminating",
            Self::Terminated => "Terminated",
            Self::Failed => "Failed",
            Self::Undefined => "Undefined",
        }
    }

    /// Map a provider-native status string onto the canonical set.
    ///
    /// Matching is case-insensitive. `Error` is reported as [`Self::Failed`];
    /// `NotExist` and every unrecognized value map to [`Self::Undefined`].
    #[must_use]
    pub fn from_native(native: &str) -> Self {
        match native.trim().to_ascii_lowercase().as_str() {
            "creating" => Self::Creating,
            "running" => Self::Running,
            "suspending" => Self::Suspending,
            "suspended" => Self::Suspended,
            "resuming" => Self::Resuming,
            "rebooting" => Self::Rebooting,
            "terminating" => Self::Terminating,
            "terminated" => Self::Terminated,
            "failed" | "error" => Self::Failed,
            _ => Self::Undefined,
        }
    }

    /// Returns true for the transitional states that block new operations.
    #[must_use]
    pub const fn is_busy(self) -> bool {
        matches!(
            self,
            Self::Creating | Self::Suspending | Self::Resuming | Self::Rebooting | Self::Terminating
        )
    }
}

impl fmt::Display for VmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VmStatus {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| StatusError::UnknownStatus(s.to_string()))
    }
}

/// A lifecycle action that can be requested on a VM or a fleet.
///
/// The completion sentinel is not an action; records express it as the
/// absence of an [`Intent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Provision a VM.
    Create,
    /// Stop a VM while retaining it.
    Suspend,
    /// Start a suspended VM.
    Resume,
    /// Restart a VM.
    Reboot,
    /// Delete a VM from the provider.
    Terminate,
}

impl Action {
    /// Every action.
    pub const ALL: [Self; 5] = [
        Self::Create,
        Self::Suspend,
        Self::Resume,
        Self::Reboot,
        Self::Terminate,
    ];

    /// Return the canonical name of the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Suspend => "Suspend",
            Self::Resume => "Resume",
            Self::Reboot => "Reboot",
            Self::Terminate => "Terminate",
        }
    }

    /// The status a record holds while this action is in flight.
    #[must_use]
    pub const fn transitional_status(self) -> VmStatus {
        match self {
            Self::Create => VmStatus::Creating,
            Self::Suspend => VmStatus::Suspending,
            Self::Resume => VmStatus::Resuming,
            Self::Reboot => VmStatus::Rebooting,
            Self::Terminate => VmStatus::Terminating,
        }
    }

    /// The status a record converges to once this action completes.
    #[must_use]
    pub const fn target_status(self) -> VmStatus {
        match self {
            Self::Create | Self::Resume | Self::Reboot => VmStatus::Running,
            Self::Suspend => VmStatus::Suspended,
            Self::Terminate => VmStatus::Terminated,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| StatusError::UnknownAction(s.to_string()))
    }
}

/// An operation in flight: the requested action and its expected end state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Intent {
    /// The requested action.
    pub action: Action,
    /// The status that marks the action as complete.
    pub target: VmStatus,
}

impl Intent {
    /// Build the intent for an action.
    #[must_use]
    pub const fn for_action(action: Action) -> Self {
        Self {
            action,
            target: action.target_status(),
        }
    }
}

/// Render an optional intent's action, using `Complete` for the sentinel.
#[must_use]
pub fn target_action_label(intent: Option<&Intent>) -> &'static str {
    intent.map_or("Complete", |i| i.action.as_str())
}

/// Render an optional intent's target status, using `None` for the sentinel.
#[must_use]
pub fn target_status_label(intent: Option<&Intent>) -> &'static str {
    intent.map_or("None", |i| i.target.as_str())
}

/// Fleet-level status derived from the statuses of every member VM.
///
/// Renders as `Empty`, a bare status (`Running`), `Partial-<Status>-(k/n)`,
/// `Failed-(k/n)` or `Undefined-(k/n)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FleetStatus {
    /// The fleet has no members.
    Empty,
    /// Every member shares the status.
    Uniform(VmStatus),
    /// `count` of `total` members share the majority status.
    Partial {
        /// The majority status.
        status: VmStatus,
        /// Number of members in the majority status.
        count: usize,
        /// Number of members.
        total: usize,
    },
    /// At least one member failed.
    Failed {
        /// Number of failed members.
        count: usize,
        /// Number of members.
        total: usize,
    },
    /// At least one member has an undefined status and none failed.
    Undefined {
        /// Number of undefined members.
        count: usize,
        /// Number of members.
        total: usize,
    },
}

impl FleetStatus {
    /// The status named by this fleet status, used for transition checks.
    #[must_use]
    pub const fn headline(&self) -> VmStatus {
        match self {
            Self::Uniform(status) | Self::Partial { status, .. } => *status,
            Self::Failed { .. } => VmStatus::Failed,
            Self::Undefined { .. } | Self::Empty => VmStatus::Undefined,
        }
    }

    /// The `(k, n)` proportion carried by this status, if any.
    #[must_use]
    pub const fn proportion(&self) -> Option<(usize, usize)> {
        match self {
            Self::Empty | Self::Uniform(_) => None,
            Self::Partial { count, total, .. }
            | Self::Failed { count, total }
            | Self::Undefined { count, total } => Some((*count, *total)),
        }
    }
}

impl fmt::Display for FleetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Uniform(status) => f.write_str(status.as_str()),
            Self::Partial {
                status,
                count,
                total,
            } => write!(f, "Partial-{status}-({count}/{total})"),
            Self::Failed { count, total } => write!(f, "Failed-({count}/{total})"),
            Self::Undefined { count, total } => write!(f, "Undefined-({count}/{total})"),
        }
    }
}

impl FromStr for FleetStatus {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || StatusError::MalformedFleetStatus(s.to_string());

        if s == "Empty" {
            return Ok(Self::Empty);
        }
        let Some((head, tail)) = s.split_once("-(") else {
            return s.parse().map(Self::Uniform).map_err(|_| malformed());
        };

        let (count, total) = tail
            .strip_suffix(')')
            .and_then(|t| t.split_once('/'))
            .and_then(|(k, n)| Some((k.parse::<usize>().ok()?, n.parse::<usize>().ok()?)))
            .ok_or_else(malformed)?;
        if count == 0 || count > total {
            return Err(malformed());
        }

        if let Some(name) = head.strip_prefix("Partial-") {
            let status = name.parse().map_err(|_| malformed())?;
            return Ok(Self::Partial {
                status,
                count,
                total,
            });
        }

        match head.parse::<VmStatus>().map_err(|_| malformed())? {
            VmStatus::Failed => Ok(Self::Failed { count, total }),
            VmStatus::Undefined => Ok(Self::Undefined { count, total }),
            status if count == total => Ok(Self::Uniform(status)),
            status => Ok(Self::Partial {
                status,
                count,
                total,
            }),
        }
    }
}

impl TryFrom<String> for FleetStatus {
    type Error = StatusError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FleetStatus> for String {
    fn from(status: FleetStatus) -> Self {
        status.to_string()
    }
}

/// Errors raised when parsing lifecycle vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatusError {
    /// The string is not a canonical VM status.
    #[error("unknown status: {0}")]
    UnknownStatus(String),

    /// The string is not a known action.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// The string is not a well-formed fleet status.
    #[error("malformed fleet status: {0}")]
    MalformedFleetStatus(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_mapping_table() {
        let cases = [
            ("Creating", VmStatus::Creating),
            ("running", VmStatus::Running),
            ("Suspending", VmStatus::Suspending),
            ("SUSPENDED", VmStatus::Suspended),
            ("Resuming", VmStatus::Resuming),
            ("Rebooting", VmStatus::Rebooting),
            ("Terminating", VmStatus::Terminating),
            ("Terminated", VmStatus::Terminated),
            ("Failed", VmStatus::Failed),
            ("Error", VmStatus::Failed),
            ("NotExist", VmStatus::Undefined),
            ("", VmStatus::Undefined),
            ("pending-ish", VmStatus::Undefined),
        ];
        for (native, expected) in cases {
            assert_eq!(VmStatus::from_native(native), expected, "native {native:?}");
        }
    }

    #[test]
    fn every_canonical_name_maps_to_itself() {
        for status in VmStatus::ALL {
            assert_eq!(VmStatus::from_native(status.as_str()), status);
            assert_eq!(status.as_str().parse::<VmStatus>().unwrap(), status);
        }
    }

    #[test]
    fn busy_states() {
        let busy: Vec<_> = VmStatus::ALL.into_iter().filter(|s| s.is_busy()).collect();
        assert_eq!(
            busy,
            vec![
                VmStatus::Creating,
                VmStatus::Suspending,
                VmStatus::Resuming,
                VmStatus::Rebooting,
                VmStatus::Terminating,
            ]
        );
    }

    #[test]
    fn action_targets() {
        assert_eq!(Intent::for_action(Action::Terminate).target, VmStatus::Terminated);
        assert_eq!(Intent::for_action(Action::Suspend).target, VmStatus::Suspended);
        assert_eq!(Intent::for_action(Action::Reboot).target, VmStatus::Running);
        assert_eq!(
            Action::Terminate.transitional_status(),
            VmStatus::Terminating
        );
        assert_eq!("reboot".parse::<Action>().unwrap(), Action::Reboot);
        assert!("complete".parse::<Action>().is_err());
    }

    #[test]
    fn sentinel_labels() {
        assert_eq!(target_action_label(None), "Complete");
        assert_eq!(target_status_label(None), "None");
        let intent = Intent::for_action(Action::Resume);
        assert_eq!(target_action_label(Some(&intent)), "Resume");
        assert_eq!(target_status_label(Some(&intent)), "Running");
    }

    #[test]
    fn fleet_status_rendering() {
        assert_eq!(FleetStatus::Uniform(VmStatus::Running).to_string(), "Running");
        assert_eq!(
            FleetStatus::Partial {
                status: VmStatus::Running,
                count: 2,
                total: 3
            }
            .to_string(),
            "Partial-Running-(2/3)"
        );
        assert_eq!(
            FleetStatus::Failed { count: 1, total: 3 }.to_string(),
            "Failed-(1/3)"
        );
        assert_eq!(
            FleetStatus::Undefined { count: 3, total: 3 }.to_string(),
            "Undefined-(3/3)"
        );
    }

    #[test]
    fn fleet_status_parsing() {
        for text in [
            "Empty",
            "Running",
            "Partial-Suspended-(1/4)",
            "Failed-(2/2)",
            "Undefined-(1/5)",
        ] {
            let parsed: FleetStatus = text.parse().unwrap();
            assert_eq!(parsed.to_string(), text);
        }
        assert_eq!(FleetStatus::Empty.headline(), VmStatus::Undefined);
        assert_eq!(
            "Partial-Suspending-(1/3)".parse::<FleetStatus>().unwrap().headline(),
            VmStatus::Suspending
        );
        for bad in ["Runnin", "Failed-(4/3)", "Failed-(0/3)", "Partial-Nope-(1/2)", "Failed-(x/3)"] {
            assert!(bad.parse::<FleetStatus>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn fleet_status_serde_as_string() {
        let status = FleetStatus::Failed { count: 1, total: 3 };
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, "\"Failed-(1/3)\"");
        let back: FleetStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, status);
    }
}
