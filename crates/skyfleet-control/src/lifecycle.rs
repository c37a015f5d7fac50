//! MCI and VM lifecycle rules.
//!
//! This module holds the pure functions of the lifecycle state machine:
//! transition validation, target-aware status disambiguation and intent
//! settlement.
//!
//! # Transition rules
//!
//! Applied in order to the current status of a VM, or the headline status of
//! an MCI:
//!
//! 1. Busy statuses (`Creating`, `Suspending`, `Resuming`, `Rebooting`,
//!    `Terminating`) reject every action.
//! 2. `Terminated` rejects every action.
//! 3. `Suspended` allows only `Resume` and `Terminate`.
//! 4. Anything else is allowed.

use skyfleet_core::{Action, FleetStatus, Intent, VmStatus};

use crate::error::{ControlError, Result};

/// Why an action was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Another operation is in flight.
    Busy,
    /// The target no longer exists.
    Terminated,
    /// The target is suspended and the action needs it running.
    Suspended,
}

impl Rejection {
    /// User-facing explanation.
    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self {
            Self::Busy => "operation already in progress",
            Self::Terminated => "already terminated",
            Self::Suspended => "only Resume and Terminate are allowed while suspended",
        }
    }
}

/// Check whether `action` may start while the target is in `status`.
///
/// # Errors
///
/// Returns the [`Rejection`] rule that forbids the action.
pub const fn check(status: VmStatus, action: Action) -> std::result::Result<(), Rejection> {
    if status.is_busy() {
        return Err(Rejection::Busy);
    }
    match (status, action) {
        (VmStatus::Terminated, _) => Err(Rejection::Terminated),
        (VmStatus::Suspended, Action::Resume | Action::Terminate) => Ok(()),
        (VmStatus::Suspended, _) => Err(Rejection::Suspended),
        _ => Ok(()),
    }
}

/// Validate an action against a VM status.
///
/// # Errors
///
/// Returns `ControlError::InvalidTransition` if the action is not allowed.
pub fn validate(target: &str, status: VmStatus, action: Action) -> Result<()> {
    check(status, action).map_err(|rejection| ControlError::InvalidTransition {
        target: target.to_string(),
        status,
        action,
        reason: rejection.reason(),
    })
}

/// Validate an action against an MCI status.
///
/// The headline status is checked; an empty MCI accepts every action.
///
/// # Errors
///
/// Returns `ControlError::InvalidTransition` if the action is not allowed.
pub fn validate_fleet(target: &str, status: &FleetStatus, action: Action) -> Result<()> {
    if matches!(status, FleetStatus::Empty) {
        return Ok(());
    }
    validate(target, status.headline(), action)
}

/// Interpret a mapped provider status in light of the operation in flight.
///
/// Providers report transient states inconsistently; the intent resolves the
/// ambiguity.
#[must_use]
pub const fn disambiguate(status: VmStatus, intent: Option<&Intent>) -> VmStatus {
    let Some(intent) = intent else {
        return status;
    };
    match (intent.action, status) {
        (Action::Create, VmStatus::Undefined) => VmStatus::Creating,
        (Action::Terminate, VmStatus::Undefined) => VmStatus::Terminated,
        (Action::Resume, VmStatus::Creating) => VmStatus::Resuming,
        (
            Action::Reboot,
            VmStatus::Suspending | VmStatus::Suspended | VmStatus::Creating | VmStatus::Resuming,
        ) => VmStatus::Rebooting,
        _ => status,
    }
}

/// Drop the intent once `status` reached its target.
#[must_use]
pub fn settle(status: VmStatus, intent: Option<Intent>) -> Option<Intent> {
    intent.filter(|intent| intent.target != status)
}

/// What a control request addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// A whole MCI.
    Mci,
    /// A single VM.
    Vm,
}

/// The progress message reported when an action is dispatched.
#[must_use]
pub fn progress_message(action: Action, scope: Scope) -> String {
    let verb = match action {
        Action::Create => "Creating",
        Action::Suspend => "Suspending",
        Action::Resume => "Resuming",
        Action::Reboot => "Rebooting",
        Action::Terminate => "Terminating",
    };
    let noun = match scope {
        Scope::Mci => "MCI",
        Scope::Vm => "VM",
    };
    format!("{verb} the {noun}")
}
