//! Error types for the control plane.
//!
//! This module defines all errors that can occur during MCI and VM lifecycle
//! operations.

use skyfleet_core::{Action, IdError, MciId, NsId, VmId, VmStatus};
use thiserror::Error;

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors that can occur in control plane operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// A request field is missing or malformed.
    #[error("invalid request: {0}")]
    Validation(String),

    /// A resource name is not a valid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// The requested action is not allowed in the current status.
    #[error("cannot {action} {target} while it is {status}: {reason}")]
    InvalidTransition {
        /// The MCI or VM the action targets.
        target: String,
        /// The status the target is in.
        status: VmStatus,
        /// The rejected action.
        action: Action,
        /// Why the action was rejected.
        reason: &'static str,
    },

    /// The requested MCI was not found.
    #[error("MCI not found: {ns_id}/{mci_id}")]
    MciNotFound {
        /// The namespace searched.
        ns_id: NsId,
        /// The missing MCI.
        mci_id: MciId,
    },

    /// The requested VM was not found.
    #[error("VM not found: {mci_id}/{vm_id}")]
    VmNotFound {
        /// The MCI searched.
        mci_id: MciId,
        /// The missing VM.
        vm_id: VmId,
    },

    /// A resource with the same identity already exists.
    #[error("{0} already exists")]
    Conflict(String),

    /// The CSP gateway call failed.
    #[error("gateway error: {0}")]
    Gateway(#[from] skyfleet_call::CallError),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] skyfleet_store::StoreError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::InvalidId(_) | Self::InvalidTransition { .. } => 400,
            Self::MciNotFound { .. } | Self::VmNotFound { .. } => 404,
            Self::Conflict(_) => 409,
            Self::Gateway(_) => 502,
            Self::Store(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        match self {
            Self::Gateway(e) => e.is_retriable(),
            Self::Store(_) | Self::Internal(_) => true,
            _ => false,
        }
    }
}
