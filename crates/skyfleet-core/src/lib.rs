//! Core types for skyfleet.
//!
//! This crate provides the foundational types used throughout the skyfleet
//! multi-cloud control plane:
//!
//! - **Identifiers**: validated names for namespaces, MCIs and VMs, and UUIDs
//!   for scheduled jobs
//! - **Lifecycle vocabulary**: canonical VM statuses, actions, in-flight
//!   intents and the aggregated fleet status
//! - **Error types**: common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use skyfleet_core::{Action, FleetStatus, MciId, VmStatus};
//!
//! let mci = MciId::new("web-fleet").unwrap();
//! assert_eq!(mci.as_str(), "web-fleet");
//!
//! assert_eq!(Action::Suspend.target_status(), VmStatus::Suspended);
//!
//! let status: FleetStatus = "Partial-Running-(2/3)".parse().unwrap();
//! assert_eq!(status.headline(), VmStatus::Running);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod status;

pub use error::{CoreError, Result};
pub use ids::{validate_name, IdError, JobId, MciId, NsId, VmId};
pub use status::{Action, FleetStatus, Intent, StatusError, VmStatus};
