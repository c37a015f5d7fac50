//! Control plane for skyfleet MCI lifecycle management.
//!
//! This crate provides the business logic for managing Multi-Cloud
//! Infrastructures (MCIs): fleets of VMs spread across cloud providers and
//! operated as one unit. It coordinates between the storage layer and the CSP
//! gateway.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API (HTTP/JSON)                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ControlPlaneService                      │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │  Lifecycle  │ │  Fan-out    │ │    Reconciler       │    │
//! │  │  Validator  │ │  Controller │ │    (status reads)   │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┴──────────────┐
//!               ▼                             ▼
//!        ┌──────────┐                  ┌─────────────┐
//!        │  Store   │                  │ CSP gateway │
//!        │ (RocksDB)│                  │  (HTTP)     │
//!        └──────────┘                  └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use skyfleet_call::{CallConfig, CallGateway};
//! use skyfleet_control::{ControlPlane, ControlPlaneService, CreateMciRequest, HttpCspClient};
//! use skyfleet_core::NsId;
//! use skyfleet_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/skyfleet")?);
//! let gateway = CallGateway::new(CallConfig::default())?;
//! let csp = Arc::new(HttpCspClient::new(gateway, "http://localhost:1024/spider"));
//!
//! let control = ControlPlaneService::with_defaults(store, csp);
//!
//! let ns_id = NsId::new("default")?;
//! let mci = control.create_mci(&ns_id, CreateMciRequest::new("fleet")).await?;
//! println!("Created MCI {} ({})", mci.id, mci.status);
//! # Ok(())
//! # }
//! ```
//!
//! # Status
//!
//! VM statuses are reconciled against the provider on every read; the MCI
//! status is aggregated from its members as `Empty`, a bare status,
//! `Partial-<Status>-(k/n)`, `Failed-(k/n)` or `Undefined-(k/n)`.
//!
//! See the [`lifecycle`] module for transition validation helpers.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod csp;
pub mod error;
pub mod fanout;
pub mod geo;
pub mod lifecycle;
pub mod reconcile;
pub mod register;
pub mod service;
pub mod types;

pub use csp::{ConnectionConfig, CreateVmRequest, CspClient, HttpCspClient};
pub use error::{ControlError, Result};
pub use geo::GeoCatalog;
pub use reconcile::StatusCount;
pub use register::{Registrar, RegistrationReport, RegistrationRequest};
pub use service::{ControlPlane, ControlPlaneService, NO_VM_TO_OPERATE};
pub use types::{
    ControlConfig, ControlOutcome, CreateMciRequest, MciStatusInfo, MciView, VmRequest, VmResult,
    VmStatusInfo, VmView,
};

#[cfg(any(test, feature = "test-utils"))]
pub use csp::mock::MockCspClient;

// Re-export commonly used types from dependencies for convenience
pub use skyfleet_core::{Action, FleetStatus, MciId, NsId, VmId, VmStatus};
pub use skyfleet_store::{Mci, Vm};
