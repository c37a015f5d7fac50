//! HTTP control surface for the skyfleet MCI control plane.
//!
//! This crate exposes MCI and VM lifecycle management and scheduled
//! registration jobs as a JSON API:
//!
//! - MCI and VM create/get/list/delete
//! - Lifecycle actions through the `?action=` query parameter
//! - Scheduled job CRUD plus pause and resume
//!
//! Failures are answered with a `{ "message": ... }` body and the status code
//! of the underlying error.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use skyfleet_api::{create_router, ApiConfig, ApiState};
//! use skyfleet_call::{CallConfig, CallGateway};
//! use skyfleet_control::{ControlPlaneService, HttpCspClient, Registrar};
//! use skyfleet_jobs::JobManager;
//! use skyfleet_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/skyfleet")?);
//! let gateway = CallGateway::new(CallConfig::default())?;
//! let csp = Arc::new(HttpCspClient::new(gateway, "http://localhost:1024/spider"));
//!
//! let control = Arc::new(ControlPlaneService::with_defaults(Arc::clone(&store), Arc::clone(&csp)));
//! let registrar = Arc::new(Registrar::new(Arc::clone(&store), csp));
//! let jobs = Arc::new(JobManager::with_defaults(store, registrar));
//!
//! let app = create_router(ApiState::new(control, jobs, ApiConfig::default()));
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:1323").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::ApiState;
