//! Outbound call gateway for skyfleet.
//!
//! Every request to the CSP abstraction layer goes through a [`CallGateway`],
//! which provides:
//!
//! - **Response caching** for idempotent `GET`s through an injected
//!   [`ResponseCache`] ([`MemoryCache`] by default)
//! - **Duplicate throttling**: a per-request in-flight ceiling; callers over
//!   it wait for the first caller's cached result
//! - **Error normalization** into [`CallError`]
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use skyfleet_call::{CallConfig, CallGateway};
//!
//! # async fn example() -> skyfleet_call::Result<()> {
//! let gateway = CallGateway::new(CallConfig::default())?;
//! let profile: serde_json::Value = gateway
//!     .get("http://localhost:1024/spider/connectionconfig/aws-east", Duration::from_secs(60))
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;

pub use cache::{MemoryCache, ResponseCache};
pub use config::CallConfig;
pub use error::{CallError, Result};
pub use gateway::CallGateway;
pub use reqwest::Method;
