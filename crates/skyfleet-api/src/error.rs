//! API error types and responses.
//!
//! Every failure is answered with a `{ "message": ... }` body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use skyfleet_control::ControlError;
use skyfleet_core::IdError;
use skyfleet_jobs::JobError;

/// API error type that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The requested resource was not found.
    #[error("{0}")]
    NotFound(String),

    /// The request conflicts with the current state.
    #[error("{0}")]
    Conflict(String),

    /// Invalid request body, parameters or transition.
    #[error("{0}")]
    BadRequest(String),

    /// The CSP gateway failed.
    #[error("{0}")]
    BadGateway(String),

    /// Internal server error.
    #[error("{0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    message: String,
}

impl ApiError {
    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<IdError> for ApiError {
    fn from(err: IdError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<ControlError> for ApiError {
    fn from(err: ControlError) -> Self {
        match err {
            ControlError::Validation(_)
            | ControlError::InvalidId(_)
            | ControlError::InvalidTransition { .. } => Self::BadRequest(err.to_string()),
            ControlError::MciNotFound { .. } | ControlError::VmNotFound { .. } => {
                Self::NotFound(err.to_string())
            }
            ControlError::Conflict(_) => Self::Conflict(err.to_string()),
            ControlError::Gateway(gateway_err) => {
                tracing::warn!(error = %gateway_err, "CSP gateway error");
                Self::BadGateway(gateway_err.to_string())
            }
            ControlError::Store(store_err) => {
                tracing::error!(error = %store_err, "Store error");
                Self::Internal("storage error".to_string())
            }
            ControlError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                Self::Internal(msg)
            }
        }
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Validation(_) => Self::BadRequest(err.to_string()),
            JobError::NotFound(_) => Self::NotFound(err.to_string()),
            JobError::Duplicate { .. } => Self::Conflict(err.to_string()),
            JobError::Store(store_err) => {
                tracing::error!(error = %store_err, "Store error");
                Self::Internal("storage error".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyfleet_core::{JobId, MciId, NsId};

    #[test]
    fn error_status_codes() {
        assert_eq!(
            ApiError::NotFound("test".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Conflict("test".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::BadGateway("test".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::Internal("test".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn control_errors_keep_their_status() {
        let not_found = ControlError::MciNotFound {
            ns_id: NsId::new("ns01").unwrap(),
            mci_id: MciId::new("fleet").unwrap(),
        };
        let code = not_found.http_status_code();
        let api = ApiError::from(not_found);
        assert_eq!(api.status_code().as_u16(), code);
        assert!(api.to_string().contains("ns01/fleet"));

        let api = ApiError::from(ControlError::Validation("name is required".into()));
        assert_eq!(api.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn duplicate_job_names_the_existing_job() {
        let existing = JobId::generate();
        let api = ApiError::from(JobError::Duplicate { existing });
        assert_eq!(api.status_code(), StatusCode::CONFLICT);
        assert!(api.to_string().contains(&existing.to_string()));
    }

    #[test]
    fn storage_details_are_not_exposed() {
        let api = ApiError::from(JobError::Store(skyfleet_store::StoreError::Database(
            "disk on fire".into(),
        )));
        assert_eq!(api.to_string(), "storage error");
    }
}
