//! Error types for outbound calls.
//!
//! Every failure is normalized into a [`CallError`] carrying a cleaned message
//! and the target URL without its scheme, so errors can be shown to users and
//! recorded on VM and job records as-is.

use thiserror::Error;

/// A result type using `CallError`.
pub type Result<T> = std::result::Result<T, CallError>;

/// Errors that can occur when calling the CSP gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// The gateway answered with a non-2xx status.
    #[error("{url}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Target URL without scheme.
        url: String,
        /// Cleaned response body.
        message: String,
    },

    /// The request never produced a response.
    #[error("{url}: {message}")]
    Transport {
        /// Target URL without scheme.
        url: String,
        /// Cleaned transport error.
        message: String,
    },

    /// The response body could not be decoded, or the request body encoded.
    #[error("{url}: invalid payload: {message}")]
    Payload {
        /// Target URL without scheme.
        url: String,
        /// Cleaned codec error.
        message: String,
    },

    /// Too many identical requests were already in flight.
    #[error("too many duplicate requests: {url}")]
    TooManyDuplicates {
        /// Target URL without scheme.
        url: String,
    },

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl CallError {
    /// Build an HTTP error from a raw response body.
    #[must_use]
    pub fn http(status: u16, url: &str, body: &str) -> Self {
        let message = clean_message(body);
        Self::Http {
            status,
            url: strip_scheme(url).to_string(),
            message: if message.is_empty() {
                format!("status {status}")
            } else {
                message
            },
        }
    }

    /// Build a transport error.
    #[must_use]
    pub fn transport(url: &str, error: &impl std::fmt::Display) -> Self {
        Self::Transport {
            url: strip_scheme(url).to_string(),
            message: clean_message(&error.to_string()),
        }
    }

    /// Build a payload error.
    #[must_use]
    pub fn payload(url: &str, error: &impl std::fmt::Display) -> Self {
        Self::Payload {
            url: strip_scheme(url).to_string(),
            message: clean_message(&error.to_string()),
        }
    }

    /// The HTTP status code of the gateway response, if there was one.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true if the gateway reported that the resource does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Http { status: 404, .. })
    }

    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status >= 500,
            Self::Transport { .. } | Self::TooManyDuplicates { .. } => true,
            Self::Payload { .. } | Self::Client(_) => false,
        }
    }
}

/// Collapse whitespace runs and strip quotes and backslashes.
#[must_use]
pub fn clean_message(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .filter(|c| !matches!(c, '"' | '\\'))
        .collect()
}

/// Remove the `scheme://` part of a URL.
#[must_use]
pub fn strip_scheme(url: &str) -> &str {
    url.split_once("://").map_or(url, |(_, rest)| rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_cleaned() {
        assert_eq!(
            clean_message("  {\"message\":\n\t\"vm  not\\found\"}  "),
            "{message: vm notfound}"
        );
        assert_eq!(clean_message(""), "");
    }

    #[test]
    fn urls_lose_their_scheme() {
        assert_eq!(strip_scheme("http://gw:1024/vm/a"), "gw:1024/vm/a");
        assert_eq!(strip_scheme("gw:1024/vm/a"), "gw:1024/vm/a");
    }

    #[test]
    fn classification() {
        let not_found = CallError::http(404, "http://gw/vmstatus/x", "\"no such vm\"");
        assert!(not_found.is_not_found());
        assert_eq!(not_found.status(), Some(404));
        assert_eq!(not_found.to_string(), "gw/vmstatus/x: no such vm");
        assert!(!not_found.is_retriable());

        let empty = CallError::http(503, "https://gw/vm", "  ");
        assert_eq!(empty.to_string(), "gw/vm: status 503");
        assert!(empty.is_retriable());

        let dup = CallError::TooManyDuplicates { url: "gw/vm".into() };
        assert_eq!(dup.status(), None);
        assert!(!dup.is_not_found());
    }
}
