//! Core identifier types for skyfleet.
//!
//! Namespaces, MCIs and VMs are addressed by user-chosen resource names that
//! double as storage key segments, so they are validated on construction.
//! Scheduled jobs get generated UUID identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length of a resource name.
pub const MAX_NAME_LEN: usize = 63;

/// Validate a resource name.
///
/// A valid name starts with a lowercase ASCII letter, contains only lowercase
/// letters, digits and `-`, does not end with `-`, and is at most
/// [`MAX_NAME_LEN`] characters long.
///
/// # Errors
///
/// Returns the first rule the name violates.
pub fn validate_name(value: &str) -> Result<(), IdError> {
    if value.is_empty() {
        return Err(IdError::Empty);
    }
    if value.len() > MAX_NAME_LEN {
        return Err(IdError::TooLong {
            max: MAX_NAME_LEN,
            got: value.len(),
        });
    }
    if !value.starts_with(|c: char| c.is_ascii_lowercase()) {
        return Err(IdError::InvalidStart);
    }
    if let Some(c) = value
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
    {
        return Err(IdError::InvalidChar(c));
    }
    if value.ends_with('-') {
        return Err(IdError::InvalidEnd);
    }
    Ok(())
}

macro_rules! name_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap a resource name.
            ///
            /// # Errors
            ///
            /// Returns an error if the value is not a valid resource name.
            pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
                let value = value.into();
                validate_name(&value)?;
                Ok(Self(value))
            }

            /// Return the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

name_id! {
    /// A namespace identifier. Every MCI lives inside exactly one namespace.
    NsId
}

name_id! {
    /// A Multi-Cloud Infrastructure (fleet) identifier, unique per namespace.
    MciId
}

name_id! {
    /// A VM identifier, unique per MCI.
    VmId
}

/// A scheduled job identifier based on UUID v4.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(uuid::Uuid);

impl JobId {
    /// Create a new `JobId` from a UUID.
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Generate a new random `JobId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Return the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl FromStr for JobId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = uuid::Uuid::parse_str(s).map_err(|_| IdError::InvalidUuid)?;
        Ok(Self(uuid))
    }
}

impl fmt::Debug for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobId({})", self.0)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for JobId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0.to_string()
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The name is empty.
    #[error("name must not be empty")]
    Empty,

    /// The name exceeds the maximum length.
    #[error("name too long: at most {max} characters, got {got}")]
    TooLong {
        /// The maximum number of characters.
        max: usize,
        /// The actual number of characters.
        got: usize,
    },

    /// The name does not start with a lowercase letter.
    #[error("name must start with a lowercase letter")]
    InvalidStart,

    /// The name ends with a hyphen.
    #[error("name must not end with '-'")]
    InvalidEnd,

    /// The name contains a character outside `[a-z0-9-]`.
    #[error("invalid character {0:?} in name")]
    InvalidChar(char),

    /// The input is not a valid UUID.
    #[error("invalid UUID format")]
    InvalidUuid,
}
