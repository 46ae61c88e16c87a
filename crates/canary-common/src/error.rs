//! Error types for canary manifest handling
//!
//! Resolution of effective values never fails; these errors only come from
//! loading manifests and from the admission-style structural checks. Each
//! variant carries the canary name and field path where one is known.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for canary operations
#[derive(Debug, Error)]
pub enum Error {
    /// Structural validation error for a Canary spec
    #[error("validation error for {canary}: {message}")]
    Validation {
        /// Name of the canary with invalid configuration
        canary: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.service.port")
        field: Option<String>,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// YAML manifest could not be decoded
    #[error("yaml error: {source}")]
    Yaml {
        /// The underlying serde_yaml error
        #[from]
        source: serde_yaml::Error,
    },

    /// JSON document could not be decoded or encoded
    #[error("json error: {source}")]
    Json {
        /// The underlying serde_json error
        #[from]
        source: serde_json::Error,
    },
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            canary: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with canary context and field path
    pub fn validation_for_field(
        canary: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            canary: canary.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a serialization error for a specific resource kind
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Get the canary name if this error is associated with a specific canary
    pub fn canary(&self) -> Option<&str> {
        match self {
            Error::Validation { canary, .. } => Some(canary),
            _ => None,
        }
    }

    /// Get the offending field path, if recorded
    pub fn field(&self) -> Option<&str> {
        match self {
            Error::Validation { field, .. } => field.as_deref(),
            _ => None,
        }
    }
}
