//! Error types for the mimirform system.
//!
//! This module provides the error hierarchy for every stage of a run:
//! manifest configuration, the Mimir HTTP APIs, persisted state, and
//! reconciliation of resources.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for mimirform.
#[derive(Debug, Error)]
pub enum MimirError {
    /// Configuration and validation errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Mimir API errors.
    #[error("Mimir API error: {0}")]
    Api(#[from] ApiError),

    /// State management errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// YAML decode or encode failure.
    #[error("YAML error in {context}: {message}")]
    Yaml {
        /// Which object was being processed.
        context: String,
        /// Underlying serde message.
        message: String,
    },

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The manifest file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The manifest could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// A value does not match the pattern its field requires.
    #[error("invalid value for {field}: '{value}' does not match regex '{pattern}'")]
    PatternMismatch {
        /// Field path.
        field: String,
        /// Offending value.
        value: String,
        /// Regex the value had to match.
        pattern: String,
    },

    /// A PromQL expression failed to parse.
    #[error("invalid PromQL expression for {field}: {message}")]
    InvalidExpression {
        /// Field path.
        field: String,
        /// Parser message.
        message: String,
    },

    /// A duration failed to parse.
    #[error("invalid duration for {field}: '{value}'")]
    InvalidDuration {
        /// Field path.
        field: String,
        /// Offending value.
        value: String,
    },

    /// Two fields that cannot be set together were both set.
    #[error("{first} and {second} are mutually exclusive")]
    MutuallyExclusive {
        /// First field path.
        first: String,
        /// Second field path.
        second: String,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// Duplicate resource definition.
    #[error("Duplicate {resource_type} name: {name}")]
    DuplicateName {
        /// Type of resource (rule group, receiver, ...).
        resource_type: String,
        /// The duplicated name.
        name: String,
    },

    /// TLS material could not be loaded.
    #[error("Invalid TLS material for {field}: {message}")]
    InvalidTls {
        /// Which setting (ca, cert, key).
        field: String,
        /// Description of the failure.
        message: String,
    },
}

/// Mimir API errors, classified once at the transport boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The remote object does not exist (HTTP 404).
    #[error("unexpected response code '404' from {url}: {body}")]
    NotFound {
        /// Requested URL.
        url: String,
        /// Response body.
        body: String,
    },

    /// The request conflicts with remote state (HTTP 409).
    #[error("unexpected response code '409' from {url}: {body}")]
    Conflict {
        /// Requested URL.
        url: String,
        /// Response body.
        body: String,
    },

    /// The remote system failed (HTTP 5xx).
    #[error("unexpected response code '{status}' from {url}: {body}")]
    ServerError {
        /// HTTP status code.
        status: u16,
        /// Requested URL.
        url: String,
        /// Response body.
        body: String,
    },

    /// Any other non-2xx response.
    #[error("unexpected response code '{status}' from {url}: {body}")]
    ClientError {
        /// HTTP status code.
        status: u16,
        /// Requested URL.
        url: String,
        /// Response body.
        body: String,
    },

    /// Transport failure (connect, TLS, timeout).
    #[error("request to {url} failed: {message}")]
    Network {
        /// Requested URL.
        url: String,
        /// Underlying error.
        message: String,
    },

    /// The response could not be interpreted.
    #[error("Invalid response from Mimir: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },

    /// The HTTP client could not be built.
    #[error("Failed to build HTTP client: {message}")]
    Configuration {
        /// Description of the failure.
        message: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// State file could not be written.
    #[error("Failed to write state: {message}")]
    WriteFailed {
        /// Description of the failure.
        message: String,
    },

    /// State lock acquisition failed.
    #[error("Failed to acquire state lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// State lock is held by another process.
    #[error("State is locked by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// No resource recorded under an address.
    #[error("No resource in state at address {address}")]
    UnknownAddress {
        /// Resource address.
        address: String,
    },

    /// Resource already recorded under an address.
    #[error("Resource already managed at address {address}")]
    AddressInUse {
        /// Resource address.
        address: String,
    },
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Reconciliation failed for a specific resource.
    #[error("Failed to reconcile {resource_type} '{name}': {reason}")]
    ResourceReconcileFailed {
        /// Type of resource.
        resource_type: String,
        /// Name of the resource.
        name: String,
        /// Reason for failure.
        reason: String,
    },

    /// Several per-group operations failed.
    #[error("{operation} failed for {} rule group(s) in namespace '{namespace}': {}", .failures.len(), .failures.join("; "))]
    PartialFailure {
        /// Operation being performed.
        operation: String,
        /// Rule namespace.
        namespace: String,
        /// One message per failed group.
        failures: Vec<String>,
    },

    /// An identity string could not be parsed.
    #[error("Invalid import id '{id}' for {resource_type}: expected {expected}")]
    InvalidImportId {
        /// Type of resource.
        resource_type: String,
        /// The id supplied.
        id: String,
        /// Accepted formats.
        expected: String,
    },

    /// Import found nothing at the given identity.
    #[error("Cannot import non-existent remote object {id}")]
    ImportNotFound {
        /// The id supplied.
        id: String,
    },

    /// Reconciliation was aborted.
    #[error("Reconciliation aborted: {reason}")]
    Aborted {
        /// Reason for abort.
        reason: String,
    },
}

/// Result type alias for mimirform operations.
pub type Result<T> = std::result::Result<T, MimirError>;

impl MimirError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Creates a YAML error with context.
    #[must_use]
    pub fn yaml(context: impl Into<String>, err: &serde_yaml::Error) -> Self {
        Self::Yaml {
            context: context.into(),
            message: err.to_string(),
        }
    }

    /// Returns true if this error means the remote object is absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Api(ApiError::NotFound { .. }))
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }

    /// Returns the field path this error refers to, if any.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::ValidationError { field, .. } => field.as_deref(),
            Self::PatternMismatch { field, .. }
            | Self::InvalidExpression { field, .. }
            | Self::InvalidDuration { field, .. }
            | Self::InvalidTls { field, .. } => Some(field),
            Self::MutuallyExclusive { first, .. } => Some(first),
            _ => None,
        }
    }
}

impl ApiError {
    /// Classifies a non-2xx response.
    #[must_use]
    pub fn from_status(status: u16, url: impl Into<String>, body: impl Into<String>) -> Self {
        let url = url.into();
        let body = body.into();
        match status {
            404 => Self::NotFound { url, body },
            409 => Self::Conflict { url, body },
            500..=599 => Self::ServerError { status, url, body },
            _ => Self::ClientError { status, url, body },
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Returns the HTTP status carried by this error, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::NotFound { .. } => Some(404),
            Self::Conflict { .. } => Some(409),
            Self::ServerError { status, .. } | Self::ClientError { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl StateError {
    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Creates a write error with the given message.
    #[must_use]
    pub fn write(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_carries_status_text() {
        let err = ApiError::from_status(404, "http://mimir/config/v1/rules/ns/g", "group does not exist");
        assert!(err.to_string().contains("response code '404'"));
        assert!(MimirError::from(err).is_not_found());
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(ApiError::from_status(409, "u", ""), ApiError::Conflict { .. }));
        assert!(matches!(ApiError::from_status(503, "u", ""), ApiError::ServerError { status: 503, .. }));
        assert!(matches!(ApiError::from_status(400, "u", ""), ApiError::ClientError { status: 400, .. }));
        assert_eq!(ApiError::from_status(502, "u", "").status(), Some(502));
        assert_eq!(ApiError::network("u", "refused").status(), None);
    }

    #[test]
    fn test_partial_failure_lists_groups() {
        let err = ReconcileError::PartialFailure {
            operation: String::from("delete"),
            namespace: String::from("infra"),
            failures: vec![String::from("a: boom"), String::from("b: boom")],
        };
        let text = err.to_string();
        assert!(text.contains("2 rule group(s)"));
        assert!(text.contains("a: boom; b: boom"));
    }
}
