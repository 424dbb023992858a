//! Error types for the tenant reconciliation engine.
//!
//! Structural failures (configuration, fetching current state) abort a run
//! and surface through [`SyncError`]. Failures of individual remote
//! operations are isolated into [`OperationError`] values that are collected
//! in the reconciliation report instead of aborting sibling operations.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::planner::OperationKind;
use crate::resource::ResourceKind;

/// The main error type for the reconciliation engine.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The current remote state could not be read.
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Reconciliation was stopped before or during execution.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// Local run state errors (lock, history).
    #[error("State error: {0}")]
    State(#[from] StateError),

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
    /// The tenant file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The tenant file could not be parsed.
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

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// Duplicate desired resource name (strict mode only).
    #[error("Duplicate {kind} name: {name}")]
    DuplicateName {
        /// Kind of the duplicated resource.
        kind: ResourceKind,
        /// The duplicated name.
        name: String,
    },
}

/// A failed call against the remote management API.
#[derive(Debug, Clone, Error, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiError {
    /// Authentication failed.
    #[error("authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// The API answered with a non-success status.
    #[error("request failed: {status} - {message}")]
    RequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// Rate limited.
    #[error("rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// The remote resource does not exist.
    #[error("resource not found: {remote_id}")]
    NotFound {
        /// Remote identifier that was not found.
        remote_id: String,
    },

    /// Network error.
    #[error("network error: {message}")]
    Network {
        /// Description of the network error.
        message: String,
    },

    /// The call did not complete in time.
    #[error("timed out after {after_secs} seconds")]
    Timeout {
        /// Elapsed seconds before giving up.
        after_secs: u64,
    },

    /// Invalid response from the API.
    #[error("invalid response: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },

    /// The worker running the call stopped without producing a result.
    #[error("worker aborted: {message}")]
    Aborted {
        /// Description of the abort.
        message: String,
    },
}

/// The existing set of resources could not be listed.
#[derive(Debug, Error)]
#[error("failed to list {kind} resources: {source}")]
pub struct FetchError {
    /// Kind that was being listed.
    pub kind: ResourceKind,
    /// Underlying API failure.
    #[source]
    pub source: ApiError,
}

/// A single create, update or delete failed.
#[derive(Debug, Clone, Error, Serialize, PartialEq, Eq)]
#[error("{operation} of {kind} '{key}' failed: {source}")]
pub struct OperationError {
    /// Operation class that failed.
    pub operation: OperationKind,
    /// Kind of the affected resource.
    pub kind: ResourceKind,
    /// Identity key of the affected resource.
    pub key: String,
    /// Remote identifier, when the resource already existed.
    pub remote_id: Option<String>,
    /// Underlying API failure.
    #[source]
    pub source: ApiError,
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The plan contains conflicts and the caller asked to fail on them.
    #[error("{count} unresolved conflict(s) for {kind}: {keys}")]
    UnresolvedConflicts {
        /// Kind being reconciled.
        kind: ResourceKind,
        /// Number of conflicting keys.
        count: usize,
        /// Conflicting keys, comma separated.
        keys: String,
    },

    /// The plan needs explicit confirmation that was not given.
    #[error("Plan for {kind} deletes {deletes} of {existing} existing resources and was not confirmed")]
    ConfirmationRequired {
        /// Kind being reconciled.
        kind: ResourceKind,
        /// Planned deletes.
        deletes: usize,
        /// Size of the existing set.
        existing: usize,
    },

    /// Reconciliation was aborted.
    #[error("Reconciliation aborted: {reason}")]
    Aborted {
        /// Reason for abort.
        reason: String,
    },
}

/// Local run state errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State file is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Lock acquisition failed.
    #[error("Failed to acquire run lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// The lock is held by another process.
    #[error("Tenant is locked by another run (lock holder: {holder}, since: {since})")]
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
}

/// Result type alias for tenant sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
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
}

impl ApiError {
    /// Creates a request error.
    #[must_use]
    pub fn request(status: u16, message: impl Into<String>) -> Self {
        Self::RequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates an invalid response error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Returns true if the client should retry this call.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Network { .. })
    }

    /// Returns the delay the server asked for before retrying, in seconds.
    ///
    /// Other retryable errors have no server hint and use the client's
    /// own back-off.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
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
}
