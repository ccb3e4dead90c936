//! Error types for the reconciliation core
//!
//! Per-record failures are collected and surfaced together through
//! [`Error::Reconcile`]; only [`Error::Discovery`] aborts an invocation.

use std::fmt;
use thiserror::Error;

/// Result type alias for reconciliation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the reconciliation core
#[derive(Error, Debug)]
pub enum Error {
    /// Topology lookup failed; nothing can be planned
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// A pattern references a placeholder the render context does not provide
    #[error("Unresolved placeholder {{{{.{placeholder}}}}} in pattern {pattern:?}")]
    UnresolvedPlaceholder {
        /// Source text of the pattern
        pattern: String,
        /// Name of the missing placeholder
        placeholder: String,
    },

    /// A pattern could not be parsed
    #[error("Invalid pattern {pattern:?}: {reason}")]
    InvalidPattern {
        /// Source text of the pattern
        pattern: String,
        /// What is wrong with it
        reason: String,
    },

    /// The DNS store rejected an upsert or delete
    #[error("Apply error ({record}): {message}")]
    Apply {
        /// Record name the change targeted
        record: String,
        /// Error message
        message: String,
    },

    /// No ownership marker exists for an instance
    #[error("Ownership marker not found: {0}")]
    OwnershipNotFound(String),

    /// Incoming lifecycle event is malformed
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reconciliation was cancelled before the action ran
    #[error("Cancelled before applying {0}")]
    Cancelled(String),

    /// One or more record actions failed; every planned action was attempted
    #[error(
        "{} record action(s) failed: {}",
        .0.len(),
        .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
    )]
    Reconcile(Vec<RecordFailure>),

    /// Filesystem errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// A single failed record action collected during reconciliation
#[derive(Debug)]
pub struct RecordFailure {
    /// Record name (or pattern key when the name could not be rendered)
    pub record: String,
    /// Underlying error
    pub error: Error,
}

impl fmt::Display for RecordFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.record, self.error)
    }
}

impl Error {
    /// Create a discovery error
    pub fn discovery(msg: impl Into<String>) -> Self {
        Self::Discovery(msg.into())
    }

    /// Create an apply error for a record
    pub fn apply(record: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Apply {
            record: record.into(),
            message: message.into(),
        }
    }

    /// Create an invalid event error
    pub fn invalid_event(msg: impl Into<String>) -> Self {
        Self::InvalidEvent(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid pattern error
    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error aborts the whole invocation
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Discovery(_) => true,
            Self::Reconcile(failures) => failures.iter().any(|f| f.error.is_fatal()),
            _ => false,
        }
    }

    /// Failures collected by a reconciliation pass, if this is one
    pub fn failures(&self) -> &[RecordFailure] {
        match self {
            Self::Reconcile(failures) => failures,
            _ => &[],
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
