//! Error types for InferHost Core

use crate::data::ValueKind;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for InferHost Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in InferHost Core
#[derive(Debug, Error)]
pub enum Error {
    // =========================================================================
    // Data access (caller bugs, never retried)
    // =========================================================================
    /// A key holds a value of a different kind than the one requested
    #[error("Type mismatch for key '{key}': expected {expected}, found {actual}")]
    TypeMismatch {
        /// Key that was accessed
        key: String,
        /// Kind the caller asked for
        expected: ValueKind,
        /// Kind actually stored
        actual: ValueKind,
    },

    /// Key is not present in the Data value
    #[error("Missing key: {0}")]
    MissingKey(String),

    /// A value violates its own invariants (shape/buffer mismatch, mixed list)
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Text or binary decoding failed
    #[error("Parse error: {0}")]
    Parse(String),

    // =========================================================================
    // Configuration (fatal at start-up)
    // =========================================================================
    /// No factory is registered for a step type tag
    #[error("Unresolved step type: {0}")]
    UnresolvedType(String),

    /// A tag was registered twice with different factories
    #[error("Step type '{tag}' already registered with a different factory")]
    DuplicateRegistration {
        /// Conflicting tag
        tag: String,
    },

    /// Two extension modules declared the same serialization tag
    #[error("Type tag '{tag}' declared by both '{first}' and '{second}'")]
    DuplicateTypeTag {
        /// Conflicting tag
        tag: String,
        /// Module that declared the tag first
        first: String,
        /// Module that declared it again
        second: String,
    },

    /// Two different extension modules share one name
    #[error("Extension module '{0}' declared twice with different steps")]
    DuplicateModule(String),

    /// Registration attempted after start-up finished
    #[error("Registry is sealed; cannot register '{0}'")]
    RegistrySealed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Pipeline description is unusable
    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),

    /// Model or worker pool failed to start
    #[error("Initialization failed: {0}")]
    Initialization(String),

    // =========================================================================
    // Worker pool
    // =========================================================================
    /// Pending-request queue is at its limit
    #[error("Inference queue is full (limit {limit})")]
    QueueFull {
        /// Configured queue limit
        limit: usize,
    },

    /// Request dropped because the pool is shutting down
    #[error("Inference executioner is shut down")]
    Shutdown,

    /// Request was cancelled while still queued
    #[error("Inference request cancelled")]
    Cancelled,

    /// Caller-side deadline elapsed before a result arrived
    #[error("Timed out after {timeout_ms}ms waiting for inference result")]
    Timeout {
        /// Deadline in milliseconds
        timeout_ms: u64,
    },

    /// The underlying model call failed; shared by every request of the batch
    #[error("Model call failed: {0:#}")]
    ModelCall(Arc<anyhow::Error>),

    // =========================================================================
    // Pipeline
    // =========================================================================
    /// A pipeline stage failed; execution stopped at this stage
    #[error("Stage {index} ({step_type}) failed: {source}")]
    StepFailed {
        /// Zero-based position of the failing stage
        index: usize,
        /// Type tag of the failing stage
        step_type: String,
        /// Error raised by the stage
        #[source]
        source: Box<Error>,
    },

    /// A stage or worker panicked, or a background task was lost
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Closed classification of errors, used in structured failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Wrong value kind requested
    TypeMismatch,
    /// Key absent
    MissingKey,
    /// Value invariant violated
    InvalidValue,
    /// Decoding failed
    Parse,
    /// Step type not registered
    UnresolvedType,
    /// Conflicting registration or discovery
    DuplicateRegistration,
    /// Bad configuration or pipeline description
    Configuration,
    /// Model or pool start-up failed
    Initialization,
    /// Backpressure: the server is busy
    Busy,
    /// Pool shut down
    Shutdown,
    /// Request cancelled
    Cancelled,
    /// Caller deadline elapsed
    Timeout,
    /// Model call failed
    Model,
    /// Panic or lost task
    Internal,
    /// I/O failure
    Io,
}

impl Error {
    /// Classify this error
    ///
    /// A `StepFailed` wrapper reports the kind of the stage's own error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Error::MissingKey(_) => ErrorKind::MissingKey,
            Error::InvalidValue(_) => ErrorKind::InvalidValue,
            Error::Parse(_) | Error::Json(_) => ErrorKind::Parse,
            Error::UnresolvedType(_) => ErrorKind::UnresolvedType,
            Error::DuplicateRegistration { .. }
            | Error::DuplicateTypeTag { .. }
            | Error::DuplicateModule(_) => ErrorKind::DuplicateRegistration,
            Error::RegistrySealed(_) | Error::ConfigError(_) | Error::InvalidPipeline(_) => {
                ErrorKind::Configuration
            }
            Error::Initialization(_) => ErrorKind::Initialization,
            Error::QueueFull { .. } => ErrorKind::Busy,
            Error::Shutdown => ErrorKind::Shutdown,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::ModelCall(_) => ErrorKind::Model,
            Error::StepFailed { source, .. } => source.kind(),
            Error::Internal(_) => ErrorKind::Internal,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether resubmitting the same request later can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Busy | ErrorKind::Shutdown | ErrorKind::Cancelled
        )
    }

    /// Innermost error, looking through `StepFailed` wrappers
    pub fn root(&self) -> &Error {
        match self {
            Error::StepFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// Build a type mismatch error for `key`
    pub(crate) fn mismatch(key: &str, expected: ValueKind, actual: ValueKind) -> Self {
        Error::TypeMismatch {
            key: key.to_string(),
            expected,
            actual,
        }
    }
}

/// Text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Parse(err.to_string())
    }
}

/// Identity of the pipeline stage a failure came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRef {
    /// Zero-based stage index
    pub index: usize,
    /// Step type tag
    pub step_type: String,
}

/// Structured failure handed to remote callers
///
/// Protocol adapters serialize this instead of surfacing raw errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Error classification
    pub kind: ErrorKind,
    /// Human-readable message
    pub message: String,
    /// Failing stage, when the error came out of a pipeline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageRef>,
}

impl From<&Error> for Failure {
    fn from(err: &Error) -> Self {
        let stage = match err {
            Error::StepFailed {
                index, step_type, ..
            } => Some(StageRef {
                index: *index,
                step_type: step_type.clone(),
            }),
            _ => None,
        };
        Failure {
            kind: err.kind(),
            message: err.root().to_string(),
            stage,
        }
    }
}

impl From<Error> for Failure {
    fn from(err: Error) -> Self {
        Failure::from(&err)
    }
}
