//! Error types for engine runs and the object-store boundary.
//!
//! Per-record validation failures are *not* errors: they come back as
//! [`Verdict::Rejected`](crate::validation::Verdict) and are routed to the
//! rejected output. Everything in this module is terminal for a run.

use thiserror::Error;

/// Terminal failure of an engine run.
#[derive(Debug, Error)]
pub enum CleanseError {
    /// The framer could not turn bytes into a line (e.g. invalid UTF-8).
    #[error("framing fault at line {line}: {message}")]
    Framing { line: u64, message: String },

    /// Reading the input or writing an output failed.
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    /// A worker task failed for a reason other than a validation verdict.
    #[error("task fault in batch {batch}: {message}")]
    TaskFault { batch: u64, message: String },

    /// The run was cancelled before completion.
    #[error("run cancelled")]
    Cancelled,

    /// The engine configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The object store rejected or failed an operation.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Convenience alias used throughout the engine.
pub type CleanseResult<T> = Result<T, CleanseError>;

/// Categories of object-store failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    NotFound,
    PermissionDenied,
    /// Network hiccups, throttling, timeouts. The only retryable kind.
    Transient,
    InvalidInput,
    Other,
}

/// Failure reported by an [`ObjectStore`](crate::io::store::ObjectStore).
#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct StorageError {
    pub kind: StorageErrorKind,
    pub message: String,
}

impl StorageError {
    pub fn new(kind: StorageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::NotFound, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::Transient, message)
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind == StorageErrorKind::Transient
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind as Io;
        let kind = match e.kind() {
            Io::NotFound => StorageErrorKind::NotFound,
            Io::PermissionDenied => StorageErrorKind::PermissionDenied,
            Io::Interrupted | Io::TimedOut | Io::ConnectionReset | Io::ConnectionAborted => {
                StorageErrorKind::Transient
            }
            Io::InvalidInput | Io::InvalidData => StorageErrorKind::InvalidInput,
            _ => StorageErrorKind::Other,
        };
        Self::new(kind, e.to_string())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
