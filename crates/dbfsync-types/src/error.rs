//! Typed sink error model shared between the engine and sink implementations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a sink failure, driving retry and fallback decisions.
#[derive(Debug, Clone, Copy, Error, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SinkErrorKind {
    /// Sink unreachable or connection lost. Retried with backoff.
    #[error("connection")]
    Connection,
    /// A value exceeded the destination column's declared width.
    /// Recovered once per table via destructive schema widening.
    #[error("data_too_long")]
    DataTooLong,
    /// Target table missing, or missing expected key/fingerprint columns.
    /// Fatal configuration problem.
    #[error("schema")]
    Schema,
    /// Anything else. Fatal.
    #[error("other")]
    Other,
}

/// Error raised by sink operations.
///
/// The `kind` decides how the engine reacts: `Connection` errors are
/// retryable, `DataTooLong` triggers the one-shot widening fallback, and
/// the rest are fatal.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[error("[{kind}] {message}")]
pub struct SinkError {
    pub kind: SinkErrorKind,
    pub message: String,
}

impl SinkError {
    pub fn new(kind: SinkErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Sink unreachable (retryable).
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(SinkErrorKind::Connection, message)
    }

    /// Value wider than the destination column.
    pub fn data_too_long(message: impl Into<String>) -> Self {
        Self::new(SinkErrorKind::DataTooLong, message)
    }

    /// Missing table or missing key/fingerprint columns.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::new(SinkErrorKind::Schema, message)
    }

    /// Unclassified sink failure.
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(SinkErrorKind::Other, message)
    }

    /// Whether the engine may retry the operation on a fresh connection.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind == SinkErrorKind::Connection
    }
}
