//! State store error types.

/// Errors produced by [`SyncStateStore`](crate::SyncStateStore) operations.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// File-system I/O failure reading or rewriting the control document.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The control document exists but is not valid JSON.
    #[error("corrupt control document: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StateError>;
