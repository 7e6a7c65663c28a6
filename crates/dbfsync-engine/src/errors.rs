//! Engine error model: fatal error taxonomy and per-run stage context.

use dbfsync_state::StateError;
use dbfsync_types::{EntryId, SinkError};

use crate::upsert::UpsertError;

/// Fatal error raised somewhere inside a run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// No entry with the requested name in the schema set.
    #[error("entry '{0}' not found in schema set")]
    EntryNotFound(String),

    /// Declared configuration is inconsistent with the observed data,
    /// e.g. a key field missing after mapping.
    #[error("configuration error: {0}")]
    Config(String),

    /// The record source failed (missing or unreadable file).
    #[error("source error: {0}")]
    Source(#[source] anyhow::Error),

    /// Sink operation failed outside the upsert loop.
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// The upsert executor failed after possibly committing some chunks.
    #[error(transparent)]
    Upsert(#[from] UpsertError),

    /// Sync state store failure.
    #[error(transparent)]
    State(#[from] StateError),
}

/// Stage of the run state machine an error surfaced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ResolveEntry,
    Extract,
    Map,
    Connect,
    Detect,
    Upsert,
    UpdateWatermark,
}

impl Stage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ResolveEntry => "resolve-entry",
            Self::Extract => "extract",
            Self::Map => "map",
            Self::Connect => "connect",
            Self::Detect => "detect",
            Self::Upsert => "upsert",
            Self::UpdateWatermark => "update-watermark",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed run: the fatal error plus enough context to diagnose it.
///
/// The watermark is never advanced when this is returned, so the next
/// invocation naturally retries the run in full.
#[derive(Debug, thiserror::Error)]
#[error("sync of entry '{entry}' failed during {stage}: {source}")]
pub struct RunError {
    pub entry: EntryId,
    pub stage: Stage,
    #[source]
    pub source: SyncError,
}

impl RunError {
    pub(crate) fn new(entry: &EntryId, stage: Stage, source: impl Into<SyncError>) -> Self {
        Self {
            entry: entry.clone(),
            stage,
            source: source.into(),
        }
    }
}
