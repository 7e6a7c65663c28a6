//! Sync state and run reporting model types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque entry identifier (the source file's name, e.g. `"AGENTS"`).
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    /// Create a new entry identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for EntryId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

/// Persisted per-entry sync state.
///
/// `registros` holds the optional key→fingerprint cache used by the
/// local-cache detection variant; it stays `None` when change detection
/// queries the sink directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryState {
    /// Timestamp of the last successful synchronization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Optional cached key→fingerprint map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registros: Option<BTreeMap<String, String>>,
}

/// One row of the append-only run audit log. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunAuditRecord {
    pub entry_id: EntryId,
    pub sync_time: DateTime<Utc>,
    pub rows_processed: u64,
    pub rows_upserted: u64,
    pub elapsed_seconds: f64,
    pub chunk_size: usize,
    pub mem_used_mb: f64,
}

/// Terminal result of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub entry_id: EntryId,
    pub rows_processed: u64,
    pub rows_upserted: u64,
    pub elapsed_seconds: f64,
    pub mem_used_mb: f64,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: processed {}, upserted {}, memory {:.2} MB, duration {:.2}s",
            self.entry_id,
            self.rows_processed,
            self.rows_upserted,
            self.mem_used_mb,
            self.elapsed_seconds
        )
    }
}
