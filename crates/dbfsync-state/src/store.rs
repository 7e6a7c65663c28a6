//! JSON control-document implementation of the sync state store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use dbfsync_types::{EntryId, EntryState};

use crate::error::{self, StateError};

type ControlDocument = BTreeMap<EntryId, EntryState>;

/// Durable per-entry sync state, backed by one JSON document on disk.
///
/// Reads tolerate a missing document (first run) by treating every entry as
/// never synchronized. Writes load the current document, apply the change,
/// and rewrite the whole file through a temporary sibling plus rename, so
/// readers never observe a partially written document.
///
/// Two processes must not write state for the same entry concurrently; the
/// orchestrator is responsible for not running one entry twice in parallel.
pub struct SyncStateStore {
    path: PathBuf,
}

impl SyncStateStore {
    /// Create a store rooted at `path`. The file need not exist yet; the
    /// parent directory is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the control document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Timestamp of the last successful sync for `entry_id`.
    ///
    /// Returns `Ok(None)` when the entry has never been synchronized or no
    /// control document exists yet.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] when the document exists but cannot be read
    /// or parsed.
    pub fn get_last_sync(&self, entry_id: &EntryId) -> error::Result<Option<DateTime<Utc>>> {
        Ok(self
            .load()?
            .get(entry_id)
            .and_then(|state| state.last_sync_time))
    }

    /// Record `timestamp` as the last successful sync for `entry_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] on read, serialization, or rename failure.
    pub fn set_last_sync(
        &self,
        entry_id: &EntryId,
        timestamp: DateTime<Utc>,
    ) -> error::Result<()> {
        let mut doc = self.load()?;
        doc.entry(entry_id.clone()).or_default().last_sync_time = Some(timestamp);
        self.persist(&doc)
    }

    /// Cached key→fingerprint map for `entry_id`, if one was stored.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] when the document cannot be read or parsed.
    pub fn get_cached_fingerprints(
        &self,
        entry_id: &EntryId,
    ) -> error::Result<Option<BTreeMap<String, String>>> {
        Ok(self
            .load()?
            .get(entry_id)
            .and_then(|state| state.registros.clone()))
    }

    /// Replace the cached key→fingerprint map for `entry_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] on read, serialization, or rename failure.
    pub fn set_cached_fingerprints(
        &self,
        entry_id: &EntryId,
        fingerprints: BTreeMap<String, String>,
    ) -> error::Result<()> {
        let mut doc = self.load()?;
        doc.entry(entry_id.clone()).or_default().registros = Some(fingerprints);
        self.persist(&doc)
    }

    fn load(&self) -> error::Result<ControlDocument> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ControlDocument::new()),
            Err(e) => Err(StateError::Io(e)),
        }
    }

    fn persist(&self, doc: &ControlDocument) -> error::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        let raw = serde_json::to_string_pretty(doc)?;
        std::fs::write(&tmp, raw)?;
        std::fs::rename(&tmp, &self.path)?;
        tracing::debug!(path = %self.path.display(), entries = doc.len(), "Control document rewritten");
        Ok(())
    }
}
