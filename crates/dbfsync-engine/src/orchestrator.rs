//! Run orchestrator: drives one entry through the full sync pipeline.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use dbfsync_state::SyncStateStore;
use dbfsync_types::{Entry, EntryId, EntrySet, RunAuditRecord, RunSummary};

use crate::connect::{self, OverflowGuard, RetryPolicy};
use crate::errors::{RunError, Stage, SyncError};
use crate::sink::SinkConnector;
use crate::source::RecordSource;
use crate::{audit, detect, fingerprint, mapper, upsert};

/// Tunables for one orchestrator instance.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Records per atomic upsert chunk.
    pub chunk_size: usize,
    /// Target column holding the content fingerprint.
    pub fingerprint_field: String,
    /// Sink connection retry policy.
    pub retry: RetryPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            chunk_size: upsert::DEFAULT_CHUNK_SIZE,
            fingerprint_field: "row_hash".to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Synchronizes entries from a record source into a sink.
///
/// Holds the parsed schema set, the durable sync state store, and the
/// sink connector. One [`Orchestrator::run`] call syncs one entry end to
/// end; entries are independent, but the same entry must not run twice
/// concurrently (the state store is not locked).
pub struct Orchestrator {
    entries: EntrySet,
    state: SyncStateStore,
    connector: Arc<dyn SinkConnector>,
    options: SyncOptions,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        entries: EntrySet,
        state: SyncStateStore,
        connector: Arc<dyn SinkConnector>,
        options: SyncOptions,
    ) -> Self {
        Self {
            entries,
            state,
            connector,
            options,
        }
    }

    /// The schema set this orchestrator serves.
    #[must_use]
    pub fn entries(&self) -> &EntrySet {
        &self.entries
    }

    /// The durable sync state store backing the watermarks.
    #[must_use]
    pub fn state(&self) -> &SyncStateStore {
        &self.state
    }

    /// Synchronize one entry: extract, map, fingerprint, detect, upsert,
    /// audit, advance the watermark.
    ///
    /// `progress` receives a percentage in `0..=100` after every committed
    /// chunk and always ends at `100` on success. The watermark advances
    /// only when every prior stage succeeded, so a failed run is retried
    /// in full on the next invocation; already-committed chunks are
    /// harmless because the upsert is idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] naming the entry and the stage that failed.
    pub fn run(
        &self,
        entry_name: &str,
        source: &dyn RecordSource,
        progress: &mut dyn FnMut(u8),
    ) -> Result<RunSummary, RunError> {
        let started = Instant::now();
        let entry = self.entries.find(entry_name).ok_or_else(|| {
            RunError::new(
                &EntryId::new(entry_name),
                Stage::ResolveEntry,
                SyncError::EntryNotFound(entry_name.to_string()),
            )
        })?;
        let entry_id = EntryId::new(&entry.id);
        tracing::info!(entry = %entry_id, table = %entry.table, "Sync run started");

        let batch = source
            .read(&entry.id, &entry.source_fields())
            .map_err(|e| RunError::new(&entry_id, Stage::Extract, SyncError::Source(e)))?;
        tracing::debug!(
            entry = %entry_id,
            records = batch.records.len(),
            missing = batch.missing_fields.len(),
            "Extraction complete"
        );

        let mapped = mapper::map_records(&batch.records, &entry.columns);
        check_key_coverage(entry, &mapped)
            .map_err(|e| RunError::new(&entry_id, Stage::Map, e))?;

        let mut records = mapped.records;
        for record in &mut records {
            fingerprint::stamp(record, &entry.hash_fields, &self.options.fingerprint_field);
        }

        let sink = connect::connect_with_retry(self.connector.as_ref(), &self.options.retry)
            .map_err(|e| RunError::new(&entry_id, Stage::Connect, e))?;

        let delta = detect::detect_changes(
            records,
            sink.as_ref(),
            &entry.table,
            &entry.key_fields,
            &self.options.fingerprint_field,
        )
        .map_err(|e| RunError::new(&entry_id, Stage::Detect, e))?;

        let mut guard = OverflowGuard::new();
        let rows_upserted = upsert::run(
            sink.as_ref(),
            &entry.table,
            &entry.key_fields,
            &delta.records,
            self.options.chunk_size,
            &mut guard,
            progress,
        )
        .map_err(|e| RunError::new(&entry_id, Stage::Upsert, e))?;

        let sync_time = Utc::now();
        let elapsed_seconds = started.elapsed().as_secs_f64();
        let mem_used_mb = audit::mem_used_mb();
        audit::record_run(
            sink.as_ref(),
            &RunAuditRecord {
                entry_id: entry_id.clone(),
                sync_time,
                rows_processed: delta.rows_processed,
                rows_upserted,
                elapsed_seconds,
                chunk_size: self.options.chunk_size,
                mem_used_mb,
            },
        );

        self.state
            .set_last_sync(&entry_id, sync_time)
            .map_err(|e| RunError::new(&entry_id, Stage::UpdateWatermark, e))?;

        let summary = RunSummary {
            entry_id,
            rows_processed: delta.rows_processed,
            rows_upserted,
            elapsed_seconds,
            mem_used_mb,
        };
        tracing::info!(widened = guard.widened(), "{summary}");
        Ok(summary)
    }
}

/// A key field whose source column the batch never carried would make
/// every record unkeyable; fail before touching the sink.
fn check_key_coverage(entry: &Entry, mapped: &mapper::MapOutcome) -> Result<(), SyncError> {
    if mapped.records.is_empty() {
        return Ok(());
    }
    for key in &entry.key_fields {
        let source = entry
            .columns
            .iter()
            .find(|c| c.target.eq_ignore_ascii_case(key))
            .map(|c| c.source.as_str());
        let covered = source.is_some_and(|s| {
            !mapped
                .missing_sources
                .iter()
                .any(|m| m.eq_ignore_ascii_case(s))
        });
        if !covered {
            return Err(SyncError::Config(format!(
                "key field '{key}' of entry '{}' is absent from the source data",
                entry.id
            )));
        }
    }
    Ok(())
}
