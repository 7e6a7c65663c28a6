//! Sink contract.
//!
//! Any relational store the engine can write to. The dialect-specific
//! upsert syntax stays behind this trait; the engine only requires a bulk
//! key→fingerprint lookup, a per-chunk atomic insert-or-update, the
//! destructive text-widening rebuild, and an append-only audit table.

use std::collections::HashMap;

use dbfsync_types::{Key, Record, RunAuditRecord, SinkError};

/// A live sink connection.
///
/// Implementations must be `Send` so a run can execute on a background
/// worker. One connection is used by at most one run at a time.
pub trait Sink: Send {
    /// Cheap connectivity probe, run right after connecting.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] with kind `Connection` when the sink is
    /// unreachable.
    fn ping(&self) -> Result<(), SinkError>;

    /// Fetch the stored fingerprint for every key in `keys` that exists in
    /// `table`, as one bulk read. Keys absent from the table are simply
    /// absent from the result.
    ///
    /// # Errors
    ///
    /// Returns a `Schema` error when the table lacks the key or
    /// fingerprint columns, `Connection` when the sink is unreachable.
    fn fetch_fingerprints(
        &self,
        table: &str,
        key_fields: &[String],
        fingerprint_field: &str,
        keys: &[Key],
    ) -> Result<HashMap<Key, String>, SinkError>;

    /// Apply one chunk as a single atomic insert-or-update: rows whose key
    /// is new are inserted, existing rows have every non-key column
    /// overwritten (fingerprint included). A failure mid-chunk must leave
    /// none of the chunk's rows committed.
    ///
    /// # Errors
    ///
    /// Returns `DataTooLong` when a value exceeds a destination column's
    /// declared width, `Connection`/`Schema`/`Other` per [`SinkError`].
    fn upsert_chunk(
        &self,
        table: &str,
        key_fields: &[String],
        records: &[Record],
    ) -> Result<(), SinkError>;

    /// Destructively rebuild `table` with every text-bearing column
    /// widened to an unbounded text type, preserving data and keys.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when the rebuild fails; the caller treats
    /// that as fatal.
    fn widen_text_columns(&self, table: &str) -> Result<(), SinkError>;

    /// Append one record to the audit log. Never mutates existing rows.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] on write failure; the caller reports it
    /// without failing the run.
    fn append_audit(&self, record: &RunAuditRecord) -> Result<(), SinkError>;
}

/// Factory for [`Sink`] connections, used by the resilient connection
/// manager to retry the initial connect.
pub trait SinkConnector: Send + Sync {
    /// Open a fresh connection.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when the sink cannot be reached.
    fn connect(&self) -> Result<Box<dyn Sink>, SinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_trait_is_object_safe() {
        fn _assert_sink(_: &dyn Sink) {}
        fn _assert_connector(_: &dyn SinkConnector) {}
    }
}
