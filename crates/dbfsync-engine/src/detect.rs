//! Change detector: deduplicates a batch and selects new or changed rows.

use std::collections::HashSet;

use dbfsync_types::{Record, Value};

use crate::errors::SyncError;
use crate::sink::Sink;

/// Outcome of change detection for one batch.
#[derive(Debug, Clone)]
pub struct Delta {
    /// Records to upsert, in input order.
    pub records: Vec<Record>,
    /// Input batch size before deduplication.
    pub rows_processed: u64,
    /// Records discarded as duplicate keys within the batch.
    pub duplicates_dropped: u64,
}

/// Select the minimal subset of `batch` that must be written to `table`.
///
/// Deduplicates by key (first occurrence wins), loads the stored
/// fingerprints for the batch's keys from the sink in one bulk read, and
/// keeps a record iff its key is absent from the sink or its stored
/// fingerprint differs from the freshly computed one. Fingerprint lookup
/// is scoped to the batch's keys; rows mutated in the sink outside this
/// batch are not re-examined.
///
/// Every record must already carry its fingerprint under
/// `fingerprint_field` (the orchestrator stamps records before calling).
///
/// # Errors
///
/// - [`SyncError::Config`] when a record is missing a key field or its
///   fingerprint (the declared schema disagrees with the data).
/// - [`SyncError::Sink`] when the bulk lookup fails; connection errors
///   stay retryable for the caller.
pub fn detect_changes(
    batch: Vec<Record>,
    sink: &dyn Sink,
    table: &str,
    key_fields: &[String],
    fingerprint_field: &str,
) -> Result<Delta, SyncError> {
    let rows_processed = batch.len() as u64;

    let mut seen = HashSet::new();
    let mut deduped = Vec::with_capacity(batch.len());
    for record in batch {
        let key = record.key(key_fields).map_err(|field| {
            SyncError::Config(format!(
                "record in table '{table}' is missing key field '{field}'"
            ))
        })?;
        if seen.insert(key.clone()) {
            deduped.push((key, record));
        }
    }
    let duplicates_dropped = rows_processed - deduped.len() as u64;
    if duplicates_dropped > 0 {
        tracing::warn!(
            table,
            dropped = duplicates_dropped,
            "Duplicate keys within batch, keeping first occurrence"
        );
    }

    let keys: Vec<_> = deduped.iter().map(|(key, _)| key.clone()).collect();
    let stored = sink.fetch_fingerprints(table, key_fields, fingerprint_field, &keys)?;

    let mut records = Vec::new();
    for (key, record) in deduped {
        let fingerprint = match record.get(fingerprint_field) {
            Some(Value::Text(hash)) => hash.clone(),
            _ => {
                return Err(SyncError::Config(format!(
                    "record with key '{key}' carries no fingerprint field '{fingerprint_field}'"
                )))
            }
        };
        if stored.get(&key) != Some(&fingerprint) {
            records.push(record);
        }
    }

    tracing::info!(
        table,
        rows_processed,
        changed = records.len(),
        "Change detection complete"
    );
    Ok(Delta {
        records,
        rows_processed,
        duplicates_dropped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use dbfsync_types::{Key, RunAuditRecord, SinkError};

    use crate::fingerprint;

    /// Sink stub returning a fixed fingerprint map; records the keys of
    /// the single bulk lookup it serves.
    struct FixedFingerprints {
        stored: HashMap<Key, String>,
        lookups: Mutex<Vec<usize>>,
    }

    impl FixedFingerprints {
        fn new(stored: HashMap<Key, String>) -> Self {
            Self {
                stored,
                lookups: Mutex::new(Vec::new()),
            }
        }
    }

    impl Sink for FixedFingerprints {
        fn ping(&self) -> Result<(), SinkError> {
            Ok(())
        }

        fn fetch_fingerprints(
            &self,
            _table: &str,
            _key_fields: &[String],
            _fingerprint_field: &str,
            keys: &[Key],
        ) -> Result<HashMap<Key, String>, SinkError> {
            self.lookups.lock().unwrap().push(keys.len());
            Ok(keys
                .iter()
                .filter_map(|k| self.stored.get(k).map(|v| (k.clone(), v.clone())))
                .collect())
        }

        fn upsert_chunk(
            &self,
            _table: &str,
            _key_fields: &[String],
            _records: &[Record],
        ) -> Result<(), SinkError> {
            Ok(())
        }

        fn widen_text_columns(&self, _table: &str) -> Result<(), SinkError> {
            Ok(())
        }

        fn append_audit(&self, _record: &RunAuditRecord) -> Result<(), SinkError> {
            Ok(())
        }
    }

    fn keys() -> Vec<String> {
        vec!["id".to_string()]
    }

    fn hashes() -> Vec<String> {
        vec!["id".to_string(), "name".to_string()]
    }

    fn stamped(id: i64, name: &str) -> Record {
        let mut record = Record::from_iter([
            ("id".to_string(), Value::Integer(id)),
            ("name".to_string(), Value::Text(name.into())),
        ]);
        fingerprint::stamp(&mut record, &hashes(), "row_hash");
        record
    }

    #[test]
    fn everything_is_new_against_empty_sink() {
        let sink = FixedFingerprints::new(HashMap::new());
        let delta = detect_changes(
            vec![stamped(1, "A"), stamped(2, "B")],
            &sink,
            "t",
            &keys(),
            "row_hash",
        )
        .unwrap();
        assert_eq!(delta.rows_processed, 2);
        assert_eq!(delta.records.len(), 2);
    }

    #[test]
    fn unchanged_records_are_filtered_out() {
        let unchanged = stamped(1, "A");
        let hash = match unchanged.get("row_hash").unwrap() {
            Value::Text(h) => h.clone(),
            _ => unreachable!(),
        };
        let mut stored = HashMap::new();
        stored.insert(Key::new(vec!["1".into()]), hash);

        let sink = FixedFingerprints::new(stored);
        let delta = detect_changes(
            vec![unchanged, stamped(2, "B")],
            &sink,
            "t",
            &keys(),
            "row_hash",
        )
        .unwrap();
        assert_eq!(delta.records.len(), 1);
        assert_eq!(delta.records[0].get("id"), Some(&Value::Integer(2)));
    }

    #[test]
    fn changed_fingerprint_selects_record() {
        let mut stored = HashMap::new();
        stored.insert(Key::new(vec!["1".into()]), "stale-hash".to_string());

        let sink = FixedFingerprints::new(stored);
        let delta =
            detect_changes(vec![stamped(1, "A")], &sink, "t", &keys(), "row_hash").unwrap();
        assert_eq!(delta.records.len(), 1);
    }

    #[test]
    fn duplicate_keys_keep_first_occurrence() {
        let sink = FixedFingerprints::new(HashMap::new());
        let delta = detect_changes(
            vec![stamped(1, "first"), stamped(1, "second"), stamped(2, "B")],
            &sink,
            "t",
            &keys(),
            "row_hash",
        )
        .unwrap();

        assert_eq!(delta.rows_processed, 3);
        assert_eq!(delta.duplicates_dropped, 1);
        assert_eq!(delta.records.len(), 2);
        assert_eq!(
            delta.records[0].get("name"),
            Some(&Value::Text("first".into()))
        );
    }

    #[test]
    fn lookup_is_one_bulk_read_scoped_to_batch_keys() {
        let sink = FixedFingerprints::new(HashMap::new());
        detect_changes(
            vec![stamped(1, "A"), stamped(2, "B"), stamped(3, "C")],
            &sink,
            "t",
            &keys(),
            "row_hash",
        )
        .unwrap();
        assert_eq!(*sink.lookups.lock().unwrap(), vec![3]);
    }

    #[test]
    fn missing_key_field_is_config_error() {
        let sink = FixedFingerprints::new(HashMap::new());
        let record = Record::from_iter([("name".to_string(), Value::Text("A".into()))]);
        let err =
            detect_changes(vec![record], &sink, "t", &keys(), "row_hash").unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn missing_fingerprint_is_config_error() {
        let sink = FixedFingerprints::new(HashMap::new());
        let record = Record::from_iter([("id".to_string(), Value::Integer(1))]);
        let err =
            detect_changes(vec![record], &sink, "t", &keys(), "row_hash").unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn empty_batch_yields_empty_delta() {
        let sink = FixedFingerprints::new(HashMap::new());
        let delta = detect_changes(vec![], &sink, "t", &keys(), "row_hash").unwrap();
        assert_eq!(delta.rows_processed, 0);
        assert!(delta.records.is_empty());
    }
}
