//! Deterministic record fingerprints for change detection.
//!
//! A fingerprint is the SHA-256 of the record's declared hash fields,
//! canonicalized and joined in declared order, rendered as lowercase hex.
//! Identical canonicalized input always yields the identical digest, and
//! fields outside the hash list never influence it.

use dbfsync_types::{Record, Value};
use sha2::{Digest, Sha256};

/// Separator between canonicalized field values. Not expected in source
/// data after trimming; a collision would require a field value to embed
/// the delimiter at a position that mirrors another field split.
const DELIMITER: &str = "|";

/// Compute the fingerprint of `record` over `hash_fields`.
///
/// Pure: no I/O, no mutation. A hash field absent from the record
/// contributes the empty string, same as a null value.
#[must_use]
pub fn compute(record: &Record, hash_fields: &[String]) -> String {
    let mut canonical = String::new();
    for (i, field) in hash_fields.iter().enumerate() {
        if i > 0 {
            canonical.push_str(DELIMITER);
        }
        if let Some(value) = record.get(field) {
            canonical.push_str(&value.canonical_text());
        }
    }
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Compute the fingerprint and append it to `record` under
/// `fingerprint_field`, replacing any existing value.
pub fn stamp(record: &mut Record, hash_fields: &[String], fingerprint_field: &str) {
    let digest = compute(record, hash_fields);
    record.set(fingerprint_field.to_string(), Value::Text(digest));
}
