//! Field mapper: renames source fields to target fields.

use dbfsync_types::{ColumnMapping, Record};

/// Result of mapping one batch.
#[derive(Debug, Clone, Default)]
pub struct MapOutcome {
    /// Mapped records, fields in declared mapping order.
    pub records: Vec<Record>,
    /// Declared source fields absent from the whole batch. A warning,
    /// not an error.
    pub missing_sources: Vec<String>,
}

/// Rename source fields to target fields per the declared mapping.
///
/// Matching is case-insensitive. A declared source field that no record in
/// the batch carries is reported in [`MapOutcome::missing_sources`] and
/// logged; it simply produces no target field. Output records contain only
/// mapped fields, in mapping order.
#[must_use]
pub fn map_records(raw: &[Record], columns: &[ColumnMapping]) -> MapOutcome {
    let mut missing_sources = Vec::new();
    for mapping in columns {
        let present = raw.iter().any(|record| {
            record
                .field_names()
                .any(|name| name.eq_ignore_ascii_case(&mapping.source))
        });
        if !present && !raw.is_empty() {
            missing_sources.push(mapping.source.clone());
        }
    }
    if !missing_sources.is_empty() {
        tracing::warn!(
            fields = ?missing_sources,
            "Declared source fields not found in batch, excluded from mapping"
        );
    }

    let records = raw
        .iter()
        .map(|record| {
            let mut mapped = Record::new();
            for mapping in columns {
                let found = record
                    .fields()
                    .find(|(name, _)| name.eq_ignore_ascii_case(&mapping.source));
                if let Some((_, value)) = found {
                    mapped.set(mapping.target.clone(), value.clone());
                }
            }
            mapped
        })
        .collect();

    MapOutcome {
        records,
        missing_sources,
    }
}
