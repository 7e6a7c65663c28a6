//! Record source adapter contract.
//!
//! The legacy flat-file reader lives outside this crate; the engine only
//! sees it through [`RecordSource`]. Source records carry source-side
//! field names (matched case-insensitively by the mapper).

use dbfsync_types::Record;

/// Result of one extraction: the decoded records plus the requested
/// fields the underlying source did not have.
#[derive(Debug, Clone, Default)]
pub struct SourceBatch {
    /// Decoded records in source order.
    pub records: Vec<Record>,
    /// Requested fields absent from the source, in request order.
    pub missing_fields: Vec<String>,
}

/// Adapter over the legacy tabular source.
///
/// Implementations must tolerate requested fields missing from the
/// underlying source by omitting them from the records and reporting
/// them in [`SourceBatch::missing_fields`]. An unreadable or missing
/// source is an error.
pub trait RecordSource: Send {
    /// Read all records for `source_id`, restricted to `requested_fields`.
    ///
    /// # Errors
    ///
    /// Returns an error when the source itself is missing or unreadable.
    fn read(&self, source_id: &str, requested_fields: &[String]) -> anyhow::Result<SourceBatch>;
}
