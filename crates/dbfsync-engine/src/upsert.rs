//! Batch upsert executor: chunked atomic writes with progress reporting.

use dbfsync_types::{Record, SinkError};

use crate::connect::OverflowGuard;
use crate::sink::Sink;

/// Chunk size used when the caller specifies none.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Upsert failure after zero or more chunks committed.
///
/// `rows_written` reflects exactly the rows of the chunks that committed
/// before the failure; the failing chunk contributes nothing.
#[derive(Debug, thiserror::Error)]
#[error("upsert failed after {rows_written} rows: {source}")]
pub struct UpsertError {
    pub rows_written: u64,
    #[source]
    pub source: SinkError,
}

/// Write `delta` to `table` in sequential chunks of at most `chunk_size`
/// records, preserving input order.
///
/// Each chunk is one atomic insert-or-update. After every committed chunk
/// the progress callback receives `floor(written / total * 100)`; an empty
/// delta set reports `100` once and writes nothing. Data-width overflows
/// are recovered through `guard` (widen and replay, at most once per run).
///
/// # Errors
///
/// Returns [`UpsertError`] carrying the accurate committed-row count when
/// a chunk fails. Prior chunks stay committed; rerunning the sync is safe
/// because the upsert is idempotent.
pub fn run(
    sink: &dyn Sink,
    table: &str,
    key_fields: &[String],
    delta: &[Record],
    chunk_size: usize,
    guard: &mut OverflowGuard,
    progress: &mut dyn FnMut(u8),
) -> Result<u64, UpsertError> {
    let chunk_size = chunk_size.max(1);
    let total = delta.len() as u64;
    if total == 0 {
        progress(100);
        return Ok(0);
    }

    let mut written: u64 = 0;
    for chunk in delta.chunks(chunk_size) {
        guard
            .apply_chunk(sink, table, key_fields, chunk)
            .map_err(|source| UpsertError {
                rows_written: written,
                source,
            })?;
        written += chunk.len() as u64;
        #[allow(clippy::cast_possible_truncation)]
        let percent = ((written * 100) / total) as u8;
        progress(percent);
        tracing::debug!(table, written, total, percent, "Chunk committed");
    }
    Ok(written)
}
