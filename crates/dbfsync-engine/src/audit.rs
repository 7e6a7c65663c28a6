//! Run audit reporting.

use dbfsync_types::RunAuditRecord;

use crate::sink::Sink;

/// Append `record` to the sink's audit log.
///
/// Audit is reporting, not correctness: a failed append is logged as a
/// warning and the run continues.
pub fn record_run(sink: &dyn Sink, record: &RunAuditRecord) {
    if let Err(err) = sink.append_audit(record) {
        tracing::warn!(
            entry = %record.entry_id,
            error = %err,
            "Could not append run audit record"
        );
    }
}

/// Resident set size of this process in megabytes.
///
/// Reads `VmRSS` from `/proc/self/status`; returns `0.0` on platforms or
/// failures where the value is unavailable. Only feeds reporting.
#[must_use]
pub fn mem_used_mb() -> f64 {
    read_vm_rss_kb().map_or(0.0, |kb| kb / 1024.0)
}

fn read_vm_rss_kb() -> Option<f64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    line.split_whitespace().nth(1)?.parse().ok()
}
