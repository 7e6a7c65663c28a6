//! Resilient sink connection handling.
//!
//! Obtains a sink connection with bounded retry and linear backoff, and
//! escalates unrecoverable data-width errors into a one-time destructive
//! schema-widening replay.

use std::time::Duration;

use dbfsync_types::{Record, SinkError};

use crate::sink::{Sink, SinkConnector};

/// Connection retry and pool sizing policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Connection attempts before giving up.
    pub max_attempts: u32,
    /// Wait before retry `n` is `base_delay * n`.
    pub base_delay: Duration,
    /// Bounded pool size hint for pooling sinks.
    pub pool_size: u32,
    /// Connections allowed beyond the pool before callers block.
    pub max_overflow: u32,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            pool_size: 5,
            max_overflow: 10,
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retrying after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Connect to the sink, retrying transient failures per `policy`.
///
/// Each attempt opens a connection and probes it with [`Sink::ping`]; the
/// last error is raised after the attempts are exhausted.
///
/// # Errors
///
/// Returns the final [`SinkError`] once `policy.max_attempts` attempts
/// have failed.
pub fn connect_with_retry(
    connector: &dyn SinkConnector,
    policy: &RetryPolicy,
) -> Result<Box<dyn Sink>, SinkError> {
    let mut last_error = None;
    for attempt in 1..=policy.max_attempts {
        match connector.connect().and_then(|sink| {
            sink.ping()?;
            Ok(sink)
        }) {
            Ok(sink) => return Ok(sink),
            Err(err) => {
                if attempt < policy.max_attempts {
                    let delay = policy.backoff(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts = policy.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Sink connection failed, will retry"
                    );
                    std::thread::sleep(delay);
                } else {
                    tracing::error!(
                        attempts = policy.max_attempts,
                        error = %err,
                        "Sink connection attempts exhausted"
                    );
                }
                last_error = Some(err);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| SinkError::connection("no connection attempt made")))
}

/// Tracks whether the one-shot widening fallback has fired for a table
/// during the current run.
#[derive(Debug, Default)]
pub struct OverflowGuard {
    widened: bool,
}

impl OverflowGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the fallback already ran this run.
    #[must_use]
    pub fn widened(&self) -> bool {
        self.widened
    }

    /// Apply one chunk, recovering a data-width overflow at most once.
    ///
    /// On `DataTooLong` with the fallback still unused, widens every
    /// text-bearing column of `table` and replays the chunk exactly once.
    /// Any other failure, or a failing replay, surfaces unchanged.
    ///
    /// # Errors
    ///
    /// Returns the chunk's [`SinkError`] when it cannot be recovered.
    pub fn apply_chunk(
        &mut self,
        sink: &dyn Sink,
        table: &str,
        key_fields: &[String],
        records: &[Record],
    ) -> Result<(), SinkError> {
        match sink.upsert_chunk(table, key_fields, records) {
            Err(err) if err.kind == dbfsync_types::SinkErrorKind::DataTooLong && !self.widened => {
                tracing::warn!(
                    table,
                    error = %err,
                    "Data overflow detected, widening table and replaying chunk"
                );
                self.widened = true;
                sink.widen_text_columns(table)?;
                sink.upsert_chunk(table, key_fields, records)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use dbfsync_types::{Key, RunAuditRecord};

    /// Scripted sink: fails `upsert_chunk` per the queued outcomes.
    struct ScriptedSink {
        upsert_outcomes: Mutex<Vec<Result<(), SinkError>>>,
        upsert_calls: AtomicU32,
        widen_calls: AtomicU32,
        widen_result: Mutex<Option<SinkError>>,
    }

    impl ScriptedSink {
        fn new(outcomes: Vec<Result<(), SinkError>>) -> Self {
            Self {
                upsert_outcomes: Mutex::new(outcomes),
                upsert_calls: AtomicU32::new(0),
                widen_calls: AtomicU32::new(0),
                widen_result: Mutex::new(None),
            }
        }
    }

    impl Sink for ScriptedSink {
        fn ping(&self) -> Result<(), SinkError> {
            Ok(())
        }

        fn fetch_fingerprints(
            &self,
            _table: &str,
            _key_fields: &[String],
            _fingerprint_field: &str,
            _keys: &[Key],
        ) -> Result<HashMap<Key, String>, SinkError> {
            Ok(HashMap::new())
        }

        fn upsert_chunk(
            &self,
            _table: &str,
            _key_fields: &[String],
            _records: &[Record],
        ) -> Result<(), SinkError> {
            self.upsert_calls.fetch_add(1, Ordering::SeqCst);
            let mut outcomes = self.upsert_outcomes.lock().unwrap();
            if outcomes.is_empty() {
                Ok(())
            } else {
                outcomes.remove(0)
            }
        }

        fn widen_text_columns(&self, _table: &str) -> Result<(), SinkError> {
            self.widen_calls.fetch_add(1, Ordering::SeqCst);
            match self.widen_result.lock().unwrap().take() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }

        fn append_audit(&self, _record: &RunAuditRecord) -> Result<(), SinkError> {
            Ok(())
        }
    }

    struct FlakyConnector {
        failures_before_success: AtomicU32,
        attempts: Arc<AtomicU32>,
    }

    impl SinkConnector for FlakyConnector {
        fn connect(&self) -> Result<Box<dyn Sink>, SinkError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.failures_before_success.load(Ordering::SeqCst) > 0 {
                self.failures_before_success.fetch_sub(1, Ordering::SeqCst);
                Err(SinkError::connection("refused"))
            } else {
                Ok(Box::new(ScriptedSink::new(vec![])))
            }
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn backoff_grows_linearly_with_attempt() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(5),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(1), Duration::from_secs(5));
        assert_eq!(policy.backoff(2), Duration::from_secs(10));
        assert_eq!(policy.backoff(3), Duration::from_secs(15));
    }

    #[test]
    fn connect_retries_then_succeeds() {
        let attempts = Arc::new(AtomicU32::new(0));
        let connector = FlakyConnector {
            failures_before_success: AtomicU32::new(2),
            attempts: attempts.clone(),
        };
        connect_with_retry(&connector, &fast_policy(3)).unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn connect_raises_last_error_after_exhaustion() {
        let attempts = Arc::new(AtomicU32::new(0));
        let connector = FlakyConnector {
            failures_before_success: AtomicU32::new(10),
            attempts: attempts.clone(),
        };
        let err = connect_with_retry(&connector, &fast_policy(3)).err().unwrap();
        assert!(err.is_retryable());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn overflow_widens_once_and_replays() {
        let sink = ScriptedSink::new(vec![Err(SinkError::data_too_long("name")), Ok(())]);
        let mut guard = OverflowGuard::new();
        guard
            .apply_chunk(&sink, "agents", &["agent_id".to_string()], &[Record::new()])
            .unwrap();
        assert_eq!(sink.upsert_calls.load(Ordering::SeqCst), 2);
        assert_eq!(sink.widen_calls.load(Ordering::SeqCst), 1);
        assert!(guard.widened());
    }

    #[test]
    fn overflow_after_widening_is_fatal() {
        let sink = ScriptedSink::new(vec![
            Err(SinkError::data_too_long("name")),
            Ok(()),
            Err(SinkError::data_too_long("name again")),
        ]);
        let mut guard = OverflowGuard::new();
        guard
            .apply_chunk(&sink, "agents", &["agent_id".to_string()], &[Record::new()])
            .unwrap();
        let err = guard
            .apply_chunk(&sink, "agents", &["agent_id".to_string()], &[Record::new()])
            .unwrap_err();
        assert_eq!(err.kind, dbfsync_types::SinkErrorKind::DataTooLong);
        assert_eq!(sink.widen_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_replay_is_fatal() {
        let sink = ScriptedSink::new(vec![
            Err(SinkError::data_too_long("name")),
            Err(SinkError::other("replay failed")),
        ]);
        let mut guard = OverflowGuard::new();
        let err = guard
            .apply_chunk(&sink, "agents", &["agent_id".to_string()], &[Record::new()])
            .unwrap_err();
        assert_eq!(err.kind, dbfsync_types::SinkErrorKind::Other);
    }

    #[test]
    fn non_overflow_errors_pass_through_without_widening() {
        let sink = ScriptedSink::new(vec![Err(SinkError::connection("gone"))]);
        let mut guard = OverflowGuard::new();
        let err = guard
            .apply_chunk(&sink, "agents", &["agent_id".to_string()], &[Record::new()])
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(sink.widen_calls.load(Ordering::SeqCst), 0);
        assert!(!guard.widened());
    }
}
