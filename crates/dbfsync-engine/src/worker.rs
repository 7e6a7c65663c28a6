//! Background run execution.
//!
//! Runs one sync on a dedicated thread and streams progress and the
//! terminal result back over a channel, keeping callers (a UI thread,
//! a scheduler) free while the run executes. Runs are not cancellable;
//! a run either finishes or fails.

use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use dbfsync_types::RunSummary;

use crate::errors::RunError;
use crate::orchestrator::Orchestrator;
use crate::source::RecordSource;

/// Event emitted by a background run.
#[derive(Debug)]
pub enum RunEvent {
    /// Upsert progress, `0..=100`, nondecreasing.
    Progress(u8),
    /// Terminal outcome. Nothing follows this event.
    Finished(Box<Result<RunSummary, RunError>>),
}

/// Handle to a background run: the event stream plus the thread handle.
pub struct RunHandle {
    events: Receiver<RunEvent>,
    thread: JoinHandle<()>,
}

impl RunHandle {
    /// The event stream. Ends after [`RunEvent::Finished`].
    #[must_use]
    pub fn events(&self) -> &Receiver<RunEvent> {
        &self.events
    }

    /// Drain remaining events and wait for the thread to exit, returning
    /// the terminal outcome.
    ///
    /// # Errors
    ///
    /// Returns the run's [`RunError`] when it failed.
    ///
    /// # Panics
    ///
    /// Re-raises the worker thread's panic, if it panicked.
    pub fn join(self) -> Result<RunSummary, RunError> {
        let mut outcome = None;
        while let Ok(event) = self.events.recv() {
            if let RunEvent::Finished(result) = event {
                outcome = Some(*result);
            }
        }
        if let Err(panic) = self.thread.join() {
            std::panic::resume_unwind(panic);
        }
        match outcome {
            Some(result) => result,
            // A non-panicking worker always sends Finished before exiting.
            None => unreachable!("worker exited without reporting an outcome"),
        }
    }
}

/// Start `entry_name`'s sync on a background thread.
///
/// Progress callbacks and the terminal result arrive as [`RunEvent`]s on
/// the returned handle. A receiver that goes away mid-run does not stop
/// the run; sends to a closed channel are ignored.
#[must_use]
pub fn spawn(
    orchestrator: Arc<Orchestrator>,
    entry_name: &str,
    source: impl RecordSource + 'static,
) -> RunHandle {
    let (tx, rx) = channel();
    let entry = entry_name.to_string();
    let thread = thread::spawn(move || {
        let progress_tx = tx.clone();
        let result = orchestrator.run(&entry, &source, &mut |percent| {
            let _ = progress_tx.send(RunEvent::Progress(percent));
        });
        let _ = tx.send(RunEvent::Finished(Box::new(result)));
    });
    RunHandle { events: rx, thread }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbfsync_state::SyncStateStore;
    use dbfsync_types::{ColumnMapping, Entry, EntrySet, Record, Value};

    use crate::orchestrator::SyncOptions;
    use crate::source::SourceBatch;
    use crate::sqlite::{SqliteSink, SqliteSinkConnector};

    struct StaticSource {
        records: Vec<Record>,
    }

    impl RecordSource for StaticSource {
        fn read(
            &self,
            _source_id: &str,
            _requested_fields: &[String],
        ) -> anyhow::Result<SourceBatch> {
            Ok(SourceBatch {
                records: self.records.clone(),
                missing_fields: Vec::new(),
            })
        }
    }

    fn setup(dir: &tempfile::TempDir) -> Arc<Orchestrator> {
        let db = dir.path().join("sink.db");
        SqliteSink::open(&db)
            .unwrap()
            .execute_batch(
                "CREATE TABLE agents (
                     agent_id INTEGER PRIMARY KEY,
                     name VARCHAR(30),
                     row_hash TEXT
                 )",
            )
            .unwrap();
        let entries = EntrySet {
            catalogs: vec![Entry {
                id: "AGENTS".into(),
                table: "agents".into(),
                columns: vec![
                    ColumnMapping {
                        source: "CVE_AGE".into(),
                        target: "agent_id".into(),
                    },
                    ColumnMapping {
                        source: "NOM_AGE".into(),
                        target: "name".into(),
                    },
                ],
                key_fields: vec!["agent_id".into()],
                hash_fields: vec!["agent_id".into(), "name".into()],
            }],
            transactional: vec![],
        };
        Arc::new(Orchestrator::new(
            entries,
            SyncStateStore::new(dir.path().join("sync_control.json")),
            Arc::new(SqliteSinkConnector::new(db)),
            SyncOptions::default(),
        ))
    }

    fn agent(id: i64, name: &str) -> Record {
        Record::from_iter([
            ("CVE_AGE".to_string(), Value::Integer(id)),
            ("NOM_AGE".to_string(), Value::Text(name.into())),
        ])
    }

    #[test]
    fn background_run_streams_progress_then_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = setup(&dir);
        let handle = spawn(
            orchestrator,
            "AGENTS",
            StaticSource {
                records: vec![agent(1, "Ana"), agent(2, "Luis")],
            },
        );

        let mut progress = Vec::new();
        let mut finished = None;
        for event in handle.events() {
            match event {
                RunEvent::Progress(p) => progress.push(p),
                RunEvent::Finished(result) => finished = Some(*result),
            }
        }
        let summary = finished.unwrap().unwrap();
        assert_eq!(summary.rows_upserted, 2);
        assert_eq!(progress.last(), Some(&100));
        handle.thread.join().unwrap();
    }

    #[test]
    fn join_returns_the_failed_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = setup(&dir);
        let handle = spawn(orchestrator, "GHOST", StaticSource { records: vec![] });
        let err = handle.join().unwrap_err();
        assert_eq!(err.stage, crate::errors::Stage::ResolveEntry);
    }
}
