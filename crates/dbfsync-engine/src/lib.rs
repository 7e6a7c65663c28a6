//! Incremental synchronization engine.
//!
//! Replicates records from a flat-file tabular source into a relational
//! sink, writing only rows that are new or whose content fingerprint
//! changed since the last run. One [`Orchestrator::run`] call performs a
//! full sync of one entry: extract, map, fingerprint, detect changes,
//! upsert in bounded chunks with progress reporting, append an audit
//! record, and advance the per-entry watermark.
//!
//! The flat-file decoder and any front end live outside this crate; they
//! plug in through the [`source::RecordSource`] and progress-callback
//! seams. The sink is abstracted behind [`sink::Sink`], with a SQLite
//! reference implementation in [`sqlite`].

pub mod audit;
pub mod connect;
pub mod detect;
pub mod errors;
pub mod fingerprint;
pub mod mapper;
pub mod orchestrator;
pub mod sink;
pub mod source;
pub mod sqlite;
pub mod upsert;
pub mod worker;

pub use connect::RetryPolicy;
pub use errors::{RunError, Stage, SyncError};
pub use orchestrator::{Orchestrator, SyncOptions};
pub use sink::{Sink, SinkConnector};
pub use source::{RecordSource, SourceBatch};
pub use sqlite::{SqliteSink, SqliteSinkConnector};
