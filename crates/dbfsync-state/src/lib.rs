//! Sync state persistence for the dbfsync engine.
//!
//! Provides [`SyncStateStore`], a JSON control-document store holding one
//! [`EntryState`](dbfsync_types::EntryState) per entry: the last successful
//! sync watermark and an optional key→fingerprint cache. The document is
//! read and rewritten wholesale, with an atomic rename on every write so a
//! crash mid-write never leaves a torn file behind.

pub mod error;
pub mod store;

pub use error::StateError;
pub use store::SyncStateStore;
