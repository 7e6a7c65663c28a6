//! Model types shared across the dbfsync crates.
//!
//! Pure data types used by the state store and the sync engine. Kept in
//! their own crate so both can share them without circular dependencies.

pub mod entry;
pub mod error;
pub mod record;
pub mod state;
pub mod value;

pub use entry::{ColumnMapping, Entry, EntrySet};
pub use error::{SinkError, SinkErrorKind};
pub use record::{Key, Record};
pub use state::{EntryId, EntryState, RunAuditRecord, RunSummary};
pub use value::Value;
