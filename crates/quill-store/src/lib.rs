pub mod database;
pub mod error;
pub mod history;
pub mod row_helpers;
pub mod schema;
pub mod snapshots;
pub mod vfs;

pub use database::Database;
pub use error::StoreError;
pub use history::HistoryLog;
pub use snapshots::{Checkpoint, CheckpointInfo, Persistence, Snapshot, SnapshotRepo};
pub use vfs::{ContentStore, DeleteOutcome, EditMode, EntryInfo, EntryKind, FileEntry};
