//! File history for a Quill workspace: tracking, snapshotting, and rewinding
//! edits made through the tool runtime.
//!
//! The moving parts, leaves first:
//!
//! - [`BackupStore`]: content copies of tracked files under
//!   `<backup_root>/<session_id>/`, keyed by path hash and version.
//! - [`FileHistory`]: the per-session state machine. Tracks files before a
//!   tool modifies them, folds the resulting pending backups into a
//!   [`Snapshot`] when the assistant turn completes, and walks the snapshot
//!   suffix to preview or apply a rewind.
//! - [`SessionJournal`]: append-only JSONL record of conversation messages
//!   and snapshots; the reader rebuilds state after a restart.
//! - [`HistoryManager`]: lazy, per-session ownership of `FileHistory`
//!   instances.

mod backup;
mod file_history;
mod journal;
mod manager;
mod snapshot;

pub use backup::{BackupError, BackupStat, BackupStore};
pub use file_history::{FileHistory, RewindOutcome};
pub use journal::{JournalContents, JournalError, SessionJournal};
pub use manager::HistoryManager;
pub use snapshot::{FileBackupMeta, Snapshot, SnapshotPreview};
