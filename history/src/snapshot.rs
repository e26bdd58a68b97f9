//! Snapshot data model.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quill_types::MessageId;
use quill_utils::RelPath;

/// Recorded state of one tracked path at backup time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileBackupMeta {
    /// Blob name inside the session's backup directory. `None` records that
    /// the path did not exist at this point (deleted or not yet created).
    pub backup_file_name: Option<String>,
    /// Strictly increasing per tracked path; starts at 1.
    pub version: u32,
    pub backup_time: DateTime<Utc>,
}

/// Record of the files modified during one assistant turn, keyed to the
/// assistant message that completed it.
///
/// A snapshot carries only the paths that changed that turn. Paths untouched
/// since an earlier snapshot are implicitly carried by whichever snapshot
/// last recorded them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub message_id: MessageId,
    pub timestamp: DateTime<Utc>,
    pub tracked_file_backups: BTreeMap<RelPath, FileBackupMeta>,
}

impl Snapshot {
    /// Number of paths whose recorded backup differs from `prior`'s.
    ///
    /// A path present in only one of the two maps counts as a change.
    #[must_use]
    pub fn change_count_from(&self, prior: &Snapshot) -> usize {
        let mut changed = 0;
        for (path, meta) in &self.tracked_file_backups {
            match prior.tracked_file_backups.get(path) {
                Some(prior_meta) if prior_meta.backup_file_name == meta.backup_file_name => {}
                _ => changed += 1,
            }
        }
        changed
            + prior
                .tracked_file_backups
                .keys()
                .filter(|path| !self.tracked_file_backups.contains_key(path))
                .count()
    }
}

/// Compact, host-facing view of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotPreview {
    pub message_id: MessageId,
    pub timestamp: DateTime<Utc>,
    pub file_count: usize,
    /// Paths recorded differently than in the previous snapshot; `None` for
    /// the first snapshot of a session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_count: Option<usize>,
    /// Line deltas are computed on demand by rewind/preview, never here.
    pub insertions: u32,
    pub deletions: u32,
}
