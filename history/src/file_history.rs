//! Per-session tracking, snapshotting, and rewind.
//!
//! # Design notes
//!
//! - Tracking is called by the tool runtime immediately before a file is
//!   modified, so a backup always captures the pre-modification state. A
//!   metadata fast path (size + mtime against the latest committed backup)
//!   skips the copy when nothing changed.
//! - A snapshot records only the paths modified that turn. Rewinding to a
//!   snapshot therefore reverts the union of paths recorded by the target
//!   and every later snapshot: a path absent from the target's own map is
//!   restored to "did not exist here".
//! - Tracking never fails the tool call; copy errors are logged under the
//!   `checkpoint` target and the pending entry is simply not recorded.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use quill_types::{MessageId, SessionId};
use quill_utils::{DiffCounts, RelPath, count_line_changes};

use crate::backup::BackupStore;
use crate::snapshot::{FileBackupMeta, Snapshot, SnapshotPreview};

/// Outcome of a rewind or rewind preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewindOutcome {
    pub success: bool,
    pub files_changed: Vec<RelPath>,
    pub insertions: u32,
    pub deletions: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RewindOutcome {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            files_changed: Vec::new(),
            insertions: 0,
            deletions: 0,
            error: Some(error.into()),
        }
    }
}

/// The file history of a single session.
#[derive(Debug)]
pub struct FileHistory {
    cwd: PathBuf,
    session_id: SessionId,
    store: BackupStore,
    snapshots: Vec<Snapshot>,
    tracked_files: BTreeSet<RelPath>,
    pending_backups: BTreeMap<RelPath, FileBackupMeta>,
}

impl FileHistory {
    /// Open a history for `session_id`, seeded with snapshots recovered from
    /// the session journal (empty for a fresh session). Ensures the backup
    /// directory exists.
    pub fn open(
        cwd: &Path,
        session_id: SessionId,
        backup_root: &Path,
        snapshots: Vec<Snapshot>,
    ) -> io::Result<Self> {
        let store = BackupStore::open(backup_root, &session_id)?;
        Ok(Self::assemble(cwd, session_id, store, snapshots))
    }

    /// Blank fallback used when the backup directory cannot be created; the
    /// calling tool still proceeds, later copies fail and are swallowed by
    /// tracking policy.
    pub(crate) fn open_detached(cwd: &Path, session_id: SessionId, backup_root: &Path) -> Self {
        let store = BackupStore::detached(backup_root, &session_id);
        Self::assemble(cwd, session_id, store, Vec::new())
    }

    fn assemble(
        cwd: &Path,
        session_id: SessionId,
        store: BackupStore,
        snapshots: Vec<Snapshot>,
    ) -> Self {
        let tracked_files = snapshots
            .iter()
            .flat_map(|snapshot| snapshot.tracked_file_backups.keys().cloned())
            .collect();
        Self {
            cwd: cwd.to_path_buf(),
            session_id,
            store,
            snapshots,
            tracked_files,
            pending_backups: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    #[must_use]
    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    #[must_use]
    pub fn tracked_files(&self) -> &BTreeSet<RelPath> {
        &self.tracked_files
    }

    #[must_use]
    pub fn backup_dir(&self) -> &Path {
        self.store.dir()
    }

    /// Record intent to snapshot `path`'s current state before an imminent
    /// modification. `path` may be absolute or relative to the workspace
    /// root.
    pub fn track_file(&mut self, path: &Path) {
        let Some(rel) = RelPath::under_root(&self.cwd, path) else {
            tracing::debug!(
                target: "checkpoint",
                path = %path.display(),
                "ignoring path outside workspace"
            );
            return;
        };

        self.tracked_files.insert(rel.clone());

        let reference = self.latest_backup(&rel).cloned();
        let absolute = rel.to_absolute(&self.cwd);
        if !self.working_file_changed(&absolute, reference.as_ref()) {
            return;
        }

        let version = reference.map_or(1, |meta| meta.version + 1);
        match self.store.copy_in(&rel, &absolute, version) {
            Ok(meta) => {
                self.pending_backups.insert(rel, meta);
            }
            Err(err) => {
                // Tracking must never fail the tool call.
                tracing::warn!(target: "checkpoint", %rel, %err, "backup failed, skipping");
            }
        }
    }

    /// Record that `path` is about to be created. No working-file I/O; the
    /// pending entry records non-existence.
    pub fn track_new_file(&mut self, path: &Path) {
        let Some(rel) = RelPath::under_root(&self.cwd, path) else {
            tracing::debug!(
                target: "checkpoint",
                path = %path.display(),
                "ignoring path outside workspace"
            );
            return;
        };

        self.tracked_files.insert(rel.clone());

        let version = self.latest_backup(&rel).map_or(1, |meta| meta.version + 1);
        self.pending_backups.insert(
            rel,
            FileBackupMeta {
                backup_file_name: None,
                version,
                backup_time: Utc::now(),
            },
        );
    }

    #[must_use]
    pub fn has_pending_backups(&self) -> bool {
        !self.pending_backups.is_empty()
    }

    #[must_use]
    pub fn has_snapshot(&self, message_id: &MessageId) -> bool {
        self.snapshots
            .iter()
            .any(|snapshot| snapshot.message_id == *message_id)
    }

    /// Fold the pending backups into a new snapshot keyed to `message_id`.
    ///
    /// Returns `None` when nothing was tracked this turn; no snapshot is
    /// created in that case.
    pub fn create_snapshot(&mut self, message_id: MessageId) -> Option<&Snapshot> {
        if self.pending_backups.is_empty() {
            return None;
        }

        let tracked_file_backups = std::mem::take(&mut self.pending_backups);
        self.snapshots.push(Snapshot {
            message_id,
            timestamp: Utc::now(),
            tracked_file_backups,
        });
        self.snapshots.last()
    }

    /// Per-snapshot summaries for the host UI. Line deltas are left at zero;
    /// they are computed on demand by [`Self::preview_rewind`].
    #[must_use]
    pub fn snapshot_previews(&self) -> Vec<SnapshotPreview> {
        self.snapshots
            .iter()
            .enumerate()
            .map(|(index, snapshot)| SnapshotPreview {
                message_id: snapshot.message_id.clone(),
                timestamp: snapshot.timestamp,
                file_count: snapshot.tracked_file_backups.len(),
                change_count: (index > 0)
                    .then(|| snapshot.change_count_from(&self.snapshots[index - 1])),
                insertions: 0,
                deletions: 0,
            })
            .collect()
    }

    /// Restore the workspace to the state captured by `message_id`.
    ///
    /// Reverts the cumulative modifications of the target snapshot and every
    /// later one. With `dry_run` the workspace is left untouched and only
    /// the would-be changes are reported.
    pub fn rewind_to_message(&self, message_id: &MessageId, dry_run: bool) -> RewindOutcome {
        let Some(target_index) = self
            .snapshots
            .iter()
            .position(|snapshot| snapshot.message_id == *message_id)
        else {
            return RewindOutcome::failure("Snapshot not found");
        };

        let target = &self.snapshots[target_index];
        let affected: BTreeSet<&RelPath> = self.snapshots[target_index..]
            .iter()
            .flat_map(|snapshot| snapshot.tracked_file_backups.keys())
            .collect();

        self.revert_paths(target, affected, !dry_run)
    }

    /// Preview a rewind without touching the workspace.
    ///
    /// Cumulative previews report exactly what [`Self::rewind_to_message`]
    /// would do. Non-cumulative previews diff only against the target
    /// snapshot's own backups, which lets a UI annotate an individual
    /// message with its local delta.
    pub fn preview_rewind(&self, message_id: &MessageId, cumulative: bool) -> RewindOutcome {
        if cumulative {
            return self.rewind_to_message(message_id, true);
        }

        let Some(target) = self
            .snapshots
            .iter()
            .find(|snapshot| snapshot.message_id == *message_id)
        else {
            return RewindOutcome::failure("Snapshot not found");
        };

        self.revert_paths(target, target.tracked_file_backups.keys(), false)
    }

    fn revert_paths<'a>(
        &self,
        target: &Snapshot,
        affected: impl IntoIterator<Item = &'a RelPath>,
        apply: bool,
    ) -> RewindOutcome {
        let mut files_changed = Vec::new();
        let mut totals = DiffCounts::default();

        for rel in affected {
            let target_name = target
                .tracked_file_backups
                .get(rel)
                .and_then(|meta| meta.backup_file_name.as_deref());
            let absolute = rel.to_absolute(&self.cwd);

            let counts = self.diff_against_backup(&absolute, target_name);
            if !counts.any() {
                continue;
            }
            totals.accumulate(counts);
            files_changed.push(rel.clone());

            if !apply {
                continue;
            }

            let restored = match target_name {
                None => BackupStore::remove_working_file(&absolute),
                Some(name) => self.store.copy_out(name, &absolute),
            };
            if let Err(err) = restored {
                // Already-restored files stay restored; report the partial counts.
                return RewindOutcome {
                    success: false,
                    files_changed,
                    insertions: totals.insertions,
                    deletions: totals.deletions,
                    error: Some(err.to_string()),
                };
            }
        }

        RewindOutcome {
            success: true,
            files_changed,
            insertions: totals.insertions,
            deletions: totals.deletions,
            error: None,
        }
    }

    /// Line deltas between the working file and a backup blob. A missing
    /// side diffs as the empty document; an unreadable side degrades to no
    /// measurable change.
    fn diff_against_backup(&self, absolute: &Path, backup_name: Option<&str>) -> DiffCounts {
        let Ok(working) = read_optional(absolute) else {
            return DiffCounts::default();
        };
        let backup = match backup_name {
            None => None,
            Some(name) => match read_optional(&self.store.blob_path(name)) {
                Ok(bytes) => bytes,
                Err(_) => return DiffCounts::default(),
            },
        };

        count_line_changes(
            backup.as_deref().unwrap_or_default(),
            working.as_deref().unwrap_or_default(),
        )
    }

    /// Latest committed backup of `rel` across the snapshot list, newest
    /// first. Pending entries are deliberately not consulted: a re-track
    /// within one turn compares against the last committed state.
    fn latest_backup(&self, rel: &RelPath) -> Option<&FileBackupMeta> {
        self.snapshots
            .iter()
            .rev()
            .find_map(|snapshot| snapshot.tracked_file_backups.get(rel))
    }

    /// Metadata fast path: present + present + equal size + equal mtime
    /// means unchanged. Missing on both sides is also unchanged; any other
    /// combination needs a fresh backup.
    fn working_file_changed(&self, absolute: &Path, reference: Option<&FileBackupMeta>) -> bool {
        let working = fs::metadata(absolute).ok().filter(|meta| meta.is_file());
        let backup = reference
            .and_then(|meta| meta.backup_file_name.as_deref())
            .and_then(|name| self.store.stat(name));

        match (working, backup) {
            (None, None) => false,
            (None, Some(_)) | (Some(_), None) => true,
            (Some(working), Some(backup)) => {
                working.len() != backup.size
                    || working.modified().ok() != Some(backup.modified)
            }
        }
    }
}

fn read_optional(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    struct Fixture {
        _backups: tempfile::TempDir,
        workspace: tempfile::TempDir,
        history: FileHistory,
    }

    fn fixture() -> Fixture {
        let backups = tempdir().unwrap();
        let workspace = tempdir().unwrap();
        let history = FileHistory::open(
            workspace.path(),
            SessionId::new("sess-1"),
            backups.path(),
            Vec::new(),
        )
        .unwrap();
        Fixture {
            _backups: backups,
            workspace,
            history,
        }
    }

    impl Fixture {
        fn write(&self, rel: &str, content: &str) -> PathBuf {
            let path = self.workspace.path().join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&path, content).unwrap();
            path
        }
    }

    #[test]
    fn tracking_an_unchanged_file_is_a_no_op() {
        let mut fx = fixture();
        let path = fx.write("a.txt", "stable");

        fx.history.track_file(&path);
        assert!(fx.history.has_pending_backups());
        fx.history.create_snapshot(MessageId::new("m1"));

        // Same size, same mtime: the fast path skips the copy.
        fx.history.track_file(&path);
        assert!(!fx.history.has_pending_backups());
    }

    #[test]
    fn versions_increase_per_path_across_snapshots() {
        let mut fx = fixture();
        let path = fx.write("a.txt", "one");

        fx.history.track_file(&path);
        fx.history.create_snapshot(MessageId::new("m1"));

        fx.write("a.txt", "two--");
        fx.history.track_file(&path);
        fx.history.create_snapshot(MessageId::new("m2"));

        let versions: Vec<u32> = fx
            .history
            .snapshots()
            .iter()
            .map(|s| s.tracked_file_backups[&RelPath::new("a.txt")].version)
            .collect();
        assert_eq!(versions, [1, 2]);
    }

    #[test]
    fn track_new_file_records_absence_without_io() {
        let mut fx = fixture();
        let path = fx.workspace.path().join("fresh.txt");

        fx.history.track_new_file(&path);
        let snapshot = fx.history.create_snapshot(MessageId::new("m1")).unwrap();
        let meta = &snapshot.tracked_file_backups[&RelPath::new("fresh.txt")];
        assert!(meta.backup_file_name.is_none());
        assert_eq!(meta.version, 1);
    }

    #[test]
    fn create_snapshot_without_pending_returns_none() {
        let mut fx = fixture();
        assert!(fx.history.create_snapshot(MessageId::new("m1")).is_none());
        assert!(fx.history.snapshots().is_empty());
    }

    #[test]
    fn create_snapshot_clears_pending() {
        let mut fx = fixture();
        let path = fx.write("a.txt", "content");

        fx.history.track_file(&path);
        assert!(fx.history.has_pending_backups());
        assert!(fx.history.create_snapshot(MessageId::new("m1")).is_some());
        assert!(!fx.history.has_pending_backups());
        assert!(fx.history.has_snapshot(&MessageId::new("m1")));
    }

    #[test]
    fn absolute_and_relative_tracking_share_one_entry() {
        let mut fx = fixture();
        let absolute = fx.write("test.txt", "content");

        fx.history.track_file(&absolute);
        fx.history.track_file(Path::new("test.txt"));

        let snapshot = fx.history.create_snapshot(MessageId::new("m1")).unwrap();
        assert_eq!(snapshot.tracked_file_backups.len(), 1);
        assert!(snapshot
            .tracked_file_backups
            .contains_key(&RelPath::new("test.txt")));
    }

    #[test]
    fn rewind_restores_snapshot_content() {
        let mut fx = fixture();
        let path = fx.write("a.txt", "original");

        fx.history.track_file(&path);
        fx.history.create_snapshot(MessageId::new("m1"));

        fx.write("a.txt", "modified beyond repair");
        let outcome = fx.history.rewind_to_message(&MessageId::new("m1"), false);
        assert!(outcome.success);
        assert_eq!(outcome.files_changed, [RelPath::new("a.txt")]);
        assert_eq!(fs::read_to_string(&path).unwrap(), "original");
    }

    #[test]
    fn rewind_to_unknown_message_reports_structured_error() {
        let fx = fixture();
        let outcome = fx.history.rewind_to_message(&MessageId::new("nope"), false);
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("Snapshot not found"));
        assert!(outcome.files_changed.is_empty());
    }

    #[test]
    fn second_rewind_is_a_no_op() {
        let mut fx = fixture();
        let path = fx.write("a.txt", "original");

        fx.history.track_file(&path);
        fx.history.create_snapshot(MessageId::new("m1"));
        fx.write("a.txt", "changed");

        let first = fx.history.rewind_to_message(&MessageId::new("m1"), false);
        assert!(first.success);
        assert_eq!(first.files_changed.len(), 1);

        let second = fx.history.rewind_to_message(&MessageId::new("m1"), false);
        assert!(second.success);
        assert!(second.files_changed.is_empty());
        assert_eq!(second.insertions, 0);
        assert_eq!(second.deletions, 0);
    }

    #[test]
    fn cumulative_preview_matches_rewind_counts() {
        let mut fx = fixture();
        let path = fx.write("a.txt", "line1\nline2\n");

        fx.history.track_file(&path);
        fx.history.create_snapshot(MessageId::new("m1"));
        fx.write("a.txt", "line1\nline2 edited\nline3\n");

        let preview = fx.history.preview_rewind(&MessageId::new("m1"), true);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "line1\nline2 edited\nline3\n",
            "preview must not touch the workspace"
        );

        let applied = fx.history.rewind_to_message(&MessageId::new("m1"), false);
        assert_eq!(preview.files_changed, applied.files_changed);
        assert_eq!(preview.insertions, applied.insertions);
        assert_eq!(preview.deletions, applied.deletions);
        assert_eq!(fs::read_to_string(&path).unwrap(), "line1\nline2\n");
    }

    #[test]
    fn local_preview_only_covers_the_snapshots_own_paths() {
        let mut fx = fixture();
        let a = fx.write("a.txt", "aaa");

        fx.history.track_file(&a);
        fx.history.create_snapshot(MessageId::new("m1"));

        let b = fx.write("b.txt", "bbb\n");
        fx.history.track_new_file(&b);
        fx.history.create_snapshot(MessageId::new("m2"));

        fx.write("a.txt", "changed");

        // Cumulative from m1 sees both paths; m2's local delta only b.txt.
        let cumulative = fx.history.preview_rewind(&MessageId::new("m1"), true);
        assert_eq!(cumulative.files_changed.len(), 2);

        let local = fx.history.preview_rewind(&MessageId::new("m2"), false);
        assert_eq!(local.files_changed, [RelPath::new("b.txt")]);
    }

    #[test]
    fn previews_report_counts_without_line_deltas() {
        let mut fx = fixture();
        let a = fx.write("a.txt", "aaa");
        fx.history.track_file(&a);
        fx.history.create_snapshot(MessageId::new("m1"));

        fx.write("a.txt", "aaaa");
        fx.history.track_file(&a);
        let b = fx.write("b.txt", "bbb");
        fx.history.track_file(&b);
        fx.history.create_snapshot(MessageId::new("m2"));

        let previews = fx.history.snapshot_previews();
        assert_eq!(previews.len(), 2);
        assert_eq!(previews[0].file_count, 1);
        assert_eq!(previews[0].change_count, None);
        assert_eq!(previews[1].file_count, 2);
        // a.txt re-recorded at v2 plus b.txt newly present.
        assert_eq!(previews[1].change_count, Some(2));
        assert_eq!(previews[1].insertions, 0);
        assert_eq!(previews[1].deletions, 0);
    }

    #[test]
    fn reopen_rebuilds_tracked_files_from_snapshots() {
        let mut fx = fixture();
        let a = fx.write("a.txt", "aaa");
        let b = fx.write("sub/b.txt", "bbb");
        fx.history.track_file(&a);
        fx.history.track_file(&b);
        fx.history.create_snapshot(MessageId::new("m1"));

        let snapshots = fx.history.snapshots().to_vec();
        let reopened = FileHistory::open(
            fx.workspace.path(),
            SessionId::new("sess-1"),
            fx._backups.path(),
            snapshots,
        )
        .unwrap();

        assert!(reopened.tracked_files().contains(&RelPath::new("a.txt")));
        assert!(reopened.tracked_files().contains(&RelPath::new("sub/b.txt")));
        assert!(!reopened.has_pending_backups());
    }
}
