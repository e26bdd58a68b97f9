//! Per-session ownership of file histories.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use quill_types::SessionId;

use crate::file_history::FileHistory;
use crate::journal::SessionJournal;

/// Lazily creates and caches one [`FileHistory`] per session.
///
/// The manager is scoped to one workspace context; hosts create one per
/// workspace rather than sharing a singleton.
#[derive(Debug)]
pub struct HistoryManager {
    backup_root: PathBuf,
    histories: HashMap<SessionId, FileHistory>,
}

impl HistoryManager {
    #[must_use]
    pub fn new(backup_root: impl Into<PathBuf>) -> Self {
        Self {
            backup_root: backup_root.into(),
            histories: HashMap::new(),
        }
    }

    #[must_use]
    pub fn backup_root(&self) -> &Path {
        &self.backup_root
    }

    /// Return the cached history for `session_id`, creating it on first
    /// access. When `journal_path` is given, the journal's snapshot stream
    /// seeds the new history; any load or setup error falls back to a blank
    /// history so the calling tool still proceeds.
    pub fn get_or_create(
        &mut self,
        cwd: &Path,
        session_id: &SessionId,
        journal_path: Option<&Path>,
    ) -> &mut FileHistory {
        if !self.histories.contains_key(session_id) {
            let history = self.build(cwd, session_id, journal_path);
            self.histories.insert(session_id.clone(), history);
        }
        self.histories
            .get_mut(session_id)
            .expect("history was just inserted")
    }

    fn build(
        &self,
        cwd: &Path,
        session_id: &SessionId,
        journal_path: Option<&Path>,
    ) -> FileHistory {
        tracing::debug!(
            target: "session",
            session = %session_id,
            subagent = session_id.is_subagent(),
            "creating file history"
        );
        let snapshots = journal_path
            .map(|path| match SessionJournal::load(path) {
                Ok(contents) => contents.snapshots,
                Err(err) => {
                    tracing::warn!(
                        target: "session",
                        session = %session_id,
                        %err,
                        "journal load failed, starting with empty history"
                    );
                    Vec::new()
                }
            })
            .unwrap_or_default();

        match FileHistory::open(cwd, session_id.clone(), &self.backup_root, snapshots) {
            Ok(history) => history,
            Err(err) => {
                tracing::warn!(
                    target: "checkpoint",
                    session = %session_id,
                    %err,
                    "backup directory unavailable, using blank history"
                );
                FileHistory::open_detached(cwd, session_id.clone(), &self.backup_root)
            }
        }
    }

    /// Install a history directly (used when restoring from a serialized
    /// session payload).
    pub fn set(&mut self, session_id: SessionId, history: FileHistory) {
        self.histories.insert(session_id, history);
    }

    /// Replace the cached history with one rebuilt from serialized
    /// snapshots, with the same blank-history fallback as lazy creation.
    pub fn install(
        &mut self,
        cwd: &Path,
        session_id: &SessionId,
        snapshots: Vec<crate::Snapshot>,
    ) -> &mut FileHistory {
        let history =
            match FileHistory::open(cwd, session_id.clone(), &self.backup_root, snapshots) {
                Ok(history) => history,
                Err(err) => {
                    tracing::warn!(
                        target: "checkpoint",
                        session = %session_id,
                        %err,
                        "backup directory unavailable, using blank history"
                    );
                    FileHistory::open_detached(cwd, session_id.clone(), &self.backup_root)
                }
            };
        self.histories.insert(session_id.clone(), history);
        self.histories
            .get_mut(session_id)
            .expect("history was just inserted")
    }

    #[must_use]
    pub fn get(&self, session_id: &SessionId) -> Option<&FileHistory> {
        self.histories.get(session_id)
    }

    pub fn get_mut(&mut self, session_id: &SessionId) -> Option<&mut FileHistory> {
        self.histories.get_mut(session_id)
    }

    /// Evict one session, or every session when `session_id` is `None`.
    pub fn clear(&mut self, session_id: Option<&SessionId>) {
        match session_id {
            Some(id) => {
                self.histories.remove(id);
            }
            None => self.histories.clear(),
        }
    }

    /// Evict everything; called when the owning workspace context is torn
    /// down. Backup blobs persist on disk past this point.
    pub fn destroy(&mut self) {
        self.histories.clear();
    }
}
