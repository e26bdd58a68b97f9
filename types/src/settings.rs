//! Resolved engine settings.
//!
//! Raw TOML deserialization structs (with `Option` fields) stay private in
//! the config loader. The loader resolves them into this type at the parse
//! boundary; existence of a value is the proof of its validity.

use std::path::{Path, PathBuf};

/// Resolved configuration consumed by the history engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistorySettings {
    checkpoints: bool,
    backup_root: PathBuf,
}

impl HistorySettings {
    #[must_use]
    pub fn new(checkpoints: bool, backup_root: PathBuf) -> Self {
        Self {
            checkpoints,
            backup_root,
        }
    }

    /// Master switch: when false, no tracking or snapshotting happens.
    #[must_use]
    pub fn checkpoints_enabled(&self) -> bool {
        self.checkpoints
    }

    /// Root of backup storage; sessions get a subdirectory each.
    #[must_use]
    pub fn backup_root(&self) -> &Path {
        &self.backup_root
    }
}
