//! Content-addressed backup store.
//!
//! Blobs live under `<backup_root>/<session_id>/` and are named
//! `hex(sha256(relative_path))[0..16] + "@v" + version`. The name is a
//! function of the path alone, never of file content, so it is computable
//! before any I/O happens. Uniqueness only has to hold within one session
//! directory, and the version suffix disambiguates further, so the
//! truncated hash is enough.
//!
//! Copy-in preserves the source's mode bits and mtime on the blob; the
//! mtime is what lets tracking skip unchanged files on a metadata-only
//! check.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Utc;
use filetime::FileTime;
use sha2::{Digest, Sha256};

use quill_types::SessionId;
use quill_utils::RelPath;

use crate::snapshot::FileBackupMeta;

/// Length of the hex prefix used in blob names.
const NAME_HASH_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("failed to back up {path}: {source}")]
    CopyIn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to preserve metadata for {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to restore {path}: {source}")]
    CopyOut {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Size and mtime of a stored blob, used for the tracking fast path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupStat {
    pub size: u64,
    pub modified: SystemTime,
}

/// One session's backup directory.
#[derive(Debug)]
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    /// Open (creating if needed) the backup directory for `session_id`.
    pub fn open(backup_root: &Path, session_id: &SessionId) -> io::Result<Self> {
        let dir = backup_root.join(session_id.as_str());
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Construct without touching the filesystem. Later copies will fail and
    /// be swallowed by tracking policy; used as the blank-history fallback.
    pub(crate) fn detached(backup_root: &Path, session_id: &SessionId) -> Self {
        Self {
            dir: backup_root.join(session_id.as_str()),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Derive the stable blob name for `(path, version)`.
    #[must_use]
    pub fn backup_file_name(rel_path: &RelPath, version: u32) -> String {
        let digest = Sha256::digest(rel_path.as_str().as_bytes());
        let mut name: String = digest
            .iter()
            .take(NAME_HASH_LEN / 2)
            .map(|byte| format!("{byte:02x}"))
            .collect();
        name.push_str("@v");
        name.push_str(&version.to_string());
        name
    }

    #[must_use]
    pub fn blob_path(&self, backup_file_name: &str) -> PathBuf {
        self.dir.join(backup_file_name)
    }

    /// Copy the working file at `source` into the store as version `version`
    /// of `rel_path`.
    ///
    /// A missing source is not an error: it yields a meta without a blob
    /// name, recording deletion or not-yet-created, and still consumes the
    /// version. Mode bits and mtime of an existing source are applied to
    /// the blob; failure to apply either is fatal.
    pub fn copy_in(
        &self,
        rel_path: &RelPath,
        source: &Path,
        version: u32,
    ) -> Result<FileBackupMeta, BackupError> {
        let backup_time = Utc::now();

        let metadata = match fs::metadata(source) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(FileBackupMeta {
                    backup_file_name: None,
                    version,
                    backup_time,
                });
            }
            Err(source_err) => {
                return Err(BackupError::CopyIn {
                    path: source.to_path_buf(),
                    source: source_err,
                });
            }
        };

        let name = Self::backup_file_name(rel_path, version);
        let blob = self.blob_path(&name);

        fs::copy(source, &blob).map_err(|source_err| BackupError::CopyIn {
            path: source.to_path_buf(),
            source: source_err,
        })?;

        fs::set_permissions(&blob, metadata.permissions()).map_err(|source_err| {
            BackupError::Metadata {
                path: blob.clone(),
                source: source_err,
            }
        })?;

        let modified = metadata.modified().map_err(|source_err| BackupError::Metadata {
            path: source.to_path_buf(),
            source: source_err,
        })?;
        filetime::set_file_mtime(&blob, FileTime::from_system_time(modified)).map_err(
            |source_err| BackupError::Metadata {
                path: blob.clone(),
                source: source_err,
            },
        )?;

        Ok(FileBackupMeta {
            backup_file_name: Some(name),
            version,
            backup_time,
        })
    }

    /// Restore a blob onto `target`, creating missing parent directories.
    ///
    /// Mode bits are restored best-effort; a permission failure there is
    /// swallowed.
    pub fn copy_out(&self, backup_file_name: &str, target: &Path) -> Result<(), BackupError> {
        let blob = self.blob_path(backup_file_name);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source_err| BackupError::CopyOut {
                path: target.to_path_buf(),
                source: source_err,
            })?;
        }

        fs::copy(&blob, target).map_err(|source_err| BackupError::CopyOut {
            path: target.to_path_buf(),
            source: source_err,
        })?;

        if let Ok(metadata) = fs::metadata(&blob) {
            let _ = fs::set_permissions(target, metadata.permissions());
        }

        Ok(())
    }

    /// Remove the working file at `target` if present (restores a
    /// "did not exist" state).
    pub fn remove_working_file(target: &Path) -> Result<(), BackupError> {
        match fs::remove_file(target) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source_err) => Err(BackupError::Remove {
                path: target.to_path_buf(),
                source: source_err,
            }),
        }
    }

    /// Size and mtime of a stored blob, or `None` if it is gone.
    #[must_use]
    pub fn stat(&self, backup_file_name: &str) -> Option<BackupStat> {
        let metadata = fs::metadata(self.blob_path(backup_file_name)).ok()?;
        let modified = metadata.modified().ok()?;
        Some(BackupStat {
            size: metadata.len(),
            modified,
        })
    }
}
