//! Workspace-relative path keys.
//!
//! Tracked files are keyed by their normalized relative path under the
//! workspace root, with forward slashes regardless of platform. Parsing
//! happens at this boundary: absolute and relative spellings of the same
//! file collapse to one key, and paths that escape the root are rejected.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Normalized relative path of a file under the workspace root.
///
/// Invariant: non-empty, forward-slashed, free of `.`/`..` components.
/// Comparison is byte-wise; hosts on case-insensitive filesystems must
/// normalize case before calling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelPath(String);

impl RelPath {
    /// Wrap an already-normalized key (as read back from a journal).
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Normalize `path` (absolute, or relative to `cwd`) into a workspace
    /// key. Returns `None` when the path escapes the workspace root or is
    /// the root itself.
    #[must_use]
    pub fn under_root(cwd: &Path, path: &Path) -> Option<Self> {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            cwd.join(path)
        };

        let root = normalize_lexically(cwd);
        let target = normalize_lexically(&joined);
        let rel = target.strip_prefix(&root).ok()?;

        let mut key = String::new();
        for component in rel.components() {
            match component {
                Component::Normal(part) => {
                    if !key.is_empty() {
                        key.push('/');
                    }
                    key.push_str(part.to_str()?);
                }
                _ => return None,
            }
        }

        if key.is_empty() {
            return None;
        }
        Some(Self(key))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rebuild the absolute working path under `cwd`.
    #[must_use]
    pub fn to_absolute(&self, cwd: &Path) -> PathBuf {
        let mut out = cwd.to_path_buf();
        for part in self.0.split('/') {
            out.push(part);
        }
        out
    }
}

impl fmt::Display for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolve `.` and `..` components without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
