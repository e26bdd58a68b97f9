//! Append-only session journal.
//!
//! One JSONL file per session. Every line is a self-describing tagged
//! record: `message`, `snapshot`, or `config`. Appends are best-effort
//! ordered (no per-record fsync). The reader is tolerant by design: a
//! malformed or truncated line (common after a crashed writer) is skipped,
//! never fatal.
//!
//! On load the message stream is normalized in two passes:
//!
//! 1. **Active path.** Messages form a tree via `parent_uuid`; rewinding and
//!    resending forks it. Only the chain from the most recent message back
//!    to its null-parented ancestor is live; off-path branches are dropped.
//! 2. **Tool-use cleanup.** An assistant message whose tool invocation never
//!    received a result (interrupted mid-call) cannot be resent upstream;
//!    such messages are dropped entirely.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use quill_types::{ConversationMessage, Role};

use crate::snapshot::Snapshot;

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("journal I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("journal record could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Tagged journal record, one per line.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum JournalRecord {
    Message(ConversationMessage),
    Snapshot(Snapshot),
    /// Host-owned session settings; opaque to the engine.
    Config {
        #[serde(flatten)]
        #[allow(dead_code)]
        payload: serde_json::Value,
    },
}

/// Borrowed record for writes, to avoid cloning on every append.
#[derive(Serialize)]
struct TaggedRecord<'a, T: Serialize> {
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(flatten)]
    record: &'a T,
}

/// What a journal read yields: the live message path and the snapshot
/// stream, in append order.
#[derive(Debug, Default)]
pub struct JournalContents {
    pub messages: Vec<ConversationMessage>,
    pub snapshots: Vec<Snapshot>,
}

/// Writer handle for one session's journal file.
#[derive(Debug, Clone)]
pub struct SessionJournal {
    path: PathBuf,
}

impl SessionJournal {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append_message(&self, message: &ConversationMessage) -> Result<(), JournalError> {
        self.append(&TaggedRecord {
            kind: "message",
            record: message,
        })
    }

    pub fn append_snapshot(&self, snapshot: &Snapshot) -> Result<(), JournalError> {
        self.append(&TaggedRecord {
            kind: "snapshot",
            record: snapshot,
        })
    }

    /// Append a host-owned config record. The engine never reads these back.
    pub fn append_config(&self, payload: &serde_json::Value) -> Result<(), JournalError> {
        self.append(&TaggedRecord {
            kind: "config",
            record: payload,
        })
    }

    fn append<T: Serialize>(&self, record: &T) -> Result<(), JournalError> {
        let line = serde_json::to_string(record)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| JournalError::Io {
                path: self.path.clone(),
                source,
            })?;
        }

        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|source| JournalError::Io {
                path: self.path.clone(),
                source,
            })?;
        writeln!(file, "{line}").map_err(|source| JournalError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Read a session journal back. A missing file yields empty contents.
    pub fn load(path: &Path) -> Result<JournalContents, JournalError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(JournalContents::default());
            }
            Err(source) => {
                return Err(JournalError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let mut messages = Vec::new();
        let mut snapshots = Vec::new();

        for line in BufReader::new(file).lines() {
            let Ok(line) = line else {
                // Unreadable tail (crashed writer, encoding damage): keep
                // what parsed so far.
                break;
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalRecord>(trimmed) {
                Ok(JournalRecord::Message(message)) => messages.push(message),
                Ok(JournalRecord::Snapshot(snapshot)) => snapshots.push(snapshot),
                Ok(JournalRecord::Config { .. }) => {}
                Err(err) => {
                    tracing::debug!(target: "session", %err, "skipping malformed journal line");
                }
            }
        }

        let messages = drop_unmatched_tool_uses(active_path(messages));
        Ok(JournalContents {
            messages,
            snapshots,
        })
    }
}

/// Reduce the message tree to the live branch: the chain from the most
/// recent message back to the last null-parented ancestor, root first.
fn active_path(messages: Vec<ConversationMessage>) -> Vec<ConversationMessage> {
    let Some(leaf) = messages.last().map(|message| message.uuid.clone()) else {
        return messages;
    };

    // Later entries win on duplicate uuids.
    let mut by_uuid: HashMap<_, _> = messages
        .into_iter()
        .map(|message| (message.uuid.clone(), message))
        .collect();

    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut cursor = Some(leaf);
    while let Some(uuid) = cursor {
        if !seen.insert(uuid.clone()) {
            // Parent cycle; bail out with what we have.
            break;
        }
        let Some(message) = by_uuid.remove(&uuid) else {
            // Orphaned parent link: treat the previous node as the root.
            break;
        };
        cursor = message.parent_uuid.clone();
        chain.push(message);
    }

    chain.reverse();
    chain
}

/// Drop assistant messages containing a tool invocation with no matching
/// result in any later tool-role message.
fn drop_unmatched_tool_uses(messages: Vec<ConversationMessage>) -> Vec<ConversationMessage> {
    let keep: Vec<bool> = messages
        .iter()
        .enumerate()
        .map(|(index, message)| {
            if message.role != Role::Assistant {
                return true;
            }
            let matched = message.tool_use_ids().all(|id| {
                messages[index + 1..].iter().any(|later| {
                    later.role == Role::Tool
                        && later.tool_result_ids().any(|result_id| result_id == id)
                })
            });
            if !matched {
                tracing::debug!(
                    target: "session",
                    uuid = %message.uuid,
                    "dropping assistant message with unmatched tool invocation"
                );
            }
            matched
        })
        .collect();

    messages
        .into_iter()
        .zip(keep)
        .filter_map(|(message, keep)| keep.then_some(message))
        .collect()
}
