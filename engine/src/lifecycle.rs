//! Lifecycle hooks bridging the tool runtime to the file history.
//!
//! Two triggers, both fired on the session's own execution context:
//!
//! - [`Engine::on_tool_start`] runs before a file-writing tool executes and
//!   records the target's pre-modification state.
//! - [`Engine::on_turn_complete`] runs after the assistant turn finishes and
//!   folds the turn's pending backups into a snapshot keyed to the final
//!   assistant message.
//!
//! Neither hook may fail the turn: every failure here is logged and
//! swallowed, or (for journal appends) leaves the snapshot in memory only.

use std::fs;
use std::path::{Path, PathBuf};

use quill_history::SessionJournal;
use quill_types::{ConversationMessage, SessionId, ToolCall, TurnStatus};

use crate::Engine;

/// Tools whose execution modifies a workspace file.
const FILE_WRITING_TOOLS: [&str; 2] = ["write", "edit"];

impl Engine {
    /// Pre-tool hook. Tracks the target of a `write`/`edit` call so its
    /// current state can be restored later.
    pub fn on_tool_start(
        &mut self,
        cwd: &Path,
        session_id: &SessionId,
        journal_path: Option<&Path>,
        call: &ToolCall,
    ) {
        if !self.settings.checkpoints_enabled() {
            return;
        }
        if !FILE_WRITING_TOOLS.contains(&call.name.as_str()) {
            return;
        }
        let Some(target) = file_target(call) else {
            tracing::debug!(
                target: "checkpoint",
                tool = %call.name,
                "file-writing tool call without a file path argument"
            );
            return;
        };

        let history = self.manager.get_or_create(cwd, session_id, journal_path);
        let absolute = if target.is_absolute() {
            target.clone()
        } else {
            cwd.join(&target)
        };
        if fs::metadata(&absolute).is_ok() {
            history.track_file(&target);
        } else {
            history.track_new_file(&target);
        }
    }

    /// Post-turn hook. Creates a snapshot from the turn's pending backups
    /// and appends it to the session journal.
    ///
    /// Skips when checkpoints are disabled, the turn did not complete (the
    /// pending set is kept for a retry), the final message is not an
    /// assistant message, the message was already snapshotted, or nothing
    /// was tracked this turn.
    pub fn on_turn_complete(
        &mut self,
        cwd: &Path,
        session_id: &SessionId,
        journal_path: Option<&Path>,
        status: TurnStatus,
        last_message: Option<&ConversationMessage>,
    ) {
        if !self.settings.checkpoints_enabled() {
            return;
        }
        if !status.is_completed() {
            return;
        }
        let Some(message) = last_message else {
            return;
        };
        if !message.is_assistant() {
            return;
        }

        let history = self.manager.get_or_create(cwd, session_id, journal_path);
        if history.has_snapshot(&message.uuid) {
            return;
        }
        if !history.has_pending_backups() {
            return;
        }
        let Some(snapshot) = history.create_snapshot(message.uuid.clone()) else {
            return;
        };

        if let Some(path) = journal_path
            && let Err(err) = SessionJournal::new(path).append_snapshot(snapshot)
        {
            // The snapshot stays usable in memory for this process.
            tracing::warn!(target: "session", %err, "failed to persist snapshot");
        }
    }
}

/// Extract the file path argument of a file-writing tool call.
fn file_target(call: &ToolCall) -> Option<PathBuf> {
    let arguments = call.arguments.as_object()?;
    let path = arguments
        .get("file_path")
        .or_else(|| arguments.get("filePath"))?
        .as_str()?;
    Some(PathBuf::from(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_history::SessionJournal;
    use quill_types::{HistorySettings, MessageContent, MessageId, Role};
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn engine(backup_root: &Path) -> Engine {
        Engine::new(HistorySettings::new(true, backup_root.to_path_buf()))
    }

    fn call(name: &str, arguments: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "T1".to_string(),
            name: name.to_string(),
            arguments,
        }
    }

    fn assistant(uuid: &str) -> ConversationMessage {
        ConversationMessage::new(
            MessageId::new(uuid),
            None,
            Role::Assistant,
            MessageContent::Text("done".to_string()),
            "2025-03-01T12:00:00Z".parse().unwrap(),
        )
    }

    fn user(uuid: &str) -> ConversationMessage {
        ConversationMessage::new(
            MessageId::new(uuid),
            None,
            Role::User,
            MessageContent::Text("hi".to_string()),
            "2025-03-01T12:00:00Z".parse().unwrap(),
        )
    }

    #[test]
    fn write_tool_tracks_existing_file() {
        let backups = tempdir().unwrap();
        let workspace = tempdir().unwrap();
        let mut engine = engine(backups.path());
        let session = SessionId::new("s");

        fs::write(workspace.path().join("a.txt"), "before").unwrap();
        engine.on_tool_start(
            workspace.path(),
            &session,
            None,
            &call("write", json!({ "file_path": "a.txt" })),
        );

        let history = engine.manager().get(&session).unwrap();
        assert!(history.has_pending_backups());
    }

    #[test]
    fn missing_target_is_tracked_as_new_file() {
        let backups = tempdir().unwrap();
        let workspace = tempdir().unwrap();
        let mut engine = engine(backups.path());
        let session = SessionId::new("s");

        engine.on_tool_start(
            workspace.path(),
            &session,
            None,
            &call("edit", json!({ "filePath": "brand_new.txt" })),
        );
        engine.on_turn_complete(
            workspace.path(),
            &session,
            None,
            TurnStatus::Completed,
            Some(&assistant("m1")),
        );

        let history = engine.manager().get(&session).unwrap();
        let snapshot = &history.snapshots()[0];
        let meta = snapshot.tracked_file_backups.values().next().unwrap();
        assert!(meta.backup_file_name.is_none());
    }

    #[test]
    fn non_file_tools_are_ignored() {
        let backups = tempdir().unwrap();
        let workspace = tempdir().unwrap();
        let mut engine = engine(backups.path());
        let session = SessionId::new("s");

        engine.on_tool_start(
            workspace.path(),
            &session,
            None,
            &call("bash", json!({ "command": "rm -rf /tmp/x" })),
        );
        assert!(engine.manager().get(&session).is_none());
    }

    #[test]
    fn disabled_checkpoints_skip_everything() {
        let backups = tempdir().unwrap();
        let workspace = tempdir().unwrap();
        let mut engine = Engine::new(HistorySettings::new(false, backups.path().to_path_buf()));
        let session = SessionId::new("s");

        fs::write(workspace.path().join("a.txt"), "before").unwrap();
        engine.on_tool_start(
            workspace.path(),
            &session,
            None,
            &call("write", json!({ "file_path": "a.txt" })),
        );
        engine.on_turn_complete(
            workspace.path(),
            &session,
            None,
            TurnStatus::Completed,
            Some(&assistant("m1")),
        );
        assert!(engine.manager().get(&session).is_none());
    }

    #[test]
    fn failed_turn_preserves_pending_backups() {
        let backups = tempdir().unwrap();
        let workspace = tempdir().unwrap();
        let mut engine = engine(backups.path());
        let session = SessionId::new("s");

        fs::write(workspace.path().join("a.txt"), "before").unwrap();
        engine.on_tool_start(
            workspace.path(),
            &session,
            None,
            &call("write", json!({ "file_path": "a.txt" })),
        );
        engine.on_turn_complete(
            workspace.path(),
            &session,
            None,
            TurnStatus::Failed,
            Some(&assistant("m1")),
        );

        let history = engine.manager().get(&session).unwrap();
        assert!(history.has_pending_backups());
        assert!(history.snapshots().is_empty());
    }

    #[test]
    fn non_assistant_tail_skips_snapshot() {
        let backups = tempdir().unwrap();
        let workspace = tempdir().unwrap();
        let mut engine = engine(backups.path());
        let session = SessionId::new("s");

        fs::write(workspace.path().join("a.txt"), "before").unwrap();
        engine.on_tool_start(
            workspace.path(),
            &session,
            None,
            &call("write", json!({ "file_path": "a.txt" })),
        );
        engine.on_turn_complete(
            workspace.path(),
            &session,
            None,
            TurnStatus::Completed,
            Some(&user("u1")),
        );

        let history = engine.manager().get(&session).unwrap();
        assert!(history.snapshots().is_empty());
        assert!(history.has_pending_backups());
    }

    #[test]
    fn completed_turn_snapshots_and_persists() {
        let backups = tempdir().unwrap();
        let workspace = tempdir().unwrap();
        let logs = tempdir().unwrap();
        let journal_path = logs.path().join("s.jsonl");
        let mut engine = engine(backups.path());
        let session = SessionId::new("s");

        fs::write(workspace.path().join("a.txt"), "before").unwrap();
        engine.on_tool_start(
            workspace.path(),
            &session,
            Some(&journal_path),
            &call("write", json!({ "file_path": "a.txt" })),
        );
        engine.on_turn_complete(
            workspace.path(),
            &session,
            Some(&journal_path),
            TurnStatus::Completed,
            Some(&assistant("m1")),
        );

        let history = engine.manager().get(&session).unwrap();
        assert!(history.has_snapshot(&MessageId::new("m1")));
        assert!(!history.has_pending_backups());

        let contents = SessionJournal::load(&journal_path).unwrap();
        assert_eq!(contents.snapshots.len(), 1);
        assert_eq!(contents.snapshots[0].message_id, MessageId::new("m1"));
    }

    #[test]
    fn duplicate_turn_completion_is_idempotent() {
        let backups = tempdir().unwrap();
        let workspace = tempdir().unwrap();
        let mut engine = engine(backups.path());
        let session = SessionId::new("s");

        fs::write(workspace.path().join("a.txt"), "before").unwrap();
        engine.on_tool_start(
            workspace.path(),
            &session,
            None,
            &call("write", json!({ "file_path": "a.txt" })),
        );
        engine.on_turn_complete(
            workspace.path(),
            &session,
            None,
            TurnStatus::Completed,
            Some(&assistant("m1")),
        );
        engine.on_turn_complete(
            workspace.path(),
            &session,
            None,
            TurnStatus::Completed,
            Some(&assistant("m1")),
        );

        let history = engine.manager().get(&session).unwrap();
        assert_eq!(history.snapshots().len(), 1);
    }
}
