//! Core domain types for Quill's file history subsystem.
//!
//! This crate contains pure domain types with no IO, no async, and minimal
//! dependencies. Everything here can be used from any layer of the engine.

mod ids;
mod message;
mod settings;

pub use ids::{MessageId, SessionId};
pub use message::{ContentPart, ConversationMessage, MessageContent, Role};
pub use settings::HistorySettings;

use serde::{Deserialize, Serialize};

/// A single tool invocation requested by the model.
///
/// The engine only inspects the tool name and the file-path argument; the
/// rest of the call is opaque and owned by the tool runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this tool call (used to match results).
    pub id: String,
    /// The name of the tool being called.
    pub name: String,
    /// The arguments to pass to the tool, as parsed JSON.
    pub arguments: serde_json::Value,
}

/// How an assistant turn ended, as reported by the tool runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    Completed,
    Failed,
    Cancelled,
}

impl TurnStatus {
    #[must_use]
    pub fn is_completed(self) -> bool {
        matches!(self, Self::Completed)
    }
}
