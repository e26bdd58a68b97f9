//! Conversation message model as it appears in the session journal.
//!
//! Messages form a tree via `parent_uuid`; the journal reader flattens the
//! tree to the active path on load. Content is either a bare string or an
//! ordered list of tagged parts. The engine itself only ever inspects part
//! tags and tool-invocation identifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::MessageId;

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// One message in the conversation tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub uuid: MessageId,
    #[serde(default)]
    pub parent_uuid: Option<MessageId>,
    pub role: Role,
    pub content: MessageContent,
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    #[must_use]
    pub fn new(
        uuid: MessageId,
        parent_uuid: Option<MessageId>,
        role: Role,
        content: MessageContent,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            uuid,
            parent_uuid,
            role,
            content,
            timestamp,
        }
    }

    #[must_use]
    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    /// Identifiers of tool invocations contained in this message.
    pub fn tool_use_ids(&self) -> impl Iterator<Item = &str> {
        self.content.parts().iter().filter_map(|part| match part {
            ContentPart::ToolUse { id, .. } => Some(id.as_str()),
            _ => None,
        })
    }

    /// Identifiers of tool results contained in this message.
    pub fn tool_result_ids(&self) -> impl Iterator<Item = &str> {
        self.content.parts().iter().filter_map(|part| match part {
            ContentPart::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
            _ => None,
        })
    }
}

/// Message content: a plain string or an ordered list of parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    #[must_use]
    pub fn parts(&self) -> &[ContentPart] {
        match self {
            Self::Text(_) => &[],
            Self::Parts(parts) => parts,
        }
    }
}

/// One tagged part of a structured message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    #[serde(alias = "tool-result")]
    ToolResult {
        #[serde(rename = "toolUseId", alias = "tool_use_id", alias = "id")]
        tool_use_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
    },
}
