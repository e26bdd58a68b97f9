//! Host-facing request surface.
//!
//! The UI host drives the engine with tagged JSON requests; every request
//! carries the workspace root and the session it concerns. Responses mirror
//! the request shape the host expects and never carry transport errors:
//! rewind failures arrive as structured results.

use std::path::PathBuf;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use quill_history::{RewindOutcome, Snapshot, SnapshotPreview};
use quill_types::{MessageId, SessionId};

use crate::Engine;

/// One request from the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRequest {
    pub cwd: PathBuf,
    pub session_id: SessionId,
    #[serde(flatten)]
    pub op: HistoryOp,
}

/// The operation a request asks for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "camelCase")]
pub enum HistoryOp {
    #[serde(rename_all = "camelCase")]
    TrackFile {
        file_path: PathBuf,
        #[serde(default)]
        is_new_file: bool,
    },
    #[serde(rename_all = "camelCase")]
    Create { message_id: MessageId },
    List,
    #[serde(rename_all = "camelCase")]
    Has { message_id: MessageId },
    #[serde(rename_all = "camelCase")]
    Rewind { message_id: MessageId },
    #[serde(rename_all = "camelCase")]
    PreviewRewind {
        message_id: MessageId,
        #[serde(default = "default_cumulative")]
        cumulative: bool,
    },
    #[serde(rename_all = "camelCase")]
    LoadFromSession { snapshots: Vec<Snapshot> },
}

fn default_cumulative() -> bool {
    true
}

/// Response payloads, one shape per operation. Serialize-only: hosts decode
/// these against the shape they asked for, so an untagged `Deserialize`
/// would be ambiguous here.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HistoryResponse {
    Ack {
        success: bool,
    },
    Created {
        snapshot: Option<SnapshotPreview>,
    },
    Listed {
        snapshots: Vec<SnapshotPreview>,
    },
    #[serde(rename_all = "camelCase")]
    HasSnapshot {
        has_snapshot: bool,
    },
    Rewound {
        result: RewindOutcome,
    },
}

impl Engine {
    /// Dispatch one host request against the session it names.
    pub fn handle_request(&mut self, request: &HistoryRequest) -> HistoryResponse {
        if let HistoryOp::LoadFromSession { snapshots } = &request.op {
            self.manager
                .install(&request.cwd, &request.session_id, snapshots.clone());
            return HistoryResponse::Ack { success: true };
        }

        let history = self
            .manager
            .get_or_create(&request.cwd, &request.session_id, None);

        match &request.op {
            HistoryOp::TrackFile {
                file_path,
                is_new_file,
            } => {
                if *is_new_file {
                    history.track_new_file(file_path);
                } else {
                    history.track_file(file_path);
                }
                HistoryResponse::Ack { success: true }
            }
            HistoryOp::Create { message_id } => {
                let created = history.create_snapshot(message_id.clone()).is_some();
                let snapshot = created
                    .then(|| history.snapshot_previews().pop())
                    .flatten();
                HistoryResponse::Created { snapshot }
            }
            HistoryOp::List => HistoryResponse::Listed {
                snapshots: history.snapshot_previews(),
            },
            HistoryOp::Has { message_id } => HistoryResponse::HasSnapshot {
                has_snapshot: history.has_snapshot(message_id),
            },
            HistoryOp::Rewind { message_id } => HistoryResponse::Rewound {
                result: history.rewind_to_message(message_id, false),
            },
            HistoryOp::PreviewRewind {
                message_id,
                cumulative,
            } => HistoryResponse::Rewound {
                result: history.preview_rewind(message_id, *cumulative),
            },
            HistoryOp::LoadFromSession { .. } => unreachable!("handled above"),
        }
    }

    /// Convenience for hosts speaking line-delimited JSON: parse, dispatch,
    /// serialize.
    pub fn handle_request_json(&mut self, raw: &str) -> anyhow::Result<String> {
        let request: HistoryRequest =
            serde_json::from_str(raw).context("invalid history request")?;
        let response = self.handle_request(&request);
        serde_json::to_string(&response).context("failed to serialize history response")
    }
}
