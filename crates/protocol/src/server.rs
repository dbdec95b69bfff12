//! Backend → core messages

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{PermissionRule, SessionListPayload};

/// Messages sent from the assistant backend to the core.
///
/// Unknown fields are ignored; the on-disk and on-wire schemas are owned by
/// the backend and may grow without notice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    SessionAssigned {
        /// Absent when the backend cannot echo the start request's token
        #[serde(default)]
        correlation_id: Option<String>,
        real_id: String,
    },
    StreamEvent {
        session_id: String,
        payload: Value,
    },
    SessionComplete {
        session_id: String,
        #[serde(default)]
        exit_code: Option<i32>,
    },
    SessionError {
        session_id: String,
        error: String,
    },
    PermissionRequest {
        request_id: String,
        session_id: String,
        tool_name: String,
        #[serde(default)]
        input: Value,
        #[serde(default)]
        suggestions: Vec<PermissionRule>,
    },
    PermissionCancelled {
        request_id: String,
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        reason: Option<String>,
    },
    ListRefresh {
        #[serde(default)]
        payload: SessionListPayload,
    },
}

impl ServerMessage {
    /// Session this message is scoped to, `None` for broadcast messages.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            ServerMessage::SessionAssigned { real_id, .. } => Some(real_id),
            ServerMessage::StreamEvent { session_id, .. }
            | ServerMessage::SessionComplete { session_id, .. }
            | ServerMessage::SessionError { session_id, .. }
            | ServerMessage::PermissionRequest { session_id, .. } => Some(session_id),
            ServerMessage::PermissionCancelled { session_id, .. } => session_id.as_deref(),
            ServerMessage::ListRefresh { .. } => None,
        }
    }

    /// Short name used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::SessionAssigned { .. } => "session-assigned",
            ServerMessage::StreamEvent { .. } => "stream-event",
            ServerMessage::SessionComplete { .. } => "session-complete",
            ServerMessage::SessionError { .. } => "session-error",
            ServerMessage::PermissionRequest { .. } => "permission-request",
            ServerMessage::PermissionCancelled { .. } => "permission-cancelled",
            ServerMessage::ListRefresh { .. } => "list-refresh",
        }
    }
}
