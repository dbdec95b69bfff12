//! Core → backend messages

use serde::{Deserialize, Serialize};

use crate::types::PermissionDecision;

/// Messages sent from the core to the assistant backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    StartSession {
        /// Echoed back in `session-assigned` so the core can find the placeholder
        correlation_id: String,
        prompt: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        attachments: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resume_id: Option<String>,
    },
    AbortSession {
        session_id: String,
    },
    PermissionResponse {
        request_id: String,
        decision: PermissionDecision,
    },
}
