//! View ↔ core messages
//!
//! Views only read core state; every mutation is a `ViewCommand` that the
//! core applies on its own writer task.

use serde::{Deserialize, Serialize};

use crate::types::*;

/// User actions sent from a view to the core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ViewCommand {
    /// Request a fresh snapshot
    Subscribe,
    /// Open an empty conversation slot and view it
    NewConversation,
    SelectSession {
        session_id: String,
    },
    /// Submit a prompt in the viewed slot (starts or resumes a session)
    SubmitPrompt {
        prompt: String,
        #[serde(default)]
        attachments: Vec<Attachment>,
    },
    LoadOlder {
        session_id: String,
    },
    DecidePermission {
        request_id: String,
        decision: UserDecision,
    },
    AbortSession {
        session_id: String,
    },
}

/// Full view state sent on connect and on `subscribe`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSnapshot {
    pub viewed: Option<SlotSummary>,
    pub slots: Vec<SlotSummary>,
    pub messages: Vec<Message>,
    pub pagination: Option<Pagination>,
    pub sessions: Vec<SessionSummary>,
    pub transport_connected: bool,
}

/// Outputs sent from the core to every view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ViewUpdate {
    Snapshot {
        snapshot: Box<ViewSnapshot>,
    },
    /// Wholesale replacement of a session's displayed messages
    SessionMessages {
        session_id: String,
        messages: Vec<Message>,
        pagination: Pagination,
    },
    OlderMessages {
        session_id: String,
        messages: Vec<Message>,
        pagination: Pagination,
    },
    MessageAppended {
        session_id: String,
        message: Message,
    },
    IdentityRewritten {
        slot_id: u64,
        from: String,
        to: String,
    },
    SlotChanged {
        slot: SlotSummary,
    },
    PermissionResolved {
        request_id: String,
        session_id: String,
        reason: ResolutionReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    SessionList {
        sessions: Vec<SessionSummary>,
    },
    TransportStatus {
        connected: bool,
    },
    AbortComplete {
        session_id: String,
    },
    Error {
        code: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
}
