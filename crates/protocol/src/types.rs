//! Core types shared across the protocol

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Where a message came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageOrigin {
    /// Read from the transcript store
    Persisted,
    /// Delivered by the transport, not yet observed in the transcript store
    Live,
}

/// Marks a message as an interactive permission request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionMarker {
    pub request_id: String,
    pub resolved: bool,
    pub state: PermissionState,
}

impl PermissionMarker {
    /// Mark the request as having left the pending set.
    pub fn settle(&mut self, reason: ResolutionReason) {
        self.resolved = true;
        self.state = reason.into();
    }
}

/// One transcript entry or live event.
///
/// `content` is owned by the external protocol and passed through unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Stable identity key used for de-duplication across merges
    pub id: String,
    pub session_id: String,
    pub origin: MessageOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission: Option<PermissionMarker>,
    pub content: Value,
}

impl Message {
    pub fn is_permission_request(&self) -> bool {
        self.permission.is_some()
    }

    pub fn is_unresolved_permission(&self) -> bool {
        self.permission.as_ref().is_some_and(|p| !p.resolved)
    }

    /// Build the live message that surfaces a pending permission request.
    pub fn permission_request(request: &PermissionRequest) -> Self {
        Self {
            id: format!("permission:{}", request.request_id),
            session_id: request.session_id.clone(),
            origin: MessageOrigin::Live,
            timestamp: Some(request.created_at.clone()),
            permission: Some(PermissionMarker {
                request_id: request.request_id.clone(),
                resolved: false,
                state: PermissionState::Pending,
            }),
            content: serde_json::json!({
                "type": "permission_request",
                "toolName": request.tool_name,
                "input": request.input,
                "suggestions": request.suggestions,
            }),
        }
    }
}

/// Cursor state for lazy backward pagination
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Number of transcript records already loaded, counted from the newest end
    pub offset: usize,
    pub has_more: bool,
    pub total: usize,
}

/// Persistence scope of an authorization rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleDestination {
    Session,
    Local,
    Project,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleBehavior {
    Allow,
    Deny,
}

/// An authorization rule, either suggested by the backend or persisted on
/// a "remember this" decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRule {
    pub tool_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    pub behavior: RuleBehavior,
    pub destination: RuleDestination,
}

/// An outstanding interactive authorization request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequest {
    pub request_id: String,
    pub session_id: String,
    pub tool_name: String,
    pub input: Value,
    #[serde(default)]
    pub suggestions: Vec<PermissionRule>,
    pub created_at: String,
}

/// Lifecycle state of a permission request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    Pending,
    Resolved,
    TimedOut,
    Aborted,
}

impl From<ResolutionReason> for PermissionState {
    fn from(reason: ResolutionReason) -> Self {
        match reason {
            ResolutionReason::Allowed | ResolutionReason::Denied => PermissionState::Resolved,
            ResolutionReason::TimedOut => PermissionState::TimedOut,
            ResolutionReason::Aborted => PermissionState::Aborted,
        }
    }
}

/// A human decision on a permission request, as chosen in a view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "behavior",
    rename_all = "lowercase",
    rename_all_fields = "camelCase"
)]
pub enum UserDecision {
    Allow {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        updated_input: Option<Value>,
        /// Adopt the suggested rules, forcing their persistence scope
        #[serde(default, skip_serializing_if = "Option::is_none")]
        remember: Option<RuleDestination>,
        /// Replace the suggested rules wholesale
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rules: Option<Vec<PermissionRule>>,
    },
    Deny {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        /// Whether in-flight tool execution should stop; defaults to true
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interrupt: Option<bool>,
    },
}

/// The decision sent back to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "behavior",
    rename_all = "lowercase",
    rename_all_fields = "camelCase"
)]
pub enum PermissionDecision {
    Allow {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        updated_input: Option<Value>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        updated_rules: Vec<PermissionRule>,
    },
    Deny {
        message: String,
        interrupt: bool,
    },
}

/// Why a permission request left the pending set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionReason {
    Allowed,
    Denied,
    TimedOut,
    Aborted,
}

/// Identity state of a conversation slot, as seen by views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    NoSession,
    Placeholder,
    PendingReal,
    Final,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotSummary {
    pub slot_id: u64,
    pub session_id: Option<String>,
    pub status: SlotStatus,
    pub protected: bool,
}

/// One entry of the externally-visible session list.
///
/// Only `id` is interpreted; every other field is passed through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload of a bulk list refresh
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionListPayload {
    #[serde(default)]
    pub sessions: Vec<SessionSummary>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// File attached to a prompt. `data` is a base64 data URI or a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub data: String,
}
