//! Event router
//!
//! All routing and identity bookkeeping lives here as a pure, synchronous
//! function: `apply(state, input, now) -> effects`. The core actor owns the
//! state, feeds inputs in arrival order and executes the effects, so
//! "read current identity" and "apply the routing decision" always happen
//! as one step.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use relaydeck_protocol::{
    new_id, Attachment, ClientMessage, Message, MessageOrigin, PermissionRequest,
    ResolutionReason, ServerMessage, SessionListPayload, ViewSnapshot, ViewUpdate,
};
use serde_json::Value;
use tracing::debug;

use crate::cache::SessionCache;
use crate::config::CoreConfig;
use crate::identity::{is_placeholder_id, AssignOutcome, IdentityResolver, SlotId, SlotState, StartRejected};
use crate::list_refresh::ListRefresher;
use crate::merge::merge_transcript;
use crate::transcript::TranscriptPage;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct CoreState {
    pub resolver: IdentityResolver,
    pub cache: SessionCache,
    pub list: ListRefresher,
    /// Pending permission requests per session, oldest first. Only the head
    /// is surfaced as a message.
    permissions: HashMap<String, VecDeque<PermissionRequest>>,
    page_size: usize,
    transport_connected: bool,
    /// Stamp of the newest Latest transcript read issued per session; older
    /// reads finishing late are discarded.
    latest_load: HashMap<String, u64>,
    next_load: u64,
}

impl CoreState {
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            resolver: IdentityResolver::new(),
            cache: SessionCache::new(config.cache_capacity),
            list: ListRefresher::new(config.refresh_debounce),
            permissions: HashMap::new(),
            page_size: config.page_size,
            transport_connected: false,
            latest_load: HashMap::new(),
            next_load: 0,
        }
    }

    #[cfg(test)]
    pub fn pending_permissions(&self, session_id: &str) -> usize {
        self.permissions.get(session_id).map_or(0, VecDeque::len)
    }

    /// Everything a freshly connected view needs.
    pub fn snapshot(&self) -> ViewSnapshot {
        let viewed = self
            .resolver
            .viewed_slot_id()
            .and_then(|slot| self.resolver.summary(slot));
        let (messages, pagination) = match self
            .resolver
            .viewed_session_id()
            .and_then(|id| self.cache.get(id))
        {
            Some((messages, pagination)) => (messages.to_vec(), Some(pagination)),
            None => (Vec::new(), None),
        };
        ViewSnapshot {
            viewed,
            slots: self.resolver.summaries(),
            messages,
            pagination,
            sessions: self.list.displayed().to_vec(),
            transport_connected: self.transport_connected,
        }
    }

    fn release_evicted(&mut self, evicted: Vec<String>) {
        for id in evicted {
            self.latest_load.remove(&id);
            self.resolver.release(&id);
        }
    }

    fn is_viewed(&self, session_id: &str) -> bool {
        self.resolver.viewed_session_id() == Some(session_id)
    }

    fn has_message(&self, session_id: &str, message_id: &str) -> bool {
        self.cache
            .get(session_id)
            .is_some_and(|(messages, _)| messages.iter().any(|m| m.id == message_id))
    }

    /// Loaded record count of a session, so reloads keep older pages.
    fn reload_limit(&self, session_id: &str) -> usize {
        self.cache
            .get(session_id)
            .map_or(self.page_size, |(_, p)| p.offset.max(self.page_size))
    }

    /// Re-read the newest page of a session, superseding earlier reads.
    fn load_latest(&mut self, session_id: &str) -> Effect {
        self.next_load += 1;
        self.latest_load
            .insert(session_id.to_string(), self.next_load);
        Effect::LoadTranscript {
            session_id: session_id.to_string(),
            kind: PageKind::Latest,
            offset: 0,
            limit: self.reload_limit(session_id),
            generation: self.next_load,
        }
    }

    fn is_stale_load(&self, session_id: &str, generation: u64) -> bool {
        self.latest_load
            .get(session_id)
            .is_some_and(|newest| generation < *newest)
    }
}

// ---------------------------------------------------------------------------
// Input / Effect
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// Newest records; merged with live state
    Latest,
    /// Next older page; prepended
    Older,
}

#[derive(Debug, Clone)]
pub enum Input {
    Inbound(ServerMessage),
    NewConversation,
    SelectSession {
        session_id: String,
    },
    SubmitPrompt {
        prompt: String,
        attachments: Vec<Attachment>,
    },
    LoadOlder {
        session_id: String,
    },
    AbortSession {
        session_id: String,
    },
    TranscriptChanged {
        session_id: String,
    },
    TranscriptLoaded {
        session_id: String,
        kind: PageKind,
        page: TranscriptPage,
        generation: u64,
    },
    PermissionSettled {
        request_id: String,
        reason: ResolutionReason,
        message: Option<String>,
    },
    FlushSessionList,
    TransportStatus {
        connected: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Send(Box<ClientMessage>),
    Emit(Box<ViewUpdate>),
    StartSession {
        slot: SlotId,
        session_id: String,
        correlation_id: String,
        resume_id: Option<String>,
        prompt: String,
        attachments: Vec<Attachment>,
    },
    LoadTranscript {
        session_id: String,
        kind: PageKind,
        offset: usize,
        limit: usize,
        /// Echoed back on `TranscriptLoaded`
        generation: u64,
    },
    RegisterPermission(Box<PermissionRequest>),
    /// Pending requests of `from` now belong to `to`
    RekeyPermissions {
        from: String,
        to: String,
    },
    AbortPermission {
        request_id: String,
        reason: String,
    },
    AbortSessionPermissions {
        session_id: String,
        reason: String,
    },
    ReleaseAttachments {
        slot: SlotId,
    },
    ScheduleListFlush {
        after: Duration,
    },
}

fn emit(effects: &mut Vec<Effect>, update: ViewUpdate) {
    effects.push(Effect::Emit(Box::new(update)));
}

// ---------------------------------------------------------------------------
// Routing decision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Belongs to the viewed slot; stored under the given id
    Active(String),
    /// Belongs to another known session
    Background(String),
    Drop,
}

/// Decide where a session-scoped event goes, reading identity as it is now.
pub fn route(resolver: &IdentityResolver, session_id: &str) -> Route {
    let canonical = resolver.canonical(session_id);
    if resolver.is_abandoned(canonical) {
        return Route::Drop;
    }

    if let Some(viewed) = resolver.viewed() {
        match &viewed.state {
            SlotState::PendingReal { real_id: id } | SlotState::Final { id, .. }
                if id == canonical =>
            {
                return Route::Active(id.clone());
            }
            SlotState::Placeholder { local_id } => {
                if local_id == canonical {
                    return Route::Active(local_id.clone());
                }
                // First event of a brand-new session, before its id arrived.
                // Only safe while no other start is in flight.
                if resolver.slot_for_session(canonical).is_none()
                    && resolver.placeholder_count() == 1
                {
                    return Route::Active(local_id.clone());
                }
            }
            _ => {}
        }
    }

    if resolver.slot_for_session(canonical).is_some() {
        return Route::Background(canonical.to_string());
    }
    Route::Drop
}

// ---------------------------------------------------------------------------
// Transition
// ---------------------------------------------------------------------------

pub fn apply(state: &mut CoreState, input: Input, now: DateTime<Utc>) -> Vec<Effect> {
    let mut effects = Vec::new();

    match input {
        Input::Inbound(message) => apply_inbound(state, message, now, &mut effects),

        Input::NewConversation => {
            state.resolver.new_conversation();
            let evicted = state.cache.set_current(None);
            state.release_evicted(evicted);
            emit(
                &mut effects,
                ViewUpdate::Snapshot {
                    snapshot: Box::new(state.snapshot()),
                },
            );
        }

        Input::SelectSession { session_id } => {
            let canonical = state.resolver.canonical(&session_id).to_string();
            let slot = state.resolver.open(&canonical);
            let Some(id) = state
                .resolver
                .slot(slot)
                .and_then(|s| s.current_id())
                .map(str::to_string)
            else {
                return effects;
            };

            let evicted = state.cache.ensure(&id);
            state.release_evicted(evicted);
            let evicted = state.cache.set_current(Some(&id));
            state.release_evicted(evicted);
            resurface_head(state, &id, &mut effects);

            emit(
                &mut effects,
                ViewUpdate::Snapshot {
                    snapshot: Box::new(state.snapshot()),
                },
            );
            if !is_placeholder_id(&id) {
                effects.push(state.load_latest(&id));
            }
        }

        Input::SubmitPrompt {
            prompt,
            attachments,
        } => {
            let slot = match state.resolver.viewed_slot_id() {
                Some(slot) => slot,
                None => state.resolver.new_conversation(),
            };
            let now_ms = u64::try_from(now.timestamp_millis()).unwrap_or_default();
            match state.resolver.begin(slot, now_ms) {
                Ok(ticket) => {
                    let evicted = state.cache.ensure(&ticket.session_id);
                    state.release_evicted(evicted);
                    let evicted = state.cache.set_current(Some(&ticket.session_id));
                    state.release_evicted(evicted);

                    let message = prompt_message(&ticket.session_id, &ticket.correlation_id, &prompt, now);
                    state.cache.append(&ticket.session_id, message.clone());
                    emit(
                        &mut effects,
                        ViewUpdate::MessageAppended {
                            session_id: ticket.session_id.clone(),
                            message,
                        },
                    );
                    push_slot_changed(state, ticket.slot, &mut effects);
                    effects.push(Effect::StartSession {
                        slot: ticket.slot,
                        session_id: ticket.session_id,
                        correlation_id: ticket.correlation_id,
                        resume_id: ticket.resume_id,
                        prompt,
                        attachments,
                    });
                }
                Err(StartRejected::Busy { session_id }) => emit(
                    &mut effects,
                    ViewUpdate::Error {
                        code: "session_busy".to_string(),
                        message: "Session already has an operation in flight".to_string(),
                        session_id: Some(session_id),
                    },
                ),
                Err(StartRejected::UnknownSlot) => emit(
                    &mut effects,
                    ViewUpdate::Error {
                        code: "unknown_slot".to_string(),
                        message: "No conversation slot to submit to".to_string(),
                        session_id: None,
                    },
                ),
            }
        }

        Input::LoadOlder { session_id } => {
            let id = state.resolver.canonical(&session_id).to_string();
            match state.cache.get(&id) {
                Some((_, pagination)) if pagination.has_more => {
                    effects.push(Effect::LoadTranscript {
                        session_id: id,
                        kind: PageKind::Older,
                        offset: pagination.offset,
                        limit: state.page_size,
                        generation: state.next_load,
                    });
                }
                Some((_, pagination)) => emit(
                    &mut effects,
                    ViewUpdate::OlderMessages {
                        session_id: id,
                        messages: Vec::new(),
                        pagination,
                    },
                ),
                None => emit(
                    &mut effects,
                    ViewUpdate::Error {
                        code: "not_loaded".to_string(),
                        message: "Session is not loaded".to_string(),
                        session_id: Some(id),
                    },
                ),
            }
        }

        Input::AbortSession { session_id } => {
            let id = state.resolver.canonical(&session_id).to_string();
            if let Some(slot) = state.resolver.slot_for_session(&id) {
                let running = state
                    .resolver
                    .slot(slot)
                    .is_some_and(|s| matches!(s.state, SlotState::Placeholder { .. } | SlotState::PendingReal { .. }));
                if running {
                    effects.push(Effect::Send(Box::new(ClientMessage::AbortSession {
                        session_id: id.clone(),
                    })));
                    // A start without its id yet keeps its token, so the
                    // late assignment can be interrupted under the real id.
                    if state.resolver.abandon(slot).is_none() {
                        state.resolver.complete(slot, &id);
                    }
                    push_slot_changed(state, slot, &mut effects);
                    reapply_list(state, &mut effects);
                }
                effects.push(Effect::AbortSessionPermissions {
                    session_id: id.clone(),
                    reason: "session aborted".to_string(),
                });
                effects.push(Effect::ReleaseAttachments { slot });
            }
            emit(&mut effects, ViewUpdate::AbortComplete { session_id: id });
        }

        Input::TranscriptChanged { session_id } => {
            let id = state.resolver.canonical(&session_id).to_string();
            if state.is_viewed(&id) {
                effects.push(state.load_latest(&id));
            }
        }

        Input::TranscriptLoaded {
            session_id,
            kind,
            page,
            generation,
        } => apply_transcript(state, session_id, kind, page, generation, &mut effects),

        Input::PermissionSettled {
            request_id,
            reason,
            message,
        } => settle_permission(state, request_id, reason, message, &mut effects),

        Input::FlushSessionList => {
            let protected = state.resolver.protected_ids().clone();
            if let Some(sessions) = state.list.flush(&protected) {
                emit(&mut effects, ViewUpdate::SessionList { sessions });
            }
        }

        Input::TransportStatus { connected } => {
            state.transport_connected = connected;
            emit(&mut effects, ViewUpdate::TransportStatus { connected });
        }
    }

    effects
}

fn apply_inbound(
    state: &mut CoreState,
    message: ServerMessage,
    now: DateTime<Utc>,
    effects: &mut Vec<Effect>,
) {
    match message {
        ServerMessage::SessionAssigned {
            correlation_id,
            real_id,
        } => {
            match state.resolver.assign(correlation_id.as_deref(), &real_id) {
                AssignOutcome::Rewritten { slot, from, to } => {
                    adopt_identity(state, slot, &from, &to, effects);
                }
                AssignOutcome::Abandoned {
                    placeholder,
                    real_id,
                } => {
                    debug!(
                        component = "router",
                        event = "router.assign.abandoned",
                        placeholder = %placeholder,
                        session_id = %real_id,
                        "Interrupting run aborted before its id arrived"
                    );
                    state.permissions.remove(&real_id);
                    effects.push(Effect::Send(Box::new(ClientMessage::AbortSession {
                        session_id: real_id.clone(),
                    })));
                    effects.push(Effect::AbortSessionPermissions {
                        session_id: real_id,
                        reason: "session aborted".to_string(),
                    });
                }
                AssignOutcome::Duplicate { .. } | AssignOutcome::Unmatched => {}
            }
        }

        ServerMessage::StreamEvent {
            session_id,
            payload,
        } => {
            let (id, active) = match route(&state.resolver, &session_id) {
                Route::Active(id) => (id, true),
                Route::Background(id) => (id, false),
                Route::Drop => {
                    debug!(
                        component = "router",
                        event = "router.stream_event.dropped",
                        session_id = %session_id,
                        "Stream event matched no known session"
                    );
                    return;
                }
            };

            let message = live_message(&id, payload);
            if state.has_message(&id, &message.id) {
                debug!(
                    component = "router",
                    event = "router.stream_event.duplicate",
                    session_id = %id,
                    message_id = %message.id,
                    "Duplicate stream event ignored"
                );
                return;
            }

            if active {
                let evicted = state.cache.ensure(&id);
                state.release_evicted(evicted);
                state.cache.append(&id, message.clone());
                emit(
                    effects,
                    ViewUpdate::MessageAppended {
                        session_id: id,
                        message,
                    },
                );
            } else {
                // Evicted sessions reload from the transcript instead.
                state.cache.append(&id, message);
            }
        }

        ServerMessage::SessionComplete {
            session_id,
            exit_code,
        } => {
            let Some(slot) = terminal_slot(state, &session_id) else {
                debug!(
                    component = "router",
                    event = "router.complete.unknown_session",
                    session_id = %session_id,
                    "Completion for unknown session dropped"
                );
                return;
            };
            let before = current_id(state, slot);
            let Some(id) = state.resolver.complete(slot, &session_id) else {
                return;
            };
            debug!(
                component = "router",
                event = "router.session.completed",
                session_id = %id,
                exit_code = ?exit_code,
                "Session completed"
            );
            if let Some(from) = before.filter(|from| *from != id) {
                adopt_identity(state, slot, &from, &id, effects);
            }
            finish_session(state, slot, &id, "session completed", effects);
        }

        ServerMessage::SessionError { session_id, error } => {
            let Some(slot) = terminal_slot(state, &session_id) else {
                debug!(
                    component = "router",
                    event = "router.error.unknown_session",
                    session_id = %session_id,
                    "Error for unknown session dropped"
                );
                return;
            };
            let before = current_id(state, slot);
            let Some(id) = state.resolver.fail(slot, &session_id) else {
                return;
            };
            if let Some(from) = before.filter(|from| *from != id) {
                adopt_identity(state, slot, &from, &id, effects);
            }
            emit(
                effects,
                ViewUpdate::Error {
                    code: "session_error".to_string(),
                    message: error,
                    session_id: Some(id.clone()),
                },
            );
            finish_session(state, slot, &id, "session failed", effects);
        }

        ServerMessage::PermissionRequest {
            request_id,
            session_id,
            tool_name,
            input,
            suggestions,
        } => {
            let id = state.resolver.canonical(&session_id).to_string();
            if state.resolver.is_abandoned(&id) {
                debug!(
                    component = "router",
                    event = "router.permission.abandoned",
                    request_id = %request_id,
                    session_id = %id,
                    "Permission request from an aborted run dropped"
                );
                return;
            }
            let queue = state.permissions.entry(id.clone()).or_default();
            if queue.iter().any(|r| r.request_id == request_id) {
                return;
            }
            let request = PermissionRequest {
                request_id,
                session_id: id.clone(),
                tool_name,
                input,
                suggestions,
                created_at: now.to_rfc3339(),
            };
            queue.push_back(request.clone());
            let is_head = queue.len() == 1;

            effects.push(Effect::RegisterPermission(Box::new(request)));
            if is_head {
                resurface_head(state, &id, effects);
            }
        }

        ServerMessage::PermissionCancelled {
            request_id, reason, ..
        } => {
            effects.push(Effect::AbortPermission {
                request_id,
                reason: reason.unwrap_or_else(|| "cancelled by backend".to_string()),
            });
        }

        ServerMessage::ListRefresh { payload } => offer_list(state, payload, effects),
    }
}

/// Slot a terminal event belongs to, decided by the same rules as stream
/// events. A run that was aborted before its assignment is forgotten here.
fn terminal_slot(state: &mut CoreState, session_id: &str) -> Option<SlotId> {
    match route(&state.resolver, session_id) {
        Route::Active(id) | Route::Background(id) => state.resolver.slot_for_session(&id),
        Route::Drop => {
            state.resolver.forget_abandoned(session_id);
            None
        }
    }
}

fn current_id(state: &CoreState, slot: SlotId) -> Option<String> {
    state
        .resolver
        .slot(slot)
        .and_then(|s| s.current_id())
        .map(str::to_string)
}

fn offer_list(state: &mut CoreState, payload: SessionListPayload, effects: &mut Vec<Effect>) {
    if let Some(after) = state.list.offer(payload) {
        effects.push(Effect::ScheduleListFlush { after });
    }
}

/// Placeholder (or forked id) replaced: move cached content and pending
/// permissions, relabel messages.
fn adopt_identity(state: &mut CoreState, slot: SlotId, from: &str, to: &str, effects: &mut Vec<Effect>) {
    state.cache.rekey(from, to);
    if let Some(messages) = state.cache.messages_mut(to) {
        for message in messages.iter_mut().filter(|m| m.session_id == from) {
            message.session_id = to.to_string();
        }
    }
    if let Some(queue) = state.permissions.remove(from) {
        let target = state.permissions.entry(to.to_string()).or_default();
        for mut request in queue {
            if target.iter().any(|r| r.request_id == request.request_id) {
                continue;
            }
            request.session_id = to.to_string();
            target.push_back(request);
        }
        effects.push(Effect::RekeyPermissions {
            from: from.to_string(),
            to: to.to_string(),
        });
    }
    if let Some(generation) = state.latest_load.remove(from) {
        let newest = state.latest_load.entry(to.to_string()).or_default();
        *newest = (*newest).max(generation);
    }

    emit(
        effects,
        ViewUpdate::IdentityRewritten {
            slot_id: slot,
            from: from.to_string(),
            to: to.to_string(),
        },
    );
    push_slot_changed(state, slot, effects);
}

/// Shared tail of complete/error: the operation is over.
fn finish_session(state: &mut CoreState, slot: SlotId, id: &str, reason: &str, effects: &mut Vec<Effect>) {
    effects.push(Effect::AbortSessionPermissions {
        session_id: id.to_string(),
        reason: reason.to_string(),
    });
    effects.push(Effect::ReleaseAttachments { slot });
    push_slot_changed(state, slot, effects);
    reapply_list(state, effects);

    if state.is_viewed(id) && !is_placeholder_id(id) {
        effects.push(state.load_latest(id));
    }
}

fn reapply_list(state: &mut CoreState, effects: &mut Vec<Effect>) {
    let protected = state.resolver.protected_ids().clone();
    if let Some(sessions) = state.list.reapply(&protected) {
        emit(effects, ViewUpdate::SessionList { sessions });
    }
}

fn push_slot_changed(state: &CoreState, slot: SlotId, effects: &mut Vec<Effect>) {
    if let Some(summary) = state.resolver.summary(slot) {
        emit(effects, ViewUpdate::SlotChanged { slot: summary });
    }
}

/// Put the session's oldest pending request into its message list, unless
/// it is already there.
fn resurface_head(state: &mut CoreState, session_id: &str, effects: &mut Vec<Effect>) {
    let Some(head) = state
        .permissions
        .get(session_id)
        .and_then(VecDeque::front)
    else {
        return;
    };
    let message = Message::permission_request(head);
    if state.has_message(session_id, &message.id) {
        return;
    }
    if !state.cache.append(session_id, message.clone()) {
        return;
    }
    if state.is_viewed(session_id) {
        emit(
            effects,
            ViewUpdate::MessageAppended {
                session_id: session_id.to_string(),
                message,
            },
        );
    }
}

fn settle_permission(
    state: &mut CoreState,
    request_id: String,
    reason: ResolutionReason,
    message: Option<String>,
    effects: &mut Vec<Effect>,
) {
    let owner = state.permissions.iter().find_map(|(session_id, queue)| {
        queue
            .iter()
            .position(|r| r.request_id == request_id)
            .map(|index| (session_id.clone(), index))
    });
    let Some((session_id, index)) = owner else {
        debug!(
            component = "router",
            event = "router.permission.unknown",
            request_id = %request_id,
            "Settled permission request was not queued"
        );
        return;
    };

    if let Some(queue) = state.permissions.get_mut(&session_id) {
        queue.remove(index);
        if queue.is_empty() {
            state.permissions.remove(&session_id);
        }
    }

    let message_id = format!("permission:{request_id}");
    if let Some(messages) = state.cache.messages_mut(&session_id) {
        for entry in messages.iter_mut().filter(|m| m.id == message_id) {
            if let Some(marker) = entry.permission.as_mut() {
                marker.settle(reason);
            }
        }
    }

    emit(
        effects,
        ViewUpdate::PermissionResolved {
            request_id,
            session_id: session_id.clone(),
            reason,
            message,
        },
    );
    if index == 0 {
        resurface_head(state, &session_id, effects);
    }
}

fn apply_transcript(
    state: &mut CoreState,
    session_id: String,
    kind: PageKind,
    page: TranscriptPage,
    generation: u64,
    effects: &mut Vec<Effect>,
) {
    let id = state.resolver.canonical(&session_id).to_string();
    let viewed = state.is_viewed(&id);
    if !viewed && !state.cache.contains(&id) {
        // Loaded for a view that has moved on and been evicted since.
        return;
    }

    match kind {
        PageKind::Latest => {
            if state.is_stale_load(&id, generation) {
                debug!(
                    component = "router",
                    event = "router.transcript.stale",
                    session_id = %id,
                    generation = generation,
                    "Superseded transcript read discarded"
                );
                return;
            }
            let mut live: Vec<Message> = state
                .cache
                .get(&id)
                .map(|(messages, _)| messages.to_vec())
                .unwrap_or_default();
            if let Some(head) = state.permissions.get(&id).and_then(VecDeque::front) {
                let pending = Message::permission_request(head);
                if !live.iter().any(|m| m.id == pending.id) {
                    live.push(pending);
                }
            }
            let merged = merge_transcript(page.messages, &live);
            let evicted = state.cache.put(&id, merged.clone(), page.pagination);
            state.release_evicted(evicted);

            if viewed {
                emit(
                    effects,
                    ViewUpdate::SessionMessages {
                        session_id: id,
                        messages: merged,
                        pagination: page.pagination,
                    },
                );
            }
        }
        PageKind::Older => {
            let known: HashSet<String> = state
                .cache
                .get(&id)
                .map(|(messages, _)| messages.iter().map(|m| m.id.clone()).collect())
                .unwrap_or_default();
            let older: Vec<Message> = page
                .messages
                .into_iter()
                .filter(|m| !known.contains(&m.id))
                .collect();
            if !state.cache.prepend(&id, older.clone(), page.pagination) {
                return;
            }
            if viewed {
                emit(
                    effects,
                    ViewUpdate::OlderMessages {
                        session_id: id,
                        messages: older,
                        pagination: page.pagination,
                    },
                );
            }
        }
    }
}

fn prompt_message(session_id: &str, correlation_id: &str, prompt: &str, now: DateTime<Utc>) -> Message {
    Message {
        id: format!("prompt:{correlation_id}"),
        session_id: session_id.to_string(),
        origin: MessageOrigin::Live,
        timestamp: Some(now.to_rfc3339()),
        permission: None,
        content: serde_json::json!({
            "type": "user",
            "message": { "role": "user", "content": prompt },
        }),
    }
}

fn live_message(session_id: &str, payload: Value) -> Message {
    let id = ["uuid", "id"]
        .iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| format!("live:{}", new_id()));
    let timestamp = payload
        .get("timestamp")
        .and_then(Value::as_str)
        .map(str::to_string);
    Message {
        id,
        session_id: session_id.to_string(),
        origin: MessageOrigin::Live,
        timestamp,
        permission: None,
        content: payload,
    }
}
