//! Identity resolver
//!
//! Tracks, per conversation slot, which identifier the session currently
//! goes by: a locally minted placeholder, the backend-issued id while the
//! session is running, or the final id once it completed. The placeholder →
//! real rewrite happens exactly once per start request and is matched by the
//! request's correlation token, never by "the first placeholder found".
//!
//! Everything here is synchronous and owned by the core actor; callers read
//! identity through the resolver at event time instead of capturing ids.

use std::collections::{HashMap, HashSet};

use relaydeck_protocol::{new_id, SlotStatus, SlotSummary};
use tracing::{debug, warn};

pub type SlotId = u64;

pub const PLACEHOLDER_PREFIX: &str = "new-session-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotState {
    NoSession,
    Placeholder { local_id: String },
    PendingReal { real_id: String },
    Final { id: String, failed: bool },
}

#[derive(Debug, Clone)]
pub struct Slot {
    pub id: SlotId,
    pub state: SlotState,
    /// Set while a resume request is in flight; the backend may fork the
    /// conversation under a new id.
    resuming: bool,
}

impl Slot {
    /// The identifier this slot currently goes by.
    pub fn current_id(&self) -> Option<&str> {
        match &self.state {
            SlotState::NoSession => None,
            SlotState::Placeholder { local_id } => Some(local_id),
            SlotState::PendingReal { real_id } => Some(real_id),
            SlotState::Final { id, .. } => Some(id),
        }
    }

    pub fn status(&self) -> SlotStatus {
        match self.state {
            SlotState::NoSession => SlotStatus::NoSession,
            SlotState::Placeholder { .. } => SlotStatus::Placeholder,
            SlotState::PendingReal { .. } => SlotStatus::PendingReal,
            SlotState::Final { failed: false, .. } => SlotStatus::Final,
            SlotState::Final { failed: true, .. } => SlotStatus::Failed,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.state, SlotState::Placeholder { .. })
    }
}

/// What a user submission turned into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTicket {
    pub slot: SlotId,
    /// Identifier to tag local state with until the backend answers
    pub session_id: String,
    pub correlation_id: String,
    /// Set when this start resumes an existing session
    pub resume_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartRejected {
    UnknownSlot,
    /// The slot already has an operation in flight
    Busy { session_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignOutcome {
    Rewritten {
        slot: SlotId,
        from: String,
        to: String,
    },
    /// Already assigned (duplicate delivery, or a resume echoing its own id)
    Duplicate { slot: SlotId },
    /// The start was aborted by the user before its id arrived. The backend
    /// run still has to be interrupted under `real_id`.
    Abandoned { placeholder: String, real_id: String },
    /// No placeholder could be matched; the event should be dropped
    Unmatched,
}

pub fn is_placeholder_id(id: &str) -> bool {
    id.starts_with(PLACEHOLDER_PREFIX)
}

#[derive(Debug, Default)]
pub struct IdentityResolver {
    slots: HashMap<SlotId, Slot>,
    next_slot: SlotId,
    /// current identifier → slot
    by_session: HashMap<String, SlotId>,
    /// in-flight start correlation token → slot
    by_correlation: HashMap<String, SlotId>,
    /// rewritten placeholder → real id, so late events keep their owner
    aliases: HashMap<String, String>,
    /// identifiers whose list position must not change
    protected: HashSet<String>,
    viewed: Option<SlotId>,
    /// Logical clock for placeholder ids; never runs backwards
    placeholder_clock: u64,
    /// correlation token of an aborted start → its placeholder
    abandoned: HashMap<String, String>,
    /// backend ids of runs aborted before their assignment arrived
    abandoned_sessions: HashSet<String>,
}

impl IdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a placeholder id: logical clock plus random suffix, always
    /// prefixed so it can never collide with a backend id shape.
    fn mint_placeholder_id(&mut self, now_ms: u64) -> String {
        let tick = self.placeholder_clock.max(now_ms);
        self.placeholder_clock = tick + 1;
        let suffix = new_id();
        format!("{PLACEHOLDER_PREFIX}{tick}-{}", &suffix[..8])
    }

    fn insert_slot(&mut self, state: SlotState) -> SlotId {
        self.next_slot += 1;
        let id = self.next_slot;
        if let Some(current) = match &state {
            SlotState::NoSession => None,
            SlotState::Placeholder { local_id } => Some(local_id.clone()),
            SlotState::PendingReal { real_id } => Some(real_id.clone()),
            SlotState::Final { id, .. } => Some(id.clone()),
        } {
            self.by_session.insert(current, id);
        }
        self.slots.insert(
            id,
            Slot {
                id,
                state,
                resuming: false,
            },
        );
        id
    }

    pub fn slot(&self, slot: SlotId) -> Option<&Slot> {
        self.slots.get(&slot)
    }

    pub fn viewed(&self) -> Option<&Slot> {
        self.viewed.and_then(|id| self.slots.get(&id))
    }

    pub fn viewed_slot_id(&self) -> Option<SlotId> {
        self.viewed
    }

    /// Identifier of the viewed session, if it has one.
    pub fn viewed_session_id(&self) -> Option<&str> {
        self.viewed().and_then(Slot::current_id)
    }

    /// Follow a rewritten placeholder to the id that replaced it.
    pub fn canonical<'a>(&'a self, id: &'a str) -> &'a str {
        self.aliases.get(id).map(String::as_str).unwrap_or(id)
    }

    /// Slot owning `id`, following placeholder aliases.
    pub fn slot_for_session(&self, id: &str) -> Option<SlotId> {
        self.by_session.get(self.canonical(id)).copied()
    }

    #[cfg(test)]
    pub fn is_protected(&self, id: &str) -> bool {
        self.protected.contains(self.canonical(id))
    }

    pub fn protected_ids(&self) -> &HashSet<String> {
        &self.protected
    }

    /// Backend id of a run the user aborted before it was assigned.
    pub fn is_abandoned(&self, id: &str) -> bool {
        self.abandoned_sessions.contains(id)
    }

    /// The abandoned run reported its end; nothing more will arrive for it.
    pub fn forget_abandoned(&mut self, id: &str) -> bool {
        self.abandoned_sessions.remove(id)
    }

    pub fn placeholder_count(&self) -> usize {
        self.slots.values().filter(|s| s.is_placeholder()).count()
    }

    /// View an empty conversation slot, reusing an idle one if present.
    pub fn new_conversation(&mut self) -> SlotId {
        let idle = self
            .slots
            .values()
            .find(|s| s.state == SlotState::NoSession)
            .map(|s| s.id);
        let slot = idle.unwrap_or_else(|| self.insert_slot(SlotState::NoSession));
        self.viewed = Some(slot);
        slot
    }

    /// View an existing session, creating a final slot for it if unknown.
    pub fn open(&mut self, session_id: &str) -> SlotId {
        let slot = match self.slot_for_session(session_id) {
            Some(slot) => slot,
            None => self.insert_slot(SlotState::Final {
                id: session_id.to_string(),
                failed: false,
            }),
        };
        self.viewed = Some(slot);
        slot
    }

    /// Start work in `slot`: a fresh placeholder for an empty slot, a resume
    /// for a finished one. Protection is switched on either way.
    pub fn begin(&mut self, slot: SlotId, now_ms: u64) -> Result<StartTicket, StartRejected> {
        let current = self
            .slots
            .get(&slot)
            .ok_or(StartRejected::UnknownSlot)?
            .state
            .clone();
        let correlation_id = new_id();

        let ticket = match current {
            SlotState::NoSession => {
                let local_id = self.mint_placeholder_id(now_ms);
                self.by_session.insert(local_id.clone(), slot);
                StartTicket {
                    slot,
                    session_id: local_id,
                    correlation_id,
                    resume_id: None,
                }
            }
            SlotState::Final { id, .. } => StartTicket {
                slot,
                session_id: id.clone(),
                correlation_id,
                resume_id: Some(id),
            },
            SlotState::Placeholder { local_id: session_id }
            | SlotState::PendingReal {
                real_id: session_id,
            } => return Err(StartRejected::Busy { session_id }),
        };

        if let Some(entry) = self.slots.get_mut(&slot) {
            entry.state = match &ticket.resume_id {
                None => SlotState::Placeholder {
                    local_id: ticket.session_id.clone(),
                },
                Some(id) => SlotState::PendingReal {
                    real_id: id.clone(),
                },
            };
            entry.resuming = ticket.resume_id.is_some();
        }
        self.by_correlation
            .insert(ticket.correlation_id.clone(), slot);
        self.protected.insert(ticket.session_id.clone());
        Ok(ticket)
    }

    /// Apply a backend "real id assigned" event.
    pub fn assign(&mut self, correlation_id: Option<&str>, real_id: &str) -> AssignOutcome {
        let matched = match correlation_id {
            Some(token) => match self.by_correlation.remove(token) {
                Some(slot) => Some(slot),
                None => {
                    if let Some(placeholder) = self.abandoned.remove(token) {
                        debug!(
                            component = "identity",
                            event = "identity.assign.abandoned",
                            placeholder = %placeholder,
                            real_id = %real_id,
                            "Assignment for an aborted start"
                        );
                        self.abandoned_sessions.insert(real_id.to_string());
                        return AssignOutcome::Abandoned {
                            placeholder,
                            real_id: real_id.to_string(),
                        };
                    }
                    None
                }
            },
            None => self.unique_placeholder(),
        };

        let Some(slot) = matched else {
            if let Some(slot) = self.slot_for_session(real_id) {
                return AssignOutcome::Duplicate { slot };
            }
            warn!(
                component = "identity",
                event = "identity.assign.unmatched",
                correlation_id = ?correlation_id,
                real_id = %real_id,
                placeholders = self.placeholder_count(),
                "Session assignment matched no placeholder"
            );
            return AssignOutcome::Unmatched;
        };

        let Some(entry) = self.slots.get(&slot) else {
            return AssignOutcome::Unmatched;
        };
        let from = match &entry.state {
            SlotState::Placeholder { local_id } => local_id.clone(),
            SlotState::PendingReal { real_id: current } if entry.resuming && current != real_id => {
                current.clone()
            }
            _ => {
                debug!(
                    component = "identity",
                    event = "identity.assign.duplicate",
                    slot = slot,
                    real_id = %real_id,
                    "Ignoring assignment for an already-assigned slot"
                );
                return AssignOutcome::Duplicate { slot };
            }
        };

        self.rewrite(slot, &from, real_id);
        AssignOutcome::Rewritten {
            slot,
            from,
            to: real_id.to_string(),
        }
    }

    /// Single in-flight placeholder, the only safe match without a token.
    fn unique_placeholder(&self) -> Option<SlotId> {
        let mut placeholders = self.slots.values().filter(|s| s.is_placeholder());
        match (placeholders.next(), placeholders.next()) {
            (Some(only), None) => Some(only.id),
            _ => None,
        }
    }

    fn rewrite(&mut self, slot: SlotId, from: &str, to: &str) {
        if let Some(entry) = self.slots.get_mut(&slot) {
            entry.state = SlotState::PendingReal {
                real_id: to.to_string(),
            };
            entry.resuming = false;
        }
        self.by_correlation.retain(|_, s| *s != slot);

        // Swap, never hold both ids at once.
        if self.protected.remove(from) {
            self.protected.insert(to.to_string());
        }
        self.by_session.remove(from);
        self.by_session.insert(to.to_string(), slot);

        for target in self.aliases.values_mut() {
            if target.as_str() == from {
                *target = to.to_string();
            }
        }
        self.aliases.insert(from.to_string(), to.to_string());
    }

    /// Terminal "complete" event. A placeholder that never saw its
    /// assignment adopts `observed_id` first.
    pub fn complete(&mut self, slot: SlotId, observed_id: &str) -> Option<String> {
        let id = self.adopt_observed(slot, observed_id)?;
        if matches!(
            self.slots.get(&slot).map(|s| &s.state),
            Some(SlotState::Final { .. })
        ) {
            return None;
        }
        self.finalize(slot, &id, false);
        Some(id)
    }

    /// Error event: any running or finished state goes final-and-failed,
    /// adopting `observed_id` the same way `complete` does.
    pub fn fail(&mut self, slot: SlotId, observed_id: &str) -> Option<String> {
        let id = self.adopt_observed(slot, observed_id)?;
        self.finalize(slot, &id, true);
        Some(id)
    }

    /// User abort of a start whose real id has not arrived yet. The
    /// correlation token is kept so the late assignment can still be
    /// interrupted under the backend's id.
    pub fn abandon(&mut self, slot: SlotId) -> Option<String> {
        let SlotState::Placeholder { local_id } = &self.slots.get(&slot)?.state else {
            return None;
        };
        let local_id = local_id.clone();
        let tokens: Vec<String> = self
            .by_correlation
            .iter()
            .filter(|(_, s)| **s == slot)
            .map(|(token, _)| token.clone())
            .collect();
        for token in tokens {
            self.by_correlation.remove(&token);
            self.abandoned.insert(token, local_id.clone());
        }
        self.finalize(slot, &local_id, false);
        Some(local_id)
    }

    /// Current id of the slot, rewriting a placeholder to the backend id
    /// observed on a terminal event.
    fn adopt_observed(&mut self, slot: SlotId, observed_id: &str) -> Option<String> {
        let entry = self.slots.get(&slot)?;
        match &entry.state {
            SlotState::Placeholder { local_id } => {
                let local_id = local_id.clone();
                if local_id != observed_id && !is_placeholder_id(observed_id) {
                    self.rewrite(slot, &local_id, observed_id);
                    Some(observed_id.to_string())
                } else {
                    Some(local_id)
                }
            }
            SlotState::NoSession => None,
            _ => entry.current_id().map(str::to_string),
        }
    }

    fn finalize(&mut self, slot: SlotId, id: &str, failed: bool) {
        if let Some(entry) = self.slots.get_mut(&slot) {
            entry.state = SlotState::Final {
                id: id.to_string(),
                failed,
            };
            entry.resuming = false;
        }
        self.by_correlation.retain(|_, s| *s != slot);
        self.protected.remove(id);
    }

    /// Drop bookkeeping for a finished session that is no longer viewed.
    pub fn release(&mut self, session_id: &str) -> bool {
        let Some(slot) = self.slot_for_session(session_id) else {
            return false;
        };
        let releasable = self.viewed != Some(slot)
            && matches!(
                self.slots.get(&slot).map(|s| &s.state),
                Some(SlotState::Final { .. })
            );
        if !releasable {
            return false;
        }
        let canonical = self.canonical(session_id).to_string();
        self.slots.remove(&slot);
        self.by_session.remove(&canonical);
        self.aliases.retain(|_, target| *target != canonical);
        true
    }

    pub fn summary(&self, slot: SlotId) -> Option<SlotSummary> {
        let entry = self.slots.get(&slot)?;
        let session_id = entry.current_id().map(str::to_string);
        let protected = session_id
            .as_deref()
            .is_some_and(|id| self.protected.contains(id));
        Some(SlotSummary {
            slot_id: slot,
            session_id,
            status: entry.status(),
            protected,
        })
    }

    pub fn summaries(&self) -> Vec<SlotSummary> {
        let mut ids: Vec<SlotId> = self.slots.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter().filter_map(|id| self.summary(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW_MS: u64 = 1_000;

    fn started(resolver: &mut IdentityResolver) -> StartTicket {
        let slot = resolver.new_conversation();
        resolver.begin(slot, NOW_MS).expect("begin")
    }

    #[test]
    fn placeholder_ids_are_prefixed_and_unique() {
        let mut resolver = IdentityResolver::new();
        let a = resolver.mint_placeholder_id(NOW_MS);
        let b = resolver.mint_placeholder_id(NOW_MS);
        assert!(is_placeholder_id(&a));
        assert!(a.starts_with("new-session-1000-"));
        assert!(b.starts_with("new-session-1001-"));

        // A clock that steps back does not reuse ticks.
        let c = resolver.mint_placeholder_id(NOW_MS - 500);
        assert!(c.starts_with("new-session-1002-"));

        // Each resolver owns its clock.
        let other = IdentityResolver::new().mint_placeholder_id(NOW_MS);
        assert!(other.starts_with("new-session-1000-"));
    }

    #[test]
    fn first_prompt_mints_protected_placeholder() {
        let mut resolver = IdentityResolver::new();
        let ticket = started(&mut resolver);

        let slot = resolver.slot(ticket.slot).unwrap();
        assert!(slot.is_placeholder());
        assert!(resolver.is_protected(&ticket.session_id));
        assert_eq!(resolver.viewed_session_id(), Some(ticket.session_id.as_str()));
        assert!(ticket.resume_id.is_none());
    }

    #[test]
    fn assignment_swaps_protection_and_aliases_placeholder() {
        let mut resolver = IdentityResolver::new();
        let ticket = started(&mut resolver);

        let outcome = resolver.assign(Some(&ticket.correlation_id), "abc123");
        assert_eq!(
            outcome,
            AssignOutcome::Rewritten {
                slot: ticket.slot,
                from: ticket.session_id.clone(),
                to: "abc123".into(),
            }
        );
        assert!(resolver.is_protected("abc123"));
        assert_eq!(resolver.protected_ids().len(), 1);
        assert!(!resolver.protected_ids().contains(&ticket.session_id));
        assert_eq!(resolver.canonical(&ticket.session_id), "abc123");
        assert_eq!(resolver.slot_for_session(&ticket.session_id), Some(ticket.slot));
        assert_eq!(
            resolver.slot(ticket.slot).unwrap().state,
            SlotState::PendingReal {
                real_id: "abc123".into()
            }
        );
    }

    #[test]
    fn duplicate_assignment_is_ignored() {
        let mut resolver = IdentityResolver::new();
        let ticket = started(&mut resolver);
        resolver.assign(Some(&ticket.correlation_id), "abc123");

        let again = resolver.assign(Some(&ticket.correlation_id), "abc123");
        assert_eq!(again, AssignOutcome::Duplicate { slot: ticket.slot });

        resolver.complete(ticket.slot, "abc123");
        let late = resolver.assign(Some(&ticket.correlation_id), "abc123");
        assert_eq!(late, AssignOutcome::Duplicate { slot: ticket.slot });
        assert!(!resolver.is_protected("abc123"));
    }

    #[test]
    fn interleaved_assignments_follow_correlation_tokens() {
        let mut resolver = IdentityResolver::new();
        let first = started(&mut resolver);
        let second_slot = resolver.new_conversation();
        assert_ne!(first.slot, second_slot);
        let second = resolver.begin(second_slot, NOW_MS).unwrap();

        resolver.assign(Some(&second.correlation_id), "r2");
        resolver.assign(Some(&first.correlation_id), "r1");

        assert_eq!(resolver.canonical(&first.session_id), "r1");
        assert_eq!(resolver.canonical(&second.session_id), "r2");
        assert_eq!(resolver.slot_for_session("r1"), Some(first.slot));
        assert_eq!(resolver.slot_for_session("r2"), Some(second.slot));
    }

    #[test]
    fn missing_correlation_falls_back_only_for_single_placeholder() {
        let mut resolver = IdentityResolver::new();
        let ticket = started(&mut resolver);
        assert!(matches!(
            resolver.assign(None, "abc"),
            AssignOutcome::Rewritten { slot, .. } if slot == ticket.slot
        ));

        let mut resolver = IdentityResolver::new();
        started(&mut resolver);
        let other = resolver.new_conversation();
        resolver.begin(other, NOW_MS).unwrap();
        assert_eq!(resolver.assign(None, "abc"), AssignOutcome::Unmatched);
    }

    #[test]
    fn unknown_correlation_is_unmatched() {
        let mut resolver = IdentityResolver::new();
        started(&mut resolver);
        assert_eq!(
            resolver.assign(Some("nope"), "abc"),
            AssignOutcome::Unmatched
        );
    }

    #[test]
    fn completion_clears_protection() {
        let mut resolver = IdentityResolver::new();
        let ticket = started(&mut resolver);
        resolver.assign(Some(&ticket.correlation_id), "abc123");

        assert_eq!(resolver.complete(ticket.slot, "abc123").as_deref(), Some("abc123"));
        assert_eq!(
            resolver.slot(ticket.slot).unwrap().status(),
            SlotStatus::Final
        );
        assert!(resolver.protected_ids().is_empty());
    }

    #[test]
    fn error_fails_placeholder_and_clears_protection() {
        let mut resolver = IdentityResolver::new();
        let ticket = started(&mut resolver);

        assert_eq!(
            resolver.fail(ticket.slot, &ticket.session_id),
            Some(ticket.session_id.clone())
        );
        assert_eq!(
            resolver.slot(ticket.slot).unwrap().status(),
            SlotStatus::Failed
        );
        assert!(!resolver.is_protected(&ticket.session_id));
        // The in-flight token is gone with the failed start.
        assert_eq!(
            resolver.assign(Some(&ticket.correlation_id), "late"),
            AssignOutcome::Unmatched
        );
    }

    #[test]
    fn aborted_start_still_recognizes_its_late_assignment() {
        let mut resolver = IdentityResolver::new();
        let ticket = started(&mut resolver);

        assert_eq!(
            resolver.abandon(ticket.slot).as_deref(),
            Some(ticket.session_id.as_str())
        );
        assert_eq!(
            resolver.slot(ticket.slot).unwrap().status(),
            SlotStatus::Final
        );
        assert!(resolver.protected_ids().is_empty());

        assert_eq!(
            resolver.assign(Some(&ticket.correlation_id), "real-1"),
            AssignOutcome::Abandoned {
                placeholder: ticket.session_id.clone(),
                real_id: "real-1".into(),
            }
        );
        assert!(resolver.is_abandoned("real-1"));
        // The slot stays with its placeholder; the run is not adopted.
        assert_eq!(resolver.slot_for_session("real-1"), None);
        // Token is consumed.
        assert_eq!(
            resolver.assign(Some(&ticket.correlation_id), "real-1"),
            AssignOutcome::Unmatched
        );
        assert!(resolver.forget_abandoned("real-1"));
    }

    #[test]
    fn abandon_only_applies_to_placeholders() {
        let mut resolver = IdentityResolver::new();
        let ticket = started(&mut resolver);
        resolver.assign(Some(&ticket.correlation_id), "abc");
        assert_eq!(resolver.abandon(ticket.slot), None);
    }

    #[test]
    fn error_before_assignment_adopts_observed_id() {
        let mut resolver = IdentityResolver::new();
        let ticket = started(&mut resolver);

        assert_eq!(resolver.fail(ticket.slot, "real-2").as_deref(), Some("real-2"));
        assert_eq!(resolver.canonical(&ticket.session_id), "real-2");
        assert_eq!(
            resolver.slot(ticket.slot).unwrap().status(),
            SlotStatus::Failed
        );
    }

    #[test]
    fn completion_before_assignment_adopts_observed_id() {
        let mut resolver = IdentityResolver::new();
        let ticket = started(&mut resolver);

        assert_eq!(resolver.complete(ticket.slot, "real-1").as_deref(), Some("real-1"));
        assert_eq!(resolver.canonical(&ticket.session_id), "real-1");
        assert!(resolver.protected_ids().is_empty());
    }

    #[test]
    fn resume_protects_existing_id_and_busy_slot_rejects() {
        let mut resolver = IdentityResolver::new();
        let slot = resolver.open("abc");
        let ticket = resolver.begin(slot, NOW_MS).unwrap();
        assert_eq!(ticket.resume_id.as_deref(), Some("abc"));
        assert!(resolver.is_protected("abc"));

        assert_eq!(
            resolver.begin(slot, NOW_MS),
            Err(StartRejected::Busy {
                session_id: "abc".into()
            })
        );

        // Echo of the same id is a duplicate.
        assert_eq!(
            resolver.assign(Some(&ticket.correlation_id), "abc"),
            AssignOutcome::Duplicate { slot }
        );
    }

    #[test]
    fn resume_fork_rewrites_to_new_id() {
        let mut resolver = IdentityResolver::new();
        let slot = resolver.open("abc");
        let ticket = resolver.begin(slot, NOW_MS).unwrap();

        let outcome = resolver.assign(Some(&ticket.correlation_id), "def");
        assert!(matches!(outcome, AssignOutcome::Rewritten { ref from, .. } if from == "abc"));
        assert!(resolver.is_protected("def"));
        assert!(!resolver.protected_ids().contains("abc"));
        assert_eq!(resolver.slot_for_session("abc"), Some(slot));
    }

    #[test]
    fn release_skips_viewed_and_running_sessions() {
        let mut resolver = IdentityResolver::new();
        resolver.open("background");
        let viewed = resolver.open("viewed");
        let running = resolver.new_conversation();
        let ticket = resolver.begin(running, NOW_MS).unwrap();
        resolver.open("viewed");

        assert!(!resolver.release("viewed"));
        assert!(!resolver.release(&ticket.session_id));
        assert!(resolver.release("background"));
        assert_eq!(resolver.slot_for_session("background"), None);
        assert_eq!(resolver.viewed_slot_id(), Some(viewed));
    }
}
