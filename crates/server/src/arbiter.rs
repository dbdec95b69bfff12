//! Permission arbiter
//!
//! Bridges a backend "authorization needed" signal to a human decision.
//! Every request waits on its own oneshot channel, so a slow decision never
//! blocks other sessions. A request leaves the pending set exactly once.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use relaydeck_protocol::{
    PermissionDecision, PermissionRequest, PermissionRule, ResolutionReason, UserDecision,
};
use tokio::sync::oneshot;
use tracing::{debug, info};

const DEFAULT_DENY_MESSAGE: &str = "User denied this operation";

/// How a pending request was settled
#[derive(Debug, Clone, PartialEq)]
pub enum PermissionOutcome {
    /// A human decided; the decision goes back to the backend.
    Decided(PermissionDecision),
    /// Nobody decided in time; denied without interrupting in-flight work.
    TimedOut(PermissionDecision),
    /// The operation stopped being relevant; nothing is sent back.
    Aborted { reason: String },
}

impl PermissionOutcome {
    pub fn reason(&self) -> ResolutionReason {
        match self {
            PermissionOutcome::Decided(PermissionDecision::Allow { .. }) => ResolutionReason::Allowed,
            PermissionOutcome::Decided(PermissionDecision::Deny { .. }) => ResolutionReason::Denied,
            PermissionOutcome::TimedOut(_) => ResolutionReason::TimedOut,
            PermissionOutcome::Aborted { .. } => ResolutionReason::Aborted,
        }
    }

    /// Decision to forward to the backend, if any.
    pub fn backend_decision(&self) -> Option<&PermissionDecision> {
        match self {
            PermissionOutcome::Decided(decision) | PermissionOutcome::TimedOut(decision) => {
                Some(decision)
            }
            PermissionOutcome::Aborted { .. } => None,
        }
    }

    /// Human-readable explanation for the view.
    pub fn message(&self) -> Option<String> {
        match self {
            PermissionOutcome::Decided(PermissionDecision::Deny { message, .. })
            | PermissionOutcome::TimedOut(PermissionDecision::Deny { message, .. }) => {
                Some(message.clone())
            }
            PermissionOutcome::Aborted { reason } => Some(reason.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    Resolved(ResolutionReason),
    NotFound,
}

struct PendingPermission {
    request: PermissionRequest,
    registered_at: Instant,
    reply: oneshot::Sender<PermissionOutcome>,
}

pub struct PermissionArbiter {
    pending: DashMap<String, PendingPermission>,
    timeout: Duration,
}

impl PermissionArbiter {
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            timeout,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    pub fn is_pending(&self, request_id: &str) -> bool {
        self.pending.contains_key(request_id)
    }

    /// Store a request and hand back the future its decision arrives on.
    /// Stale requests are swept first. Returns `None` for a request id that
    /// is already pending (duplicate delivery).
    pub fn register(
        &self,
        request: PermissionRequest,
        now: Instant,
    ) -> Option<oneshot::Receiver<PermissionOutcome>> {
        self.timeout_sweep(now);

        let (reply, rx) = oneshot::channel();
        let request_id = request.request_id.clone();
        let mut inserted = false;
        self.pending.entry(request_id.clone()).or_insert_with(|| {
            inserted = true;
            PendingPermission {
                request,
                registered_at: now,
                reply,
            }
        });
        if !inserted {
            debug!(
                component = "arbiter",
                event = "arbiter.register.duplicate",
                request_id = %request_id,
                "Permission request already pending"
            );
            return None;
        }
        Some(rx)
    }

    /// Apply a human decision. Unknown or already-settled ids report
    /// `NotFound` without side effects.
    pub fn resolve(&self, request_id: &str, decision: UserDecision) -> ResolveOutcome {
        let Some((_, pending)) = self.pending.remove(request_id) else {
            return ResolveOutcome::NotFound;
        };
        let decision = build_decision(&pending.request, decision);
        let outcome = PermissionOutcome::Decided(decision);
        let reason = outcome.reason();
        info!(
            component = "arbiter",
            event = "arbiter.resolved",
            request_id = %request_id,
            session_id = %pending.request.session_id,
            reason = ?reason,
            "Permission request resolved"
        );
        let _ = pending.reply.send(outcome);
        ResolveOutcome::Resolved(reason)
    }

    /// Deny every request older than the timeout, letting in-flight work
    /// continue. Returns the expired requests.
    pub fn timeout_sweep(&self, now: Instant) -> Vec<PermissionRequest> {
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|entry| now.saturating_duration_since(entry.registered_at) >= self.timeout)
            .map(|entry| entry.key().clone())
            .collect();

        let mut settled = Vec::with_capacity(expired.len());
        for request_id in expired {
            let Some((_, pending)) = self.pending.remove(&request_id) else {
                continue;
            };
            info!(
                component = "arbiter",
                event = "arbiter.timed_out",
                request_id = %request_id,
                session_id = %pending.request.session_id,
                tool_name = %pending.request.tool_name,
                "Permission request timed out"
            );
            let decision = PermissionDecision::Deny {
                message: format!(
                    "Permission request timed out after {}s without a response",
                    self.timeout.as_secs()
                ),
                interrupt: false,
            };
            let _ = pending.reply.send(PermissionOutcome::TimedOut(decision));
            settled.push(pending.request);
        }
        settled
    }

    /// The operation behind the request was cancelled before anyone decided.
    pub fn abort(&self, request_id: &str, reason: &str) -> bool {
        let Some((_, pending)) = self.pending.remove(request_id) else {
            return false;
        };
        debug!(
            component = "arbiter",
            event = "arbiter.aborted",
            request_id = %request_id,
            session_id = %pending.request.session_id,
            reason = %reason,
            "Permission request aborted"
        );
        let _ = pending.reply.send(PermissionOutcome::Aborted {
            reason: reason.to_string(),
        });
        true
    }

    /// Abort every pending request of one session.
    pub fn abort_session(&self, session_id: &str, reason: &str) -> Vec<String> {
        let ids: Vec<String> = self
            .pending
            .iter()
            .filter(|entry| entry.request.session_id == session_id)
            .map(|entry| entry.key().clone())
            .collect();
        ids.into_iter()
            .filter(|id| self.abort(id, reason))
            .collect()
    }

    /// Move a session's pending requests to the id it was rewritten to, so
    /// later session-wide aborts still find them.
    pub fn rekey_session(&self, from: &str, to: &str) -> usize {
        let mut moved = 0;
        for mut entry in self.pending.iter_mut() {
            if entry.request.session_id == from {
                entry.request.session_id = to.to_string();
                moved += 1;
            }
        }
        if moved > 0 {
            debug!(
                component = "arbiter",
                event = "arbiter.rekeyed",
                from = %from,
                to = %to,
                count = moved,
                "Pending permission requests moved to rewritten session"
            );
        }
        moved
    }

    /// Teardown: nothing may be left dangling.
    pub fn shutdown(&self) -> usize {
        let ids: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        ids.iter()
            .filter(|id| self.abort(id, "core shutting down"))
            .count()
    }
}

/// Turn a view decision into the backend decision. Suggestions are
/// advisory: `rules` replaces them, `remember` re-scopes them.
pub fn build_decision(request: &PermissionRequest, decision: UserDecision) -> PermissionDecision {
    match decision {
        UserDecision::Allow {
            updated_input,
            remember,
            rules,
        } => {
            let updated_rules = match (rules, remember) {
                (Some(rules), _) => rules,
                (None, Some(destination)) => request
                    .suggestions
                    .iter()
                    .cloned()
                    .map(|rule| PermissionRule {
                        destination,
                        ..rule
                    })
                    .collect(),
                (None, None) => Vec::new(),
            };
            PermissionDecision::Allow {
                updated_input,
                updated_rules,
            }
        }
        UserDecision::Deny { message, interrupt } => PermissionDecision::Deny {
            message: message.unwrap_or_else(|| DEFAULT_DENY_MESSAGE.to_string()),
            interrupt: interrupt.unwrap_or(true),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaydeck_protocol::{RuleBehavior, RuleDestination};

    const TIMEOUT: Duration = Duration::from_secs(300);

    fn request(id: &str, session_id: &str) -> PermissionRequest {
        PermissionRequest {
            request_id: id.to_string(),
            session_id: session_id.to_string(),
            tool_name: "Write".to_string(),
            input: serde_json::json!({ "file_path": "/tmp/out.txt" }),
            suggestions: vec![PermissionRule {
                tool_name: "Write".to_string(),
                pattern: Some("/tmp/**".to_string()),
                behavior: RuleBehavior::Allow,
                destination: RuleDestination::Session,
            }],
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    fn allow() -> UserDecision {
        UserDecision::Allow {
            updated_input: None,
            remember: None,
            rules: None,
        }
    }

    #[tokio::test]
    async fn unresolved_request_times_out_as_deny_without_interrupt() {
        let arbiter = PermissionArbiter::new(TIMEOUT);
        let start = Instant::now();
        let rx = arbiter.register(request("req1", "abc"), start).unwrap();

        assert!(arbiter.timeout_sweep(start + Duration::from_secs(299)).is_empty());
        assert!(arbiter.is_pending("req1"));

        let expired = arbiter.timeout_sweep(start + TIMEOUT + Duration::from_secs(1));
        assert_eq!(expired.len(), 1);
        assert!(!arbiter.is_pending("req1"));

        let outcome = rx.await.expect("outcome delivered");
        assert_eq!(outcome.reason(), ResolutionReason::TimedOut);
        match outcome.backend_decision() {
            Some(PermissionDecision::Deny { interrupt, message }) => {
                assert!(!interrupt);
                assert!(message.contains("timed out"));
            }
            other => panic!("expected deny, got {:?}", other),
        }

        // Exactly once.
        assert!(arbiter
            .timeout_sweep(start + TIMEOUT * 2)
            .is_empty());
        assert_eq!(arbiter.resolve("req1", allow()), ResolveOutcome::NotFound);
    }

    #[tokio::test]
    async fn explicit_deny_interrupts_by_default() {
        let arbiter = PermissionArbiter::new(TIMEOUT);
        let rx = arbiter.register(request("req1", "abc"), Instant::now()).unwrap();

        let result = arbiter.resolve(
            "req1",
            UserDecision::Deny {
                message: None,
                interrupt: None,
            },
        );
        assert_eq!(result, ResolveOutcome::Resolved(ResolutionReason::Denied));
        match rx.await.unwrap() {
            PermissionOutcome::Decided(PermissionDecision::Deny { interrupt, message }) => {
                assert!(interrupt);
                assert_eq!(message, DEFAULT_DENY_MESSAGE);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn resolving_unknown_or_settled_request_is_not_found() {
        let arbiter = PermissionArbiter::new(TIMEOUT);
        assert_eq!(arbiter.resolve("ghost", allow()), ResolveOutcome::NotFound);

        let _rx = arbiter.register(request("req1", "abc"), Instant::now());
        assert_eq!(
            arbiter.resolve("req1", allow()),
            ResolveOutcome::Resolved(ResolutionReason::Allowed)
        );
        assert_eq!(arbiter.resolve("req1", allow()), ResolveOutcome::NotFound);
    }

    #[test]
    fn remember_forces_destination_of_suggested_rules() {
        let req = request("req1", "abc");
        let decision = build_decision(
            &req,
            UserDecision::Allow {
                updated_input: None,
                remember: Some(RuleDestination::Local),
                rules: None,
            },
        );
        match decision {
            PermissionDecision::Allow { updated_rules, .. } => {
                assert_eq!(updated_rules.len(), 1);
                assert_eq!(updated_rules[0].destination, RuleDestination::Local);
                assert_eq!(updated_rules[0].pattern.as_deref(), Some("/tmp/**"));
            }
            other => panic!("unexpected decision: {:?}", other),
        }
    }

    #[test]
    fn explicit_rules_replace_suggestions() {
        let req = request("req1", "abc");
        let custom = PermissionRule {
            tool_name: "Write".to_string(),
            pattern: None,
            behavior: RuleBehavior::Allow,
            destination: RuleDestination::User,
        };
        let decision = build_decision(
            &req,
            UserDecision::Allow {
                updated_input: None,
                remember: Some(RuleDestination::Project),
                rules: Some(vec![custom.clone()]),
            },
        );
        assert_eq!(
            decision,
            PermissionDecision::Allow {
                updated_input: None,
                updated_rules: vec![custom],
            }
        );
    }

    #[test]
    fn plain_allow_persists_nothing() {
        let decision = build_decision(&request("req1", "abc"), allow());
        assert_eq!(
            decision,
            PermissionDecision::Allow {
                updated_input: None,
                updated_rules: vec![],
            }
        );
    }

    #[tokio::test]
    async fn abort_is_distinct_from_timeout_and_deny() {
        let arbiter = PermissionArbiter::new(TIMEOUT);
        let rx = arbiter.register(request("req1", "abc"), Instant::now()).unwrap();

        assert!(arbiter.abort("req1", "session aborted"));
        assert!(!arbiter.abort("req1", "again"));

        let outcome = rx.await.unwrap();
        assert_eq!(outcome.reason(), ResolutionReason::Aborted);
        assert!(outcome.backend_decision().is_none());
    }

    #[test]
    fn abort_session_leaves_other_sessions_alone() {
        let arbiter = PermissionArbiter::new(TIMEOUT);
        let now = Instant::now();
        let _a1 = arbiter.register(request("a1", "a"), now);
        let _a2 = arbiter.register(request("a2", "a"), now);
        let _b1 = arbiter.register(request("b1", "b"), now);

        let mut aborted = arbiter.abort_session("a", "user abort");
        aborted.sort();
        assert_eq!(aborted, vec!["a1".to_string(), "a2".to_string()]);
        assert!(arbiter.is_pending("b1"));
    }

    #[tokio::test]
    async fn rekeyed_requests_are_aborted_under_new_id() {
        let arbiter = PermissionArbiter::new(TIMEOUT);
        let now = Instant::now();
        let rx = arbiter.register(request("req1", "abc"), now).unwrap();
        let _other = arbiter.register(request("req2", "xyz"), now);

        assert_eq!(arbiter.rekey_session("abc", "def"), 1);
        assert!(arbiter.abort_session("abc", "session completed").is_empty());
        assert_eq!(
            arbiter.abort_session("def", "session completed"),
            vec!["req1".to_string()]
        );
        assert!(!arbiter.is_pending("req1"));
        assert!(arbiter.is_pending("req2"));
        assert_eq!(rx.await.unwrap().reason(), ResolutionReason::Aborted);
    }

    #[test]
    fn duplicate_registration_keeps_first() {
        let arbiter = PermissionArbiter::new(TIMEOUT);
        let now = Instant::now();
        assert!(arbiter.register(request("req1", "abc"), now).is_some());
        assert!(arbiter.register(request("req1", "abc"), now).is_none());
        assert_eq!(arbiter.len(), 1);
    }

    #[test]
    fn registration_lazily_sweeps_stale_requests() {
        let arbiter = PermissionArbiter::new(TIMEOUT);
        let start = Instant::now();
        let _old = arbiter.register(request("old", "abc"), start);
        let _new = arbiter.register(request("new", "abc"), start + TIMEOUT);

        assert!(!arbiter.is_pending("old"));
        assert!(arbiter.is_pending("new"));
    }

    #[tokio::test]
    async fn shutdown_aborts_everything() {
        let arbiter = PermissionArbiter::new(TIMEOUT);
        let rx = arbiter.register(request("req1", "abc"), Instant::now()).unwrap();
        let _other = arbiter.register(request("req2", "def"), Instant::now());

        assert_eq!(arbiter.shutdown(), 2);
        assert_eq!(arbiter.len(), 0);
        assert_eq!(rx.await.unwrap().reason(), ResolutionReason::Aborted);
    }
}
