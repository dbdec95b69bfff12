//! Session list refresh
//!
//! Bulk refreshes are coalesced: the newest payload replaces any older one
//! still waiting, and only one flush is scheduled at a time. Protected
//! sessions keep their current entry and position when a refresh lands.

use std::collections::HashSet;
use std::time::Duration;

use relaydeck_protocol::{SessionListPayload, SessionSummary};
use tracing::debug;

#[derive(Debug)]
pub struct ListRefresher {
    debounce: Duration,
    waiting: Option<SessionListPayload>,
    flush_scheduled: bool,
    /// Last payload applied, re-applied when a protected session finishes
    last_raw: Option<SessionListPayload>,
    displayed: Vec<SessionSummary>,
}

impl ListRefresher {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            waiting: None,
            flush_scheduled: false,
            last_raw: None,
            displayed: Vec::new(),
        }
    }

    pub fn displayed(&self) -> &[SessionSummary] {
        &self.displayed
    }

    /// Accept a refresh. Returns the delay to schedule a flush after, or
    /// `None` when a flush is already on its way.
    pub fn offer(&mut self, payload: SessionListPayload) -> Option<Duration> {
        let coalesced = self.waiting.replace(payload).is_some();
        if self.flush_scheduled {
            debug!(
                component = "list_refresh",
                event = "list_refresh.coalesced",
                replaced_waiting = coalesced,
                "Folded list refresh into pending flush"
            );
            return None;
        }
        self.flush_scheduled = true;
        Some(self.debounce)
    }

    /// Apply the waiting payload, if any.
    pub fn flush(&mut self, protected: &HashSet<String>) -> Option<Vec<SessionSummary>> {
        self.flush_scheduled = false;
        let payload = self.waiting.take()?;
        self.displayed = apply_protection(payload.sessions.clone(), &self.displayed, protected);
        self.last_raw = Some(payload);
        Some(self.displayed.clone())
    }

    /// Re-apply the last payload after protection changed. Skipped while a
    /// flush is pending since that flush will see the new protection set.
    pub fn reapply(&mut self, protected: &HashSet<String>) -> Option<Vec<SessionSummary>> {
        if self.flush_scheduled {
            return None;
        }
        let sessions = self.last_raw.as_ref()?.sessions.clone();
        self.displayed = apply_protection(sessions, &self.displayed, protected);
        Some(self.displayed.clone())
    }
}

/// Filter a refreshed list so protected sessions that are currently shown
/// keep their entry and index.
pub fn apply_protection(
    incoming: Vec<SessionSummary>,
    displayed: &[SessionSummary],
    protected: &HashSet<String>,
) -> Vec<SessionSummary> {
    if protected.is_empty() {
        return incoming;
    }

    let pinned: Vec<(usize, &SessionSummary)> = displayed
        .iter()
        .enumerate()
        .filter(|(_, entry)| protected.contains(&entry.id))
        .collect();
    if pinned.is_empty() {
        return incoming;
    }

    let pinned_ids: HashSet<&str> = pinned.iter().map(|(_, e)| e.id.as_str()).collect();
    let mut result: Vec<SessionSummary> = incoming
        .into_iter()
        .filter(|entry| !pinned_ids.contains(entry.id.as_str()))
        .collect();

    // Ascending order keeps earlier insertions from shifting later ones.
    for (position, entry) in pinned {
        let at = position.min(result.len());
        result.insert(at, entry.clone());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value};

    fn summary(id: &str, title: &str) -> SessionSummary {
        let mut extra = Map::new();
        extra.insert("title".into(), Value::String(title.into()));
        SessionSummary {
            id: id.to_string(),
            extra,
        }
    }

    fn payload(entries: Vec<SessionSummary>) -> SessionListPayload {
        SessionListPayload {
            sessions: entries,
            extra: Map::new(),
        }
    }

    fn ids(list: &[SessionSummary]) -> Vec<&str> {
        list.iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn refreshes_coalesce_into_one_flush() {
        let mut refresher = ListRefresher::new(Duration::from_millis(300));
        assert_eq!(
            refresher.offer(payload(vec![summary("a", "old")])),
            Some(Duration::from_millis(300))
        );
        assert_eq!(refresher.offer(payload(vec![summary("b", "new")])), None);

        let applied = refresher.flush(&HashSet::new()).expect("flushed");
        assert_eq!(ids(&applied), vec!["b"]);
        assert!(refresher.flush(&HashSet::new()).is_none());

        // After a flush the next refresh schedules again.
        assert!(refresher.offer(payload(vec![])).is_some());
    }

    #[test]
    fn protected_session_keeps_position_and_entry() {
        let displayed = vec![summary("a", "a"), summary("busy", "working"), summary("c", "c")];
        let incoming = vec![
            summary("busy", "reordered"),
            summary("c", "c2"),
            summary("a", "a2"),
        ];
        let protected: HashSet<String> = ["busy".to_string()].into();

        let result = apply_protection(incoming, &displayed, &protected);
        assert_eq!(ids(&result), vec!["c", "busy", "a"]);
        assert_eq!(result[1].extra["title"], "working");
    }

    #[test]
    fn protected_session_survives_removal_from_refresh() {
        let displayed = vec![summary("busy", "working"), summary("b", "b")];
        let protected: HashSet<String> = ["busy".to_string()].into();

        let result = apply_protection(vec![summary("b", "b")], &displayed, &protected);
        assert_eq!(ids(&result), vec!["busy", "b"]);
    }

    #[test]
    fn reapply_after_protection_clears_uses_latest_raw_payload() {
        let mut refresher = ListRefresher::new(Duration::ZERO);
        refresher.offer(payload(vec![summary("busy", "v1")]));
        refresher.flush(&HashSet::new());

        let protected: HashSet<String> = ["busy".to_string()].into();
        refresher.offer(payload(vec![summary("x", "x"), summary("busy", "v2")]));
        let shown = refresher.flush(&protected).unwrap();
        assert_eq!(ids(&shown), vec!["busy", "x"]);
        assert_eq!(shown[0].extra["title"], "v1");

        let released = refresher.reapply(&HashSet::new()).unwrap();
        assert_eq!(ids(&released), vec!["x", "busy"]);
        assert_eq!(released[1].extra["title"], "v2");
    }
}
