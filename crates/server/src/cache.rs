//! Session cache
//!
//! Keeps at most `capacity` sessions' message lists resident, evicting the
//! least recently accessed first. The currently viewed session is exempt
//! and survives even when it is the oldest entry.

use std::collections::HashMap;

use relaydeck_protocol::{Message, Pagination};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CachedSession {
    pub messages: Vec<Message>,
    pub pagination: Pagination,
    /// Logical access tick; strictly increasing, so ties never happen.
    last_access: u64,
}

#[derive(Debug)]
pub struct SessionCache {
    entries: HashMap<String, CachedSession>,
    capacity: usize,
    clock: u64,
    current: Option<String>,
}

impl SessionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            clock: 0,
            current: None,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    #[cfg(test)]
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn get(&self, id: &str) -> Option<(&[Message], Pagination)> {
        self.entries
            .get(id)
            .map(|entry| (entry.messages.as_slice(), entry.pagination))
    }

    pub fn messages_mut(&mut self, id: &str) -> Option<&mut Vec<Message>> {
        self.entries.get_mut(id).map(|entry| &mut entry.messages)
    }

    /// Replace a session's content wholesale. Returns evicted ids.
    pub fn put(&mut self, id: &str, messages: Vec<Message>, pagination: Pagination) -> Vec<String> {
        let last_access = self.tick();
        self.entries.insert(
            id.to_string(),
            CachedSession {
                messages,
                pagination,
                last_access,
            },
        );
        self.evict()
    }

    /// Make sure an entry exists (empty if new). Returns evicted ids.
    pub fn ensure(&mut self, id: &str) -> Vec<String> {
        if self.touch(id) {
            return Vec::new();
        }
        self.put(id, Vec::new(), Pagination::default())
    }

    /// Insert an older page ahead of the loaded messages. Only the touched
    /// session's recency changes.
    pub fn prepend(&mut self, id: &str, older: Vec<Message>, pagination: Pagination) -> bool {
        let last_access = self.tick();
        let Some(entry) = self.entries.get_mut(id) else {
            return false;
        };
        let mut messages = older;
        messages.append(&mut entry.messages);
        entry.messages = messages;
        entry.pagination = pagination;
        entry.last_access = last_access;
        true
    }

    pub fn append(&mut self, id: &str, message: Message) -> bool {
        let last_access = self.tick();
        let Some(entry) = self.entries.get_mut(id) else {
            return false;
        };
        entry.messages.push(message);
        entry.last_access = last_access;
        true
    }

    /// Mark recency without touching content.
    pub fn touch(&mut self, id: &str) -> bool {
        let last_access = self.tick();
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.last_access = last_access;
                true
            }
            None => false,
        }
    }

    /// Switch the eviction-exempt session. Returns ids evicted now that the
    /// previous one lost its exemption.
    pub fn set_current(&mut self, id: Option<&str>) -> Vec<String> {
        self.current = id.map(str::to_string);
        if let Some(id) = id {
            self.touch(id);
        }
        self.evict()
    }

    /// Move an entry to a new key (placeholder → real id), keeping recency.
    pub fn rekey(&mut self, from: &str, to: &str) {
        if let Some(entry) = self.entries.remove(from) {
            match self.entries.get_mut(to) {
                // Both exist: keep the rewritten session's messages, which
                // carry everything streamed under the placeholder.
                Some(existing) => {
                    let mut merged = entry.messages;
                    for message in existing.messages.drain(..) {
                        if !merged.iter().any(|m| m.id == message.id) {
                            merged.push(message);
                        }
                    }
                    existing.messages = merged;
                    existing.last_access = existing.last_access.max(entry.last_access);
                }
                None => {
                    self.entries.insert(to.to_string(), entry);
                }
            }
        }
        if self.current.as_deref() == Some(from) {
            self.current = Some(to.to_string());
        }
    }

    fn evict(&mut self) -> Vec<String> {
        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            let victim = self
                .entries
                .iter()
                .filter(|(id, _)| self.current.as_deref() != Some(id.as_str()))
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(id, _)| id.clone());
            let Some(victim) = victim else { break };
            self.entries.remove(&victim);
            debug!(
                component = "session_cache",
                event = "session_cache.evicted",
                session_id = %victim,
                resident = self.entries.len(),
                "Evicted least recently used session"
            );
            evicted.push(victim);
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaydeck_protocol::MessageOrigin;

    fn msg(session_id: &str, id: &str) -> Message {
        Message {
            id: id.to_string(),
            session_id: session_id.to_string(),
            origin: MessageOrigin::Persisted,
            timestamp: None,
            permission: None,
            content: serde_json::json!({ "text": id }),
        }
    }

    fn page(total: usize) -> Pagination {
        Pagination {
            offset: total,
            has_more: false,
            total,
        }
    }

    #[test]
    fn get_after_put_returns_what_was_put() {
        let mut cache = SessionCache::new(2);
        let messages = vec![msg("a", "1"), msg("a", "2")];
        cache.put("a", messages.clone(), page(2));

        let (got, pagination) = cache.get("a").expect("resident");
        assert_eq!(got, messages.as_slice());
        assert_eq!(pagination, page(2));
    }

    #[test]
    fn evicts_least_recently_used_first() {
        let mut cache = SessionCache::new(2);
        cache.put("a", vec![], page(0));
        cache.put("b", vec![], page(0));
        cache.touch("a");

        let evicted = cache.put("c", vec![], page(0));
        assert_eq!(evicted, vec!["b".to_string()]);
        assert!(cache.contains("a"));
        assert!(cache.contains("c"));
    }

    #[test]
    fn current_view_is_never_evicted() {
        let mut cache = SessionCache::new(3);
        cache.put("viewed", vec![], page(0));
        cache.set_current(Some("viewed"));

        for i in 0..20 {
            cache.put(&format!("s{i}"), vec![], page(0));
            assert!(cache.contains("viewed"));
            assert!(cache.len() <= 3);
        }
    }

    #[test]
    fn newest_entry_goes_first_when_only_the_view_is_older() {
        let mut cache = SessionCache::new(1);
        cache.put("viewed", vec![], page(0));
        cache.set_current(Some("viewed"));
        let evicted = cache.put("other", vec![], page(0));

        assert_eq!(evicted, vec!["other".to_string()]);
        assert!(cache.contains("viewed"));
        assert_eq!(cache.len(), 1);

        // Once nothing is viewed the older entry is the victim again.
        cache.set_current(None);
        let evicted = cache.put("third", vec![], page(0));
        assert_eq!(evicted, vec!["viewed".to_string()]);
        assert!(cache.contains("third"));
    }

    #[test]
    fn prepend_keeps_older_first_and_only_touches_target() {
        let mut cache = SessionCache::new(2);
        cache.put("a", vec![msg("a", "3"), msg("a", "4")], page(2));
        cache.put("b", vec![], page(0));

        assert!(cache.prepend(
            "a",
            vec![msg("a", "1"), msg("a", "2")],
            Pagination {
                offset: 4,
                has_more: false,
                total: 4,
            },
        ));
        let ids: Vec<&str> = cache.get("a").unwrap().0.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4"]);

        // "a" was touched by prepend, so "b" is now the LRU victim.
        let evicted = cache.put("c", vec![], page(0));
        assert_eq!(evicted, vec!["b".to_string()]);
    }

    #[test]
    fn prepend_on_missing_session_is_refused() {
        let mut cache = SessionCache::new(2);
        assert!(!cache.prepend("ghost", vec![msg("ghost", "1")], page(1)));
        assert!(!cache.contains("ghost"));
    }

    #[test]
    fn rekey_moves_messages_and_current_marker() {
        let mut cache = SessionCache::new(2);
        cache.ensure("new-session-1");
        cache.set_current(Some("new-session-1"));
        cache.append("new-session-1", msg("new-session-1", "m1"));

        cache.rekey("new-session-1", "real");

        assert!(!cache.contains("new-session-1"));
        assert_eq!(cache.current(), Some("real"));
        assert_eq!(cache.get("real").unwrap().0.len(), 1);
    }
}
