//! Transcript/live merge
//!
//! `displayed = transcript ++ unresolved live permission requests`. Entries
//! are keyed by `Message::id`, so a live request that later shows up in the
//! transcript is not shown twice and re-running the merge is a no-op.

use std::collections::HashSet;

use relaydeck_protocol::{Message, MessageOrigin};

pub fn merge_transcript(snapshot: Vec<Message>, current: &[Message]) -> Vec<Message> {
    let mut seen: HashSet<String> = HashSet::with_capacity(snapshot.len());
    let mut merged: Vec<Message> = Vec::with_capacity(snapshot.len() + 1);

    for message in snapshot {
        if seen.insert(message.id.clone()) {
            merged.push(message);
        }
    }

    for message in current {
        if message.origin != MessageOrigin::Live || !message.is_unresolved_permission() {
            continue;
        }
        if seen.insert(message.id.clone()) {
            merged.push(message.clone());
        }
    }

    merged
}
