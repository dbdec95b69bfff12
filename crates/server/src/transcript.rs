//! Read-only access to the assistant's transcript store.
//!
//! One append-only JSONL file per session, written by the assistant process.
//! Lines that do not parse as JSON objects are skipped; record fields are
//! passed through untouched.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use relaydeck_protocol::{Message, MessageOrigin, Pagination};
use serde_json::Value;
use tracing::debug;

use crate::error::TranscriptError;

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptPage {
    pub messages: Vec<Message>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone)]
pub struct TranscriptStore {
    root: Option<PathBuf>,
}

impl TranscriptStore {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    /// Find the transcript file of a session: directly under the root or one
    /// project directory below it.
    pub fn locate(&self, session_id: &str) -> Result<Option<PathBuf>, TranscriptError> {
        let root = self.root.as_deref().ok_or(TranscriptError::NoRoot)?;
        if !is_safe_session_id(session_id) {
            return Ok(None);
        }
        let file_name = format!("{session_id}.jsonl");

        let direct = root.join(&file_name);
        if direct.is_file() {
            return Ok(Some(direct));
        }

        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(TranscriptError::Io {
                    operation: "listing transcript root",
                    path: root.to_path_buf(),
                    source,
                })
            }
        };
        for entry in entries.flatten() {
            let candidate = entry.path().join(&file_name);
            if candidate.is_file() {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// Read one page counted from the newest end. `offset` is the number of
    /// records the caller already holds. A missing file is an empty page.
    pub fn read_page(
        &self,
        session_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<TranscriptPage, TranscriptError> {
        let Some(path) = self.locate(session_id)? else {
            debug!(
                component = "transcript",
                event = "transcript.missing",
                session_id = %session_id,
                "No transcript file yet"
            );
            return Ok(TranscriptPage {
                messages: Vec::new(),
                pagination: Pagination::default(),
            });
        };

        let content = fs::read_to_string(&path).map_err(|source| TranscriptError::Io {
            operation: "reading transcript",
            path: path.clone(),
            source,
        })?;
        let mut records = parse_records(&content, session_id);

        let total = records.len();
        let (start, end) = page_bounds(total, offset, limit);
        let messages: Vec<Message> = records.drain(start..end).collect();

        Ok(TranscriptPage {
            pagination: Pagination {
                offset: offset.min(total) + messages.len(),
                has_more: start > 0,
                total,
            },
            messages,
        })
    }
}

/// `start = max(0, total - offset - limit)`, `end = total - offset`.
pub fn page_bounds(total: usize, offset: usize, limit: usize) -> (usize, usize) {
    let end = total.saturating_sub(offset);
    let start = end.saturating_sub(limit);
    (start, end)
}

/// Session id of a transcript file path.
pub fn session_id_from_path(path: &Path) -> Option<String> {
    if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
        return None;
    }
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
}

fn is_safe_session_id(session_id: &str) -> bool {
    !session_id.is_empty()
        && !session_id.contains(['/', '\\'])
        && session_id != "."
        && session_id != ".."
}

fn parse_records(content: &str, session_id: &str) -> Vec<Message> {
    let mut skipped = 0usize;
    let messages: Vec<Message> = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(line_no, line)| {
            match serde_json::from_str::<Value>(line) {
                Ok(record @ Value::Object(_)) => Some(record_to_message(record, session_id, line_no)),
                _ => {
                    skipped += 1;
                    None
                }
            }
        })
        .collect();

    if skipped > 0 {
        debug!(
            component = "transcript",
            event = "transcript.lines_skipped",
            session_id = %session_id,
            skipped,
            "Skipped unparseable transcript lines"
        );
    }
    messages
}

fn record_to_message(record: Value, session_id: &str, line_no: usize) -> Message {
    let id = ["uuid", "id"]
        .iter()
        .find_map(|key| record.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| format!("{session_id}:{line_no}"));
    let timestamp = record
        .get("timestamp")
        .and_then(Value::as_str)
        .map(str::to_string);

    Message {
        id,
        session_id: session_id.to_string(),
        origin: MessageOrigin::Persisted,
        timestamp,
        permission: None,
        content: record,
    }
}
