//! Staged attachments: data-URI uploads written to disk so the backend can
//! read them by path. Staged files belong to a conversation slot and are
//! removed as soon as its operation ends.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use relaydeck_protocol::Attachment;
use tracing::{debug, warn};

use crate::error::AttachmentError;
use crate::identity::SlotId;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct StagedAttachments {
    /// Paths (or pass-through references) in submission order
    pub references: Vec<String>,
    pub failed: usize,
}

#[derive(Debug)]
pub struct AttachmentStore {
    root: PathBuf,
    staged: HashMap<SlotId, PathBuf>,
}

impl AttachmentStore {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            staged: HashMap::new(),
        }
    }

    #[cfg(test)]
    pub fn staged_dir(&self, slot: SlotId) -> Option<&Path> {
        self.staged.get(&slot).map(PathBuf::as_path)
    }

    /// Decode data URIs under `<root>/<session_id>/`. Anything that is not a
    /// data URI is passed through as a path. Failures are skipped.
    pub fn stage(
        &mut self,
        slot: SlotId,
        session_id: &str,
        attachments: &[Attachment],
    ) -> StagedAttachments {
        let mut staged = StagedAttachments::default();
        if attachments.is_empty() {
            return staged;
        }

        let dir = self.root.join(sanitize(session_id));
        for (index, attachment) in attachments.iter().enumerate() {
            if !attachment.data.starts_with("data:") {
                staged.references.push(attachment.data.clone());
                continue;
            }
            match write_data_uri(&attachment.data, &dir, index) {
                Ok(path) => {
                    self.staged.entry(slot).or_insert_with(|| dir.clone());
                    staged.references.push(path.to_string_lossy().to_string());
                }
                Err(err) => {
                    warn!(
                        component = "attachments",
                        event = "attachments.stage_failed",
                        session_id = %session_id,
                        name = ?attachment.name,
                        error = %err,
                        "Failed to stage attachment, skipping"
                    );
                    staged.failed += 1;
                }
            }
        }
        staged
    }

    /// Remove a slot's staged files. Runs synchronously so callers can
    /// report completion afterwards.
    pub fn release(&mut self, slot: SlotId) -> bool {
        let Some(dir) = self.staged.remove(&slot) else {
            return false;
        };
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                debug!(
                    component = "attachments",
                    event = "attachments.released",
                    slot = slot,
                    path = %dir.display(),
                    "Released staged attachments"
                );
                true
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => true,
            Err(err) => {
                warn!(
                    component = "attachments",
                    event = "attachments.release_failed",
                    slot = slot,
                    path = %dir.display(),
                    error = %err,
                    "Failed to remove staged attachments"
                );
                false
            }
        }
    }
}

fn write_data_uri(data_uri: &str, dir: &Path, index: usize) -> Result<PathBuf, AttachmentError> {
    // data:<mime>;base64,<payload>
    let without_scheme = data_uri
        .strip_prefix("data:")
        .ok_or(AttachmentError::InvalidDataUri("missing data: prefix"))?;
    let (meta, payload) = without_scheme
        .split_once(',')
        .ok_or(AttachmentError::InvalidDataUri("missing comma"))?;
    let mime_type = meta
        .strip_suffix(";base64")
        .ok_or(AttachmentError::InvalidDataUri("not base64 encoded"))?;

    let bytes = STANDARD.decode(payload)?;

    fs::create_dir_all(dir).map_err(|source| AttachmentError::Io {
        operation: "creating attachment directory",
        path: dir.to_path_buf(),
        source,
    })?;
    let path = dir.join(format!("{index}.{}", mime_to_extension(mime_type)));
    fs::write(&path, bytes).map_err(|source| AttachmentError::Io {
        operation: "writing attachment",
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn mime_to_extension(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "application/pdf" => "pdf",
        "application/json" => "json",
        "text/plain" => "txt",
        "text/markdown" => "md",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(data: &str) -> Attachment {
        Attachment {
            name: None,
            data: data.to_string(),
        }
    }

    #[test]
    fn stages_data_uris_and_passes_paths_through() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = AttachmentStore::new(tmp.path().to_path_buf());

        let staged = store.stage(
            1,
            "new-session-1",
            &[
                attachment("data:text/plain;base64,aGVsbG8="),
                attachment("/home/me/notes.md"),
            ],
        );

        assert_eq!(staged.failed, 0);
        assert_eq!(staged.references.len(), 2);
        assert_eq!(staged.references[1], "/home/me/notes.md");
        assert_eq!(fs::read_to_string(&staged.references[0]).unwrap(), "hello");
        assert!(store.staged_dir(1).is_some());
    }

    #[test]
    fn malformed_data_uri_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = AttachmentStore::new(tmp.path().to_path_buf());

        let staged = store.stage(
            1,
            "abc",
            &[
                attachment("data:image/png,rawbytes"),
                attachment("data:image/png;base64,@@@"),
            ],
        );
        assert_eq!(staged.failed, 2);
        assert!(staged.references.is_empty());
        assert!(store.staged_dir(1).is_none());
    }

    #[test]
    fn release_removes_staged_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = AttachmentStore::new(tmp.path().to_path_buf());
        store.stage(7, "abc", &[attachment("data:image/png;base64,iVBORw0KGgo=")]);
        let dir = store.staged_dir(7).unwrap().to_path_buf();
        assert!(dir.exists());

        assert!(store.release(7));
        assert!(!dir.exists());
        assert!(!store.release(7));
    }
}
