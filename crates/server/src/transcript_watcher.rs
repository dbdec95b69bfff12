//! Watches the transcript root and tells the core when a session's
//! transcript file changed. Bursts of writes to one file are debounced into
//! a single notification.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core_command::CoreCommand;
use crate::router::Input;
use crate::transcript::session_id_from_path;

const DEBOUNCE_MS: u64 = 150;

pub async fn run_transcript_watcher(
    root: PathBuf,
    core_tx: mpsc::Sender<CoreCommand>,
) -> anyhow::Result<()> {
    if !root.exists() {
        info!(
            component = "transcript_watcher",
            event = "transcript_watcher.root_missing",
            path = %root.display(),
            "Transcript root missing, watcher disabled"
        );
        return Ok(());
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<WatcherMessage>();
    let watcher_tx = tx.clone();

    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                if !matches_supported_event_kind(&event.kind) {
                    return;
                }
                for path in event.paths {
                    let _ = watcher_tx.send(WatcherMessage::FsEvent(path));
                }
            }
            Err(err) => {
                warn!(
                    component = "transcript_watcher",
                    event = "transcript_watcher.fs_event_error",
                    error = %err,
                    "Transcript watcher event error"
                );
            }
        },
        notify::Config::default(),
    )?;
    watcher.watch(&root, RecursiveMode::Recursive)?;

    info!(
        component = "transcript_watcher",
        event = "transcript_watcher.started",
        path = %root.display(),
        "Transcript watcher started"
    );

    let mut runtime = WatcherRuntime::new(tx, Duration::from_millis(DEBOUNCE_MS));
    while let Some(message) = rx.recv().await {
        match message {
            WatcherMessage::FsEvent(path) => runtime.schedule(&path),
            WatcherMessage::Changed(session_id) => {
                runtime.debounce_tasks.remove(&session_id);
                let command = CoreCommand::process(Input::TranscriptChanged { session_id });
                if core_tx.send(command).await.is_err() {
                    break;
                }
            }
        }
    }

    drop(watcher);
    Ok(())
}

enum WatcherMessage {
    FsEvent(PathBuf),
    Changed(String),
}

struct WatcherRuntime {
    tx: mpsc::UnboundedSender<WatcherMessage>,
    debounce: Duration,
    debounce_tasks: HashMap<String, JoinHandle<()>>,
}

impl WatcherRuntime {
    fn new(tx: mpsc::UnboundedSender<WatcherMessage>, debounce: Duration) -> Self {
        Self {
            tx,
            debounce,
            debounce_tasks: HashMap::new(),
        }
    }

    /// Restart the debounce timer of the file's session.
    fn schedule(&mut self, path: &Path) {
        let Some(session_id) = session_id_from_path(path) else {
            return;
        };
        if let Some(handle) = self.debounce_tasks.remove(&session_id) {
            handle.abort();
        }

        debug!(
            component = "transcript_watcher",
            event = "transcript_watcher.scheduled",
            session_id = %session_id,
            "Transcript change scheduled"
        );
        let tx = self.tx.clone();
        let debounce = self.debounce;
        let id = session_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let _ = tx.send(WatcherMessage::Changed(id));
        });
        self.debounce_tasks.insert(session_id, handle);
    }
}

fn matches_supported_event_kind(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[tokio::test]
    async fn bursts_collapse_into_one_change() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut runtime = WatcherRuntime::new(tx, Duration::from_millis(20));

        let path = Path::new("/tmp/project/abc.jsonl");
        runtime.schedule(path);
        runtime.schedule(path);
        runtime.schedule(path);
        runtime.schedule(Path::new("/tmp/project/notes.txt"));

        let first = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("debounce should fire")
            .expect("channel open");
        assert!(matches!(first, WatcherMessage::Changed(ref id) if id == "abc"));

        let second = timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(second.is_err(), "only one change per burst");
    }

    #[test]
    fn access_events_are_ignored() {
        assert!(!matches_supported_event_kind(&EventKind::Access(
            notify::event::AccessKind::Any
        )));
        assert!(matches_supported_event_kind(&EventKind::Modify(
            notify::event::ModifyKind::Any
        )));
    }
}
