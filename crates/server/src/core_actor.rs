//! Core actor: owns the routing state and processes commands sequentially.
//!
//! Every write to identity, cache and list state goes through this single
//! task, so routing decisions are atomic with respect to identity changes.
//! Callers talk to it through `CoreHandle`; lock-free reads go through an
//! `ArcSwap` snapshot and updates fan out over a broadcast channel.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use chrono::Utc;
use relaydeck_protocol::{ClientMessage, ViewSnapshot, ViewUpdate};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::arbiter::{PermissionArbiter, PermissionOutcome, ResolveOutcome};
use crate::attachments::AttachmentStore;
use crate::config::CoreConfig;
use crate::core_command::CoreCommand;
use crate::error::TranscriptError;
use crate::router::{self, CoreState, Effect, Input};
use crate::transcript::TranscriptStore;
use crate::transport::TransportHandle;

const COMMAND_CAPACITY: usize = 1024;
const UPDATE_CAPACITY: usize = 512;

/// Collaborators the actor drives.
pub struct CoreDeps {
    pub arbiter: Arc<PermissionArbiter>,
    pub transport: TransportHandle,
    pub transcripts: TranscriptStore,
    pub attachments: AttachmentStore,
}

/// Handle to the running core actor (cheap to Clone).
#[derive(Clone)]
pub struct CoreHandle {
    command_tx: mpsc::Sender<CoreCommand>,
    snapshot: Arc<ArcSwap<ViewSnapshot>>,
    updates: broadcast::Sender<ViewUpdate>,
}

impl CoreHandle {
    /// Command channel, created before the actor so producers can be wired
    /// up first.
    pub fn channel() -> (mpsc::Sender<CoreCommand>, mpsc::Receiver<CoreCommand>) {
        mpsc::channel(COMMAND_CAPACITY)
    }

    pub fn spawn(
        config: &CoreConfig,
        deps: CoreDeps,
        command_tx: mpsc::Sender<CoreCommand>,
        command_rx: mpsc::Receiver<CoreCommand>,
    ) -> (CoreHandle, JoinHandle<()>) {
        let state = CoreState::new(config);
        let snapshot = Arc::new(ArcSwap::from_pointee(state.snapshot()));
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);

        let actor = CoreActor {
            state,
            deps,
            command_tx: command_tx.clone(),
            updates: updates.clone(),
            snapshot: snapshot.clone(),
        };
        let task = tokio::spawn(actor.run(command_rx));

        (
            CoreHandle {
                command_tx,
                snapshot,
                updates,
            },
            task,
        )
    }

    /// Send a command to the actor (fire-and-forget).
    pub async fn send(&self, command: CoreCommand) {
        if self.command_tx.send(command).await.is_err() {
            warn!(
                component = "core_actor",
                event = "core_actor.send.closed",
                "Core actor channel closed, command dropped"
            );
        }
    }

    /// Lock-free snapshot read.
    pub fn snapshot(&self) -> Arc<ViewSnapshot> {
        self.snapshot.load_full()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ViewUpdate> {
        self.updates.subscribe()
    }

    /// Abort all pending permission requests and stop the actor.
    pub async fn shutdown(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        self.send(CoreCommand::Shutdown { reply }).await;
        rx.await.unwrap_or_default()
    }
}

struct CoreActor {
    state: CoreState,
    deps: CoreDeps,
    /// Fed back into by spawned IO tasks
    command_tx: mpsc::Sender<CoreCommand>,
    updates: broadcast::Sender<ViewUpdate>,
    snapshot: Arc<ArcSwap<ViewSnapshot>>,
}

impl CoreActor {
    async fn run(mut self, mut command_rx: mpsc::Receiver<CoreCommand>) {
        while let Some(command) = command_rx.recv().await {
            match command {
                CoreCommand::Process { input } => {
                    let effects = router::apply(&mut self.state, input, Utc::now());
                    for effect in effects {
                        self.execute(effect);
                    }
                    self.snapshot.store(Arc::new(self.state.snapshot()));
                }
                CoreCommand::DecidePermission {
                    request_id,
                    decision,
                } => {
                    if self.deps.arbiter.resolve(&request_id, decision) == ResolveOutcome::NotFound {
                        self.emit(ViewUpdate::Error {
                            code: "permission_not_found".to_string(),
                            message: format!("No pending permission request {request_id}"),
                            session_id: None,
                        });
                    }
                }
                CoreCommand::Shutdown { reply } => {
                    let aborted = self.deps.arbiter.shutdown();
                    info!(
                        component = "core_actor",
                        event = "core_actor.shutdown",
                        aborted_permissions = aborted,
                        "Core actor shutting down"
                    );
                    let _ = reply.send(aborted);
                    break;
                }
            }
        }
    }

    fn emit(&self, update: ViewUpdate) {
        // No subscribers is fine.
        let _ = self.updates.send(update);
    }

    fn send_to_backend(&self, message: ClientMessage) {
        if let Err(err) = self.deps.transport.try_send(message) {
            warn!(
                component = "core_actor",
                event = "core_actor.transport.send_failed",
                error = %err,
                "Failed to queue message for backend"
            );
            self.emit(ViewUpdate::Error {
                code: "transport_error".to_string(),
                message: err.to_string(),
                session_id: None,
            });
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::Send(message) => self.send_to_backend(*message),

            Effect::Emit(update) => self.emit(*update),

            Effect::StartSession {
                slot,
                session_id,
                correlation_id,
                resume_id,
                prompt,
                attachments,
            } => {
                let staged = self
                    .deps
                    .attachments
                    .stage(slot, &session_id, &attachments);
                if staged.failed > 0 {
                    self.emit(ViewUpdate::Error {
                        code: "attachment_failed".to_string(),
                        message: format!("{} attachment(s) could not be staged", staged.failed),
                        session_id: Some(session_id.clone()),
                    });
                }
                info!(
                    component = "core_actor",
                    event = "core_actor.session.start",
                    session_id = %session_id,
                    correlation_id = %correlation_id,
                    resume = resume_id.is_some(),
                    attachments = staged.references.len(),
                    "Starting session"
                );
                self.send_to_backend(ClientMessage::StartSession {
                    correlation_id,
                    prompt,
                    attachments: staged.references,
                    resume_id,
                });
            }

            Effect::LoadTranscript {
                session_id,
                kind,
                offset,
                limit,
                generation,
            } => {
                let store = self.deps.transcripts.clone();
                let tx = self.command_tx.clone();
                tokio::spawn(async move {
                    let id = session_id.clone();
                    let result =
                        tokio::task::spawn_blocking(move || store.read_page(&id, offset, limit)).await;
                    let page = match result {
                        Ok(Ok(page)) => page,
                        Ok(Err(TranscriptError::NoRoot)) => return,
                        Ok(Err(err)) => {
                            warn!(
                                component = "core_actor",
                                event = "core_actor.transcript.read_failed",
                                session_id = %session_id,
                                error = %err,
                                "Failed to read transcript"
                            );
                            return;
                        }
                        Err(err) => {
                            warn!(
                                component = "core_actor",
                                event = "core_actor.transcript.task_failed",
                                session_id = %session_id,
                                error = %err,
                                "Transcript read task failed"
                            );
                            return;
                        }
                    };
                    let _ = tx
                        .send(CoreCommand::process(Input::TranscriptLoaded {
                            session_id,
                            kind,
                            page,
                            generation,
                        }))
                        .await;
                });
            }

            Effect::RegisterPermission(request) => {
                let request_id = request.request_id.clone();
                let Some(rx) = self.deps.arbiter.register(*request, Instant::now()) else {
                    return;
                };
                debug!(
                    component = "core_actor",
                    event = "core_actor.permission.registered",
                    request_id = %request_id,
                    pending = self.deps.arbiter.len(),
                    "Permission request registered"
                );
                spawn_permission_waiter(
                    rx,
                    request_id,
                    self.deps.transport.clone(),
                    self.command_tx.clone(),
                );
            }

            Effect::RekeyPermissions { from, to } => {
                self.deps.arbiter.rekey_session(&from, &to);
            }

            Effect::AbortPermission { request_id, reason } => {
                self.deps.arbiter.abort(&request_id, &reason);
            }

            Effect::AbortSessionPermissions { session_id, reason } => {
                let aborted = self.deps.arbiter.abort_session(&session_id, &reason);
                if !aborted.is_empty() {
                    debug!(
                        component = "core_actor",
                        event = "core_actor.permissions.aborted",
                        session_id = %session_id,
                        count = aborted.len(),
                        "Aborted pending permission requests"
                    );
                }
            }

            Effect::ReleaseAttachments { slot } => {
                self.deps.attachments.release(slot);
            }

            Effect::ScheduleListFlush { after } => {
                let tx = self.command_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    let _ = tx
                        .send(CoreCommand::process(Input::FlushSessionList))
                        .await;
                });
            }
        }
    }
}

/// Await one permission decision off the actor. The decision goes to the
/// backend and the settlement back to the actor.
fn spawn_permission_waiter(
    rx: oneshot::Receiver<PermissionOutcome>,
    request_id: String,
    transport: TransportHandle,
    core_tx: mpsc::Sender<CoreCommand>,
) {
    tokio::spawn(async move {
        let outcome = rx.await.unwrap_or_else(|_| PermissionOutcome::Aborted {
            reason: "permission arbiter dropped".to_string(),
        });

        if let Some(decision) = outcome.backend_decision() {
            let response = ClientMessage::PermissionResponse {
                request_id: request_id.clone(),
                decision: decision.clone(),
            };
            if let Err(err) = transport.send(response).await {
                warn!(
                    component = "core_actor",
                    event = "core_actor.permission.response_failed",
                    request_id = %request_id,
                    error = %err,
                    "Failed to send permission response"
                );
            }
        }

        let _ = core_tx
            .send(CoreCommand::process(Input::PermissionSettled {
                request_id,
                reason: outcome.reason(),
                message: outcome.message(),
            }))
            .await;
    });
}

/// Periodic timeout sweep. Lazy sweeps also run on every registration.
pub fn spawn_timeout_sweeper(arbiter: Arc<PermissionArbiter>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let expired = arbiter.timeout_sweep(Instant::now());
            if !expired.is_empty() {
                debug!(
                    component = "core_actor",
                    event = "core_actor.sweep",
                    expired = expired.len(),
                    "Permission timeout sweep"
                );
            }
        }
    })
}
