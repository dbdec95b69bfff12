//! Transport adapter: the WebSocket pipe to the assistant backend.
//!
//! One task owns the connection. It reconnects after a fixed delay, and a
//! start guard keeps a second loop (and with it a second socket) from ever
//! being spawned. Outbound messages queue in a channel while disconnected.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use relaydeck_protocol::{ClientMessage, ServerMessage};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::core_command::CoreCommand;
use crate::error::TransportError;
use crate::router::Input;

const OUTBOUND_CAPACITY: usize = 256;

/// Cheap-to-clone sender for backend-bound messages.
#[derive(Clone)]
pub struct TransportHandle {
    outbound: mpsc::Sender<ClientMessage>,
}

impl TransportHandle {
    pub fn channel() -> (Self, mpsc::Receiver<ClientMessage>) {
        let (outbound, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        (Self { outbound }, rx)
    }

    pub async fn send(&self, message: ClientMessage) -> Result<(), TransportError> {
        self.outbound
            .send(message)
            .await
            .map_err(|_| TransportError::ChannelClosed)
    }

    /// Non-blocking send for the core actor, which must never wait on a
    /// disconnected backend.
    pub fn try_send(&self, message: ClientMessage) -> Result<(), TransportError> {
        self.outbound.try_send(message).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => TransportError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => TransportError::ChannelClosed,
        })
    }
}

pub struct BackendTransport {
    url: String,
    reconnect_delay: Duration,
    started: Arc<AtomicBool>,
}

impl BackendTransport {
    pub fn new(url: impl Into<String>, reconnect_delay: Duration) -> Self {
        Self {
            url: url.into(),
            reconnect_delay,
            started: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn the connection loop. Returns `None` if it is already running.
    pub fn start(
        &self,
        outbound_rx: mpsc::Receiver<ClientMessage>,
        core_tx: mpsc::Sender<CoreCommand>,
    ) -> Option<JoinHandle<()>> {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(
                component = "transport",
                event = "transport.start.duplicate",
                url = %self.url,
                "Transport loop already running, refusing second connection"
            );
            return None;
        }

        let url = self.url.clone();
        let delay = self.reconnect_delay;
        let started = self.started.clone();
        Some(tokio::spawn(async move {
            connection_loop(url, delay, outbound_rx, core_tx).await;
            started.store(false, Ordering::Release);
        }))
    }
}

async fn connection_loop(
    url: String,
    delay: Duration,
    mut outbound_rx: mpsc::Receiver<ClientMessage>,
    core_tx: mpsc::Sender<CoreCommand>,
) {
    loop {
        match connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                info!(
                    component = "transport",
                    event = "transport.connected",
                    url = %url,
                    "Connected to assistant backend"
                );
                set_status(&core_tx, true).await;

                let result = pump(stream, &mut outbound_rx, &core_tx).await;
                set_status(&core_tx, false).await;

                match result {
                    Ok(PumpExit::CoreGone) => break,
                    Ok(PumpExit::Closed) => warn!(
                        component = "transport",
                        event = "transport.disconnected",
                        url = %url,
                        "Backend closed the connection, reconnecting"
                    ),
                    Err(err) => warn!(
                        component = "transport",
                        event = "transport.disconnected",
                        url = %url,
                        error = %err,
                        "Backend connection failed, reconnecting"
                    ),
                }
            }
            Err(source) => {
                let err = TransportError::Connect {
                    url: url.clone(),
                    source,
                };
                warn!(
                    component = "transport",
                    event = "transport.connect_failed",
                    error = %err,
                    retry_in_ms = delay.as_millis() as u64,
                    "Backend connect failed"
                );
            }
        }

        if core_tx.is_closed() {
            break;
        }
        tokio::time::sleep(delay).await;
    }

    info!(
        component = "transport",
        event = "transport.stopped",
        "Transport loop stopped"
    );
}

enum PumpExit {
    /// Backend went away; reconnect
    Closed,
    /// Core dropped its channels; stop for good
    CoreGone,
}

async fn pump(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    outbound_rx: &mut mpsc::Receiver<ClientMessage>,
    core_tx: &mpsc::Sender<CoreCommand>,
) -> Result<PumpExit, TransportError> {
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => {
                let Some(message) = outbound else {
                    let _ = sink.close().await;
                    return Ok(PumpExit::CoreGone);
                };
                let json = serde_json::to_string(&message)?;
                sink.send(Message::Text(json.into())).await?;
            }
            inbound = source.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        let Some(message) = parse_inbound(text.as_str()) else {
                            continue;
                        };
                        let command = CoreCommand::process(Input::Inbound(message));
                        if core_tx.send(command).await.is_err() {
                            return Ok(PumpExit::CoreGone);
                        }
                    }
                    Some(Ok(Message::Ping(data))) => sink.send(Message::Pong(data)).await?,
                    Some(Ok(Message::Close(_))) | None => return Ok(PumpExit::Closed),
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Err(err.into()),
                }
            }
        }
    }
}

/// Parse one inbound frame. Unknown kinds and malformed frames are logged
/// and skipped, never fatal to the connection.
pub fn parse_inbound(text: &str) -> Option<ServerMessage> {
    match serde_json::from_str::<ServerMessage>(text) {
        Ok(message) => {
            debug!(
                component = "transport",
                event = "transport.inbound",
                kind = message.kind(),
                session_id = ?message.session_id(),
                "Inbound backend message"
            );
            Some(message)
        }
        Err(err) => {
            warn!(
                component = "transport",
                event = "transport.inbound.parse_failed",
                error = %err,
                payload_bytes = text.len(),
                "Failed to parse backend message"
            );
            None
        }
    }
}

async fn set_status(core_tx: &mpsc::Sender<CoreCommand>, connected: bool) {
    let _ = core_tx
        .send(CoreCommand::process(Input::TransportStatus { connected }))
        .await;
}
