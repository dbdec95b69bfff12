//! View-facing WebSocket endpoint.
//!
//! A view gets a snapshot on connect, then every `ViewUpdate` the core
//! broadcasts. Commands it sends are forwarded to the core actor.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use relaydeck_protocol::{ViewCommand, ViewUpdate};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::core_command::CoreCommand;
use crate::state::AppState;

/// Messages that can be sent through the WebSocket
enum OutboundMessage {
    Json(ViewUpdate),
    Pong(Bytes),
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = state.next_connection_id();
    info!(
        component = "websocket",
        event = "ws.connection.opened",
        connection_id = conn_id,
        "View connection opened"
    );

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundMessage>(100);

    let send_task = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            let result = match msg {
                OutboundMessage::Json(update) => match serde_json::to_string(&update) {
                    Ok(json) => ws_tx.send(Message::Text(json.into())).await,
                    Err(e) => {
                        error!(
                            component = "websocket",
                            event = "ws.send.serialize_failed",
                            connection_id = conn_id,
                            error = %e,
                            "Failed to serialize view update"
                        );
                        continue;
                    }
                },
                OutboundMessage::Pong(data) => ws_tx.send(Message::Pong(data)).await,
            };

            if result.is_err() {
                debug!(
                    component = "websocket",
                    event = "ws.send.disconnected",
                    connection_id = conn_id,
                    "WebSocket send failed, view disconnected"
                );
                break;
            }
        }
    });

    // Subscribe before reading the snapshot so nothing falls in between.
    let updates = state.core().subscribe();
    send_snapshot(&outbound_tx, &state).await;
    spawn_broadcast_forwarder(updates, outbound_tx.clone(), conn_id);

    while let Some(result) = ws_rx.next().await {
        let text = match result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Ping(data)) => {
                let _ = outbound_tx.send(OutboundMessage::Pong(data)).await;
                continue;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!(
                    component = "websocket",
                    event = "ws.connection.error",
                    connection_id = conn_id,
                    error = %e,
                    "WebSocket error"
                );
                break;
            }
        };

        let command: ViewCommand = match serde_json::from_str(text.as_str()) {
            Ok(command) => command,
            Err(e) => {
                warn!(
                    component = "websocket",
                    event = "ws.message.parse_failed",
                    connection_id = conn_id,
                    error = %e,
                    payload_bytes = text.len(),
                    "Failed to parse view command"
                );
                send_json(
                    &outbound_tx,
                    ViewUpdate::Error {
                        code: "parse_error".into(),
                        message: e.to_string(),
                        session_id: None,
                    },
                )
                .await;
                continue;
            }
        };

        handle_view_command(command, &outbound_tx, &state, conn_id).await;
    }

    info!(
        component = "websocket",
        event = "ws.connection.closed",
        connection_id = conn_id,
        "View connection closed"
    );
    send_task.abort();
}

async fn handle_view_command(
    command: ViewCommand,
    client_tx: &mpsc::Sender<OutboundMessage>,
    state: &Arc<AppState>,
    conn_id: u64,
) {
    debug!(
        component = "websocket",
        event = "ws.command",
        connection_id = conn_id,
        command = ?command,
        "View command"
    );
    match CoreCommand::from_view(command) {
        Some(command) => state.core().send(command).await,
        None => send_snapshot(client_tx, state).await,
    }
}

async fn send_snapshot(tx: &mpsc::Sender<OutboundMessage>, state: &AppState) {
    let snapshot = state.core().snapshot();
    send_json(
        tx,
        ViewUpdate::Snapshot {
            snapshot: Box::new(snapshot.as_ref().clone()),
        },
    )
    .await;
}

async fn send_json(tx: &mpsc::Sender<OutboundMessage>, update: ViewUpdate) {
    let _ = tx.send(OutboundMessage::Json(update)).await;
}

/// Drain the core's broadcast into this connection. When the view lags
/// behind the buffer it is told so it can resubscribe for a fresh snapshot.
fn spawn_broadcast_forwarder(
    mut rx: broadcast::Receiver<ViewUpdate>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    conn_id: u64,
) {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(update) => {
                    if outbound_tx.send(OutboundMessage::Json(update)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(
                        component = "websocket",
                        event = "ws.broadcast.lagged",
                        connection_id = conn_id,
                        skipped = n,
                        "Broadcast subscriber lagged, skipped {n} updates"
                    );
                    let _ = outbound_tx
                        .send(OutboundMessage::Json(ViewUpdate::Error {
                            code: "lagged".to_string(),
                            message: format!("Subscriber lagged, skipped {n} updates"),
                            session_id: None,
                        }))
                        .await;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::arbiter::PermissionArbiter;
    use crate::attachments::AttachmentStore;
    use crate::config::CoreConfig;
    use crate::core_actor::{CoreDeps, CoreHandle};
    use crate::transcript::TranscriptStore;
    use crate::transport::TransportHandle;
    use tokio::time::timeout;

    fn app_state() -> (Arc<AppState>, tempfile::TempDir) {
        let data = tempfile::tempdir().unwrap();
        let config = CoreConfig::default();
        let (transport, _outbound) = TransportHandle::channel();
        let (command_tx, command_rx) = CoreHandle::channel();
        let (core, _task) = CoreHandle::spawn(
            &config,
            CoreDeps {
                arbiter: Arc::new(PermissionArbiter::new(config.permission_timeout)),
                transport,
                transcripts: TranscriptStore::new(None),
                attachments: AttachmentStore::new(data.path().to_path_buf()),
            },
            command_tx,
            command_rx,
        );
        (Arc::new(AppState::new(core)), data)
    }

    async fn recv_update(rx: &mut mpsc::Receiver<OutboundMessage>) -> ViewUpdate {
        match timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("outbound message")
            .expect("channel open")
        {
            OutboundMessage::Json(update) => update,
            OutboundMessage::Pong(_) => panic!("expected JSON update, got pong"),
        }
    }

    #[tokio::test]
    async fn subscribe_answers_with_snapshot() {
        let (state, _data) = app_state();
        let (client_tx, mut client_rx) = mpsc::channel::<OutboundMessage>(16);

        handle_view_command(ViewCommand::Subscribe, &client_tx, &state, 1).await;

        match recv_update(&mut client_rx).await {
            ViewUpdate::Snapshot { snapshot } => {
                assert!(snapshot.viewed.is_none());
                assert!(!snapshot.transport_connected);
            }
            other => panic!("expected snapshot, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn commands_reach_the_core_and_updates_come_back() {
        let (state, _data) = app_state();
        let (client_tx, mut client_rx) = mpsc::channel::<OutboundMessage>(16);
        spawn_broadcast_forwarder(state.core().subscribe(), client_tx.clone(), 1);

        handle_view_command(ViewCommand::NewConversation, &client_tx, &state, 1).await;

        match recv_update(&mut client_rx).await {
            ViewUpdate::Snapshot { snapshot } => {
                assert!(snapshot.viewed.is_some());
            }
            other => panic!("expected snapshot, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn lagging_forwarder_reports_lagged_error() {
        let (tx, rx) = broadcast::channel(1);
        for connected in [true, false, true] {
            tx.send(ViewUpdate::TransportStatus { connected }).unwrap();
        }
        let (client_tx, mut client_rx) = mpsc::channel::<OutboundMessage>(16);
        spawn_broadcast_forwarder(rx, client_tx, 7);

        match recv_update(&mut client_rx).await {
            ViewUpdate::Error { code, .. } => assert_eq!(code, "lagged"),
            other => panic!("expected lagged error, got {:?}", other),
        }
        assert_eq!(
            recv_update(&mut client_rx).await,
            ViewUpdate::TransportStatus { connected: true }
        );
    }
}
