//! relaydeck
//!
//! Session identity and message routing core sitting between an assistant
//! backend and any number of chat views.

mod arbiter;
mod attachments;
mod cache;
mod config;
mod core_actor;
mod core_command;
mod error;
mod identity;
mod list_refresh;
mod logging;
mod merge;
mod paths;
mod router;
mod state;
mod transcript;
mod transcript_watcher;
mod transport;
mod websocket;

use std::sync::Arc;

use axum::{response::IntoResponse, routing::get, Router};
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::arbiter::PermissionArbiter;
use crate::attachments::AttachmentStore;
use crate::config::{Args, CoreConfig};
use crate::core_actor::{spawn_timeout_sweeper, CoreDeps, CoreHandle};
use crate::logging::init_logging;
use crate::paths::DataPaths;
use crate::state::AppState;
use crate::transcript::TranscriptStore;
use crate::transcript_watcher::run_transcript_watcher;
use crate::transport::{BackendTransport, TransportHandle};
use crate::websocket::ws_handler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let paths = DataPaths::resolve(args.data_dir.as_deref())?;
    paths.ensure_dirs()?;
    let logging = init_logging(&paths.log_dir(), args.log_format, args.log_stderr)?;
    let config = CoreConfig::from_args(&args);

    info!(
        component = "server",
        event = "server.starting",
        run_id = %logging.run_id,
        bind = %args.bind,
        backend_url = %config.backend_url,
        data_dir = %paths.root().display(),
        transcript_root = ?config.transcript_root,
        "Starting relaydeck"
    );

    let arbiter = Arc::new(PermissionArbiter::new(config.permission_timeout));
    let (transport_handle, outbound_rx) = TransportHandle::channel();
    let (command_tx, command_rx) = CoreHandle::channel();

    let transport = BackendTransport::new(config.backend_url.clone(), config.reconnect_delay);
    let transport_task = transport.start(outbound_rx, command_tx.clone());

    if let Some(root) = config.transcript_root.clone() {
        let watcher_tx = command_tx.clone();
        tokio::spawn(async move {
            if let Err(err) = run_transcript_watcher(root, watcher_tx).await {
                warn!(
                    component = "transcript_watcher",
                    event = "transcript_watcher.failed",
                    error = %err,
                    "Transcript watcher stopped"
                );
            }
        });
    }

    let sweeper = spawn_timeout_sweeper(arbiter.clone(), config.sweep_interval);

    let deps = CoreDeps {
        arbiter,
        transport: transport_handle,
        transcripts: TranscriptStore::new(config.transcript_root.clone()),
        attachments: AttachmentStore::new(paths.attachments_dir()),
    };
    let (core, core_task) = CoreHandle::spawn(&config, deps, command_tx, command_rx);
    let state = Arc::new(AppState::new(core.clone()));

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    info!(
        component = "server",
        event = "server.listening",
        bind = %args.bind,
        "Listening for views"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let aborted = core.shutdown().await;
    sweeper.abort();
    if let Some(task) = transport_task {
        task.abort();
    }
    let _ = core_task.await;

    info!(
        component = "server",
        event = "server.stopped",
        aborted_permissions = aborted,
        "relaydeck stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(
            component = "server",
            event = "server.signal_failed",
            error = %err,
            "Failed to listen for ctrl-c"
        );
        std::future::pending::<()>().await;
    }
    info!(
        component = "server",
        event = "server.shutdown_requested",
        "Shutdown requested"
    );
}

async fn health_handler() -> impl IntoResponse {
    "OK"
}
