//! Error types for the IO-facing components.
//!
//! Identity and routing problems are not errors: they are recovered where
//! they happen and show up as outcome enums instead.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    #[error("websocket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("outbound queue is full")]
    QueueFull,

    #[error("Channel closed")]
    ChannelClosed,
}

#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("no transcript root configured")]
    NoRoot,

    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("invalid data URI: {0}")]
    InvalidDataUri(&'static str),

    #[error("base64 decode error: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
