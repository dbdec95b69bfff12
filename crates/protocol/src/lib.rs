//! relaydeck Protocol
//!
//! Shared types for communication between the relaydeck core, the assistant
//! backend it proxies, and the views that render its state.
//! These types are serialized as JSON over WebSocket.

use uuid::Uuid;

pub mod client;
pub mod server;
pub mod types;
pub mod view;

pub use client::ClientMessage;
pub use server::ServerMessage;
pub use types::*;
pub use view::{ViewCommand, ViewSnapshot, ViewUpdate};

/// Generate a new unique ID
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
