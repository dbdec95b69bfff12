//! Application state shared by the HTTP/WebSocket handlers

use std::sync::atomic::{AtomicU64, Ordering};

use crate::core_actor::CoreHandle;

pub struct AppState {
    core: CoreHandle,
    next_connection_id: AtomicU64,
}

impl AppState {
    pub fn new(core: CoreHandle) -> Self {
        Self {
            core,
            next_connection_id: AtomicU64::new(1),
        }
    }

    pub fn core(&self) -> &CoreHandle {
        &self.core
    }

    /// Id used to correlate log lines of one view connection
    pub fn next_connection_id(&self) -> u64 {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }
}
