use std::sync::Arc;

use ttpipe::{BroadcastHub, MemoryJobQueue, SessionStore};

/// Shared handles passed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub hub: BroadcastHub,
    pub queue: Arc<MemoryJobQueue>,
    pub sessions: Arc<SessionStore>,
}
