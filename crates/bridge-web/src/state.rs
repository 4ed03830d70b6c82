//! Application state shared across handlers.

use sync_engine::SyncEngine;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: SyncEngine,
}

impl AppState {
    pub fn new(engine: SyncEngine) -> Self {
        Self { engine }
    }
}
