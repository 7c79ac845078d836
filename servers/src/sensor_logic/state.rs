use std::sync::Arc;

use lib_common::{BroadcastHub, RecordStore, ReplayCursor};

/// Handles shared by the HTTP handlers and the replay scheduler.
///
/// Built once in `main` and cloned wherever needed; every field is an `Arc`,
/// so a clone is three pointer bumps. The store, cursor, and hub each exist
/// exactly once per process, and everything that touches them receives them
/// through this struct rather than through globals.
#[derive(Clone)]
pub struct AppState {
    // The loaded record batch
    pub store: Arc<RecordStore>,
    // Current replay position over the store
    pub cursor: Arc<ReplayCursor>,
    // Fan-out registry for live stream subscribers
    pub hub: Arc<BroadcastHub>,
}

impl AppState {
    pub fn new() -> Self {
        let store = Arc::new(RecordStore::new());
        let cursor = Arc::new(ReplayCursor::new(store.clone()));
        let hub = Arc::new(BroadcastHub::new(cursor.clone()));
        Self { store, cursor, hub }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_same_store() {
        let state = AppState::new();
        let clone = state.clone();
        assert!(Arc::ptr_eq(&state.store, &clone.store));
        assert!(Arc::ptr_eq(&state.hub, &clone.hub));
    }
}
