//! Event bus for decoupled communication
//!
//! Purely in-process notifications for UI layers and tests. Cross-process
//! propagation goes through the sync engine, not through this bus.

use std::path::PathBuf;
use tokio::sync::broadcast;

/// Catalog-related events
#[derive(Debug, Clone)]
pub enum Event {
    /// Core has started
    CoreStarted,

    /// Core is shutting down
    CoreShutdown,

    /// An asset was created or updated locally
    AssetUpserted { asset_id: String },

    /// An asset's workflow status changed
    AssetStatusChanged {
        asset_id: String,
        status: String,
    },

    /// A scan pass over a root finished
    RootScanned { root: PathBuf, indexed: usize },

    /// The catalog root was repointed and assets were remapped
    RootRehomed {
        old_root: PathBuf,
        new_root: PathBuf,
        moved: usize,
    },

    /// A tag was created or deleted
    TagsChanged,

    /// A remote sync event was applied to the local store
    SyncApplied { event_id: String },
}

/// Event bus for broadcasting events
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new event bus with specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event
    pub fn emit(&self, event: Event) {
        // Ignore send errors (no receivers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
