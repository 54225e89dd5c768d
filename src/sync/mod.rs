//! Cross-process synchronization over a shared event-log directory
//!
//! Cooperating processes share one append-only directory of JSON event
//! files under the catalog root (typically synced between machines by an
//! external file-sync service). There is no coordinator and no locking:
//! safety comes from idempotent event ids, append-only writes, and
//! tolerating lost races during compaction.

pub mod engine;
pub mod event;

pub use engine::{SyncEngine, SyncSubscriber};
pub use event::{SyncEvent, SyncEventBody};
