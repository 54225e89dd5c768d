//! Domain types for the asset catalog

pub mod asset;
pub mod history;
pub mod tag;

pub use asset::{Asset, AssetKind, AssetMetadata, Comment};
pub use history::{HistoryAction, HistoryEvent};
pub use tag::Tag;

/// Current wall-clock time as epoch milliseconds.
///
/// All persisted timestamps (assets, sync events, history) use this
/// resolution, which also bounds cross-process event ordering.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
