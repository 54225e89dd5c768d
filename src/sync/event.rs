//! Sync event wire model
//!
//! Events are immutable once written and identified uniquely by `id` for
//! deduplication. On disk each event file holds either one event object or
//! a JSON array of them (a compacted batch), each shaped
//! `{id, timestamp, userId, type, payload}`.

use crate::domain::Tag;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A single cross-process mutation record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEvent {
    /// Globally unique id, the deduplication key
    pub id: String,

    /// Creation time, epoch millis; the primary replay sort key
    pub timestamp: i64,

    /// Session-scoped writer identity
    pub user_id: String,

    #[serde(flatten)]
    pub body: SyncEventBody,
}

/// Type-specific payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum SyncEventBody {
    #[serde(rename = "ASSET_UPDATE", rename_all = "camelCase")]
    AssetUpdate {
        asset_id: String,
        /// Partial change set merged into the local record; field values
        /// overwrite whole (no finer merge policy exists)
        #[serde(default)]
        changes: serde_json::Map<String, Value>,
    },

    #[serde(rename = "TAG_CREATE")]
    TagCreate { tag: Tag },

    #[serde(rename = "TAG_DELETE", rename_all = "camelCase")]
    TagDelete { tag_id: String },

    #[serde(rename = "ASSET_TAG_ADD", rename_all = "camelCase")]
    AssetTagAdd { asset_id: String, tag_id: String },

    #[serde(rename = "ASSET_TAG_REMOVE", rename_all = "camelCase")]
    AssetTagRemove { asset_id: String, tag_id: String },
}

impl SyncEvent {
    pub fn new(user_id: impl Into<String>, body: SyncEventBody) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: crate::domain::now_millis(),
            user_id: user_id.into(),
            body,
        }
    }

    /// File name for an individual event: `<timestamp>_<id>.json`
    pub fn file_name(&self) -> String {
        format!("{}_{}.json", self.timestamp, self.id)
    }

    /// Deterministic replay ordering: `(timestamp, id)`. The id tie-break
    /// makes replay independent of file-enumeration order.
    pub fn sort_key(&self) -> (i64, &str) {
        (self.timestamp, self.id.as_str())
    }
}

/// File name for a compacted batch: `compacted_<maxTimestamp>_<id>.json`
pub fn compacted_file_name(max_timestamp: i64) -> String {
    format!("compacted_{}_{}.json", max_timestamp, Uuid::new_v4())
}

/// Whether a directory entry is a compacted batch file.
pub fn is_compacted_file_name(name: &str) -> bool {
    name.starts_with("compacted_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_wire_shape_is_stable() {
        let event = SyncEvent {
            id: "e1".to_string(),
            timestamp: 1700000000000,
            user_id: "session-1".to_string(),
            body: SyncEventBody::AssetUpdate {
                asset_id: "a1".to_string(),
                changes: serde_json::json!({"status": "approved"})
                    .as_object()
                    .unwrap()
                    .clone(),
            },
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "e1",
                "timestamp": 1700000000000i64,
                "userId": "session-1",
                "type": "ASSET_UPDATE",
                "payload": {"assetId": "a1", "changes": {"status": "approved"}}
            })
        );

        let back: SyncEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_tag_event_roundtrip() {
        let event = SyncEvent::new(
            "s1",
            SyncEventBody::AssetTagAdd {
                asset_id: "a1".to_string(),
                tag_id: "t1".to_string(),
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"ASSET_TAG_ADD\""));

        let back: SyncEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_sort_key_breaks_timestamp_ties_by_id() {
        let mut a = SyncEvent::new("s", SyncEventBody::TagDelete { tag_id: "t".into() });
        let mut b = a.clone();
        a.id = "aaa".to_string();
        b.id = "bbb".to_string();
        b.timestamp = a.timestamp;

        let mut events = vec![b.clone(), a.clone()];
        events.sort_by(|x, y| x.sort_key().cmp(&y.sort_key()));
        assert_eq!(events[0].id, "aaa");
    }
}
