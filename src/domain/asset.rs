//! Asset - a cataloged media file under a root directory
//!
//! Assets are identified by an opaque stable id and addressed by their
//! `(root_path, path)` pair, which is unique within a catalog. The record
//! is owned exclusively by the asset store; everything else goes through it.

use crate::domain::tag::Tag;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use uuid::Uuid;

/// Default workflow status for newly indexed assets.
pub const STATUS_UNSORTED: &str = "unsorted";

/// Status applied when the file behind an asset disappears from disk.
/// Assets are never hard-deleted on file removal.
pub const STATUS_MISSING: &str = "missing";

/// A cataloged media asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    /// Opaque stable identifier
    pub id: String,

    /// Logical root this asset belongs to (absolute path, as a string)
    pub root_path: String,

    /// Path relative to the root, forward slashes
    pub path: String,

    /// Media kind, derived from the file extension
    pub kind: AssetKind,

    /// Workflow state, free-form (e.g. "unsorted", "approved")
    pub status: String,

    /// Creation time, epoch millis
    pub created_at: i64,

    /// Last update time, epoch millis
    pub updated_at: i64,

    /// Typed metadata with an open extension map
    #[serde(default)]
    pub metadata: AssetMetadata,

    /// Relative thumbnail file name, if one was generated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_path: Option<String>,

    /// Tags joined from the relationship store (not a column)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

/// Media kind of an asset
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AssetKind {
    Image,
    Video,
    #[default]
    Other,
}

impl AssetKind {
    /// Classify a file by its extension.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("jpg" | "jpeg" | "png" | "gif" | "webp" | "bmp" | "tiff" | "avif" | "heic") => {
                AssetKind::Image
            }
            Some("mp4" | "mov" | "mkv" | "webm" | "avi" | "m4v") => AssetKind::Video,
            _ => AssetKind::Other,
        }
    }
}

/// Open metadata bag with a small set of known fields
///
/// Known fields are typed; anything else round-trips through `extra` so
/// records written by newer versions survive untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssetMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Ids of assets this one was produced from
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<Comment>,

    /// Semantic search vector; absent when the embedding generator
    /// returned nothing for this asset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// Forward-compatible extension map
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl AssetMetadata {
    /// Text content of this bag as fed to the full-text index.
    /// The embedding vector is deliberately excluded.
    pub fn searchable_text(&self) -> String {
        let mut parts = Vec::new();
        if let Some(desc) = &self.description {
            parts.push(desc.clone());
        }
        for comment in &self.comments {
            parts.push(comment.text.clone());
        }
        for value in self.extra.values() {
            if let Value::String(s) = value {
                parts.push(s.clone());
            }
        }
        parts.join("\n")
    }
}

/// A free-form comment attached to an asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub created_at: i64,
}

impl Asset {
    /// Create a new asset record for a freshly discovered file
    pub fn new(root_path: impl Into<String>, path: impl Into<String>, kind: AssetKind) -> Self {
        let now = crate::domain::now_millis();
        Self {
            id: Uuid::new_v4().to_string(),
            root_path: root_path.into(),
            path: path.into(),
            kind,
            status: STATUS_UNSORTED.to_string(),
            created_at: now,
            updated_at: now,
            metadata: AssetMetadata::default(),
            thumbnail_path: None,
            tags: Vec::new(),
        }
    }

    /// Absolute path of the file behind this asset
    pub fn absolute_path(&self) -> std::path::PathBuf {
        Path::new(&self.root_path).join(&self.path)
    }

    /// Text fed to the embedding generator: path plus metadata content.
    pub fn searchable_text(&self) -> String {
        let metadata_text = self.metadata.searchable_text();
        if metadata_text.is_empty() {
            self.path.clone()
        } else {
            format!("{}\n{}", self.path, metadata_text)
        }
    }

    /// Full-record change set for an `ASSET_UPDATE` event.
    ///
    /// Carries every column, so a peer that has never seen this asset can
    /// construct it from the event alone. Inverse of [`Self::apply_changes`].
    pub fn as_change_set(&self) -> serde_json::Map<String, Value> {
        let mut changes = serde_json::Map::new();
        changes.insert("rootPath".to_string(), Value::String(self.root_path.clone()));
        changes.insert("path".to_string(), Value::String(self.path.clone()));
        changes.insert("kind".to_string(), serde_json::json!(self.kind));
        changes.insert("status".to_string(), Value::String(self.status.clone()));
        changes.insert("metadata".to_string(), serde_json::json!(self.metadata));
        if let Some(thumb) = &self.thumbnail_path {
            changes.insert("thumbnailPath".to_string(), Value::String(thumb.clone()));
        }
        changes
    }

    /// Apply a partial change set from an `ASSET_UPDATE` event.
    ///
    /// Known keys map onto columns; `metadata` overwrites the whole bag
    /// (whole-record overwrite is the conflict policy, nothing finer);
    /// unknown keys land in the metadata extension map.
    pub fn apply_changes(&mut self, changes: &serde_json::Map<String, Value>) {
        for (key, value) in changes {
            match key.as_str() {
                "status" => {
                    if let Value::String(s) = value {
                        self.status = s.clone();
                    }
                }
                "path" => {
                    if let Value::String(s) = value {
                        self.path = s.clone();
                    }
                }
                "rootPath" => {
                    if let Value::String(s) = value {
                        self.root_path = s.clone();
                    }
                }
                "kind" | "type" => {
                    if let Ok(kind) = serde_json::from_value(value.clone()) {
                        self.kind = kind;
                    }
                }
                "thumbnailPath" => {
                    self.thumbnail_path = value.as_str().map(ToOwned::to_owned);
                }
                "metadata" => {
                    if let Ok(metadata) = serde_json::from_value(value.clone()) {
                        self.metadata = metadata;
                    }
                }
                _ => {
                    self.metadata.extra.insert(key.clone(), value.clone());
                }
            }
        }
        self.updated_at = crate::domain::now_millis();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(AssetKind::from_path(Path::new("a/b.PNG")), AssetKind::Image);
        assert_eq!(AssetKind::from_path(Path::new("clip.mp4")), AssetKind::Video);
        assert_eq!(AssetKind::from_path(Path::new("notes.txt")), AssetKind::Other);
        assert_eq!(AssetKind::from_path(Path::new("no_extension")), AssetKind::Other);
    }

    #[test]
    fn test_apply_changes_known_and_unknown_keys() {
        let mut asset = Asset::new("/root", "img/a.png", AssetKind::Image);
        let changes = serde_json::json!({
            "status": "approved",
            "rating": 5,
        });

        asset.apply_changes(changes.as_object().unwrap());

        assert_eq!(asset.status, "approved");
        assert_eq!(
            asset.metadata.extra.get("rating"),
            Some(&serde_json::json!(5))
        );
    }

    #[test]
    fn test_metadata_extra_roundtrip() {
        let json = serde_json::json!({
            "description": "sunset",
            "inputs": ["a1"],
            "customField": "kept"
        });
        let metadata: AssetMetadata = serde_json::from_value(json.clone()).unwrap();

        assert_eq!(metadata.description.as_deref(), Some("sunset"));
        assert_eq!(metadata.inputs, vec!["a1".to_string()]);
        assert_eq!(
            metadata.extra.get("customField"),
            Some(&serde_json::json!("kept"))
        );

        let back = serde_json::to_value(&metadata).unwrap();
        assert_eq!(back, json);
    }

    #[test]
    fn test_change_set_reconstructs_asset() {
        let mut original = Asset::new("/root", "img/a.png", AssetKind::Image);
        original.status = "approved".to_string();
        original.metadata.description = Some("sunset".to_string());
        original.thumbnail_path = Some("thumb_a.webp".to_string());

        let mut rebuilt = Asset::new("/elsewhere", "placeholder", AssetKind::Other);
        rebuilt.apply_changes(&original.as_change_set());

        assert_eq!(rebuilt.root_path, original.root_path);
        assert_eq!(rebuilt.path, original.path);
        assert_eq!(rebuilt.kind, original.kind);
        assert_eq!(rebuilt.status, original.status);
        assert_eq!(rebuilt.metadata, original.metadata);
        assert_eq!(rebuilt.thumbnail_path, original.thumbnail_path);
    }

    #[test]
    fn test_searchable_text_includes_comments() {
        let mut asset = Asset::new("/root", "img/a.png", AssetKind::Image);
        asset.metadata.comments.push(Comment {
            text: "needs crop".to_string(),
            author: None,
            created_at: 0,
        });

        let text = asset.searchable_text();
        assert!(text.contains("img/a.png"));
        assert!(text.contains("needs crop"));
    }
}
