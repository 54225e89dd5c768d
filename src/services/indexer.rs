//! Indexer - turns filesystem observations into catalog records
//!
//! Consumes `(full_path)` notifications from the initial scan and the live
//! root watcher, resolves them to `(relative_path, kind, size)`, upserts
//! through the asset store, and publishes the mutation to the sync engine.
//! Embedding and thumbnail generation are invoked here; both are fallible
//! collaborators whose failures only degrade the asset, never the pass.

use crate::domain::{asset, Asset, AssetKind, HistoryEvent};
use crate::infrastructure::events::{Event, EventBus};
use crate::library::Catalog;
use crate::services::media::{EmbeddingProvider, ThumbnailGenerator};
use crate::sync::{SyncEngine, SyncEventBody};
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Indexer {
    root: PathBuf,
    catalog: Arc<Catalog>,
    sync: Arc<SyncEngine>,
    events: Arc<EventBus>,
    embeddings: Arc<dyn EmbeddingProvider>,
    thumbnails: Arc<dyn ThumbnailGenerator>,
}

impl Indexer {
    pub fn new(
        root: PathBuf,
        catalog: Arc<Catalog>,
        sync: Arc<SyncEngine>,
        events: Arc<EventBus>,
        embeddings: Arc<dyn EmbeddingProvider>,
        thumbnails: Arc<dyn ThumbnailGenerator>,
    ) -> Self {
        Self {
            root,
            catalog,
            sync,
            events,
            embeddings,
            thumbnails,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Paths the indexer never looks at: hidden entries (including the
    /// `.lightbox` sync/state directory) and temp files.
    pub fn should_ignore(path: &Path) -> bool {
        path.components().any(|c| {
            let name = c.as_os_str().to_string_lossy();
            name.starts_with('.') && name.len() > 1 && name != ".."
        }) || path
            .extension()
            .is_some_and(|ext| ext == "tmp" || ext == "part")
    }

    /// Walk the whole root once, indexing every file found.
    /// Iterative with an explicit stack: media trees can be deep.
    pub async fn scan_root(&self) -> Result<usize> {
        let mut indexed = 0usize;
        let mut stack = vec![self.root.clone()];

        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Could not read {:?} during scan: {}", dir, e);
                    continue;
                }
            };

            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                if Self::should_ignore(&path) {
                    continue;
                }
                match entry.file_type().await {
                    Ok(ft) if ft.is_dir() => stack.push(path),
                    Ok(_) => match self.index_file(&path).await {
                        Ok(true) => indexed += 1,
                        Ok(false) => {}
                        Err(e) => warn!("Failed to index {:?}: {:#}", path, e),
                    },
                    Err(e) => warn!("Could not stat {:?}: {}", path, e),
                }
            }
        }

        info!("Scan of {:?} complete, {} assets indexed", self.root, indexed);
        self.events.emit(Event::RootScanned {
            root: self.root.clone(),
            indexed,
        });
        Ok(indexed)
    }

    /// Index one discovered or changed file. Returns whether the catalog
    /// was actually written (unchanged files are skipped).
    pub async fn index_file(&self, full_path: &Path) -> Result<bool> {
        let Some(relative) = self.relative_path(full_path) else {
            debug!("Ignoring path outside root: {:?}", full_path);
            return Ok(false);
        };

        // Symlinks are reported at their own path, never their target's.
        let meta = tokio::fs::symlink_metadata(full_path).await?;
        if meta.is_dir() {
            return Ok(false);
        }
        let size = meta.len();

        let root_str = self.root.to_string_lossy().to_string();
        let existing = self
            .catalog
            .assets
            .get_asset_by_path(&root_str, &relative)
            .await?;

        let is_new = existing.is_none();
        let mut asset = match existing {
            Some(existing) => {
                let known_size = existing
                    .metadata
                    .extra
                    .get("size")
                    .and_then(|v| v.as_u64());
                if known_size == Some(size) {
                    return Ok(false);
                }
                existing
            }
            None => Asset::new(
                root_str.clone(),
                relative.clone(),
                AssetKind::from_path(full_path),
            ),
        };
        asset
            .metadata
            .extra
            .insert("size".to_string(), serde_json::json!(size));
        asset.updated_at = crate::domain::now_millis();

        // A null embedding only suppresses semantic search for this asset.
        if let Some(vector) = self.embeddings.generate(&asset.searchable_text()).await {
            asset.metadata.embedding = Some(vector);
        }

        self.catalog.assets.upsert_asset(&asset).await?;

        if is_new {
            let record = HistoryEvent::new(&asset.id, crate::domain::HistoryAction::Created)
                .with_user(self.sync.session_id());
            if let Err(e) = self.catalog.history.record(&record).await {
                warn!("Failed to record history for {}: {}", asset.id, e);
            }
        }

        if asset.thumbnail_path.is_none() {
            if let Some(thumb) = self.thumbnails.generate(full_path, &asset.id).await {
                self.catalog.assets.update_thumbnail(&asset.id, &thumb).await?;
                asset.thumbnail_path = Some(thumb);
            }
        }

        self.sync
            .publish(SyncEventBody::AssetUpdate {
                asset_id: asset.id.clone(),
                changes: asset.as_change_set(),
            })
            .await;
        self.events.emit(Event::AssetUpserted {
            asset_id: asset.id.clone(),
        });

        Ok(true)
    }

    /// A removed file soft-deletes its asset: status becomes "missing",
    /// the record stays.
    pub async fn mark_missing(&self, full_path: &Path) -> Result<()> {
        let Some(relative) = self.relative_path(full_path) else {
            return Ok(());
        };

        let root_str = self.root.to_string_lossy().to_string();
        let Some(mut found) = self
            .catalog
            .assets
            .get_asset_by_path(&root_str, &relative)
            .await?
        else {
            return Ok(());
        };

        if found.status == asset::STATUS_MISSING {
            return Ok(());
        }

        let record = HistoryEvent::field_change(
            &found.id,
            "status",
            Some(found.status.clone()),
            Some(asset::STATUS_MISSING.to_string()),
        )
        .with_user(self.sync.session_id());

        found.status = asset::STATUS_MISSING.to_string();
        found.updated_at = crate::domain::now_millis();
        self.catalog.assets.upsert_asset(&found).await?;
        if let Err(e) = self.catalog.history.record(&record).await {
            warn!("Failed to record history for {}: {}", found.id, e);
        }

        let mut changes = serde_json::Map::new();
        changes.insert(
            "status".to_string(),
            serde_json::json!(asset::STATUS_MISSING),
        );
        self.sync
            .publish(SyncEventBody::AssetUpdate {
                asset_id: found.id.clone(),
                changes,
            })
            .await;
        self.events.emit(Event::AssetStatusChanged {
            asset_id: found.id,
            status: asset::STATUS_MISSING.to_string(),
        });

        Ok(())
    }

    fn relative_path(&self, full_path: &Path) -> Option<String> {
        full_path
            .strip_prefix(&self.root)
            .ok()
            .map(|rel| rel.to_string_lossy().replace('\\', "/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_ignore_hidden_and_temp() {
        assert!(Indexer::should_ignore(Path::new("a/.lightbox/sync/x.json")));
        assert!(Indexer::should_ignore(Path::new(".hidden.png")));
        assert!(Indexer::should_ignore(Path::new("render.tmp")));
        assert!(Indexer::should_ignore(Path::new("upload.part")));
        assert!(!Indexer::should_ignore(Path::new("shoots/day1/a.png")));
    }
}
