//! Lightbox Core
//!
//! An event-sourced media asset catalog. One SQLite database holds the
//! canonical asset/tag/history stores; cooperating processes converge by
//! replaying a shared append-only event log kept under the media root.

pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod library;
pub mod services;
pub mod sync;

use crate::config::AppConfig;
use crate::domain::{Asset, AssetMetadata, HistoryAction, HistoryEvent, Tag};
use crate::infrastructure::database::Database;
use crate::infrastructure::events::{Event, EventBus};
use crate::library::{Catalog, IndexParity};
use crate::services::indexer::Indexer;
use crate::services::media::{EmbeddingProvider, NoEmbeddings, NoThumbnails, ThumbnailGenerator};
use crate::services::Services;
use crate::sync::{SyncEngine, SyncEvent, SyncEventBody, SyncSubscriber};
use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Everything bound to the currently configured media root. Replaced
/// wholesale when the root is repointed.
struct RootSession {
    root: PathBuf,
    sync: Arc<SyncEngine>,
    indexer: Arc<Indexer>,
    services: Services,
}

impl RootSession {
    fn root_str(&self) -> String {
        self.root.to_string_lossy().to_string()
    }
}

/// Applies remote sync events to the local catalog.
///
/// Runs inside the sync engine's dispatch path, so it only ever sees events
/// that passed deduplication and the own-writer filter. It never publishes:
/// applying a remote event must not echo it back into the log.
struct ApplySubscriber {
    catalog: Arc<Catalog>,
    events: Arc<EventBus>,
}

#[async_trait::async_trait]
impl SyncSubscriber for ApplySubscriber {
    async fn apply(&self, event: &SyncEvent) -> Result<()> {
        match &event.body {
            SyncEventBody::AssetUpdate { asset_id, changes } => {
                match self.catalog.assets.get_asset(asset_id).await? {
                    Some(mut asset) => {
                        asset.apply_changes(changes);
                        self.catalog.assets.upsert_asset(&asset).await?;
                        self.catalog
                            .history
                            .record(
                                &HistoryEvent::new(asset_id, HistoryAction::Updated)
                                    .with_user(&event.user_id),
                            )
                            .await?;
                    }
                    None => {
                        // Full-record change sets let us construct assets we
                        // have never seen; partial updates for unknown ids
                        // are dropped (their creating event will arrive).
                        let root = changes.get("rootPath").and_then(|v| v.as_str());
                        let path = changes.get("path").and_then(|v| v.as_str());
                        let (Some(root), Some(path)) = (root, path) else {
                            warn!(
                                "Dropping partial update for unknown asset {}",
                                asset_id
                            );
                            return Ok(());
                        };
                        let mut asset =
                            Asset::new(root, path, crate::domain::AssetKind::Other);
                        asset.id = asset_id.clone();
                        asset.apply_changes(changes);
                        self.catalog.assets.upsert_asset(&asset).await?;
                        self.catalog
                            .history
                            .record(
                                &HistoryEvent::new(asset_id, HistoryAction::Created)
                                    .with_user(&event.user_id),
                            )
                            .await?;
                    }
                }
            }
            SyncEventBody::TagCreate { tag } => {
                self.catalog.tags.create_tag(tag).await?;
                self.events.emit(Event::TagsChanged);
            }
            SyncEventBody::TagDelete { tag_id } => {
                self.catalog.tags.delete_tag(tag_id).await?;
                self.events.emit(Event::TagsChanged);
            }
            SyncEventBody::AssetTagAdd { asset_id, tag_id } => {
                self.catalog.tags.add_tag_to_asset(asset_id, tag_id).await?;
                self.catalog
                    .history
                    .record(
                        &HistoryEvent {
                            field: Some("tag".to_string()),
                            new_value: Some(tag_id.clone()),
                            ..HistoryEvent::new(asset_id, HistoryAction::TagAdded)
                        }
                        .with_user(&event.user_id),
                    )
                    .await?;
            }
            SyncEventBody::AssetTagRemove { asset_id, tag_id } => {
                self.catalog
                    .tags
                    .remove_tag_from_asset(asset_id, tag_id)
                    .await?;
                self.catalog
                    .history
                    .record(
                        &HistoryEvent {
                            field: Some("tag".to_string()),
                            old_value: Some(tag_id.clone()),
                            ..HistoryEvent::new(asset_id, HistoryAction::TagRemoved)
                        }
                        .with_user(&event.user_id),
                    )
                    .await?;
            }
        }

        self.events.emit(Event::SyncApplied {
            event_id: event.id.clone(),
        });
        Ok(())
    }
}

/// The main context for all catalog operations
pub struct Core {
    /// Application configuration
    config: Arc<RwLock<AppConfig>>,

    /// Event bus for state changes
    pub events: Arc<EventBus>,

    /// Canonical stores (assets, tags, history) over one database
    pub catalog: Arc<Catalog>,

    /// Everything bound to the current media root
    session: RwLock<Option<RootSession>>,

    /// Session-scoped writer identity, stamped on published sync events
    user_id: String,

    embeddings: Arc<dyn EmbeddingProvider>,
    thumbnails: Arc<dyn ThumbnailGenerator>,
}

impl Core {
    /// Initialize a new Core instance with default data directory
    pub async fn new() -> Result<Self> {
        let data_dir = crate::config::default_data_dir()?;
        Self::new_with_config(data_dir).await
    }

    /// Initialize a new Core instance with custom data directory
    pub async fn new_with_config(data_dir: PathBuf) -> Result<Self> {
        Self::new_with_media(data_dir, Arc::new(NoEmbeddings), Arc::new(NoThumbnails)).await
    }

    /// Initialize with custom embedding/thumbnail collaborators
    pub async fn new_with_media(
        data_dir: PathBuf,
        embeddings: Arc<dyn EmbeddingProvider>,
        thumbnails: Arc<dyn ThumbnailGenerator>,
    ) -> Result<Self> {
        info!("Initializing Lightbox Core at {:?}", data_dir);

        // 1. Load or create app config
        let config = AppConfig::load_or_create(&data_dir)?;
        config.ensure_directories()?;

        // 2. Create event bus
        let events = Arc::new(EventBus::default());

        // 3. Open the catalog database
        let db = Arc::new(Database::open(&config.database_path()).await?);
        let catalog = Arc::new(Catalog::new(db));

        let saved_root = config.root_path.clone();
        let core = Self {
            config: Arc::new(RwLock::new(config)),
            events,
            catalog,
            session: RwLock::new(None),
            user_id: uuid::Uuid::new_v4().to_string(),
            embeddings,
            thumbnails,
        };

        // 4. Re-open the previously configured root, if any
        if let Some(root) = saved_root {
            if root.is_dir() {
                let session = core.open_session(root).await;
                *core.session.write().await = Some(session);
            } else {
                warn!("Configured root {:?} is not accessible", root);
            }
        }

        // 5. Emit startup event
        core.events.emit(Event::CoreStarted);

        Ok(core)
    }

    /// Get the application configuration
    pub fn config(&self) -> Arc<RwLock<AppConfig>> {
        self.config.clone()
    }

    /// Writer identity stamped on events published by this process
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The currently configured media root, if any
    pub async fn root(&self) -> Option<PathBuf> {
        self.session.read().await.as_ref().map(|s| s.root.clone())
    }

    /// Point the catalog at a media root.
    ///
    /// If a different root was configured before, existing assets are
    /// remapped onto the new root in one transaction (assets whose relative
    /// path does not exist under the new root are shadow-deleted; their
    /// history survives). The sync engine and watcher are restarted against
    /// the new root's log directory.
    pub async fn set_root(&self, new_root: PathBuf) -> Result<()> {
        let new_root = new_root
            .canonicalize()
            .map_err(|e| anyhow!("cannot access root {:?}: {}", new_root, e))?;

        let old_root = {
            let mut session = self.session.write().await;
            match session.take() {
                Some(old) => {
                    old.services.stop_all().await?;
                    old.sync.stop().await;
                    Some(old.root)
                }
                None => None,
            }
        };

        let mut moved = 0;
        if old_root.as_deref().is_some_and(|old| old != new_root) {
            info!("Rehoming catalog from {:?} to {:?}", old_root, new_root);
            moved = self.catalog.assets.rehome_assets(&new_root).await?;
        }

        {
            let mut config = self.config.write().await;
            config.root_path = Some(new_root.clone());
            config.save()?;
        }

        let session = self.open_session(new_root.clone()).await;
        *self.session.write().await = Some(session);

        if let Some(old_root) = old_root {
            self.events.emit(Event::RootRehomed {
                old_root,
                new_root,
                moved,
            });
        }
        Ok(())
    }

    async fn open_session(&self, root: PathBuf) -> RootSession {
        let sync = Arc::new(SyncEngine::with_session(&root, self.user_id.clone()));
        sync.subscribe(Arc::new(ApplySubscriber {
            catalog: self.catalog.clone(),
            events: self.events.clone(),
        }))
        .await;
        sync.initialize().await;

        let indexer = Arc::new(Indexer::new(
            root.clone(),
            self.catalog.clone(),
            sync.clone(),
            self.events.clone(),
            self.embeddings.clone(),
            self.thumbnails.clone(),
        ));

        let services = Services::new(indexer.clone());
        match services.start_all().await {
            Ok(()) => info!("Background services started"),
            Err(e) => error!("Failed to start services: {}", e),
        }

        RootSession {
            root,
            sync,
            indexer,
            services,
        }
    }

    /// Scan the configured root, indexing new and changed files
    pub async fn scan(&self) -> Result<usize> {
        let session = self.session.read().await;
        let session = session.as_ref().ok_or_else(no_root)?;
        session.indexer.scan_root().await
    }

    /// All assets under the configured root, newest first, tags joined
    pub async fn assets(&self) -> Result<Vec<Asset>> {
        let session = self.session.read().await;
        let session = session.as_ref().ok_or_else(no_root)?;
        Ok(self.catalog.assets.get_assets(&session.root_str()).await?)
    }

    /// Look up one asset by id
    pub async fn asset(&self, asset_id: &str) -> Result<Option<Asset>> {
        Ok(self.catalog.assets.get_asset(asset_id).await?)
    }

    /// Full-text search over path and metadata, best match first
    pub async fn search(&self, query: &str) -> Result<Vec<Asset>> {
        let session = self.session.read().await;
        let session = session.as_ref().ok_or_else(no_root)?;
        Ok(self
            .catalog
            .assets
            .search_assets(&session.root_str(), query)
            .await?)
    }

    /// Set an asset's workflow status
    pub async fn update_asset_status(&self, asset_id: &str, status: &str) -> Result<()> {
        let mut asset = self
            .catalog
            .assets
            .get_asset(asset_id)
            .await?
            .ok_or_else(|| anyhow!("asset {} not found", asset_id))?;

        if asset.status == status {
            return Ok(());
        }

        let record = HistoryEvent::field_change(
            asset_id,
            "status",
            Some(asset.status.clone()),
            Some(status.to_string()),
        )
        .with_user(&self.user_id);

        asset.status = status.to_string();
        asset.updated_at = crate::domain::now_millis();
        self.catalog.assets.upsert_asset(&asset).await?;
        self.catalog.history.record(&record).await?;

        let mut changes = serde_json::Map::new();
        changes.insert("status".to_string(), serde_json::json!(status));
        self.publish(SyncEventBody::AssetUpdate {
            asset_id: asset_id.to_string(),
            changes,
        })
        .await;
        self.events.emit(Event::AssetStatusChanged {
            asset_id: asset_id.to_string(),
            status: status.to_string(),
        });
        Ok(())
    }

    /// Replace an asset's metadata bag
    pub async fn update_asset_metadata(
        &self,
        asset_id: &str,
        metadata: AssetMetadata,
    ) -> Result<()> {
        let mut asset = self
            .catalog
            .assets
            .get_asset(asset_id)
            .await?
            .ok_or_else(|| anyhow!("asset {} not found", asset_id))?;

        asset.metadata = metadata;
        asset.updated_at = crate::domain::now_millis();
        self.catalog.assets.upsert_asset(&asset).await?;
        self.catalog
            .history
            .record(
                &HistoryEvent {
                    field: Some("metadata".to_string()),
                    ..HistoryEvent::new(asset_id, HistoryAction::Updated)
                }
                .with_user(&self.user_id),
            )
            .await?;

        let mut changes = serde_json::Map::new();
        changes.insert(
            "metadata".to_string(),
            serde_json::json!(asset.metadata),
        );
        self.publish(SyncEventBody::AssetUpdate {
            asset_id: asset_id.to_string(),
            changes,
        })
        .await;
        self.events.emit(Event::AssetUpserted {
            asset_id: asset_id.to_string(),
        });
        Ok(())
    }

    /// Create a tag (or converge on the existing one with this name)
    pub async fn create_tag(&self, name: &str, color: Option<String>) -> Result<Tag> {
        let tag = self.catalog.tags.create_tag(&Tag::new(name, color)).await?;
        self.publish(SyncEventBody::TagCreate { tag: tag.clone() }).await;
        self.events.emit(Event::TagsChanged);
        Ok(tag)
    }

    /// Delete a tag; asset associations cascade
    pub async fn delete_tag(&self, tag_id: &str) -> Result<bool> {
        let deleted = self.catalog.tags.delete_tag(tag_id).await?;
        if deleted {
            self.publish(SyncEventBody::TagDelete {
                tag_id: tag_id.to_string(),
            })
            .await;
            self.events.emit(Event::TagsChanged);
        }
        Ok(deleted)
    }

    /// All tags, by name
    pub async fn tags(&self) -> Result<Vec<Tag>> {
        Ok(self.catalog.tags.get_tags().await?)
    }

    /// Attach a tag to an asset (idempotent)
    pub async fn tag_asset(&self, asset_id: &str, tag_id: &str) -> Result<()> {
        self.catalog.tags.add_tag_to_asset(asset_id, tag_id).await?;
        self.catalog
            .history
            .record(
                &HistoryEvent {
                    field: Some("tag".to_string()),
                    new_value: Some(tag_id.to_string()),
                    ..HistoryEvent::new(asset_id, HistoryAction::TagAdded)
                }
                .with_user(&self.user_id),
            )
            .await?;
        self.publish(SyncEventBody::AssetTagAdd {
            asset_id: asset_id.to_string(),
            tag_id: tag_id.to_string(),
        })
        .await;
        Ok(())
    }

    /// Detach a tag from an asset
    pub async fn untag_asset(&self, asset_id: &str, tag_id: &str) -> Result<()> {
        self.catalog
            .tags
            .remove_tag_from_asset(asset_id, tag_id)
            .await?;
        self.catalog
            .history
            .record(
                &HistoryEvent {
                    field: Some("tag".to_string()),
                    old_value: Some(tag_id.to_string()),
                    ..HistoryEvent::new(asset_id, HistoryAction::TagRemoved)
                }
                .with_user(&self.user_id),
            )
            .await?;
        self.publish(SyncEventBody::AssetTagRemove {
            asset_id: asset_id.to_string(),
            tag_id: tag_id.to_string(),
        })
        .await;
        Ok(())
    }

    /// Full bidirectional derivation closure of an asset
    pub async fn lineage(&self, asset_id: &str) -> Result<Vec<Asset>> {
        Ok(self.catalog.lineage(asset_id).await?)
    }

    /// Audit trail for one asset, newest first
    pub async fn asset_history(&self, asset_id: &str, limit: i64) -> Result<Vec<HistoryEvent>> {
        Ok(self.catalog.history.for_asset(asset_id, limit).await?)
    }

    /// Most recent audit rows across the whole catalog
    pub async fn recent_history(&self, limit: i64) -> Result<Vec<HistoryEvent>> {
        Ok(self.catalog.history.recent(limit).await?)
    }

    /// Display color for a folder (a UI preference, not synced)
    pub async fn folder_color(&self, folder: &str) -> Option<String> {
        self.config
            .read()
            .await
            .preferences
            .folder_colors
            .get(folder)
            .cloned()
    }

    /// Set or clear the display color for a folder
    pub async fn set_folder_color(&self, folder: &str, color: Option<String>) -> Result<()> {
        let mut config = self.config.write().await;
        match color {
            Some(color) => {
                config
                    .preferences
                    .folder_colors
                    .insert(folder.to_string(), color);
            }
            None => {
                config.preferences.folder_colors.remove(folder);
            }
        }
        config.save()?;
        Ok(())
    }

    /// Re-read the whole shared event log and fold it into the local store,
    /// then compact. Idempotent: already-applied events are skipped.
    pub async fn resync(&self) -> Result<()> {
        let session = self.session.read().await;
        let session = session.as_ref().ok_or_else(no_root)?;
        session.sync.replay_events().await;
        session.sync.compact_events().await;
        Ok(())
    }

    /// Consistency check between the asset table and its full-text shadow
    pub async fn index_parity(&self) -> Result<IndexParity> {
        let session = self.session.read().await;
        let session = session.as_ref().ok_or_else(no_root)?;
        Ok(self
            .catalog
            .assets
            .index_parity(&session.root_str())
            .await?)
    }

    /// Resolve an asset id to its absolute path under the current root
    pub async fn resolve_path(&self, asset_id: &str) -> Result<PathBuf> {
        let asset = self
            .catalog
            .assets
            .get_asset(asset_id)
            .await?
            .ok_or_else(|| anyhow!("asset {} not found", asset_id))?;
        Ok(asset.absolute_path())
    }

    /// Shutdown the core gracefully
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down Lightbox Core...");

        if let Some(session) = self.session.write().await.take() {
            session.services.stop_all().await?;
            session.sync.stop().await;
        }

        self.config.write().await.save()?;
        self.catalog.close().await;

        self.events.emit(Event::CoreShutdown);

        info!("Lightbox Core shutdown complete");
        Ok(())
    }

    /// Best-effort publish to the shared event log; a missing session only
    /// means the mutation stays local.
    async fn publish(&self, body: SyncEventBody) {
        let session = self.session.read().await;
        if let Some(session) = session.as_ref() {
            session.sync.publish(body).await;
        }
    }
}

fn no_root() -> anyhow::Error {
    anyhow!("no media root configured; call set_root first")
}
