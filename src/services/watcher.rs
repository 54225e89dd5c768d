//! Live filesystem watcher for the catalog root
//!
//! Wraps a recursive notify watcher and feeds debounced create/modify
//! events into the indexer; removals soft-delete via the indexer's
//! missing-status path. The watcher handle is held in a field so that
//! dropping it on stop tears down the OS-level watch.

use crate::services::indexer::Indexer;
use crate::services::Service;
use anyhow::{Context, Result};
use notify::{Event as NotifyEvent, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, trace, warn};

const DEBOUNCE: Duration = Duration::from_millis(200);

pub struct RootWatcher {
    indexer: Arc<Indexer>,
    /// Recently handled paths, for debouncing editor/copy write bursts
    recent_events: Arc<RwLock<HashMap<PathBuf, Instant>>>,
    watcher: RwLock<Option<RecommendedWatcher>>,
    task: RwLock<Option<tokio::task::JoinHandle<()>>>,
    running: AtomicBool,
}

impl RootWatcher {
    pub fn new(indexer: Arc<Indexer>) -> Self {
        Self {
            indexer,
            recent_events: Arc::new(RwLock::new(HashMap::new())),
            watcher: RwLock::new(None),
            task: RwLock::new(None),
            running: AtomicBool::new(false),
        }
    }

    async fn should_debounce(recent: &RwLock<HashMap<PathBuf, Instant>>, path: &Path) -> bool {
        let mut recent = recent.write().await;
        let now = Instant::now();

        if let Some(&last_seen) = recent.get(path) {
            if now.duration_since(last_seen) < DEBOUNCE {
                return true;
            }
        }
        recent.insert(path.to_path_buf(), now);
        recent.retain(|_, &mut last_seen| now.duration_since(last_seen) < Duration::from_secs(5));
        false
    }

    async fn dispatch(indexer: &Indexer, recent: &RwLock<HashMap<PathBuf, Instant>>, event: NotifyEvent) {
        let relevant = matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        );
        if !relevant {
            return;
        }

        for path in event.paths {
            if Indexer::should_ignore(&path) {
                continue;
            }

            match event.kind {
                EventKind::Remove(_) => {
                    trace!("Watcher: removed {}", path.display());
                    if let Err(e) = indexer.mark_missing(&path).await {
                        warn!("Failed to mark {:?} missing: {:#}", path, e);
                    }
                }
                _ => {
                    if Self::should_debounce(recent, &path).await {
                        debug!("Debounced event for: {}", path.display());
                        continue;
                    }
                    trace!("Watcher: changed {}", path.display());
                    if let Err(e) = indexer.index_file(&path).await {
                        warn!("Failed to index {:?}: {:#}", path, e);
                    }
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Service for RootWatcher {
    async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let root = self.indexer.root().to_path_buf();
        let (tx, mut rx) = mpsc::unbounded_channel::<NotifyEvent>();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<NotifyEvent>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        })
        .context("failed to create filesystem watcher")?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .with_context(|| format!("failed to watch {:?}", root))?;
        *self.watcher.write().await = Some(watcher);

        let indexer = self.indexer.clone();
        let recent = self.recent_events.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                Self::dispatch(&indexer, &recent, event).await;
            }
        });
        *self.task.write().await = Some(task);

        info!("Watching {:?}", self.indexer.root());
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        // Dropping the notify handle removes the OS watch; the drained
        // channel then ends the dispatch task.
        self.watcher.write().await.take();
        if let Some(task) = self.task.write().await.take() {
            task.abort();
        }

        info!("Stopped watching {:?}", self.indexer.root());
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn name(&self) -> &'static str {
        "root_watcher"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_debounce_suppresses_bursts() {
        let recent = RwLock::new(HashMap::new());
        let path = Path::new("/root/a.png");

        assert!(!RootWatcher::should_debounce(&recent, path).await);
        assert!(RootWatcher::should_debounce(&recent, path).await);

        tokio::time::sleep(DEBOUNCE + Duration::from_millis(20)).await;
        assert!(!RootWatcher::should_debounce(&recent, path).await);
    }

    #[tokio::test]
    async fn test_distinct_paths_not_debounced() {
        let recent = RwLock::new(HashMap::new());

        assert!(!RootWatcher::should_debounce(&recent, Path::new("/r/a.png")).await);
        assert!(!RootWatcher::should_debounce(&recent, Path::new("/r/b.png")).await);
    }
}
