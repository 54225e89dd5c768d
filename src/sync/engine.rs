//! Sync engine - durable, idempotent, order-preserving event propagation
//!
//! One engine instance per process. Local mutations are published as one
//! JSON file per event into the shared directory; a notify watcher picks up
//! files created by other processes and applies them through the same
//! dedicated apply path used by startup replay. Every file I/O failure here
//! is advisory: an unreadable file is skipped and the engine degrades to
//! single-process behavior rather than failing the catalog.

use crate::sync::event::{compacted_file_name, is_compacted_file_name, SyncEvent, SyncEventBody};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Most-recent events kept in memory for activity views
const HISTORY_CAPACITY: usize = 100;

/// Individual event files that trigger compaction after replay
const COMPACTION_THRESHOLD: usize = 50;

/// Directory under the root holding the shared event log
const SYNC_DIR: &str = ".lightbox/sync";

/// Receives events for side-effecting application (e.g. updating the
/// asset store with `from_sync = true`, which must not re-publish).
#[async_trait::async_trait]
pub trait SyncSubscriber: Send + Sync {
    async fn apply(&self, event: &SyncEvent) -> anyhow::Result<()>;
}

/// The append-only log engine shared by all cooperating processes of a root
pub struct SyncEngine {
    sync_dir: PathBuf,
    session_id: String,
    /// False when the sync directory could not be created; the engine then
    /// runs local-only and publish skips the file write.
    enabled: bool,
    processed: RwLock<HashSet<String>>,
    history: RwLock<VecDeque<SyncEvent>>,
    subscribers: RwLock<Vec<Arc<dyn SyncSubscriber>>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    watch_task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncEngine {
    /// Create an engine for a catalog root with a fresh session identity.
    pub fn new(root: &Path) -> Self {
        Self::with_session(root, Uuid::new_v4().to_string())
    }

    /// Create an engine with an explicit session (writer) identity.
    pub fn with_session(root: &Path, session_id: String) -> Self {
        let sync_dir = root.join(SYNC_DIR);
        let enabled = match std::fs::create_dir_all(&sync_dir) {
            Ok(()) => true,
            Err(e) => {
                // Not fatal: the catalog still works, just without sync.
                warn!(
                    "Could not create sync directory {:?}: {} - sync disabled",
                    sync_dir, e
                );
                false
            }
        };

        Self {
            sync_dir,
            session_id,
            enabled,
            processed: RwLock::new(HashSet::new()),
            history: RwLock::new(VecDeque::new()),
            subscribers: RwLock::new(Vec::new()),
            watcher: Mutex::new(None),
            watch_task: Mutex::new(None),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn sync_dir(&self) -> &Path {
        &self.sync_dir
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Register a subscriber for applied events.
    pub async fn subscribe(&self, subscriber: Arc<dyn SyncSubscriber>) {
        self.subscribers.write().await.push(subscriber);
    }

    /// Start watching, replay existing events, then compact if the backlog
    /// of individual files has grown past the threshold.
    pub async fn initialize(self: &Arc<Self>) {
        if !self.enabled {
            info!("Sync disabled, running local-only");
            return;
        }

        self.start_watching().await;
        self.replay_events().await;
        self.compact_events().await;
    }

    /// Publish a local mutation to the shared log.
    ///
    /// The id is marked processed before the file is written so the
    /// directory watcher ignores our own file. The write itself is
    /// fire-and-forget: a failed publish is a silent availability gap, not
    /// a correctness violation - the local mutation already succeeded.
    pub async fn publish(&self, body: SyncEventBody) -> SyncEvent {
        let event = SyncEvent::new(&self.session_id, body);

        self.processed.write().await.insert(event.id.clone());
        self.push_history(event.clone()).await;

        if self.enabled {
            let path = self.sync_dir.join(event.file_name());
            match serde_json::to_vec_pretty(&event) {
                Ok(bytes) => {
                    if let Err(e) = write_atomic(&path, &bytes).await {
                        warn!("Failed to write sync event {}: {}", event.id, e);
                    } else {
                        trace!("Published sync event {} to {:?}", event.id, path);
                    }
                }
                Err(e) => warn!("Failed to serialize sync event {}: {}", event.id, e),
            }
        }

        event
    }

    /// Apply one event: dedupe by id, suppress our own writes, record it,
    /// dispatch to subscribers. Used by both the watcher and replay.
    pub async fn process_event(&self, event: SyncEvent) {
        if !self.processed.write().await.insert(event.id.clone()) {
            trace!("Skipping already-processed event {}", event.id);
            return;
        }

        // Defense in depth: an authored event normally hits the processed
        // set above, but a restarted session must still never re-apply its
        // own writer id.
        if event.user_id == self.session_id {
            debug!("Skipping own event {}", event.id);
            return;
        }

        self.push_history(event.clone()).await;

        let subscribers: Vec<_> = self.subscribers.read().await.clone();
        for subscriber in subscribers {
            if let Err(e) = subscriber.apply(&event).await {
                warn!("Subscriber failed to apply event {}: {:#}", event.id, e);
            }
        }
    }

    /// Replay every event file in the directory in `(timestamp, id)` order.
    ///
    /// Applying through `process_event` makes replay idempotent and makes
    /// the final state independent of file arrival order.
    pub async fn replay_events(&self) {
        if !self.enabled {
            return;
        }

        let mut events = self.read_all_events().await;
        events.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        let count = events.len();
        for event in events {
            self.process_event(event).await;
        }
        if count > 0 {
            info!("Replayed {} sync events", count);
        }
    }

    /// Consolidate individual event files into one batch file once the
    /// backlog reaches the threshold. Originals are deleted afterwards;
    /// delete failures are tolerated - another process may have compacted
    /// the same files concurrently, and a lost race is a harmless retry.
    pub async fn compact_events(&self) {
        if !self.enabled {
            return;
        }

        let individual = self.list_event_files(false).await;
        if individual.len() < COMPACTION_THRESHOLD {
            return;
        }

        let mut events = Vec::new();
        let mut sources = Vec::new();
        let mut seen = HashSet::new();
        for path in &individual {
            match read_events_file(path).await {
                Some(parsed) => {
                    for event in parsed {
                        if seen.insert(event.id.clone()) {
                            events.push(event);
                        }
                    }
                    sources.push(path.clone());
                }
                // Leave unreadable files in place; they are not ours to lose.
                None => warn!("Skipping unreadable event file {:?} during compaction", path),
            }
        }

        if events.is_empty() {
            return;
        }

        events.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        let max_timestamp = events.last().map(|e| e.timestamp).unwrap_or_default();

        let target = self.sync_dir.join(compacted_file_name(max_timestamp));
        let bytes = match serde_json::to_vec_pretty(&events) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to serialize compacted batch: {}", e);
                return;
            }
        };
        if let Err(e) = write_atomic(&target, &bytes).await {
            warn!("Failed to write compacted batch {:?}: {}", target, e);
            return;
        }

        let mut removed = 0usize;
        for path in sources {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) => debug!("Could not remove compacted source {:?}: {}", path, e),
            }
        }
        info!(
            "Compacted {} events into {:?} ({} originals removed)",
            events.len(),
            target,
            removed
        );
    }

    /// Begin watching the shared directory for externally created files.
    async fn start_watching(self: &Arc<Self>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();

        // Modify events matter too: a rename into place surfaces as a
        // modify on some backends, and a writer that creates the file
        // before its bytes land only becomes readable on a later write.
        // Re-ingesting is safe; the processed set dedupes.
        let mut watcher = match notify::recommended_watcher(
            move |res: notify::Result<notify::Event>| {
                if let Ok(event) = res {
                    if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                        for path in event.paths {
                            if path.extension().is_some_and(|ext| ext == "json") {
                                let _ = tx.send(path);
                            }
                        }
                    }
                }
            },
        ) {
            Ok(watcher) => watcher,
            Err(e) => {
                warn!("Could not create sync watcher: {} - falling back to replay-only", e);
                return;
            }
        };

        if let Err(e) = watcher.watch(&self.sync_dir, RecursiveMode::NonRecursive) {
            warn!("Could not watch {:?}: {} - falling back to replay-only", self.sync_dir, e);
            return;
        }

        *self.watcher.lock().await = Some(watcher);

        let engine = Arc::clone(self);
        let task = tokio::spawn(async move {
            while let Some(path) = rx.recv().await {
                engine.ingest_file(&path).await;
            }
        });
        *self.watch_task.lock().await = Some(task);

        debug!("Watching sync directory {:?}", self.sync_dir);
    }

    /// Stop watching. The directory handle is released before this returns.
    pub async fn stop(&self) {
        if let Some(watcher) = self.watcher.lock().await.take() {
            drop(watcher);
        }
        if let Some(task) = self.watch_task.lock().await.take() {
            task.abort();
        }
    }

    /// The bounded in-memory event history, oldest first.
    pub async fn history(&self) -> Vec<SyncEvent> {
        self.history.read().await.iter().cloned().collect()
    }

    /// Parse and apply one event file (single event or compacted batch).
    async fn ingest_file(&self, path: &Path) {
        let Some(mut events) = read_events_file(path).await else {
            warn!("Skipping unreadable sync event file {:?}", path);
            return;
        };

        events.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        for event in events {
            self.process_event(event).await;
        }
    }

    async fn push_history(&self, event: SyncEvent) {
        let mut history = self.history.write().await;
        history.push_back(event);
        while history.len() > HISTORY_CAPACITY {
            history.pop_front();
        }
    }

    async fn read_all_events(&self) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        for path in self.list_event_files(true).await {
            match read_events_file(&path).await {
                Some(parsed) => events.extend(parsed),
                None => warn!("Skipping unreadable sync event file {:?}", path),
            }
        }
        events
    }

    /// Event files in the sync directory; `include_compacted` selects
    /// whether batch files are listed too.
    async fn list_event_files(&self, include_compacted: bool) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.sync_dir).await {
            Ok(dir) => dir,
            Err(e) => {
                warn!("Could not read sync directory {:?}: {}", self.sync_dir, e);
                return files;
            }
        };

        while let Ok(Some(entry)) = dir.next_entry().await {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if !include_compacted && is_compacted_file_name(&name) {
                continue;
            }
            files.push(path);
        }
        files
    }
}

/// Write under a temp name in the same directory and rename into place,
/// so a watching peer never observes a partially written event file. The
/// temp name carries no `.json` extension and is invisible to the watch
/// filter until the rename.
async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}

/// Read one event file as either a single event or an array of events.
/// Returns `None` for unreadable or malformed files; the caller logs and
/// moves on - one bad file must never block replay of the others.
async fn read_events_file(path: &Path) -> Option<Vec<SyncEvent>> {
    let bytes = tokio::fs::read(path).await.ok()?;
    let value: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    match value {
        serde_json::Value::Array(_) => serde_json::from_value(value).ok(),
        _ => serde_json::from_value::<SyncEvent>(value).ok().map(|e| vec![e]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    /// Subscriber that records every applied event.
    struct Recorder {
        applied: Mutex<Vec<SyncEvent>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                applied: Mutex::new(Vec::new()),
            })
        }

        async fn ids(&self) -> Vec<String> {
            self.applied.lock().await.iter().map(|e| e.id.clone()).collect()
        }
    }

    #[async_trait::async_trait]
    impl SyncSubscriber for Recorder {
        async fn apply(&self, event: &SyncEvent) -> anyhow::Result<()> {
            self.applied.lock().await.push(event.clone());
            Ok(())
        }
    }

    fn tag_delete(tag_id: &str) -> SyncEventBody {
        SyncEventBody::TagDelete {
            tag_id: tag_id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_publish_writes_one_file_per_event() {
        let root = TempDir::new().unwrap();
        let engine = Arc::new(SyncEngine::new(root.path()));

        let event = engine.publish(tag_delete("t1")).await;

        let expected = engine.sync_dir().join(event.file_name());
        assert!(expected.exists());

        let on_disk: SyncEvent =
            serde_json::from_slice(&std::fs::read(&expected).unwrap()).unwrap();
        assert_eq!(on_disk, event);
    }

    #[tokio::test]
    async fn test_replay_is_idempotent() {
        let root = TempDir::new().unwrap();

        let writer = Arc::new(SyncEngine::with_session(root.path(), "writer".into()));
        writer.publish(tag_delete("t1")).await;
        writer.publish(tag_delete("t2")).await;

        let reader = Arc::new(SyncEngine::with_session(root.path(), "reader".into()));
        let recorder = Recorder::new();
        reader.subscribe(recorder.clone()).await;

        reader.replay_events().await;
        reader.replay_events().await;

        assert_eq!(recorder.ids().await.len(), 2);
    }

    #[tokio::test]
    async fn test_replay_order_is_by_timestamp_not_arrival() {
        let root = TempDir::new().unwrap();
        let sync_dir = root.path().join(".lightbox/sync");
        std::fs::create_dir_all(&sync_dir).unwrap();

        // Write files in reverse timestamp order.
        for (ts, id) in [(300i64, "c"), (100, "a"), (200, "b")] {
            let event = SyncEvent {
                id: id.to_string(),
                timestamp: ts,
                user_id: "writer".to_string(),
                body: tag_delete("t"),
            };
            std::fs::write(
                sync_dir.join(event.file_name()),
                serde_json::to_vec(&event).unwrap(),
            )
            .unwrap();
        }

        let reader = Arc::new(SyncEngine::with_session(root.path(), "reader".into()));
        let recorder = Recorder::new();
        reader.subscribe(recorder.clone()).await;
        reader.replay_events().await;

        assert_eq!(recorder.ids().await, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_own_events_are_never_reapplied() {
        let root = TempDir::new().unwrap();

        let writer = Arc::new(SyncEngine::with_session(root.path(), "session-1".into()));
        writer.publish(tag_delete("t1")).await;

        // Same writer id, fresh process: the processed set is empty but the
        // writer id check still suppresses the event.
        let restarted = Arc::new(SyncEngine::with_session(root.path(), "session-1".into()));
        let recorder = Recorder::new();
        restarted.subscribe(recorder.clone()).await;
        restarted.replay_events().await;

        assert!(recorder.ids().await.is_empty());
    }

    /// Poll the recorder until it holds the expected ids or time runs out.
    async fn wait_for_ids(recorder: &Recorder, expected: &[&str]) -> bool {
        for _ in 0..250 {
            if recorder.ids().await == expected {
                return true;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_watch_applies_events_from_another_engine_without_replay() {
        let root = TempDir::new().unwrap();

        let reader = Arc::new(SyncEngine::with_session(root.path(), "reader".into()));
        let recorder = Recorder::new();
        reader.subscribe(recorder.clone()).await;
        reader.initialize().await;

        // Published after the reader is already watching: only the live
        // watch path can deliver this.
        let writer = Arc::new(SyncEngine::with_session(root.path(), "writer".into()));
        let published = writer.publish(tag_delete("t1")).await;

        assert!(
            wait_for_ids(&recorder, &[&published.id]).await,
            "event was not applied via the watch path"
        );
        reader.stop().await;
    }

    #[tokio::test]
    async fn test_watch_applies_event_file_written_after_creation() {
        let root = TempDir::new().unwrap();

        let reader = Arc::new(SyncEngine::with_session(root.path(), "reader".into()));
        let recorder = Recorder::new();
        reader.subscribe(recorder.clone()).await;
        reader.initialize().await;

        // A non-atomic writer: the file appears empty first, its bytes
        // land later. The later write must still get the event applied.
        let event = SyncEvent {
            id: "slow-1".to_string(),
            timestamp: 100,
            user_id: "writer".to_string(),
            body: tag_delete("t"),
        };
        let path = reader.sync_dir().join(event.file_name());
        std::fs::write(&path, b"").unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        std::fs::write(&path, serde_json::to_vec(&event).unwrap()).unwrap();

        assert!(
            wait_for_ids(&recorder, &["slow-1"]).await,
            "slowly-written event was lost by the watch path"
        );
        reader.stop().await;
    }

    #[tokio::test]
    async fn test_publish_leaves_no_temp_files() {
        let root = TempDir::new().unwrap();
        let engine = Arc::new(SyncEngine::new(root.path()));

        engine.publish(tag_delete("t1")).await;

        let leftovers: Vec<String> = std::fs::read_dir(engine.sync_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|name| !name.ends_with(".json"))
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");
    }

    #[tokio::test]
    async fn test_malformed_file_does_not_block_replay() {
        let root = TempDir::new().unwrap();

        let writer = Arc::new(SyncEngine::with_session(root.path(), "writer".into()));
        let good = writer.publish(tag_delete("t1")).await;
        std::fs::write(writer.sync_dir().join("999_bogus.json"), b"{not json").unwrap();

        let reader = Arc::new(SyncEngine::with_session(root.path(), "reader".into()));
        let recorder = Recorder::new();
        reader.subscribe(recorder.clone()).await;
        reader.replay_events().await;

        assert_eq!(recorder.ids().await, vec![good.id]);
    }

    #[tokio::test]
    async fn test_compaction_preserves_content_and_replay_state() {
        let root = TempDir::new().unwrap();

        let writer = Arc::new(SyncEngine::with_session(root.path(), "writer".into()));
        let mut published = Vec::new();
        for i in 0..COMPACTION_THRESHOLD {
            published.push(writer.publish(tag_delete(&format!("t{i}"))).await);
        }

        writer.compact_events().await;

        // All originals folded into exactly one batch file.
        let names: Vec<String> = std::fs::read_dir(writer.sync_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("compacted_"));

        let batch: Vec<SyncEvent> = serde_json::from_slice(
            &std::fs::read(writer.sync_dir().join(&names[0])).unwrap(),
        )
        .unwrap();
        let mut expected = published.clone();
        expected.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        assert_eq!(batch, expected);

        // Replaying the batch alone reproduces the same application set.
        let reader = Arc::new(SyncEngine::with_session(root.path(), "reader".into()));
        let recorder = Recorder::new();
        reader.subscribe(recorder.clone()).await;
        reader.replay_events().await;
        assert_eq!(recorder.ids().await.len(), published.len());
    }

    #[tokio::test]
    async fn test_compaction_below_threshold_is_a_noop() {
        let root = TempDir::new().unwrap();

        let writer = Arc::new(SyncEngine::with_session(root.path(), "writer".into()));
        writer.publish(tag_delete("t1")).await;
        writer.compact_events().await;

        let count = std::fs::read_dir(writer.sync_dir()).unwrap().count();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_history_buffer_is_bounded() {
        let root = TempDir::new().unwrap();
        let engine = Arc::new(SyncEngine::new(root.path()));

        for i in 0..(HISTORY_CAPACITY + 10) {
            engine.publish(tag_delete(&format!("t{i}"))).await;
        }

        let history = engine.history().await;
        assert_eq!(history.len(), HISTORY_CAPACITY);
        // Oldest evicted first.
        assert!(matches!(
            &history[0].body,
            SyncEventBody::TagDelete { tag_id } if tag_id == "t10"
        ));
    }
}
