//! HistoryStore - the clipboard history orchestrator
//!
//! Owns the two ordered collections (recent history, pinned set), applies
//! capture/dedup/trim policy, and coordinates persistence and search.
//!
//! Concurrency model:
//! - Mutations are single-writer: capture/pin/delete/tag/clear run on one
//!   logical owner.
//! - Search scans and image decodes run on workers against cloned snapshots
//!   of the collections, never against live references.
//! - Saves are scheduled, debounced and retried off the caller's path; a
//!   mutating call returning does not mean the save has completed.

use std::path::Path;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

use crate::capture;
use crate::image_cache::{DecodedImage, ImageCache};
use crate::interface::{
    ClipStashError, ClipboardContent, ClipboardPort, ContentTypeFilter, ItemId, ItemKind,
    RawCapture, SearchHit, SourceAppProvider, StoreEvent,
};
use crate::models::{default_tags, ClipboardItem, Tag};
use crate::persistence::{PersistenceEngine, SaveScheduler, Snapshot, SAVE_DEBOUNCE};
use crate::search::{SearchService, SnapshotFn};

/// Global fallback Tokio runtime for when store methods are called outside
/// any runtime context (e.g. from a UI event thread). Shared across all
/// stores and never dropped.
static FALLBACK_RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to create fallback tokio runtime")
});

/// Get a tokio runtime handle - current runtime if available, otherwise the
/// global fallback.
pub(crate) fn runtime_handle() -> tokio::runtime::Handle {
    tokio::runtime::Handle::try_current().unwrap_or_else(|_| FALLBACK_RUNTIME.handle().clone())
}

/// Store policy knobs. Explicit instance, passed at construction.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// History length cap; oldest unpinned items are evicted beyond it.
    pub max_history: usize,
    /// Consecutive-duplicate suppression on capture.
    pub dedup_enabled: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_history: 50,
            dedup_enabled: true,
        }
    }
}

/// The two ordered collections plus the tag list. An item lives in exactly
/// one of `history` and `pinned`; moving it is remove-from-one,
/// insert-into-other.
#[derive(Default)]
struct StoreState {
    /// Most-recent-first, bounded by `max_history`.
    history: Vec<ClipboardItem>,
    /// Pin-order, unbounded, exempt from trimming and age purge.
    pinned: Vec<ClipboardItem>,
    tags: Vec<Tag>,
}

impl StoreState {
    fn find_mut(&mut self, id: ItemId) -> Option<&mut ClipboardItem> {
        self.history
            .iter_mut()
            .chain(self.pinned.iter_mut())
            .find(|item| item.id == id)
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            items: self.history.clone(),
            pinned_items: self.pinned.clone(),
            tags: self.tags.clone(),
        }
    }

    /// Canonical display order: pinned ++ history.
    fn all_items(&self) -> Vec<ClipboardItem> {
        self.pinned
            .iter()
            .chain(self.history.iter())
            .cloned()
            .collect()
    }
}

/// Thread-safe clipboard history store.
pub struct HistoryStore {
    state: Arc<Mutex<StoreState>>,
    config: StoreConfig,
    persistence: Arc<PersistenceEngine>,
    scheduler: SaveScheduler,
    search: SearchService,
    image_cache: Arc<ImageCache>,
    source_app_provider: Option<Arc<dyn SourceAppProvider>>,
    runtime: tokio::runtime::Handle,
}

impl HistoryStore {
    /// Open a store persisted at the per-user application data location.
    pub fn open(config: StoreConfig) -> Result<(Self, UnboundedReceiver<StoreEvent>), ClipStashError> {
        let (events_tx, events_rx) = unbounded_channel();
        let engine = PersistenceEngine::new(events_tx)?;
        Ok((Self::with_engine(engine, config), events_rx))
    }

    /// Open a store persisted under an explicit directory.
    pub fn open_at(
        dir: &Path,
        config: StoreConfig,
    ) -> Result<(Self, UnboundedReceiver<StoreEvent>), ClipStashError> {
        let (events_tx, events_rx) = unbounded_channel();
        let engine = PersistenceEngine::at_dir(dir, events_tx)?;
        Ok((Self::with_engine(engine, config), events_rx))
    }

    fn with_engine(engine: PersistenceEngine, config: StoreConfig) -> Self {
        let runtime = runtime_handle();

        let loaded = engine.load();
        let state = match loaded {
            Some(snapshot) => StoreState {
                history: snapshot.items,
                pinned: snapshot.pinned_items,
                tags: snapshot.tags,
            },
            None => StoreState {
                tags: default_tags(),
                ..StoreState::default()
            },
        };
        let state = Arc::new(Mutex::new(state));

        let snapshot_source = Arc::clone(&state);
        let snapshot: SnapshotFn = Arc::new(move || snapshot_source.lock().all_items());
        let search = SearchService::new(snapshot, runtime.clone());

        Self {
            state,
            config,
            persistence: Arc::new(engine),
            scheduler: SaveScheduler::new(SAVE_DEBOUNCE),
            search,
            image_cache: Arc::new(ImageCache::new(runtime.clone())),
            source_app_provider: None,
            runtime,
        }
    }

    /// Attach a best-effort frontmost-application name provider, used when
    /// the monitor passes no source app.
    pub fn with_source_app_provider(mut self, provider: Arc<dyn SourceAppProvider>) -> Self {
        self.source_app_provider = Some(provider);
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Capture
    // ─────────────────────────────────────────────────────────────────────────

    /// Classify a raw clipboard read and insert it at the head of history.
    /// Consecutive duplicates of the current head are suppressed when
    /// enabled; oversized or undecodable captures yield None silently.
    pub fn capture(&self, raw: RawCapture, source_app: Option<String>) -> Option<ClipboardItem> {
        let source_app = source_app.or_else(|| {
            self.source_app_provider
                .as_ref()
                .and_then(|p| p.frontmost_app_name())
        });
        let item = capture::classify(raw, source_app)?;

        {
            let mut state = self.state.lock();

            if self.config.dedup_enabled {
                if let Some(head) = state.history.first() {
                    if head.fingerprint() == item.fingerprint() {
                        tracing::debug!(id = %head.id, "consecutive duplicate suppressed");
                        return None;
                    }
                }
            }

            // Should not normally exist; identity collisions are removed
            // rather than duplicated.
            state.history.retain(|existing| existing.id != item.id);
            state.history.insert(0, item.clone());
            state.history.truncate(self.config.max_history);
        }

        self.schedule_save();
        Some(item)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pin / unpin
    // ─────────────────────────────────────────────────────────────────────────

    /// Move an item from history to the tail of the pinned set. Misses and
    /// already-pinned ids are silent no-ops.
    pub fn pin(&self, id: ItemId) {
        let moved = {
            let mut state = self.state.lock();
            match state.history.iter().position(|item| item.id == id) {
                Some(index) => {
                    let mut item = state.history.remove(index);
                    item.pinned = true;
                    state.pinned.push(item);
                    true
                }
                None => false,
            }
        };
        if moved {
            self.schedule_save();
        }
    }

    /// Move an item from the pinned set back to the head of history.
    pub fn unpin(&self, id: ItemId) {
        let moved = {
            let mut state = self.state.lock();
            match state.pinned.iter().position(|item| item.id == id) {
                Some(index) => {
                    let mut item = state.pinned.remove(index);
                    item.pinned = false;
                    state.history.insert(0, item);
                    true
                }
                None => false,
            }
        };
        if moved {
            self.schedule_save();
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Delete / tags
    // ─────────────────────────────────────────────────────────────────────────

    /// Remove an item from whichever collection holds it, along with any
    /// pending search result and cached decode for it.
    pub fn delete(&self, id: ItemId) {
        {
            let mut state = self.state.lock();
            state.history.retain(|item| item.id != id);
            state.pinned.retain(|item| item.id != id);
        }
        self.search.remove_hit(id);
        self.image_cache.remove(id);
        self.schedule_save();
    }

    /// Idempotently add a tag to the matching item. Misses are no-ops.
    pub fn add_tag(&self, name: &str, id: ItemId) {
        let changed = {
            let mut state = self.state.lock();
            match state.find_mut(id) {
                Some(item) => {
                    item.add_tag(name);
                    true
                }
                None => false,
            }
        };
        if changed {
            self.schedule_save();
        }
    }

    pub fn remove_tag(&self, name: &str, id: ItemId) {
        let changed = {
            let mut state = self.state.lock();
            match state.find_mut(id) {
                Some(item) => {
                    item.remove_tag(name);
                    true
                }
                None => false,
            }
        };
        if changed {
            self.schedule_save();
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Bulk removal
    // ─────────────────────────────────────────────────────────────────────────

    /// Clear history; the pinned set is untouched.
    pub fn clear_unpinned(&self) {
        self.state.lock().history.clear();
        self.after_bulk_removal();
    }

    /// Clear history and pinned set both. Tags survive.
    pub fn clear_all(&self) {
        {
            let mut state = self.state.lock();
            state.history.clear();
            state.pinned.clear();
        }
        self.after_bulk_removal();
    }

    /// Drop history entries older than `days`. Pinned items are exempt.
    pub fn clear_older_than(&self, days: u32) {
        let cutoff = Utc::now() - ChronoDuration::days(i64::from(days));
        self.state
            .lock()
            .history
            .retain(|item| item.created_at >= cutoff);
        self.after_bulk_removal();
    }

    /// Drop all items of the given kind from both collections.
    pub fn clear_by_kind(&self, kind: ItemKind) {
        {
            let mut state = self.state.lock();
            state.history.retain(|item| item.kind() != kind);
            state.pinned.retain(|item| item.kind() != kind);
        }
        self.after_bulk_removal();
    }

    /// Bulk removals save and re-run an active search over the new item set
    /// (or clear stale results).
    fn after_bulk_removal(&self) {
        self.schedule_save();
        self.search.refresh();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Read access
    // ─────────────────────────────────────────────────────────────────────────

    /// Canonical display order everywhere: pinned ++ history.
    pub fn all_items(&self) -> Vec<ClipboardItem> {
        self.state.lock().all_items()
    }

    pub fn filtered_items(&self, filter: ContentTypeFilter) -> Vec<ClipboardItem> {
        self.state
            .lock()
            .all_items()
            .into_iter()
            .filter(|item| filter.matches(item.kind()))
            .collect()
    }

    pub fn tags(&self) -> Vec<Tag> {
        self.state.lock().tags.clone()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Search
    // ─────────────────────────────────────────────────────────────────────────

    pub fn set_query(&self, query: &str) {
        self.search.set_query(query);
    }

    pub fn set_filter(&self, filter: ContentTypeFilter) {
        self.search.set_filter(filter);
    }

    pub fn reset_search(&self) {
        self.search.reset();
    }

    pub fn search_hits(&self) -> Vec<SearchHit> {
        self.search.hits()
    }

    pub fn search_hit(&self, id: ItemId) -> Option<SearchHit> {
        self.search.hit_for(id)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Images
    // ─────────────────────────────────────────────────────────────────────────

    pub fn image_cache(&self) -> &Arc<ImageCache> {
        &self.image_cache
    }

    /// Decode an image item's payload through the cache. None for missing
    /// ids and non-image items.
    pub async fn load_image(&self, id: ItemId) -> Result<Option<Arc<DecodedImage>>, ClipStashError> {
        let bytes = {
            let state = self.state.lock();
            state
                .pinned
                .iter()
                .chain(state.history.iter())
                .find(|item| item.id == id)
                .and_then(|item| match &item.content {
                    ClipboardContent::Image { data, .. } => Some(data.clone()),
                    _ => None,
                })
        };
        match bytes {
            Some(bytes) => Ok(Some(self.image_cache.load(id, bytes).await?)),
            None => Ok(None),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Persistence
    // ─────────────────────────────────────────────────────────────────────────

    /// Synchronous save of the current state. Used on shutdown; regular
    /// mutations rely on the debounced scheduler instead.
    pub fn flush(&self) -> Result<(), ClipStashError> {
        let snapshot = self.state.lock().snapshot();
        self.persistence.write_snapshot(&snapshot)?;
        Ok(())
    }

    /// Export the current state to a caller-chosen path.
    pub fn export_to(&self, path: &Path, pretty: bool) -> Result<(), ClipStashError> {
        let snapshot = self.state.lock().snapshot();
        self.persistence.export_to(path, &snapshot, pretty)?;
        Ok(())
    }

    /// Replace the current state with a snapshot imported from a
    /// caller-chosen path. Failures are returned, leaving state untouched.
    pub fn import_from(&self, path: &Path) -> Result<(), ClipStashError> {
        let snapshot = self.persistence.import_from(path)?;
        {
            let mut state = self.state.lock();
            state.history = snapshot.items;
            state.pinned = snapshot.pinned_items;
            state.tags = snapshot.tags;
        }
        self.schedule_save();
        self.search.refresh();
        Ok(())
    }

    fn schedule_save(&self) {
        let state = Arc::clone(&self.state);
        self.scheduler
            .schedule(&self.runtime, Arc::clone(&self.persistence), move || {
                state.lock().snapshot()
            });
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Clipboard write-back
    // ─────────────────────────────────────────────────────────────────────────

    /// Write an item's content back to the system clipboard for paste-back.
    /// Returns false when the id is unknown.
    pub fn recopy(&self, id: ItemId, clipboard: &dyn ClipboardPort) -> bool {
        let content = {
            let state = self.state.lock();
            state
                .pinned
                .iter()
                .chain(state.history.iter())
                .find(|item| item.id == id)
                .map(|item| item.content.clone())
        };
        match content {
            Some(content) => {
                clipboard.write(&content);
                true
            }
            None => false,
        }
    }

    /// Backdate an item's capture time (test hook for age-based purge).
    #[cfg(test)]
    pub(crate) fn backdate(&self, id: ItemId, days: u32) {
        let mut state = self.state.lock();
        if let Some(item) = state.find_mut(id) {
            item.created_at = Utc::now() - ChronoDuration::days(i64::from(days));
        }
    }
}
