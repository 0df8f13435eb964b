//! Durable snapshot persistence
//!
//! One JSON document holds history, pinned items and tags, with ISO-8601
//! timestamps and a kind discriminator per item. Writes go to a temp file,
//! the current primary is copied to a backup, then the temp is renamed over
//! the primary. Loads fall back primary → backup → empty; an empty store is
//! a legitimate cold start, not an error.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::interface::StoreEvent;
use crate::models::{ClipboardItem, Tag};

const SNAPSHOT_FILENAME: &str = "history.json";
const BACKUP_FILENAME: &str = "history.backup.json";
const APP_DIR_NAME: &str = "clipstash";

/// Write attempts before a save is reported failed.
const SAVE_ATTEMPTS: u32 = 3;
/// Fixed delay between attempts.
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Quiet window that coalesces bursts of mutations into one save.
pub(crate) const SAVE_DEBOUNCE: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Encode error: {0}")]
    Encode(serde_json::Error),
    #[error("Invalid snapshot document: {0}")]
    InvalidDocument(serde_json::Error),
    #[error("No application data directory available")]
    NoDataDir,
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// The persisted document: `{ items, pinnedItems, tags }`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub items: Vec<ClipboardItem>,
    pub pinned_items: Vec<ClipboardItem>,
    pub tags: Vec<Tag>,
}

/// Snapshot store bound to a primary file and a same-directory backup.
pub struct PersistenceEngine {
    primary: PathBuf,
    backup: PathBuf,
    events: UnboundedSender<StoreEvent>,
}

impl PersistenceEngine {
    /// Engine at the per-user application data location.
    pub fn new(events: UnboundedSender<StoreEvent>) -> PersistenceResult<Self> {
        let dir = dirs::data_dir()
            .ok_or(PersistenceError::NoDataDir)?
            .join(APP_DIR_NAME);
        Self::at_dir(&dir, events)
    }

    /// Engine at an explicit directory (tests, custom profiles).
    pub fn at_dir(dir: &Path, events: UnboundedSender<StoreEvent>) -> PersistenceResult<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            primary: dir.join(SNAPSHOT_FILENAME),
            backup: dir.join(BACKUP_FILENAME),
            events,
        })
    }

    pub fn primary_path(&self) -> &Path {
        &self.primary
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup
    }

    /// Encode and atomically replace the primary file, keeping the previous
    /// primary as the backup copy.
    pub fn write_snapshot(&self, snapshot: &Snapshot) -> PersistenceResult<()> {
        let encoded = serde_json::to_vec(snapshot).map_err(PersistenceError::Encode)?;

        let temp = self.primary.with_extension("json.tmp");
        fs::write(&temp, &encoded)?;

        if self.primary.exists() {
            fs::copy(&self.primary, &self.backup)?;
        }
        fs::rename(&temp, &self.primary)?;
        Ok(())
    }

    /// Save with bounded retry, entirely off the caller's critical path.
    /// Exhaustion emits `StoreEvent::SaveFailed` instead of raising — the
    /// mutating call that scheduled this save has long returned.
    pub(crate) fn save_blocking(&self, snapshot: &Snapshot) {
        for attempt in 1..=SAVE_ATTEMPTS {
            match self.write_snapshot(snapshot) {
                Ok(()) => {
                    tracing::debug!(
                        items = snapshot.items.len(),
                        pinned = snapshot.pinned_items.len(),
                        "snapshot saved"
                    );
                    return;
                }
                Err(e) if attempt < SAVE_ATTEMPTS => {
                    tracing::warn!(attempt, error = %e, "snapshot save failed, retrying");
                    std::thread::sleep(RETRY_DELAY);
                }
                Err(e) => {
                    tracing::error!(error = %e, "snapshot save exhausted all attempts");
                    let _ = self.events.send(StoreEvent::SaveFailed {
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    /// Load the snapshot: primary first, then backup. A readable backup
    /// repairs the primary before returning. Total failure is `None`.
    pub fn load(&self) -> Option<Snapshot> {
        match Self::read_snapshot(&self.primary) {
            Ok(snapshot) => return Some(snapshot),
            Err(e) => {
                tracing::warn!(path = %self.primary.display(), error = %e, "primary snapshot unreadable, trying backup");
            }
        }

        match Self::read_snapshot(&self.backup) {
            Ok(snapshot) => {
                if let Err(e) = fs::copy(&self.backup, &self.primary) {
                    tracing::warn!(error = %e, "failed to repair primary from backup");
                }
                Some(snapshot)
            }
            Err(e) => {
                tracing::debug!(error = %e, "no recoverable snapshot, starting empty");
                None
            }
        }
    }

    fn read_snapshot(path: &Path) -> PersistenceResult<Snapshot> {
        let bytes = fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(PersistenceError::InvalidDocument)
    }

    /// Encode the snapshot to a caller-chosen path. Failures are returned,
    /// never absorbed — the caller explicitly asked for this write.
    pub fn export_to(&self, path: &Path, snapshot: &Snapshot, pretty: bool) -> PersistenceResult<()> {
        let encoded = if pretty {
            serde_json::to_vec_pretty(snapshot).map_err(PersistenceError::Encode)?
        } else {
            serde_json::to_vec(snapshot).map_err(PersistenceError::Encode)?
        };
        fs::write(path, encoded)?;
        Ok(())
    }

    /// Decode a snapshot from a caller-chosen path. Bad schema or dates are
    /// typed errors, never coerced into empty data.
    pub fn import_from(&self, path: &Path) -> PersistenceResult<Snapshot> {
        Self::read_snapshot(path)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DEBOUNCED SAVE SCHEDULING
// ─────────────────────────────────────────────────────────────────────────────

/// Coalesces rapid mutations into one save of the latest state. Each
/// `schedule` bumps a generation and arms a timer; only the task holding the
/// newest generation actually snapshots and writes.
pub(crate) struct SaveScheduler {
    generation: Arc<AtomicU64>,
    delay: Duration,
}

impl SaveScheduler {
    pub(crate) fn new(delay: Duration) -> Self {
        Self {
            generation: Arc::new(AtomicU64::new(0)),
            delay,
        }
    }

    pub(crate) fn schedule<F>(
        &self,
        runtime: &tokio::runtime::Handle,
        engine: Arc<PersistenceEngine>,
        snapshot_fn: F,
    ) where
        F: FnOnce() -> Snapshot + Send + 'static,
    {
        let my_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = Arc::clone(&self.generation);
        let delay = self.delay;
        let handle = runtime.clone();

        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if generation.load(Ordering::SeqCst) != my_generation {
                // A later mutation reset the deadline
                return;
            }
            let snapshot = snapshot_fn();
            let _ = handle
                .spawn_blocking(move || engine.save_blocking(&snapshot))
                .await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::ClipboardContent;
    use tokio::sync::mpsc::unbounded_channel;

    fn sample_snapshot() -> Snapshot {
        let item = ClipboardItem::new(
            ClipboardContent::Text {
                value: "persisted".to_string(),
            },
            Some("Editor".to_string()),
        );
        Snapshot {
            items: vec![item],
            pinned_items: Vec::new(),
            tags: crate::models::default_tags(),
        }
    }

    #[test]
    fn test_write_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = unbounded_channel();
        let engine = PersistenceEngine::at_dir(dir.path(), tx).unwrap();

        let snapshot = sample_snapshot();
        engine.write_snapshot(&snapshot).unwrap();

        let loaded = engine.load().unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn test_second_write_keeps_previous_as_backup() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = unbounded_channel();
        let engine = PersistenceEngine::at_dir(dir.path(), tx).unwrap();

        let first = sample_snapshot();
        engine.write_snapshot(&first).unwrap();
        let second = Snapshot::default();
        engine.write_snapshot(&second).unwrap();

        let backup = PersistenceEngine::read_snapshot(engine.backup_path()).unwrap();
        assert_eq!(backup, first);
        assert_eq!(engine.load().unwrap(), second);
    }

    #[test]
    fn test_corrupt_primary_recovers_from_backup_and_repairs() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = unbounded_channel();
        let engine = PersistenceEngine::at_dir(dir.path(), tx).unwrap();

        let first = sample_snapshot();
        engine.write_snapshot(&first).unwrap();
        engine.write_snapshot(&first).unwrap(); // populate backup

        fs::write(engine.primary_path(), b"{ not json").unwrap();

        let loaded = engine.load().unwrap();
        assert_eq!(loaded, first);
        // Primary repaired in place
        let repaired = PersistenceEngine::read_snapshot(engine.primary_path()).unwrap();
        assert_eq!(repaired, first);
    }

    #[test]
    fn test_missing_everything_is_cold_start_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = unbounded_channel();
        let engine = PersistenceEngine::at_dir(dir.path(), tx).unwrap();
        assert!(engine.load().is_none());
    }

    #[test]
    fn test_import_bad_document_is_typed_error() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = unbounded_channel();
        let engine = PersistenceEngine::at_dir(dir.path(), tx).unwrap();

        let bad = dir.path().join("bad.json");
        fs::write(&bad, b"[1, 2, 3]").unwrap();
        assert!(matches!(
            engine.import_from(&bad),
            Err(PersistenceError::InvalidDocument(_))
        ));

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            engine.import_from(&missing),
            Err(PersistenceError::Io(_))
        ));
    }

    #[test]
    fn test_export_pretty_and_compact_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = unbounded_channel();
        let engine = PersistenceEngine::at_dir(dir.path(), tx).unwrap();

        let snapshot = sample_snapshot();
        let pretty = dir.path().join("export-pretty.json");
        let compact = dir.path().join("export-compact.json");
        engine.export_to(&pretty, &snapshot, true).unwrap();
        engine.export_to(&compact, &snapshot, false).unwrap();

        assert_eq!(engine.import_from(&pretty).unwrap(), snapshot);
        assert_eq!(engine.import_from(&compact).unwrap(), snapshot);
        assert!(fs::read(&pretty).unwrap().len() > fs::read(&compact).unwrap().len());
    }

    #[test]
    fn test_save_exhaustion_reports_event_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = unbounded_channel();
        let engine = PersistenceEngine::at_dir(dir.path(), tx).unwrap();

        // Occupy the temp path with a directory so every write attempt fails
        fs::create_dir_all(dir.path().join("history.json.tmp")).unwrap();

        engine.save_blocking(&sample_snapshot());
        match rx.try_recv() {
            Ok(StoreEvent::SaveFailed { message }) => assert!(!message.is_empty()),
            other => panic!("Expected SaveFailed event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_scheduler_coalesces_bursts() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = unbounded_channel();
        let engine = Arc::new(PersistenceEngine::at_dir(dir.path(), tx).unwrap());
        let scheduler = SaveScheduler::new(Duration::from_millis(50));
        let fired = Arc::new(AtomicU32::new(0));

        let handle = tokio::runtime::Handle::current();
        for _ in 0..5 {
            let fired = Arc::clone(&fired);
            scheduler.schedule(&handle, Arc::clone(&engine), move || {
                fired.fetch_add(1, Ordering::SeqCst);
                Snapshot::default()
            });
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1, "burst must collapse to one save");
        assert!(engine.primary_path().exists());
    }
}
