//! ClipStash Core - clipboard history engine
//!
//! Observes a system clipboard through a monitor collaborator, captures
//! typed snapshots, deduplicates and retains a bounded history plus an
//! unbounded pinned set, persists snapshots durably with backup recovery,
//! answers debounced substring search over the item set, and keeps a
//! memory-bounded cache of decoded images. Presentation (menus, popups,
//! hotkeys) lives outside and talks to the core only through the types in
//! `interface` and the `HistoryStore` API.

pub mod capture;
pub mod image_cache;
pub mod interface;
pub mod models;
pub mod persistence;
pub mod search;
mod store;

pub use image_cache::{CacheError, DecodedImage, ImageCache};
pub use interface::*;
pub use models::{default_tags, ClipboardItem, Fingerprint, Tag};
pub use persistence::{PersistenceEngine, PersistenceError, Snapshot};
pub use search::{generate_preview, merge_ranges, SearchService};
pub use store::{HistoryStore, StoreConfig};
