//! ClipStash public interface definitions
//!
//! Shared records, enums, collaborator traits and the top-level error type.
//! This module is the source of truth for the types the presentation layer
//! and the clipboard monitor exchange with the core.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ═══════════════════════════════════════════════════════════════════════════════
// IDENTIFIERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Opaque item identifier, assigned at creation and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENUMS
// ═══════════════════════════════════════════════════════════════════════════════

/// Content category of a captured item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    Text,
    Url,
    Image,
    FileList,
}

/// Typed clipboard payload. Exactly one payload shape per kind — the enum
/// makes the one-payload-per-item rule structural rather than conventional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ClipboardContent {
    Text {
        value: String,
    },
    Url {
        value: String,
    },
    Image {
        #[serde(with = "crate::models::base64_bytes")]
        data: Vec<u8>,
        width: u32,
        height: u32,
    },
    FileList {
        paths: Vec<String>,
    },
}

impl ClipboardContent {
    /// Get the ItemKind for this content
    pub fn kind(&self) -> ItemKind {
        match self {
            ClipboardContent::Text { .. } => ItemKind::Text,
            ClipboardContent::Url { .. } => ItemKind::Url,
            ClipboardContent::Image { .. } => ItemKind::Image,
            ClipboardContent::FileList { .. } => ItemKind::FileList,
        }
    }

    /// The searchable/displayable text content
    pub fn text_content(&self) -> String {
        match self {
            ClipboardContent::Text { value } => value.clone(),
            ClipboardContent::Url { value } => value.clone(),
            ClipboardContent::Image { width, height, .. } => {
                format!("Image {}×{}", width, height)
            }
            ClipboardContent::FileList { paths } => paths.join("\n"),
        }
    }
}

/// Type filter applied to listing and search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentTypeFilter {
    #[default]
    All,
    Text,
    Url,
    Image,
    FileList,
}

impl ContentTypeFilter {
    pub fn matches(&self, kind: ItemKind) -> bool {
        match self {
            ContentTypeFilter::All => true,
            ContentTypeFilter::Text => kind == ItemKind::Text,
            ContentTypeFilter::Url => kind == ItemKind::Url,
            ContentTypeFilter::Image => kind == ItemKind::Image,
            ContentTypeFilter::FileList => kind == ItemKind::FileList,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECORDS
// ═══════════════════════════════════════════════════════════════════════════════

/// A raw clipboard read as delivered by the OS monitor, before classification.
/// Multiple representations may be present; classification picks exactly one
/// in priority order file paths → image → text.
#[derive(Debug, Clone, Default)]
pub struct RawCapture {
    pub file_paths: Vec<String>,
    pub image_bytes: Option<Vec<u8>>,
    pub text: Option<String>,
}

impl RawCapture {
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            text: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn image(bytes: Vec<u8>) -> Self {
        Self {
            image_bytes: Some(bytes),
            ..Self::default()
        }
    }

    pub fn files(paths: Vec<String>) -> Self {
        Self {
            file_paths: paths,
            ..Self::default()
        }
    }
}

/// A half-open character range marking a query match within an item's
/// searchable text (lowercased form).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighlightRange {
    pub start: usize,
    pub end: usize,
}

/// A search match for one item. The score is a placeholder for future
/// ranking work and is never used for ordering today.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub item_id: ItemId,
    pub score: f64,
    pub ranges: Vec<HighlightRange>,
}

/// Events the core pushes to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// All persistence save attempts were exhausted; data loss is possible.
    SaveFailed { message: String },
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLABORATOR TRAITS
// ═══════════════════════════════════════════════════════════════════════════════

/// Clipboard read/write capability the core consumes. The monitor polls
/// `change_count` and hands `read` results to `HistoryStore::capture`;
/// `write` is used for copy-back. Simulating a paste keystroke is an OS
/// integration concern outside the core.
pub trait ClipboardPort: Send + Sync {
    /// Monotonic token that changes whenever the clipboard content changes.
    fn change_count(&self) -> i64;

    /// Read the current clipboard content, if any.
    fn read(&self) -> Option<RawCapture>;

    /// Write content back to the system clipboard.
    fn write(&self, content: &ClipboardContent);
}

/// Best-effort provider of the frontmost application's name.
pub trait SourceAppProvider: Send + Sync {
    fn frontmost_app_name(&self) -> Option<String>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Error type for ClipStash operations that cross the core boundary.
#[derive(Debug, Error)]
pub enum ClipStashError {
    #[error("Persistence error: {0}")]
    Persistence(#[from] crate::persistence::PersistenceError),
    #[error("Image cache error: {0}")]
    Cache(#[from] crate::image_cache::CacheError),
    #[error("Operation cancelled")]
    Cancelled,
}
