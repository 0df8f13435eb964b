//! Core data models for ClipStash
//!
//! `ClipboardItem` is immutable by convention: only `pinned` and `tags` are
//! mutated in place after creation. Content equality for duplicate
//! suppression goes through kind-dispatched fingerprints, never identifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::interface::{ClipboardContent, ItemId, ItemKind};

/// Character prefix compared when deduplicating text items.
pub(crate) const DEDUP_TEXT_PREFIX_CHARS: usize = 100;

/// Bounded prefix sampled when fingerprinting image bytes.
const IMAGE_SAMPLE_PREFIX_BYTES: usize = 64 * 1024;
/// Sampling stride within the prefix.
const IMAGE_SAMPLE_STRIDE: usize = 64;

// ─────────────────────────────────────────────────────────────────────────────
// ITEM
// ─────────────────────────────────────────────────────────────────────────────

/// A captured clipboard snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipboardItem {
    pub id: ItemId,
    #[serde(flatten)]
    pub content: ClipboardContent,
    pub created_at: DateTime<Utc>,
    pub pinned: bool,
    /// Tag names. Set semantics, but insertion order is kept so display
    /// order stays stable.
    #[serde(default)]
    pub tags: Vec<String>,
    pub source_app: Option<String>,
}

impl ClipboardItem {
    pub fn new(content: ClipboardContent, source_app: Option<String>) -> Self {
        Self {
            id: ItemId::new(),
            content,
            created_at: Utc::now(),
            pinned: false,
            tags: Vec::new(),
            source_app,
        }
    }

    pub fn kind(&self) -> ItemKind {
        self.content.kind()
    }

    /// Concatenated searchable text: payload text, file paths and tags.
    pub fn searchable_text(&self) -> String {
        let mut text = self.content.text_content();
        for tag in &self.tags {
            text.push('\n');
            text.push_str(tag);
        }
        text
    }

    /// Display text (truncated, normalized whitespace) for list previews.
    pub fn display_text(&self, max_chars: usize) -> String {
        crate::search::generate_preview(&self.content.text_content(), max_chars)
    }

    /// Kind-dispatched content fingerprint used for duplicate suppression.
    pub fn fingerprint(&self) -> Fingerprint {
        match &self.content {
            ClipboardContent::Text { value } => {
                Fingerprint::Text(value.chars().take(DEDUP_TEXT_PREFIX_CHARS).collect())
            }
            ClipboardContent::Url { value } => Fingerprint::Url(value.clone()),
            ClipboardContent::Image { data, .. } => Fingerprint::Image {
                len: data.len(),
                checksum: sampled_checksum(data),
            },
            ClipboardContent::FileList { paths } => Fingerprint::FileList(paths.clone()),
        }
    }

    /// Idempotently add a tag, preserving insertion order.
    pub(crate) fn add_tag(&mut self, name: &str) {
        if !self.tags.iter().any(|t| t == name) {
            self.tags.push(name.to_string());
        }
    }

    pub(crate) fn remove_tag(&mut self, name: &str) {
        self.tags.retain(|t| t != name);
    }
}

/// Cheap content-derived equality value. Text is bounded to a prefix and
/// images to a sampled checksum so dedup never walks full payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fingerprint {
    Text(String),
    Url(String),
    Image { len: usize, checksum: u64 },
    FileList(Vec<String>),
}

/// FNV-style checksum over every `IMAGE_SAMPLE_STRIDE`-th byte of the first
/// `IMAGE_SAMPLE_PREFIX_BYTES` bytes.
fn sampled_checksum(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in data
        .iter()
        .take(IMAGE_SAMPLE_PREFIX_BYTES)
        .step_by(IMAGE_SAMPLE_STRIDE)
    {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

// ─────────────────────────────────────────────────────────────────────────────
// TAGS
// ─────────────────────────────────────────────────────────────────────────────

/// A user-visible tag with a display color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub color: String,
}

impl Tag {
    pub fn new(name: &str, color: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            color: color.to_string(),
        }
    }
}

/// Fixed default set seeding a fresh store.
pub fn default_tags() -> Vec<Tag> {
    vec![
        Tag::new("Important", "#E06C75"),
        Tag::new("Work", "#61AFEF"),
        Tag::new("Personal", "#98C379"),
        Tag::new("Snippets", "#C678DD"),
    ]
}

// ─────────────────────────────────────────────────────────────────────────────
// SERDE HELPERS
// ─────────────────────────────────────────────────────────────────────────────

/// Base64 (de)serialization for image bytes inside the JSON snapshot.
pub(crate) mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
