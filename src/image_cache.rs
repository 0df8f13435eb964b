//! Bounded LRU cache of decoded images
//!
//! Decoded payloads are held under both an entry-count ceiling and a total
//! decoded-byte ceiling, with strict least-recently-used eviction over
//! lookups and inserts. Decoding and downsampling run off the latency
//! critical path on blocking workers; per item id at most one decode is in
//! flight — a newer request replaces and cancels the older one.
//!
//! The inner maps sit behind a mutex: the cache is reachable from the owner
//! thread (synchronous lookups) and from decode completions on workers.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use image::GenericImageView;
use parking_lot::Mutex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::interface::ItemId;

/// Entry-count ceiling.
pub(crate) const MAX_ENTRIES: usize = 50;
/// Total decoded-byte ceiling.
pub(crate) const MAX_TOTAL_BYTES: usize = 50 * 1024 * 1024;
/// A single image estimated above this is never cached.
pub(crate) const MAX_SINGLE_BYTES: usize = 10 * 1024 * 1024;
/// Longer-edge cap; larger images are scaled down preserving aspect ratio.
pub(crate) const DOWNSAMPLE_EDGE: u32 = 800;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Image decode failed: {0}")]
    Decode(String),
    #[error("Decode cancelled")]
    Cancelled,
}

/// A decoded RGBA bitmap ready for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl DecodedImage {
    /// Estimated in-memory size: pixel dimensions × 4 bytes (RGBA), not
    /// compressed byte size.
    pub fn estimated_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

#[derive(Default)]
struct CacheInner {
    map: HashMap<ItemId, Arc<DecodedImage>>,
    /// LRU order, least recently used at the front.
    order: VecDeque<ItemId>,
    total_bytes: usize,
}

impl CacheInner {
    fn touch(&mut self, id: ItemId) {
        self.order.retain(|entry| *entry != id);
        self.order.push_back(id);
    }

    fn remove(&mut self, id: ItemId) {
        if let Some(image) = self.map.remove(&id) {
            self.total_bytes -= image.estimated_bytes();
            self.order.retain(|entry| *entry != id);
        }
    }

    fn evict_one(&mut self) {
        if let Some(oldest) = self.order.pop_front() {
            if let Some(image) = self.map.remove(&oldest) {
                self.total_bytes -= image.estimated_bytes();
                tracing::debug!(id = %oldest, "evicted decoded image");
            }
        }
    }
}

/// One explicit instance per app, constructed at startup and handed to all
/// consumers — no hidden global.
pub struct ImageCache {
    inner: Mutex<CacheInner>,
    in_flight: Mutex<HashMap<ItemId, (u64, CancellationToken)>>,
    next_job: std::sync::atomic::AtomicU64,
    runtime: tokio::runtime::Handle,
}

impl ImageCache {
    pub fn new(runtime: tokio::runtime::Handle) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            in_flight: Mutex::new(HashMap::new()),
            next_job: std::sync::atomic::AtomicU64::new(0),
            runtime,
        }
    }

    /// Synchronous lookup. A hit counts as a use for LRU purposes.
    pub fn get(&self, id: ItemId) -> Option<Arc<DecodedImage>> {
        let mut inner = self.inner.lock();
        let image = inner.map.get(&id).cloned()?;
        inner.touch(id);
        Some(image)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().map.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.inner.lock().total_bytes
    }

    /// Insert a decoded image, enforcing both ceilings. Oversized images are
    /// rejected outright, never evicted-to-fit; the caller recomputes on the
    /// next access.
    pub(crate) fn insert(&self, id: ItemId, image: Arc<DecodedImage>) {
        let size = image.estimated_bytes();
        if size > MAX_SINGLE_BYTES {
            tracing::debug!(id = %id, size, "image over single-item cap, not cached");
            return;
        }

        let mut inner = self.inner.lock();
        inner.remove(id);
        while !inner.order.is_empty()
            && (inner.map.len() >= MAX_ENTRIES || inner.total_bytes + size > MAX_TOTAL_BYTES)
        {
            inner.evict_one();
        }
        inner.total_bytes += size;
        inner.map.insert(id, image);
        inner.order.push_back(id);
    }

    /// Decode `bytes` for `id` off the critical path, downsampling images
    /// whose longer edge exceeds `DOWNSAMPLE_EDGE`. Returns the cached image
    /// immediately on a hit; otherwise any prior in-flight decode for the
    /// same id is cancelled and replaced.
    pub async fn load(&self, id: ItemId, bytes: Vec<u8>) -> Result<Arc<DecodedImage>, CacheError> {
        if let Some(image) = self.get(id) {
            return Ok(image);
        }

        let job = self
            .next_job
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let token = CancellationToken::new();
        {
            let mut in_flight = self.in_flight.lock();
            if let Some((_, prev)) = in_flight.insert(id, (job, token.clone())) {
                prev.cancel();
            }
        }

        let decode_token = token.clone();
        let joined = self
            .runtime
            .spawn_blocking(move || decode_and_downsample(&bytes, &decode_token))
            .await;

        {
            let mut in_flight = self.in_flight.lock();
            if in_flight.get(&id).map(|(j, _)| *j) == Some(job) {
                in_flight.remove(&id);
            }
        }

        if token.is_cancelled() {
            return Err(CacheError::Cancelled);
        }

        let image = Arc::new(joined.map_err(|_| CacheError::Cancelled)??);
        self.insert(id, Arc::clone(&image));
        Ok(image)
    }

    /// Cancel any in-flight decode for `id`. Safe with no job in flight.
    pub fn cancel(&self, id: ItemId) {
        if let Some((_, token)) = self.in_flight.lock().remove(&id) {
            token.cancel();
        }
    }

    /// Drop a cached entry (item deleted).
    pub(crate) fn remove(&self, id: ItemId) {
        self.inner.lock().remove(id);
    }
}

fn decode_and_downsample(bytes: &[u8], token: &CancellationToken) -> Result<DecodedImage, CacheError> {
    if token.is_cancelled() {
        return Err(CacheError::Cancelled);
    }

    let decoded =
        image::load_from_memory(bytes).map_err(|e| CacheError::Decode(e.to_string()))?;

    if token.is_cancelled() {
        return Err(CacheError::Cancelled);
    }

    let (width, height) = decoded.dimensions();
    let decoded = if width.max(height) > DOWNSAMPLE_EDGE {
        decoded.resize(
            DOWNSAMPLE_EDGE,
            DOWNSAMPLE_EDGE,
            image::imageops::FilterType::Triangle,
        )
    } else {
        decoded
    };

    let rgba = decoded.to_rgba8();
    Ok(DecodedImage {
        width: rgba.width(),
        height: rgba.height(),
        rgba: rgba.into_raw(),
    })
}
