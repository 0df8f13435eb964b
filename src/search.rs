//! Debounced, cancellable substring search
//!
//! The service moves Idle → Pending (debounce timer armed) → Searching
//! (worker scans a snapshot) → Idle. A generation counter gives search an
//! effective concurrency of one: results apply only if query and filter are
//! unchanged from when the search was launched; late results from a
//! superseded search are discarded. Matching is plain case-insensitive
//! substring search — the score field is a placeholder, never an ordering.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::interface::{ContentTypeFilter, HighlightRange, ItemId, SearchHit};
use crate::models::ClipboardItem;

/// Quiet window between a query/filter change and the scan.
pub(crate) const SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

/// Guard window after `reset` suppressing the next debounce-armed scan.
pub(crate) const RESET_GUARD: Duration = Duration::from_millis(400);

/// Candidate cap: only the first N items (after filtering) are scanned.
pub(crate) const MAX_CANDIDATES: usize = 100;

/// Placeholder match score carried for future ranking work.
const PLACEHOLDER_SCORE: f64 = 1.0;

/// Provides the worker a consistent snapshot of the item collections in
/// canonical order (pinned ++ history) without holding the store lock
/// during the scan.
pub(crate) type SnapshotFn = Arc<dyn Fn() -> Vec<ClipboardItem> + Send + Sync>;

#[derive(Default)]
struct SearchState {
    query: String,
    filter: ContentTypeFilter,
    hits: Vec<SearchHit>,
    generation: u64,
    suppress_until: Option<Instant>,
    active: Option<CancellationToken>,
}

/// One explicit instance per store, constructed at startup — no globals.
pub struct SearchService {
    state: Arc<Mutex<SearchState>>,
    snapshot: SnapshotFn,
    runtime: tokio::runtime::Handle,
}

impl SearchService {
    pub(crate) fn new(snapshot: SnapshotFn, runtime: tokio::runtime::Handle) -> Self {
        Self {
            state: Arc::new(Mutex::new(SearchState::default())),
            snapshot,
            runtime,
        }
    }

    pub fn set_query(&self, query: &str) {
        {
            let mut state = self.state.lock();
            state.query = query.to_string();
            state.suppress_until = None;
        }
        self.trigger();
    }

    pub fn set_filter(&self, filter: ContentTypeFilter) {
        {
            let mut state = self.state.lock();
            state.filter = filter;
            state.suppress_until = None;
        }
        self.trigger();
    }

    /// Clear query, filter and results immediately. Arms the guard window
    /// so a debounce timer already in flight from the prior query cannot
    /// fire a stale search on top of the cleared state.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.query.clear();
        state.filter = ContentTypeFilter::All;
        state.hits.clear();
        state.generation += 1;
        state.suppress_until = Some(Instant::now() + RESET_GUARD);
        if let Some(token) = state.active.take() {
            token.cancel();
        }
    }

    /// Re-run the active query against the current item set (after bulk
    /// mutations), or clear results when no query is active.
    pub(crate) fn refresh(&self) {
        let has_query = {
            let mut state = self.state.lock();
            if state.query.trim().is_empty() {
                state.hits.clear();
                state.generation += 1;
                false
            } else {
                true
            }
        };
        if has_query {
            self.trigger();
        }
    }

    pub fn query(&self) -> String {
        self.state.lock().query.clone()
    }

    pub fn filter(&self) -> ContentTypeFilter {
        self.state.lock().filter
    }

    pub fn hits(&self) -> Vec<SearchHit> {
        self.state.lock().hits.clone()
    }

    pub fn hit_for(&self, id: ItemId) -> Option<SearchHit> {
        self.state.lock().hits.iter().find(|h| h.item_id == id).cloned()
    }

    /// Drop any pending result for a deleted item.
    pub(crate) fn remove_hit(&self, id: ItemId) {
        self.state.lock().hits.retain(|h| h.item_id != id);
    }

    /// Arm the debounce timer. The timer's generation must still be current
    /// when it fires, and again when the scan completes, for results to
    /// apply.
    fn trigger(&self) {
        let (my_generation, token) = {
            let mut state = self.state.lock();
            state.generation += 1;
            if let Some(prev) = state.active.take() {
                prev.cancel();
            }
            let token = CancellationToken::new();
            state.active = Some(token.clone());
            (state.generation, token)
        };

        let state = Arc::clone(&self.state);
        let snapshot = Arc::clone(&self.snapshot);
        let runtime = self.runtime.clone();

        self.runtime.spawn(async move {
            tokio::time::sleep(SEARCH_DEBOUNCE).await;

            let (query, filter) = {
                let mut guard = state.lock();
                if guard.generation != my_generation {
                    return;
                }
                if let Some(until) = guard.suppress_until {
                    if Instant::now() < until {
                        return;
                    }
                }
                let query = guard.query.trim().to_string();
                if query.is_empty() {
                    guard.hits.clear();
                    return;
                }
                (query, guard.filter)
            };

            let items = snapshot();
            tracing::debug!(query = %query, candidates = items.len(), "search launched");

            let scan_token = token.clone();
            let scanned = runtime
                .spawn_blocking(move || scan_items(&items, &query, filter, &scan_token))
                .await
                .unwrap_or_default();

            let mut guard = state.lock();
            if guard.generation == my_generation && !token.is_cancelled() {
                guard.hits = scanned;
                guard.active = None;
            }
        });
    }
}

/// Case-insensitive substring scan over the first `MAX_CANDIDATES` items
/// passing the filter. Produces the single matched range per item; merging
/// for display is the consumer's job via `merge_ranges`.
pub(crate) fn scan_items(
    items: &[ClipboardItem],
    query: &str,
    filter: ContentTypeFilter,
    token: &CancellationToken,
) -> Vec<SearchHit> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }

    let mut hits = Vec::new();
    for item in items
        .iter()
        .filter(|i| filter.matches(i.kind()))
        .take(MAX_CANDIDATES)
    {
        if token.is_cancelled() {
            break;
        }
        let haystack = item.searchable_text().to_lowercase();
        if let Some(pos) = haystack.find(&needle) {
            hits.push(SearchHit {
                item_id: item.id,
                score: PLACEHOLDER_SCORE,
                ranges: vec![HighlightRange {
                    start: pos,
                    end: pos + needle.len(),
                }],
            });
        }
    }
    hits
}

/// Merge overlapping or adjacent ranges into non-overlapping spans for
/// display.
pub fn merge_ranges(ranges: &[HighlightRange]) -> Vec<HighlightRange> {
    if ranges.is_empty() {
        return Vec::new();
    }

    let mut sorted = ranges.to_vec();
    sorted.sort_unstable_by_key(|r| r.start);

    let mut merged = vec![sorted[0]];
    for range in &sorted[1..] {
        let last = merged.last_mut().unwrap();
        if range.start <= last.end {
            last.end = last.end.max(range.end);
        } else {
            merged.push(*range);
        }
    }
    merged
}

/// Generate a preview from content: leading whitespace trimmed, internal
/// whitespace runs collapsed to single spaces, capped at `max_chars`.
pub fn generate_preview(content: &str, max_chars: usize) -> String {
    let mut preview = String::with_capacity(max_chars.min(content.len()));
    let mut last_was_space = false;

    for ch in content.trim_start().chars() {
        if preview.chars().count() >= max_chars {
            break;
        }
        let ch = match ch {
            '\n' | '\t' | '\r' => ' ',
            c => c,
        };
        if ch == ' ' {
            if last_was_space {
                continue;
            }
            last_was_space = true;
        } else {
            last_was_space = false;
        }
        preview.push(ch);
    }

    if preview.ends_with(' ') {
        preview.pop();
    }
    preview
}
