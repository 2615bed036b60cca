//! Infinite-scroll pagination over the match list.
//!
//! One controller follows one active [`QueryKey`] at a time. Pages go through
//! the shared [`QueryCache`] (one cache entry per offset) and are stitched
//! into a flat list deduplicated by match id.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::api::{MatchQuery, MatchSource};
use crate::error::ApiError;
use crate::model::{Match, Page};
use crate::query_cache::{CacheKey, CachePolicy, QueryCache, QueryKey};
use crate::time_source::TimeSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    Idle,
    LoadingFirst,
    Ready,
    LoadingMore,
    Error,
}

/// What observers see after every state change.
#[derive(Debug, Clone)]
pub struct PaginationSnapshot {
    pub key: Option<QueryKey>,
    pub status: PageStatus,
    pub matches: Arc<Vec<Match>>,
    pub total: Option<u32>,
    pub has_more: bool,
    pub pages_loaded: usize,
    pub error: Option<ApiError>,
}

impl PaginationSnapshot {
    fn empty() -> Self {
        Self {
            key: None,
            status: PageStatus::Idle,
            matches: Arc::new(Vec::new()),
            total: None,
            has_more: false,
            pages_loaded: 0,
            error: None,
        }
    }

    /// Failed before anything was loaded: the whole view shows a retry.
    pub fn is_first_load_error(&self) -> bool {
        self.status == PageStatus::Error && self.matches.is_empty()
    }

    /// Failed while loading more: keep the list, show an inline retry.
    pub fn is_incremental_error(&self) -> bool {
        self.status == PageStatus::Error && !self.matches.is_empty()
    }
}

#[derive(Debug, Clone)]
struct LoadedPage {
    offset: u32,
    fetched_at: DateTime<Utc>,
    page: Arc<Page>,
}

struct ControllerState {
    key: Option<QueryKey>,
    /// Bumped whenever the key changes or the list restarts; a response
    /// carrying an older generation is dropped.
    generation: u64,
    status: PageStatus,
    pages: Vec<LoadedPage>,
    matches: Arc<Vec<Match>>,
    error: Option<ApiError>,
}

impl ControllerState {
    fn has_more(&self) -> bool {
        self.pages.last().is_some_and(|p| p.page.has_more())
    }

    fn total(&self) -> Option<u32> {
        self.pages.iter().rev().find_map(|p| p.page.total)
    }

    fn clear(&mut self) {
        self.pages.clear();
        self.matches = Arc::new(Vec::new());
        self.error = None;
    }

    fn snapshot(&self) -> PaginationSnapshot {
        PaginationSnapshot {
            key: self.key.clone(),
            status: self.status,
            matches: Arc::clone(&self.matches),
            total: self.total(),
            has_more: self.has_more(),
            pages_loaded: self.pages.len(),
            error: self.error.clone(),
        }
    }
}

/// Concatenate pages in offset order and deduplicate by id. A repeated id
/// keeps the slot of its first occurrence and the fields of the most recently
/// fetched copy.
fn assemble(pages: &[LoadedPage]) -> Vec<Match> {
    let mut out: Vec<Match> = Vec::new();
    let mut seen: HashMap<u64, (usize, DateTime<Utc>)> = HashMap::new();
    for loaded in pages {
        for m in &loaded.page.matches {
            match seen.get_mut(&m.id) {
                Some((slot, fetched_at)) => {
                    if loaded.fetched_at >= *fetched_at {
                        out[*slot] = m.clone();
                        *fetched_at = loaded.fetched_at;
                    }
                }
                None => {
                    seen.insert(m.id, (out.len(), loaded.fetched_at));
                    out.push(m.clone());
                }
            }
        }
    }
    out
}

/// Returns the controller to a resting state when a load future is dropped
/// before it settles. The cache load itself keeps running.
struct LoadGuard<'a> {
    controller: &'a PaginationController,
    generation: u64,
    settled: bool,
}

impl<'a> LoadGuard<'a> {
    fn new(controller: &'a PaginationController, generation: u64) -> Self {
        Self { controller, generation, settled: false }
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.controller.state.lock();
        if state.generation != self.generation {
            return;
        }
        let resting = match state.status {
            PageStatus::LoadingFirst => PageStatus::Idle,
            PageStatus::LoadingMore => PageStatus::Ready,
            _ => return,
        };
        debug!(from = ?state.status, to = ?resting, "Page load abandoned before settling");
        state.status = resting;
        self.controller.publish(&state);
    }
}

pub struct PaginationController {
    cache: QueryCache<Page>,
    source: Arc<dyn MatchSource>,
    clock: Arc<dyn TimeSource>,
    policy: CachePolicy,
    page_size: u32,
    state: Mutex<ControllerState>,
    updates: watch::Sender<PaginationSnapshot>,
}

impl PaginationController {
    pub fn new(
        cache: QueryCache<Page>,
        source: Arc<dyn MatchSource>,
        clock: Arc<dyn TimeSource>,
        policy: CachePolicy,
        page_size: u32,
    ) -> Self {
        let (updates, _) = watch::channel(PaginationSnapshot::empty());
        Self {
            cache,
            source,
            clock,
            policy,
            page_size,
            state: Mutex::new(ControllerState {
                key: None,
                generation: 0,
                status: PageStatus::Idle,
                pages: Vec::new(),
                matches: Arc::new(Vec::new()),
                error: None,
            }),
            updates,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PaginationSnapshot> {
        self.updates.subscribe()
    }

    pub fn snapshot(&self) -> PaginationSnapshot {
        self.state.lock().snapshot()
    }

    pub fn status(&self) -> PageStatus {
        self.state.lock().status
    }

    pub fn key(&self) -> Option<QueryKey> {
        self.state.lock().key.clone()
    }

    pub fn matches(&self) -> Arc<Vec<Match>> {
        Arc::clone(&self.state.lock().matches)
    }

    fn publish(&self, state: &ControllerState) {
        self.updates.send_replace(state.snapshot());
    }

    /// Make `key` the active query. A different key resets to `Idle` with an
    /// empty list; responses still in flight for the old key are discarded
    /// when they land. Returns whether the key changed.
    pub fn set_query(&self, key: QueryKey) -> bool {
        let mut state = self.state.lock();
        if state.key.as_ref() == Some(&key) {
            return false;
        }
        info!(key = %key, "Switching match query");
        state.key = Some(key);
        state.generation += 1;
        state.status = PageStatus::Idle;
        state.clear();
        self.publish(&state);
        true
    }

    /// Fetch the first page. Only acts in `Idle`.
    pub async fn load_first(&self) -> PageStatus {
        let (key, generation) = {
            let mut state = self.state.lock();
            let Some(key) = state.key.clone() else {
                return state.status;
            };
            if state.status != PageStatus::Idle {
                return state.status;
            }
            state.status = PageStatus::LoadingFirst;
            self.publish(&state);
            (key, state.generation)
        };
        let mut guard = LoadGuard::new(self, generation);
        let outcome = self.fetch_page(&key, 0).await;
        guard.settled = true;
        self.settle(&key, generation, outcome)
    }

    /// Fetch the page after the last loaded one. A no-op unless the list is
    /// `Ready`, another page is known to exist, and no fetch for that page is
    /// already in flight.
    pub async fn load_next(&self) -> PageStatus {
        let (key, generation, offset) = {
            let mut state = self.state.lock();
            if state.status != PageStatus::Ready || !state.has_more() {
                return state.status;
            }
            let (Some(key), Some(last)) = (state.key.clone(), state.pages.last()) else {
                return state.status;
            };
            let offset = last.page.next_offset();
            if self.cache.is_fetching(&CacheKey::new(key.clone(), offset)) {
                debug!(key = %key, offset, "Next page already in flight");
                return state.status;
            }
            state.status = PageStatus::LoadingMore;
            self.publish(&state);
            (key, state.generation, offset)
        };
        let mut guard = LoadGuard::new(self, generation);
        let outcome = self.fetch_page(&key, offset).await;
        guard.settled = true;
        self.settle(&key, generation, outcome)
    }

    /// Drop every cached page for the active key and start again from
    /// offset 0. The accumulated list is replaced, not appended to.
    pub async fn refresh(&self) -> PageStatus {
        let (key, generation) = {
            let mut state = self.state.lock();
            let Some(key) = state.key.clone() else {
                return state.status;
            };
            state.generation += 1;
            state.status = PageStatus::LoadingFirst;
            state.clear();
            self.publish(&state);
            (key, state.generation)
        };
        self.cache.invalidate(|k| k.query == key);
        let mut guard = LoadGuard::new(self, generation);
        let outcome = self.fetch_page(&key, 0).await;
        guard.settled = true;
        self.settle(&key, generation, outcome)
    }

    /// Fold a newer cached copy of an already loaded page into the list, e.g.
    /// after a background revalidation. Returns whether the list changed.
    pub fn sync_from_cache(&self, cache_key: &CacheKey) -> bool {
        let Some(entry) = self.cache.get(cache_key) else {
            return false;
        };
        let mut state = self.state.lock();
        if state.key.as_ref() != Some(&cache_key.query) {
            return false;
        }
        let Some(loaded) = state.pages.iter_mut().find(|p| p.offset == cache_key.offset) else {
            return false;
        };
        if entry.fetched_at <= loaded.fetched_at {
            return false;
        }
        loaded.page = entry.data;
        loaded.fetched_at = entry.fetched_at;
        state.matches = Arc::new(assemble(&state.pages));
        debug!(key = %cache_key, "Merged revalidated page");
        self.publish(&state);
        true
    }

    #[instrument(level = "debug", skip(self, key), fields(key = %key))]
    async fn fetch_page(&self, key: &QueryKey, offset: u32) -> Result<LoadedPage, ApiError> {
        let cache_key = CacheKey::new(key.clone(), offset);
        let source = Arc::clone(&self.source);
        let query = MatchQuery::from_key(key, offset, self.page_size);
        let page = self
            .cache
            .fetch(cache_key.clone(), move || async move { source.fetch_matches(&query).await }, self.policy)
            .await?;
        let fetched_at = self
            .cache
            .get(&cache_key)
            .filter(|entry| Arc::ptr_eq(&entry.data, &page))
            .map(|entry| entry.fetched_at)
            .unwrap_or_else(|| self.clock.now());
        Ok(LoadedPage { offset, fetched_at, page })
    }

    fn settle(&self, key: &QueryKey, generation: u64, outcome: Result<LoadedPage, ApiError>) -> PageStatus {
        let mut state = self.state.lock();
        if state.generation != generation || state.key.as_ref() != Some(key) {
            debug!(key = %key, "Discarding page for an inactive query");
            return state.status;
        }
        match outcome {
            Ok(loaded) => {
                info!(key = %key, offset = loaded.offset, returned = loaded.page.matches.len(), "Page loaded");
                match state.pages.iter().position(|p| p.offset == loaded.offset) {
                    Some(i) => state.pages[i] = loaded,
                    None => {
                        state.pages.push(loaded);
                        state.pages.sort_by_key(|p| p.offset);
                    }
                }
                state.matches = Arc::new(assemble(&state.pages));
                state.status = PageStatus::Ready;
                state.error = None;
            }
            Err(e) => {
                warn!(key = %key, error = %e, loaded = state.matches.len(), "Page fetch failed");
                state.status = PageStatus::Error;
                state.error = Some(e);
            }
        }
        self.publish(&state);
        state.status
    }
}
