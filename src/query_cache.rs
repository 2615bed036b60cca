//! Key/value store for fetched data with staleness, retention and request
//! coalescing.
//!
//! A key has at most one loader in flight. Concurrent callers asking for the
//! same key while it is loading share the same [`Shared`] future, so N
//! subscribers cost one network call. Stale entries are served immediately
//! while a background task revalidates them.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::time_source::TimeSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Upcoming,
    Live,
    Completed,
}

impl StatusFilter {
    /// Value for the `status` query parameter; `None` when unfiltered.
    pub fn as_query_param(&self) -> Option<&'static str> {
        match self {
            StatusFilter::All => None,
            StatusFilter::Upcoming => Some("upcoming"),
            StatusFilter::Live => Some("live"),
            StatusFilter::Completed => Some("completed"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.as_query_param().unwrap_or("all")
    }
}

impl std::str::FromStr for StatusFilter {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(StatusFilter::All),
            "upcoming" => Ok(StatusFilter::Upcoming),
            "live" => Ok(StatusFilter::Live),
            "completed" => Ok(StatusFilter::Completed),
            other => Err(ApiError::parse(format!("unknown status filter '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Matches,
    Tournaments,
}

/// Identifies one parameterised request, independent of the page offset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    kind: QueryKind,
    timezone: String,
    status: StatusFilter,
    tournament_ids: Vec<u64>,
    search: Option<String>,
}

impl QueryKey {
    /// Key for the match list. Tournament ids are sorted and deduplicated so
    /// the same selection always yields the same key.
    pub fn matches<I>(timezone: &str, status: StatusFilter, tournament_ids: I) -> Self
    where
        I: IntoIterator<Item = u64>,
    {
        let mut ids: Vec<u64> = tournament_ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        Self { kind: QueryKind::Matches, timezone: timezone.to_string(), status, tournament_ids: ids, search: None }
    }

    pub fn tournaments(search: Option<&str>) -> Self {
        let search = search.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        Self { kind: QueryKind::Tournaments, timezone: String::new(), status: StatusFilter::All, tournament_ids: Vec::new(), search }
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    pub fn timezone(&self) -> &str {
        &self.timezone
    }

    pub fn status(&self) -> StatusFilter {
        self.status
    }

    pub fn tournament_ids(&self) -> &[u64] {
        &self.tournament_ids
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    /// Hash of the key; identical for identical parameters within one build.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            QueryKind::Matches => {
                let ids: Vec<String> = self.tournament_ids.iter().map(u64::to_string).collect();
                write!(f, "matches|{}|{}|{}", self.timezone, self.status.as_str(), ids.join(","))
            }
            QueryKind::Tournaments => write!(f, "tournaments|{}", self.search.as_deref().unwrap_or("")),
        }
    }
}

/// A query key plus the page offset it covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub query: QueryKey,
    pub offset: u32,
}

impl CacheKey {
    pub fn new(query: QueryKey, offset: u32) -> Self {
        Self { query, offset }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.query, self.offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Age below which an entry is served without revalidation.
    pub stale_time: Duration,
    /// Idle time after which an entry may be swept.
    pub retention: Duration,
}

impl CachePolicy {
    pub fn new(stale_time: Duration, retention: Duration) -> Self {
        Self { stale_time, retention }
    }
}

/// Snapshot of one entry as seen by readers.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub key: CacheKey,
    pub data: Arc<T>,
    pub fetched_at: DateTime<Utc>,
    pub is_fetching: bool,
}

type SharedLoad<T> = Shared<BoxFuture<'static, Result<Arc<T>, ApiError>>>;

struct StoredEntry<T> {
    data: Arc<T>,
    fetched_at: DateTime<Utc>,
    last_access: DateTime<Utc>,
    retention: Duration,
}

struct InFlight<T> {
    id: u64,
    load: SharedLoad<T>,
}

struct CacheState<T> {
    entries: HashMap<CacheKey, StoredEntry<T>>,
    in_flight: HashMap<CacheKey, InFlight<T>>,
    next_load_id: u64,
}

/// Process-wide query cache. Cloning shares the same store.
pub struct QueryCache<T> {
    state: Arc<Mutex<CacheState<T>>>,
    clock: Arc<dyn TimeSource>,
    events: broadcast::Sender<CacheKey>,
}

impl<T> Clone for QueryCache<T> {
    fn clone(&self) -> Self {
        Self { state: Arc::clone(&self.state), clock: Arc::clone(&self.clock), events: self.events.clone() }
    }
}

enum Plan<T> {
    Fresh(Arc<T>),
    Stale(Arc<T>, bool),
    Wait(SharedLoad<T>),
}

fn age(now: DateTime<Utc>, then: DateTime<Utc>) -> Duration {
    (now - then).to_std().unwrap_or_default()
}

impl<T> QueryCache<T>
where
    T: Send + Sync + 'static,
{
    pub fn new(clock: Arc<dyn TimeSource>) -> Self {
        let (events, _) = broadcast::channel(64);
        let state = CacheState { entries: HashMap::new(), in_flight: HashMap::new(), next_load_id: 0 };
        Self { state: Arc::new(Mutex::new(state)), clock, events }
    }

    /// Current entry for `key`, if any. Counts as an access for retention.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry<T>> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let is_fetching = state.in_flight.contains_key(key);
        let entry = state.entries.get_mut(key)?;
        entry.last_access = now;
        Some(CacheEntry { key: key.clone(), data: Arc::clone(&entry.data), fetched_at: entry.fetched_at, is_fetching })
    }

    pub fn is_fetching(&self, key: &CacheKey) -> bool {
        self.state.lock().in_flight.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receive the key of every value stored, including background refreshes.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheKey> {
        self.events.subscribe()
    }

    /// Return cached data for `key`, loading it if needed.
    ///
    /// * fresh entry: returned, `loader` is not called.
    /// * stale entry: returned, and a background refresh is started unless one
    ///   is already running.
    /// * no entry: waits for the in-flight load, starting one if none exists.
    ///   A failure reaches every waiter and nothing is cached.
    pub async fn fetch<F, Fut>(&self, key: CacheKey, loader: F, policy: CachePolicy) -> Result<Arc<T>, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        self.sweep();

        let plan = {
            let now = self.clock.now();
            let mut state = self.state.lock();
            let cached = state.entries.get_mut(&key).map(|entry| {
                entry.last_access = now;
                entry.retention = policy.retention;
                (Arc::clone(&entry.data), age(now, entry.fetched_at) < policy.stale_time)
            });
            match cached {
                Some((data, true)) => Plan::Fresh(data),
                Some((data, false)) => {
                    let revalidating = !state.in_flight.contains_key(&key);
                    if revalidating {
                        self.start_load(&mut state, key.clone(), loader(), policy);
                    }
                    Plan::Stale(data, revalidating)
                }
                None => match state.in_flight.get(&key) {
                    Some(in_flight) => {
                        debug!(key = %key, "Joining in-flight load");
                        Plan::Wait(in_flight.load.clone())
                    }
                    None => Plan::Wait(self.start_load(&mut state, key.clone(), loader(), policy)),
                },
            }
        };

        match plan {
            Plan::Fresh(data) => {
                debug!(key = %key, "Serving fresh cache entry");
                Ok(data)
            }
            Plan::Stale(data, revalidating) => {
                if revalidating {
                    debug!(key = %key, "Serving stale entry; revalidating in background");
                } else {
                    debug!(key = %key, "Serving stale entry; revalidation already running");
                }
                Ok(data)
            }
            Plan::Wait(load) => load.await,
        }
    }

    fn start_load<Fut>(&self, state: &mut CacheState<T>, key: CacheKey, load: Fut, policy: CachePolicy) -> SharedLoad<T>
    where
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let id = state.next_load_id;
        state.next_load_id += 1;

        let cache = self.clone();
        let settle_key = key.clone();
        let shared = async move {
            let result = load.await.map(Arc::new);
            cache.settle(&settle_key, id, &result, policy);
            result
        }
        .boxed()
        .shared();

        state.in_flight.insert(key, InFlight { id, load: shared.clone() });
        // Driven by its own task: the load settles even if every caller
        // stops waiting for it.
        tokio::spawn(shared.clone());
        shared
    }

    /// Store the outcome of load `id`, unless the key was invalidated (or
    /// reloaded) while it was running.
    fn settle(&self, key: &CacheKey, id: u64, result: &Result<Arc<T>, ApiError>, policy: CachePolicy) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let owned = state.in_flight.get(key).is_some_and(|current| current.id == id);
        if !owned {
            debug!(key = %key, "Discarding result of superseded load");
            return;
        }
        state.in_flight.remove(key);
        match result {
            Ok(data) => {
                state.entries.insert(
                    key.clone(),
                    StoredEntry { data: Arc::clone(data), fetched_at: now, last_access: now, retention: policy.retention },
                );
                drop(state);
                let _ = self.events.send(key.clone());
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Load failed; nothing cached");
            }
        }
    }

    /// Drop every entry, and forget every in-flight load, whose key matches.
    /// Loads already running finish but their results are discarded.
    pub fn invalidate<P>(&self, predicate: P) -> usize
    where
        P: Fn(&CacheKey) -> bool,
    {
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|key, _| !predicate(key));
        state.in_flight.retain(|key, _| !predicate(key));
        let removed = before - state.entries.len();
        if removed > 0 {
            info!(removed, "Invalidated cache entries");
        }
        removed
    }

    /// Drop entries idle for longer than their retention. Entries with a load
    /// in flight are kept.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let CacheState { entries, in_flight, .. } = &mut *state;
        let before = entries.len();
        entries.retain(|key, entry| in_flight.contains_key(key) || age(now, entry.last_access) < entry.retention);
        let swept = before - entries.len();
        if swept > 0 {
            debug!(swept, "Swept idle cache entries");
        }
        swept
    }
}
