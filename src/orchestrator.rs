use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::api::{MatchSource, SportsQuery};
use crate::config::Config;
use crate::countdown::{CountdownHandle, CountdownScheduler, CountdownTarget, CountdownUpdate};
use crate::error::ApiError;
use crate::filter::{CommitOutcome, FilterSelection, FilterStore};
use crate::model::{Match, Page, Sport, TournamentListing, all_tournaments};
use crate::pagination::{PageStatus, PaginationController, PaginationSnapshot};
use crate::query_cache::{CacheKey, QueryCache, QueryKey};
use crate::time_source::{TimeSource, ZonedComponents};

/// Screen-level glue for the match list: the applied filter picks the query
/// key, the pagination controller fills the list, and each visible row
/// subscribes to the shared countdown scheduler.
pub struct MatchListOrchestrator {
    config: Config,
    clock: Arc<dyn TimeSource>,
    source: Arc<dyn MatchSource>,
    match_cache: QueryCache<Page>,
    sports_cache: QueryCache<Vec<Sport>>,
    filters: FilterStore,
    pagination: Arc<PaginationController>,
    countdown: CountdownScheduler,
}

impl MatchListOrchestrator {
    pub fn new(config: Config, source: Arc<dyn MatchSource>, clock: Arc<dyn TimeSource>) -> Self {
        let countdown = CountdownScheduler::new(Arc::clone(&clock), config.tick_interval());
        Self::with_scheduler(config, source, clock, countdown)
    }

    /// Same as [`new`](Self::new) but with a caller-supplied scheduler, e.g. a
    /// manually ticked one.
    pub fn with_scheduler(
        config: Config,
        source: Arc<dyn MatchSource>,
        clock: Arc<dyn TimeSource>,
        countdown: CountdownScheduler,
    ) -> Self {
        let match_cache = QueryCache::new(Arc::clone(&clock));
        let sports_cache = QueryCache::new(Arc::clone(&clock));
        let pagination = Arc::new(PaginationController::new(
            match_cache.clone(),
            Arc::clone(&source),
            Arc::clone(&clock),
            config.match_policy(),
            config.page_size,
        ));
        Self { config, clock, source, match_cache, sports_cache, filters: FilterStore::new(), pagination, countdown }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn filters(&self) -> &FilterStore {
        &self.filters
    }

    pub fn match_cache(&self) -> &QueryCache<Page> {
        &self.match_cache
    }

    pub fn countdown(&self) -> &CountdownScheduler {
        &self.countdown
    }

    fn key_for(&self, applied: &FilterSelection) -> QueryKey {
        QueryKey::matches(&self.config.timezone, self.config.status, applied.applied.iter().copied())
    }

    /// Key derived from the currently applied filter.
    pub fn current_key(&self) -> QueryKey {
        self.key_for(&self.filters.snapshot())
    }

    /// Point the list at the applied filter and load the first page.
    pub async fn start(&self) -> PageStatus {
        self.pagination.set_query(self.current_key());
        self.pagination.load_first().await
    }

    pub fn snapshot(&self) -> PaginationSnapshot {
        self.pagination.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<PaginationSnapshot> {
        self.pagination.subscribe()
    }

    pub async fn load_more(&self) -> PageStatus {
        self.pagination.load_next().await
    }

    pub async fn refresh(&self) -> PageStatus {
        self.pagination.refresh().await
    }

    /// Open the filter sheet: pending starts as a copy of applied.
    pub fn begin_filter_edit(&self) {
        self.filters.begin_edit();
    }

    pub fn toggle_tournament(&self, tournament_id: u64) {
        self.filters.toggle(tournament_id);
    }

    /// Commit the pending selection. Only a change to `applied` switches the
    /// query key, drops the old key's cached pages and loads again; an
    /// unchanged commit costs nothing.
    #[instrument(level = "info", skip(self))]
    pub async fn apply_filters(&self) -> CommitOutcome {
        let outcome = self.filters.commit();
        if outcome.changed() {
            self.switch_key().await;
        }
        outcome
    }

    /// Clear both pending and applied selections.
    pub async fn clear_filters(&self) {
        let was_active = self.filters.is_active();
        self.filters.reset();
        if was_active {
            self.switch_key().await;
        }
    }

    async fn switch_key(&self) {
        let next = self.current_key();
        if let Some(previous) = self.pagination.key().filter(|k| *k != next) {
            self.match_cache.invalidate(|k| k.query == previous);
        }
        if self.pagination.set_query(next) {
            self.pagination.load_first().await;
        }
    }

    /// Sports with their tournaments for the filter sheet.
    pub async fn sports(&self, search: Option<&str>) -> Result<Arc<Vec<Sport>>, ApiError> {
        let key = CacheKey::new(QueryKey::tournaments(search), 0);
        let query = SportsQuery {
            search: key.query.search().map(str::to_string),
            limit: self.config.tournament_page_size,
            offset: 0,
        };
        let source = Arc::clone(&self.source);
        self.sports_cache
            .fetch(key, move || async move { source.fetch_sports(&query).await }, self.config.tournament_policy())
            .await
    }

    pub async fn tournaments(&self, search: Option<&str>) -> Result<Vec<TournamentListing>, ApiError> {
        Ok(all_tournaments(&self.sports(search).await?))
    }

    pub async fn tournament(&self, id: u64) -> Result<TournamentListing, ApiError> {
        self.tournaments(None)
            .await?
            .into_iter()
            .find(|t| t.id == id)
            .ok_or_else(|| ApiError::not_found(format!("tournament {}", id)))
    }

    /// Look a match up in the loaded list.
    pub fn find_match(&self, id: u64) -> Result<Match, ApiError> {
        self.pagination
            .matches()
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("match {}", id)))
    }

    /// Kickoff in the match's own timezone; `None` when it can't be parsed.
    pub fn kickoff(&self, m: &Match) -> Option<ZonedComponents> {
        self.clock.to_zoned(&m.start_time, &m.timezone)
    }

    /// Subscribe one row to the shared countdown. Drop or cancel the handle
    /// when the row goes away.
    pub fn watch_countdown<F>(&self, m: &Match, callback: F) -> CountdownHandle
    where
        F: FnMut(&CountdownUpdate) + Send + 'static,
    {
        self.countdown.subscribe(CountdownTarget::for_match(m), callback)
    }

    /// Fold background cache refreshes into the visible list until the
    /// returned task is aborted.
    pub fn spawn_cache_sync(&self) -> JoinHandle<()> {
        let mut events = self.match_cache.subscribe();
        let pagination = Arc::clone(&self.pagination);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(key) => {
                        if pagination.sync_from_cache(&key) {
                            debug!(key = %key, "List updated from cache");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Cache sync lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Cache closed; stopping sync");
                        break;
                    }
                }
            }
        })
    }
}
