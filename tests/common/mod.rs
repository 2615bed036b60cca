#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use kickoff_sync::model::{Match, MatchStatus, Page, Sport, Team, Tournament, TournamentRef};
use kickoff_sync::{ApiError, MatchQuery, MatchSource, SportsQuery, TimeSource};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 8, 0, 0, 0).unwrap()
}

pub fn fixture_match(id: u64, tournament_id: u64, start_time: &str) -> Match {
    Match {
        id,
        match_id: Some(id + 1000),
        match_name: format!("Match {}", id),
        tournament: TournamentRef { id: tournament_id, name: format!("Tournament {}", tournament_id), sport_id: None, sport_name: None },
        home_team: Team { id: id * 2, name: format!("Home {}", id), short_name: String::new(), logo: None, score: None },
        away_team: Team { id: id * 2 + 1, name: format!("Away {}", id), short_name: String::new(), logo: None, score: None },
        status: MatchStatus::Upcoming,
        match_date: None,
        match_time: None,
        start_time: start_time.to_string(),
        timezone: "Australia/Sydney".to_string(),
        venue: None,
    }
}

/// `count` matches with ids `first..`, all in `tournament_id`.
pub fn matches(first: u64, count: u64, tournament_id: u64) -> Vec<Match> {
    (first..first + count).map(|id| fixture_match(id, tournament_id, "2025-03-09T09:00:00Z")).collect()
}

/// A `MatchSource` backed by an in-memory list. Counts calls, can fail on
/// demand and can hold requests behind a gate until the test releases them.
#[derive(Default)]
pub struct ScriptedSource {
    matches: Mutex<Vec<Match>>,
    sports: Mutex<Vec<Sport>>,
    failures: Mutex<VecDeque<ApiError>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    queries: Mutex<Vec<MatchQuery>>,
    match_calls: AtomicUsize,
    sports_calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(matches: Vec<Match>) -> Arc<Self> {
        let source = Self::default();
        *source.matches.lock() = matches;
        *source.sports.lock() = vec![
            Sport {
                id: 4,
                sport_name: "Cricket".to_string(),
                tournaments: vec![Tournament { id: 101, name: "India Test Series".to_string() }],
            },
            Sport {
                id: 8,
                sport_name: "Soccer".to_string(),
                tournaments: vec![
                    Tournament { id: 201, name: "Premier League".to_string() },
                    Tournament { id: 202, name: "La Liga".to_string() },
                ],
            },
        ];
        Arc::new(source)
    }

    pub fn match_calls(&self) -> usize {
        self.match_calls.load(Ordering::SeqCst)
    }

    pub fn sports_calls(&self) -> usize {
        self.sports_calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<MatchQuery> {
        self.queries.lock().clone()
    }

    pub fn set_matches(&self, matches: Vec<Match>) {
        *self.matches.lock() = matches;
    }

    pub fn insert_front(&self, m: Match) {
        self.matches.lock().insert(0, m);
    }

    pub fn rename(&self, id: u64, name: &str) {
        if let Some(m) = self.matches.lock().iter_mut().find(|m| m.id == id) {
            m.match_name = name.to_string();
        }
    }

    /// The next call fails with `error`.
    pub fn fail_next(&self, error: ApiError) {
        self.failures.lock().push_back(error);
    }

    /// Hold every following call until a permit is added to the returned gate.
    pub fn close_gate(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    /// Let following calls through. Calls already waiting keep waiting.
    pub fn open_gate(&self) {
        *self.gate.lock() = None;
    }

    async fn pass_gate(&self) {
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            let permit = gate.acquire().await.expect("gate closed");
            permit.forget();
        }
    }
}

#[async_trait]
impl MatchSource for ScriptedSource {
    async fn fetch_matches(&self, query: &MatchQuery) -> Result<Page, ApiError> {
        self.match_calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().push(query.clone());
        self.pass_gate().await;
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }
        let filtered: Vec<Match> = self
            .matches
            .lock()
            .iter()
            .filter(|m| query.tournament_ids.is_empty() || query.tournament_ids.contains(&m.tournament.id))
            .cloned()
            .collect();
        let total = filtered.len() as u32;
        let page: Vec<Match> = filtered.into_iter().skip(query.offset as usize).take(query.limit as usize).collect();
        Ok(Page { matches: page, offset: query.offset, limit: query.limit, total: Some(total), has_more: None })
    }

    async fn fetch_sports(&self, _query: &SportsQuery) -> Result<Vec<Sport>, ApiError> {
        self.sports_calls.fetch_add(1, Ordering::SeqCst);
        self.pass_gate().await;
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }
        Ok(self.sports.lock().clone())
    }
}

/// Wall clock that follows tokio's (pausable) time from a fixed start.
pub struct TokioClock {
    base: DateTime<Utc>,
    started: tokio::time::Instant,
}

impl TokioClock {
    pub fn new(base: DateTime<Utc>) -> Self {
        Self { base, started: tokio::time::Instant::now() }
    }
}

impl TimeSource for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.started.elapsed()).unwrap_or_default();
        self.base + elapsed
    }
}

/// Yield until `condition` holds, giving spawned tasks a chance to run.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
