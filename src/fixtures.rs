use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;

use crate::api::{MatchQuery, MatchSource, SportsQuery};
use crate::error::ApiError;
use crate::model::{Match, MatchStatus, Page, Sport, Team, Tournament, TournamentRef};
use crate::query_cache::StatusFilter;
use crate::time_source::TimeSource;

/// In-process stand-in for the sports API, serving a small fixed schedule
/// positioned relative to the clock's "now".
pub struct FixtureSource {
    clock: Arc<dyn TimeSource>,
    latency: Duration,
}

struct Row {
    id: u64,
    match_id: u64,
    tournament: (u64, &'static str, u64, &'static str),
    home: (u64, &'static str, &'static str),
    away: (u64, &'static str, &'static str),
    status: MatchStatus,
    offset_hours: i64,
    match_time: &'static str,
}

const ROWS: [Row; 6] = [
    Row {
        id: 1,
        match_id: 1001,
        tournament: (101, "India Test Series", 4, "Cricket"),
        home: (1, "India", "IND"),
        away: (2, "Australia", "AUS"),
        status: MatchStatus::Upcoming,
        offset_hours: 2,
        match_time: "10:00 AM",
    },
    Row {
        id: 2,
        match_id: 1002,
        tournament: (104, "Ashes Series", 4, "Cricket"),
        home: (3, "England", "ENG"),
        away: (4, "New Zealand", "NZ"),
        status: MatchStatus::Live,
        offset_hours: -1,
        match_time: "02:30 PM",
    },
    Row {
        id: 3,
        match_id: 2001,
        tournament: (201, "Premier League", 8, "Soccer"),
        home: (11, "Manchester United", "MUN"),
        away: (12, "Liverpool", "LIV"),
        status: MatchStatus::Upcoming,
        offset_hours: 8,
        match_time: "08:00 PM",
    },
    Row {
        id: 4,
        match_id: 3001,
        tournament: (301, "AFL Premiership", 9, "Australian Rules"),
        home: (21, "Sydney Swans", "SYD"),
        away: (22, "Collingwood", "COL"),
        status: MatchStatus::Upcoming,
        offset_hours: 48,
        match_time: "03:20 PM",
    },
    Row {
        id: 5,
        match_id: 4001,
        tournament: (401, "NBA", 10, "Basketball"),
        home: (31, "Los Angeles Lakers", "LAL"),
        away: (32, "Golden State Warriors", "GSW"),
        status: MatchStatus::Upcoming,
        offset_hours: 6,
        match_time: "12:00 PM",
    },
    Row {
        id: 6,
        match_id: 5001,
        tournament: (501, "NRL", 12, "Rugby League"),
        home: (41, "Penrith Panthers", "PEN"),
        away: (42, "Melbourne Storm", "MEL"),
        status: MatchStatus::Upcoming,
        offset_hours: 72,
        match_time: "07:50 PM",
    },
];

fn team((id, name, short): (u64, &'static str, &'static str)) -> Team {
    Team { id, name: name.to_string(), short_name: short.to_string(), logo: None, score: None }
}

fn to_match(row: &Row, now: DateTime<Utc>, timezone: &str) -> Match {
    let start = (now + chrono::Duration::hours(row.offset_hours)).to_rfc3339_opts(SecondsFormat::Secs, true);
    let (tid, tname, sport_id, sport_name) = row.tournament;
    let home = team(row.home);
    let away = team(row.away);
    Match {
        id: row.id,
        match_id: Some(row.match_id),
        match_name: format!("{} vs {}", home.name, away.name),
        tournament: TournamentRef { id: tid, name: tname.to_string(), sport_id: Some(sport_id), sport_name: Some(sport_name.to_string()) },
        home_team: home,
        away_team: away,
        status: row.status,
        match_date: Some(start.clone()),
        match_time: Some(row.match_time.to_string()),
        start_time: start,
        timezone: timezone.to_string(),
        venue: None,
    }
}

fn status_matches(filter: StatusFilter, status: MatchStatus) -> bool {
    match filter {
        StatusFilter::All => true,
        StatusFilter::Upcoming => status.is_upcoming(),
        StatusFilter::Live => status.is_live(),
        StatusFilter::Completed => status.is_completed(),
    }
}

impl FixtureSource {
    pub fn new(clock: Arc<dyn TimeSource>) -> Self {
        Self { clock, latency: Duration::ZERO }
    }

    /// Delay every response, to exercise loading states.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn sports() -> Vec<Sport> {
        fn sport(id: u64, name: &str, tournaments: &[(u64, &str)]) -> Sport {
            Sport {
                id,
                sport_name: name.to_string(),
                tournaments: tournaments.iter().map(|(id, name)| Tournament { id: *id, name: name.to_string() }).collect(),
            }
        }
        vec![
            sport(4, "Cricket", &[(101, "India Test Series"), (102, "Big Bash League"), (104, "Ashes Series")]),
            sport(8, "Soccer", &[(201, "Premier League"), (202, "La Liga"), (205, "A-League")]),
            sport(9, "Australian Rules", &[(301, "AFL Premiership")]),
            sport(10, "Basketball", &[(401, "NBA"), (402, "NBL Australia")]),
            sport(12, "Rugby League", &[(501, "NRL"), (502, "State of Origin")]),
        ]
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl MatchSource for FixtureSource {
    async fn fetch_matches(&self, query: &MatchQuery) -> Result<Page, ApiError> {
        self.simulate_latency().await;
        let now = self.clock.now();
        let filtered: Vec<Match> = ROWS
            .iter()
            .filter(|row| query.tournament_ids.is_empty() || query.tournament_ids.contains(&row.tournament.0))
            .filter(|row| status_matches(query.status, row.status))
            .map(|row| to_match(row, now, &query.timezone))
            .collect();
        let total = filtered.len() as u32;
        let matches: Vec<Match> = filtered.into_iter().skip(query.offset as usize).take(query.limit as usize).collect();
        debug!(offset = query.offset, returned = matches.len(), total, "Served fixture page");
        Ok(Page { matches, offset: query.offset, limit: query.limit, total: Some(total), has_more: None })
    }

    async fn fetch_sports(&self, query: &SportsQuery) -> Result<Vec<Sport>, ApiError> {
        self.simulate_latency().await;
        let sports = Self::sports();
        let Some(needle) = query.search.as_deref().map(str::to_lowercase).filter(|s| !s.is_empty()) else {
            return Ok(sports);
        };
        Ok(sports
            .into_iter()
            .filter_map(|mut sport| {
                if sport.sport_name.to_lowercase().contains(&needle) {
                    return Some(sport);
                }
                sport.tournaments.retain(|t| t.name.to_lowercase().contains(&needle));
                (!sport.tournaments.is_empty()).then_some(sport)
            })
            .collect())
    }
}
