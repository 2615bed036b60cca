use serde::{Deserialize, Serialize};

pub const DEFAULT_TIMEZONE: &str = "Australia/Sydney";

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Upcoming,
    Live,
    Completed,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl MatchStatus {
    pub fn label(&self) -> &'static str {
        match self {
            MatchStatus::Live => "LIVE",
            MatchStatus::Upcoming => "Upcoming",
            MatchStatus::Completed => "Completed",
            MatchStatus::Cancelled => "Cancelled",
            MatchStatus::Unknown => "Unknown",
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, MatchStatus::Live)
    }

    pub fn is_upcoming(&self) -> bool {
        matches!(self, MatchStatus::Upcoming)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, MatchStatus::Completed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub short_name: String,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub score: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentRef {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub sport_id: Option<u64>,
    #[serde(default)]
    pub sport_name: Option<String>,
}

/// One scheduled fixture as returned by `matchList`.
///
/// `start_time` is kept as the raw string: a malformed timestamp on one record
/// must not fail the whole page, so parsing happens at display time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: u64,
    #[serde(default)]
    pub match_id: Option<u64>,
    #[serde(default)]
    pub match_name: String,
    pub tournament: TournamentRef,
    pub home_team: Team,
    pub away_team: Team,
    #[serde(rename = "matchStatus")]
    pub status: MatchStatus,
    #[serde(default)]
    pub match_date: Option<String>,
    #[serde(default)]
    pub match_time: Option<String>,
    pub start_time: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub venue: Option<String>,
}

impl Match {
    pub fn tournament_id(&self) -> u64 {
        self.tournament.id
    }

    /// "HOME vs AWAY" using short codes when the feed provides them.
    pub fn headline(&self) -> String {
        let side = |t: &Team| if t.short_name.is_empty() { t.name.clone() } else { t.short_name.clone() };
        format!("{} vs {}", side(&self.home_team), side(&self.away_team))
    }
}
