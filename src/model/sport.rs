use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: u64,
    pub name: String,
}

/// A sport and its tournaments, in the order the server listed them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sport {
    pub id: u64,
    pub sport_name: String,
    #[serde(default)]
    pub tournaments: Vec<Tournament>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TournamentListing {
    pub id: u64,
    pub name: String,
    pub sport_id: u64,
    pub sport_name: String,
}

/// Flatten sports into one tournament list, keeping sport order and the
/// tournament order inside each sport.
pub fn all_tournaments(sports: &[Sport]) -> Vec<TournamentListing> {
    sports
        .iter()
        .flat_map(|sport| {
            sport.tournaments.iter().map(move |t| TournamentListing {
                id: t.id,
                name: t.name.clone(),
                sport_id: sport.id,
                sport_name: sport.sport_name.clone(),
            })
        })
        .collect()
}
