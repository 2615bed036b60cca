pub mod fixture;
pub mod page;
pub mod sport;

pub use fixture::{Match, MatchStatus, Team, TournamentRef};
pub use page::{MatchListEnvelope, Page, SportsEnvelope};
pub use sport::{Sport, Tournament, TournamentListing, all_tournaments};
