//! Client-side data synchronisation for a match schedule: a coalescing query
//! cache, an infinite-scroll pagination controller, a shared countdown ticker
//! and a two-phase tournament filter.

pub mod api;
pub mod config;
pub mod countdown;
pub mod error;
pub mod filter;
pub mod fixtures;
pub mod model;
pub mod orchestrator;
pub mod pagination;
pub mod query_cache;
pub mod time_source;

pub use api::{ApiClient, MatchQuery, MatchSource, SportsQuery};
pub use config::Config;
pub use countdown::{CountdownHandle, CountdownScheduler, CountdownTarget, CountdownUpdate, format_countdown};
pub use error::{ApiError, ConfigError};
pub use filter::{FilterSelection, FilterStateMachine, FilterStore};
pub use orchestrator::MatchListOrchestrator;
pub use pagination::{PageStatus, PaginationController, PaginationSnapshot};
pub use query_cache::{CacheKey, CachePolicy, QueryCache, QueryKey, StatusFilter};
pub use time_source::{ManualClock, Remaining, SystemClock, TimeSource};
