use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::fixture::DEFAULT_TIMEZONE;
use crate::query_cache::{CachePolicy, StatusFilter};
use crate::time_source::parse_timezone;

/// Runtime settings. Defaults match the production app; a JSON file and
/// `KICKOFF_*` environment variables override them, in that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub timezone: String,
    pub status: StatusFilter,
    pub page_size: u32,
    pub tournament_page_size: u32,
    pub request_timeout_ms: u64,
    pub match_stale_ms: u64,
    pub match_retention_ms: u64,
    pub tournament_stale_ms: u64,
    pub tournament_retention_ms: u64,
    pub tick_interval_ms: u64,
    pub offline: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "https://au.testing.smartb.com.au/api/sports".to_string(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            status: StatusFilter::All,
            page_size: 20,
            tournament_page_size: 50,
            request_timeout_ms: 30_000,
            match_stale_ms: 2 * 60 * 1000,
            match_retention_ms: 5 * 60 * 1000,
            tournament_stale_ms: 10 * 60 * 1000,
            tournament_retention_ms: 30 * 60 * 1000,
            tick_interval_ms: 1000,
            offline: false,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { name, value: raw }),
        Err(_) => Ok(None),
    }
}

fn env_bool(name: &'static str) -> Result<Option<bool>, ConfigError> {
    match env::var(name) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" | "" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidEnv { name, value: raw }),
        },
        Err(_) => Ok(None),
    }
}

impl Config {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;
        Self::from_json_str(&raw)
    }

    /// Load from `KICKOFF_CONFIG` (if set), apply env overrides and validate.
    pub fn load() -> Result<Self, ConfigError> {
        let config = match env::var("KICKOFF_CONFIG") {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path.trim())?,
            _ => Self::default(),
        };
        let config = config.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(url) = env::var("KICKOFF_BASE_URL") {
            self.base_url = url.trim().to_string();
        }
        if let Ok(tz) = env::var("KICKOFF_TIMEZONE") {
            self.timezone = tz.trim().to_string();
        }
        if let Some(status) = env_parse::<StatusFilter>("KICKOFF_STATUS")? {
            self.status = status;
        }
        if let Some(size) = env_parse("KICKOFF_PAGE_SIZE")? {
            self.page_size = size;
        }
        if let Some(ms) = env_parse("KICKOFF_TIMEOUT_MS")? {
            self.request_timeout_ms = ms;
        }
        if let Some(ms) = env_parse("KICKOFF_TICK_MS")? {
            self.tick_interval_ms = ms;
        }
        if let Some(offline) = env_bool("KICKOFF_OFFLINE")? {
            self.offline = offline;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("base_url must not be empty".to_string()));
        }
        if self.page_size == 0 || self.tournament_page_size == 0 {
            return Err(ConfigError::Invalid("page sizes must be positive".to_string()));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be positive".to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid("request_timeout_ms must be positive".to_string()));
        }
        parse_timezone(&self.timezone).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn match_policy(&self) -> CachePolicy {
        CachePolicy::new(Duration::from_millis(self.match_stale_ms), Duration::from_millis(self.match_retention_ms))
    }

    pub fn tournament_policy(&self) -> CachePolicy {
        CachePolicy::new(Duration::from_millis(self.tournament_stale_ms), Duration::from_millis(self.tournament_retention_ms))
    }
}
