//! Clock abstraction and timezone-aware date math.
//!
//! Everything that asks "what time is it" goes through [`TimeSource`] so the
//! cache, pagination and countdown code can be driven by a [`ManualClock`] in
//! tests. Parse failures never escape this module: callers get a sentinel and
//! render a fallback string.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;
use tracing::warn;

use crate::error::ApiError;

/// Remaining time until a target instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    /// Whole seconds left; zero or negative once the target has passed.
    Seconds(i64),
    /// The target or its timezone could not be understood.
    Unknown,
}

/// A start instant projected into the match's own timezone.
#[derive(Debug, Clone, PartialEq)]
pub struct ZonedComponents {
    pub instant: DateTime<Utc>,
    pub local: DateTime<Tz>,
}

impl ZonedComponents {
    /// e.g. `7:50 PM`
    pub fn time_label(&self) -> String {
        self.local.format("%-I:%M %p").to_string()
    }

    /// e.g. `Sat, Mar 8`
    pub fn date_label(&self) -> String {
        self.local.format("%a, %b %-d").to_string()
    }
}

pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn to_zoned(&self, instant: &str, timezone: &str) -> Option<ZonedComponents> {
        match try_to_zoned(instant, timezone) {
            Ok(zoned) => Some(zoned),
            Err(e) => {
                warn!(error = %e, instant, timezone, "Unable to project instant into timezone");
                None
            }
        }
    }

    fn seconds_until(&self, target: &str, timezone: &str) -> Remaining {
        match try_to_zoned(target, timezone) {
            Ok(zoned) => Remaining::Seconds((zoned.instant - self.now()).num_seconds()),
            Err(e) => {
                warn!(error = %e, target, timezone, "Unable to compute remaining time");
                Remaining::Unknown
            }
        }
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock() = instant;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz, ApiError> {
    name.parse::<Tz>().map_err(|_| ApiError::parse(format!("unknown timezone '{}'", name)))
}

/// Parse an ISO-8601 instant. Strings with an offset are taken as-is; naive
/// strings are wall-clock time in `tz`.
pub fn parse_instant(raw: &str, tz: Tz) -> Result<DateTime<Utc>, ApiError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, pattern) {
            // Ambiguous local times (DST fall-back) resolve to the earlier instant.
            return tz
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .ok_or_else(|| ApiError::parse(format!("'{}' does not exist in {}", raw, tz.name())));
        }
    }
    Err(ApiError::parse(format!("unparsable instant '{}'", raw)))
}

pub fn try_to_zoned(instant: &str, timezone: &str) -> Result<ZonedComponents, ApiError> {
    let tz = parse_timezone(timezone)?;
    let instant = parse_instant(instant, tz)?;
    Ok(ZonedComponents { instant, local: instant.with_timezone(&tz) })
}
