//! Countdown text for upcoming matches, driven by one shared ticker.
//!
//! Every visible match subscribes with its start instant. A single interval
//! task recomputes all subscriptions on each tick and only calls back when the
//! rendered text changes, so a match three days out is re-rendered once a
//! minute while one starting shortly is re-rendered every second.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use crate::model::Match;
use crate::time_source::{Remaining, TimeSource};

pub const STARTED: &str = "Started";
pub const UNKNOWN_REMAINING: &str = "TBA";
pub const LIVE_LABEL: &str = "LIVE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownParts {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
    pub total_seconds: i64,
}

impl CountdownParts {
    /// Split a positive number of seconds; `None` once the target is reached.
    pub fn from_seconds(total_seconds: i64) -> Option<Self> {
        if total_seconds <= 0 {
            return None;
        }
        Some(Self {
            days: total_seconds / 86_400,
            hours: (total_seconds % 86_400) / 3_600,
            minutes: (total_seconds % 3_600) / 60,
            seconds: total_seconds % 60,
            total_seconds,
        })
    }

    pub fn format(&self) -> String {
        if self.days > 0 {
            format!("{}d {}h {}m", self.days, self.hours, self.minutes)
        } else if self.hours > 0 {
            format!("{}h {}m {}s", self.hours, self.minutes, self.seconds)
        } else if self.minutes > 0 {
            format!("{}m {}s", self.minutes, self.seconds)
        } else {
            format!("{}s", self.seconds)
        }
    }
}

/// `"1d 1h 0m"`, `"1h 1m 1s"`, `"4m 5s"`, `"45s"`, or `"Started"`.
pub fn format_countdown(total_seconds: i64) -> String {
    CountdownParts::from_seconds(total_seconds)
        .map(|parts| parts.format())
        .unwrap_or_else(|| STARTED.to_string())
}

/// What a subscriber counts down to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownTarget {
    pub instant: String,
    pub timezone: String,
    /// Shown instead of "Started" once the target has passed.
    pub live_label: Option<String>,
}

impl CountdownTarget {
    pub fn new(instant: impl Into<String>, timezone: impl Into<String>) -> Self {
        Self { instant: instant.into(), timezone: timezone.into(), live_label: None }
    }

    pub fn with_live_label(mut self, label: impl Into<String>) -> Self {
        self.live_label = Some(label.into());
        self
    }

    pub fn for_match(m: &Match) -> Self {
        let target = Self::new(m.start_time.clone(), m.timezone.clone());
        if m.status.is_live() { target.with_live_label(LIVE_LABEL) } else { target }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownUpdate {
    pub text: String,
    pub parts: Option<CountdownParts>,
    pub expired: bool,
}

/// Render `target` against `clock` right now.
pub fn render(clock: &dyn TimeSource, target: &CountdownTarget) -> CountdownUpdate {
    match clock.seconds_until(&target.instant, &target.timezone) {
        Remaining::Unknown => CountdownUpdate { text: UNKNOWN_REMAINING.to_string(), parts: None, expired: false },
        Remaining::Seconds(secs) => match CountdownParts::from_seconds(secs) {
            Some(parts) => CountdownUpdate { text: parts.format(), parts: Some(parts), expired: false },
            None => CountdownUpdate {
                text: target.live_label.clone().unwrap_or_else(|| STARTED.to_string()),
                parts: None,
                expired: true,
            },
        },
    }
}

type Callback = Box<dyn FnMut(&CountdownUpdate) + Send>;

struct Subscription {
    target: CountdownTarget,
    last_emitted: Mutex<Option<String>>,
    callback: Mutex<Callback>,
    cancelled: AtomicBool,
}

impl Subscription {
    /// Recompute and call back if the text moved. Returns whether it did.
    fn deliver(&self, clock: &dyn TimeSource) -> bool {
        let mut callback = self.callback.lock();
        // Checked under the callback lock: once `cancel` has stored the flag,
        // no invocation can start.
        if self.cancelled.load(Ordering::Acquire) {
            return false;
        }
        let update = render(clock, &self.target);
        {
            let mut last = self.last_emitted.lock();
            if last.as_deref() == Some(update.text.as_str()) {
                return false;
            }
            *last = Some(update.text.clone());
        }
        (*callback)(&update);
        true
    }
}

struct SchedulerInner {
    clock: Arc<dyn TimeSource>,
    interval: Duration,
    auto_tick: bool,
    subscriptions: Mutex<BTreeMap<u64, Arc<Subscription>>>,
    next_id: AtomicU64,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl SchedulerInner {
    fn tick(&self) -> usize {
        let subs: Vec<Arc<Subscription>> = self.subscriptions.lock().values().cloned().collect();
        let notified = subs.iter().filter(|sub| sub.deliver(self.clock.as_ref())).count();
        trace!(subscriptions = subs.len(), notified, "Countdown tick");
        notified
    }

    fn remove(&self, id: u64) {
        let now_empty = {
            let mut subs = self.subscriptions.lock();
            subs.remove(&id);
            subs.is_empty()
        };
        if now_empty {
            if let Some(handle) = self.ticker.lock().take() {
                debug!("Last countdown subscription gone; stopping ticker");
                handle.abort();
            }
        }
    }
}

impl Drop for SchedulerInner {
    fn drop(&mut self) {
        if let Some(handle) = self.ticker.get_mut().take() {
            handle.abort();
        }
    }
}

/// Shared ticking clock for all countdown displays. Cloning shares it.
#[derive(Clone)]
pub struct CountdownScheduler {
    inner: Arc<SchedulerInner>,
}

impl CountdownScheduler {
    /// Scheduler that runs its own interval task on the current tokio runtime
    /// while at least one subscription exists.
    pub fn new(clock: Arc<dyn TimeSource>, interval: Duration) -> Self {
        Self::build(clock, interval, true)
    }

    /// Scheduler that only advances when [`tick`](Self::tick) is called.
    pub fn manual(clock: Arc<dyn TimeSource>) -> Self {
        Self::build(clock, Duration::from_secs(1), false)
    }

    fn build(clock: Arc<dyn TimeSource>, interval: Duration, auto_tick: bool) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                clock,
                interval,
                auto_tick,
                subscriptions: Mutex::new(BTreeMap::new()),
                next_id: AtomicU64::new(0),
                ticker: Mutex::new(None),
            }),
        }
    }

    /// Register `callback` for `target`. It is called once immediately with
    /// the current text and afterwards whenever the text changes.
    pub fn subscribe<F>(&self, target: CountdownTarget, callback: F) -> CountdownHandle
    where
        F: FnMut(&CountdownUpdate) + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let sub = Arc::new(Subscription {
            target,
            last_emitted: Mutex::new(None),
            callback: Mutex::new(Box::new(callback)),
            cancelled: AtomicBool::new(false),
        });
        self.inner.subscriptions.lock().insert(id, Arc::clone(&sub));
        sub.deliver(self.inner.clock.as_ref());
        self.ensure_ticker();
        CountdownHandle { id, sub, scheduler: Arc::downgrade(&self.inner) }
    }

    /// Advance every subscription once. Returns how many were notified.
    pub fn tick(&self) -> usize {
        self.inner.tick()
    }

    pub fn active_subscriptions(&self) -> usize {
        self.inner.subscriptions.lock().len()
    }

    pub fn is_ticking(&self) -> bool {
        self.inner.ticker.lock().as_ref().is_some_and(|handle| !handle.is_finished())
    }

    fn ensure_ticker(&self) {
        if !self.inner.auto_tick {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let mut ticker = self.inner.ticker.lock();
        if ticker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.interval;
        debug!(period_ms = period.as_millis() as u64, "Starting countdown ticker");
        *ticker = Some(runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately; subscribers already got
            // their initial value.
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                inner.tick();
            }
        }));
    }
}

/// Keeps a countdown subscription alive. Dropping it cancels.
pub struct CountdownHandle {
    id: u64,
    sub: Arc<Subscription>,
    scheduler: Weak<SchedulerInner>,
}

impl CountdownHandle {
    /// Detach from the shared clock. No callback starts after this returns.
    pub fn cancel(&self) {
        if self.sub.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(inner) = self.scheduler.upgrade() {
            inner.remove(self.id);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.sub.cancelled.load(Ordering::Acquire)
    }

    /// Last text delivered to the callback.
    pub fn last_text(&self) -> Option<String> {
        self.sub.last_emitted.lock().clone()
    }
}

impl Drop for CountdownHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
