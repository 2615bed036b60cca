use std::env;
use std::sync::Arc;
use std::time::Duration;

use kickoff_sync::fixtures::FixtureSource;
use kickoff_sync::{ApiClient, Config, MatchListOrchestrator, MatchSource, PageStatus, SystemClock, TimeSource};
use tracing::{error, info, instrument, warn};
use tracing_subscriber::EnvFilter;

type Error = Box<dyn std::error::Error + Send + Sync>;

/// Comma separated tournament ids, e.g. `101,201`.
fn tournaments_from_env() -> Vec<u64> {
    env::var("KICKOFF_TOURNAMENTS")
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse::<u64>().ok())
        .collect()
}

#[instrument(skip(app))]
async fn print_list(app: &MatchListOrchestrator) {
    let snapshot = app.snapshot();
    info!(
        status = ?snapshot.status,
        loaded = snapshot.matches.len(),
        total = ?snapshot.total,
        has_more = snapshot.has_more,
        "Match list"
    );
    for m in snapshot.matches.iter() {
        let (date, time) = app
            .kickoff(m)
            .map(|z| (z.date_label(), z.time_label()))
            .unwrap_or_default();
        info!(
            id = m.id,
            tournament = %m.tournament.name,
            fixture = %m.headline(),
            status = m.status.label(),
            date = %date,
            time = %time,
            "Fixture"
        );
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Error> {
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_current_span(false)
        .with_target(false)
        .with_ansi(false)
        .try_init();

    let config = Config::load()?;
    let clock: Arc<dyn TimeSource> = Arc::new(SystemClock);
    let source: Arc<dyn MatchSource> = if config.offline {
        info!("Using offline fixtures");
        Arc::new(FixtureSource::new(Arc::clone(&clock)).with_latency(Duration::from_millis(300)))
    } else {
        Arc::new(ApiClient::from_config(&config))
    };
    let demo_secs: u64 = env::var("KICKOFF_DEMO_SECS").ok().and_then(|s| s.parse().ok()).unwrap_or(5);

    let app = MatchListOrchestrator::new(config, source, clock);
    let sync = app.spawn_cache_sync();

    match app.tournaments(None).await {
        Ok(tournaments) => info!(count = tournaments.len(), "Loaded tournament catalogue"),
        Err(e) => warn!(error = %e, "Tournament catalogue unavailable"),
    }

    if app.start().await == PageStatus::Error {
        let snapshot = app.snapshot();
        let message = snapshot.error.map(|e| e.to_string()).unwrap_or_default();
        error!(error = %message, "First page failed; pull to refresh");
        sync.abort();
        return Err(message.into());
    }

    let selected = tournaments_from_env();
    if !selected.is_empty() {
        app.begin_filter_edit();
        for id in selected {
            app.toggle_tournament(id);
        }
        let outcome = app.apply_filters().await;
        info!(applied = ?outcome.applied, changed = outcome.changed(), "Filter applied");
    }

    while app.snapshot().has_more {
        if app.load_more().await == PageStatus::Error {
            warn!("Stopped paging after an incremental failure");
            break;
        }
    }
    print_list(&app).await;

    let handles: Vec<_> = app
        .snapshot()
        .matches
        .iter()
        .take(3)
        .map(|m| {
            let id = m.id;
            app.watch_countdown(m, move |update| info!(id, countdown = %update.text, "Countdown"))
        })
        .collect();

    tokio::time::sleep(Duration::from_secs(demo_secs)).await;
    drop(handles);
    sync.abort();
    Ok(())
}
