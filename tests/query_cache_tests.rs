mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use kickoff_sync::{ApiError, CacheKey, CachePolicy, ManualClock, QueryCache, QueryKey, StatusFilter, TimeSource};
use tokio::sync::Semaphore;

use common::{t0, wait_until};

fn policy() -> CachePolicy {
    CachePolicy::new(Duration::from_secs(60), Duration::from_secs(300))
}

fn key(ids: &[u64], offset: u32) -> CacheKey {
    CacheKey::new(QueryKey::matches("Australia/Sydney", StatusFilter::All, ids.iter().copied()), offset)
}

fn setup() -> (Arc<ManualClock>, QueryCache<String>) {
    let clock = Arc::new(ManualClock::new(t0()));
    let cache = QueryCache::new(Arc::clone(&clock) as Arc<dyn TimeSource>);
    (clock, cache)
}

fn counting_loader(
    calls: &Arc<AtomicUsize>,
    value: &str,
) -> impl FnOnce() -> BoxFuture<'static, Result<String, ApiError>> {
    let calls = Arc::clone(calls);
    let value = value.to_string();
    move || {
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(value)
        }
        .boxed()
    }
}

#[test]
fn query_keys_are_order_insensitive_for_tournaments() {
    let a = QueryKey::matches("Australia/Sydney", StatusFilter::All, [201, 101, 101]);
    let b = QueryKey::matches("Australia/Sydney", StatusFilter::All, [101, 201]);
    assert_eq!(a, b);
    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_eq!(a.tournament_ids(), &[101, 201]);
    assert_ne!(a, QueryKey::matches("Australia/Sydney", StatusFilter::Live, [101, 201]));
    assert_ne!(a, QueryKey::matches("UTC", StatusFilter::All, [101, 201]));
}

#[tokio::test]
async fn concurrent_fetches_for_one_key_share_a_single_load() {
    let (_clock, cache) = setup();
    let calls = Arc::new(AtomicUsize::new(0));

    let fetches = (0..5).map(|_| cache.fetch(key(&[], 0), counting_loader(&calls, "page"), policy()));
    let results = futures::future::join_all(fetches).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1, "loader should run once");
    for result in results {
        assert_eq!(result.expect("fetch failed").as_str(), "page");
    }
    assert!(!cache.is_fetching(&key(&[], 0)));
}

#[tokio::test]
async fn fresh_entry_is_served_without_loading() {
    let (clock, cache) = setup();
    let calls = Arc::new(AtomicUsize::new(0));

    cache.fetch(key(&[], 0), counting_loader(&calls, "v1"), policy()).await.unwrap();
    clock.advance(chrono::Duration::seconds(59));
    let again = cache.fetch(key(&[], 0), counting_loader(&calls, "v2"), policy()).await.unwrap();

    assert_eq!(again.as_str(), "v1");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stale_entry_is_served_immediately_and_revalidated() {
    let (clock, cache) = setup();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut events = cache.subscribe();

    cache.fetch(key(&[], 0), counting_loader(&calls, "v1"), policy()).await.unwrap();
    assert_eq!(events.recv().await.unwrap(), key(&[], 0));

    clock.advance(chrono::Duration::seconds(61));
    let stale = cache.fetch(key(&[], 0), counting_loader(&calls, "v2"), policy()).await.unwrap();
    assert_eq!(stale.as_str(), "v1", "stale data should be returned without waiting");

    let refreshed = tokio::time::timeout(Duration::from_secs(5), events.recv()).await.expect("no revalidation").unwrap();
    assert_eq!(refreshed, key(&[], 0));
    let entry = cache.get(&key(&[], 0)).expect("entry missing");
    assert_eq!(entry.data.as_str(), "v2");
    assert_eq!(entry.fetched_at, t0() + chrono::Duration::seconds(61));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failed_load_reaches_every_waiter_and_caches_nothing() {
    let (_clock, cache) = setup();
    let calls = Arc::new(AtomicUsize::new(0));

    let failing = || {
        let calls = Arc::clone(&calls);
        move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Err::<String, _>(ApiError::server(500, "boom"))
        }
    };
    let (a, b) = tokio::join!(
        cache.fetch(key(&[], 0), failing(), policy()),
        cache.fetch(key(&[], 0), failing(), policy()),
    );

    assert_eq!(a.unwrap_err(), ApiError::server(500, "boom"));
    assert_eq!(b.unwrap_err(), ApiError::server(500, "boom"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(cache.get(&key(&[], 0)).is_none());
    assert!(!cache.is_fetching(&key(&[], 0)));

    // The next fetch tries again.
    let ok = cache.fetch(key(&[], 0), counting_loader(&calls, "v1"), policy()).await.unwrap();
    assert_eq!(ok.as_str(), "v1");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn invalidate_removes_only_matching_keys() {
    let (_clock, cache) = setup();
    let calls = Arc::new(AtomicUsize::new(0));
    for k in [key(&[101], 0), key(&[101], 20), key(&[201], 0)] {
        cache.fetch(k, counting_loader(&calls, "page"), policy()).await.unwrap();
    }
    assert_eq!(cache.len(), 3);

    let target = key(&[101], 0).query;
    assert_eq!(cache.invalidate(|k| k.query == target), 2);
    assert_eq!(cache.len(), 1);
    assert!(cache.get(&key(&[201], 0)).is_some());

    cache.fetch(key(&[101], 0), counting_loader(&calls, "page"), policy()).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 4, "invalidated key must be fetched again");
}

#[tokio::test]
async fn invalidate_during_load_discards_the_result() {
    let (_clock, cache) = setup();
    let gate = Arc::new(Semaphore::new(0));
    let loader_gate = Arc::clone(&gate);

    let background = cache.clone();
    let task = tokio::spawn(async move {
        background
            .fetch(
                key(&[], 0),
                move || async move {
                    loader_gate.acquire().await.expect("gate closed").forget();
                    Ok("late".to_string())
                },
                policy(),
            )
            .await
    });
    wait_until(|| cache.is_fetching(&key(&[], 0))).await;

    cache.invalidate(|_| true);
    assert!(!cache.is_fetching(&key(&[], 0)));
    gate.add_permits(1);

    let result = task.await.expect("task panicked").expect("load failed");
    assert_eq!(result.as_str(), "late", "the waiter still gets its answer");
    assert!(cache.get(&key(&[], 0)).is_none(), "but it is not cached");
}

#[tokio::test]
async fn sweep_drops_entries_idle_past_retention() {
    let (clock, cache) = setup();
    let calls = Arc::new(AtomicUsize::new(0));
    cache.fetch(key(&[101], 0), counting_loader(&calls, "a"), policy()).await.unwrap();
    cache.fetch(key(&[201], 0), counting_loader(&calls, "b"), policy()).await.unwrap();

    clock.advance(chrono::Duration::seconds(200));
    // Reading counts as use.
    assert!(cache.get(&key(&[101], 0)).is_some());
    clock.advance(chrono::Duration::seconds(150));

    assert_eq!(cache.sweep(), 1);
    assert!(cache.get(&key(&[101], 0)).is_some());
    assert!(cache.get(&key(&[201], 0)).is_none());
}

#[tokio::test]
async fn stale_callers_share_one_background_refresh() {
    let (clock, cache) = setup();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut events = cache.subscribe();
    cache.fetch(key(&[], 0), counting_loader(&calls, "v1"), policy()).await.unwrap();
    events.recv().await.unwrap();

    clock.advance(chrono::Duration::seconds(61));
    let gate = Arc::new(Semaphore::new(0));
    for _ in 0..5 {
        let calls = Arc::clone(&calls);
        let gate = Arc::clone(&gate);
        let loader = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            gate.acquire().await.expect("gate closed").forget();
            Ok("v2".to_string())
        };
        let stale = cache.fetch(key(&[], 0), loader, policy()).await.unwrap();
        assert_eq!(stale.as_str(), "v1");
        assert!(cache.is_fetching(&key(&[], 0)));
    }

    gate.add_permits(1);
    tokio::time::timeout(Duration::from_secs(5), events.recv()).await.expect("no revalidation").unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2, "one initial load plus one shared refresh");
    assert_eq!(cache.get(&key(&[], 0)).expect("entry missing").data.as_str(), "v2");
}

#[tokio::test]
async fn load_completes_after_its_only_caller_gives_up() {
    let (_clock, cache) = setup();
    let gate = Arc::new(Semaphore::new(0));
    let finished = Arc::new(AtomicUsize::new(0));

    let loader = {
        let gate = Arc::clone(&gate);
        let finished = Arc::clone(&finished);
        move || async move {
            gate.acquire().await.expect("gate closed").forget();
            finished.fetch_add(1, Ordering::SeqCst);
            Ok("orphan".to_string())
        }
    };
    let gave_up = tokio::time::timeout(Duration::from_millis(1), cache.fetch(key(&[], 0), loader, policy())).await;
    assert!(gave_up.is_err(), "fetch should still be waiting on the gate");
    assert!(cache.is_fetching(&key(&[], 0)));

    gate.add_permits(1);
    wait_until(|| !cache.is_fetching(&key(&[], 0))).await;

    assert_eq!(finished.load(Ordering::SeqCst), 1);
    assert_eq!(cache.get(&key(&[], 0)).expect("entry missing").data.as_str(), "orphan");
}
