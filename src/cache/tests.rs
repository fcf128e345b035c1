use super::*;
use crate::clock::{system_clock, ManualClock, SharedClock};
use crate::config::CacheConfig;
use crate::error::StoreError;
use crate::types::{Identity, Record};
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn config(capacity: Option<usize>) -> CacheConfig {
    CacheConfig {
        capacity,
        default_ttl_secs: 600,
        ..CacheConfig::default()
    }
}

fn cache_with(clock: SharedClock, capacity: Option<usize>) -> Cache<i64> {
    Cache::new("test", &config(capacity), clock)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_share_one_computation() {
    let cache = Arc::new(cache_with(system_clock(), None));
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let cache = Arc::clone(&cache);
        let calls = Arc::clone(&calls);
        handles.push(tokio::spawn(async move {
            cache
                .get_or_compute(
                    Identity::Int(1),
                    || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok::<_, Infallible>(42)
                    },
                    None,
                    None,
                )
                .await
        }));
    }

    for result in futures::future::join_all(handles).await {
        assert_eq!(result.unwrap().unwrap(), 42);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.stats().computations, 1);
}

#[tokio::test]
async fn second_call_within_ttl_skips_computation() {
    let cache = cache_with(system_clock(), None);
    let slow = || async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok::<_, Infallible>(7)
    };

    let started = Instant::now();
    let first = cache
        .get_or_compute(Identity::Int(1), slow, None, None)
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(200));

    let started = Instant::now();
    let second = cache
        .get_or_compute(Identity::Int(1), slow, None, None)
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_millis(20));
    assert_eq!(first, second);

    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses, stats.computations), (1, 1, 1));
}

#[tokio::test]
async fn expired_entries_are_recomputed() {
    let clock = ManualClock::default();
    let cache = cache_with(Arc::new(clock.clone()), None);
    let calls = AtomicUsize::new(0);
    let calls = &calls;
    let compute = move || async move {
        Ok::<_, Infallible>(calls.fetch_add(1, Ordering::SeqCst) as i64)
    };
    let ttl = Some(Duration::from_secs(60));

    assert_eq!(cache.get_or_compute(Identity::Int(1), compute, ttl, None).await.unwrap(), 0);
    clock.advance(chrono::Duration::seconds(59));
    assert_eq!(cache.get_or_compute(Identity::Int(1), compute, ttl, None).await.unwrap(), 0);
    clock.advance(chrono::Duration::seconds(2));
    assert_eq!(cache.get_or_compute(Identity::Int(1), compute, ttl, None).await.unwrap(), 1);
    assert_eq!(cache.stats().expirations, 1);
}

#[test]
fn sweep_drops_only_expired_entries() {
    let clock = ManualClock::default();
    let cache = cache_with(Arc::new(clock.clone()), None);
    cache.insert(Identity::Int(1), 1, Some(Duration::from_secs(10)));
    cache.insert(Identity::Int(2), 2, Some(Duration::from_secs(100)));

    clock.advance(chrono::Duration::seconds(30));
    assert_eq!(cache.purge_expired(), 1);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get(&Identity::Int(2)), Some(2));
    assert_eq!(cache.get(&Identity::Int(1)), None);
}

#[test]
fn capacity_evicts_least_recently_used() {
    let cache = cache_with(system_clock(), Some(2));
    cache.insert(Identity::Int(1), 1, None);
    cache.insert(Identity::Int(2), 2, None);
    assert_eq!(cache.get(&Identity::Int(1)), Some(1));

    cache.insert(Identity::Int(3), 3, None);
    assert_eq!(cache.get(&Identity::Int(2)), None);
    assert_eq!(cache.get(&Identity::Int(1)), Some(1));
    assert_eq!(cache.get(&Identity::Int(3)), Some(3));
    assert_eq!(cache.stats().evictions, 1);

    cache.insert(Identity::Int(3), 30, None);
    assert_eq!(cache.stats().evictions, 1);
}

#[tokio::test]
async fn timeout_releases_the_slot() {
    let cache = cache_with(system_clock(), None);

    let err = cache
        .get_or_compute(
            Identity::Int(1),
            || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, Infallible>(1)
            },
            None,
            Some(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    assert!(matches!(err, StoreError::Timeout { key: Identity::Int(1), .. }));

    let value = cache
        .get_or_compute(
            Identity::Int(1),
            || async { Ok::<_, Infallible>(2) },
            None,
            Some(Duration::from_millis(50)),
        )
        .await
        .unwrap();
    assert_eq!(value, 2);
}

#[tokio::test]
async fn failed_computation_is_not_cached() {
    let cache = cache_with(system_clock(), None);

    let err = cache
        .get_or_compute(Identity::Int(1), || async { Err::<i64, _>("backend down") }, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Compute { ref reason, .. } if reason == "backend down"));
    assert!(cache.is_empty());

    let value = cache
        .get_or_compute(Identity::Int(1), || async { Ok::<_, Infallible>(5) }, None, None)
        .await
        .unwrap();
    assert_eq!(value, 5);
}

#[tokio::test]
async fn waiter_retries_after_leader_fails() {
    let cache = cache_with(system_clock(), None);

    let leader = cache.get_or_compute(
        Identity::Int(1),
        || async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Err::<i64, _>("flaky")
        },
        None,
        None,
    );
    let waiter = cache.get_or_compute(
        Identity::Int(1),
        || async { Ok::<_, &str>(9) },
        None,
        None,
    );

    let (leader, waiter) = tokio::join!(leader, waiter);
    assert!(leader.is_err());
    assert_eq!(waiter.unwrap(), 9);
    assert_eq!(cache.get(&Identity::Int(1)), Some(9));
}

#[tokio::test]
async fn invalidate_during_computation_skips_caching() {
    let cache = cache_with(system_clock(), None);

    let computing = cache.get_or_compute(
        Identity::Int(1),
        || async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok::<_, Infallible>(1)
        },
        None,
        None,
    );
    let invalidating = async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.invalidate(&Identity::Int(1))
    };

    let (value, _) = tokio::join!(computing, invalidating);
    assert_eq!(value.unwrap(), 1);
    assert!(cache.get(&Identity::Int(1)).is_none());
}

#[test]
fn manager_hands_out_one_cache_per_name() {
    let manager = CacheManager::new(CacheConfig::default(), system_clock());
    let orders = manager.cache("Order");
    orders.insert(Identity::Int(1), Record::new("Order", "Order", 1), None);

    assert!(Arc::ptr_eq(&orders, &manager.cache("Order")));
    assert_eq!(manager.get("Order").map(|c| c.len()), Some(1));
    assert!(manager.get("Customer").is_none());
    assert_eq!(manager.names(), vec!["Order".to_string()]);
}
