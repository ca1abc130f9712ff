//! Integration tests for the result cache under concurrency

use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use roster_engine::cache::{CacheOutcome, ResultCache};
use roster_engine::filter::Filter;
use sdk::types::Resource;

fn resource(id: &str) -> Resource {
    Resource {
        id: id.to_string(),
        name: format!("Person {}", id),
        employee_number: format!("E{}", id),
        location: "Oslo".to_string(),
        rank_name: "Analyst".to_string(),
        skills: vec![],
    }
}

#[tokio::test]
async fn test_concurrent_lookups_share_one_fetch() {
    let cache = Arc::new(ResultCache::new(Duration::from_secs(60), None));
    let fetches = Arc::new(AtomicUsize::new(0));
    let filter = Filter::new().with_location("Oslo");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = Arc::clone(&cache);
        let fetches = Arc::clone(&fetches);
        let filter = filter.clone();
        handles.push(tokio::spawn(async move {
            cache
                .get_or_fetch(&filter, || async {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, String>(vec![resource("1"), resource("2")])
                })
                .await
                .unwrap()
        }));
    }

    let mut outcomes = Vec::new();
    for result in join_all(handles).await {
        let (value, outcome) = result.unwrap();
        assert_eq!(value.len(), 2);
        outcomes.push(outcome);
    }

    assert_eq!(fetches.load(Ordering::SeqCst), 1);
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| **o == CacheOutcome::Fetched)
            .count(),
        1
    );
    assert_eq!(cache.len().await, 1);
}

#[tokio::test]
async fn test_different_keys_fetch_independently() {
    let cache = Arc::new(ResultCache::new(Duration::from_secs(60), None));
    let fetches = Arc::new(AtomicUsize::new(0));

    let a = Filter::new().with_location("Oslo");
    let b = Filter::new().with_location("London");

    let fetch = |fetches: Arc<AtomicUsize>| {
        move || async move {
            fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, String>(vec![resource("1")])
        }
    };

    let (ra, rb) = tokio::join!(
        cache.get_or_fetch(&a, fetch(Arc::clone(&fetches))),
        cache.get_or_fetch(&b, fetch(Arc::clone(&fetches)))
    );
    assert_eq!(ra.unwrap().1, CacheOutcome::Fetched);
    assert_eq!(rb.unwrap().1, CacheOutcome::Fetched);
    assert_eq!(fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_abandoned_fetch_writes_nothing() {
    let cache = Arc::new(ResultCache::new(Duration::from_secs(60), None));
    let filter = Filter::new().with_skill("rust");

    let slow = cache.get_or_fetch(&filter, || async {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok::<_, String>(vec![resource("1")])
    });
    assert!(tokio::time::timeout(Duration::from_millis(20), slow)
        .await
        .is_err());

    assert!(cache.is_empty().await);

    // The key is usable again right away
    let (value, outcome) = cache
        .get_or_fetch(&filter, || async { Ok::<_, String>(vec![]) })
        .await
        .unwrap();
    assert!(value.is_empty());
    assert_eq!(outcome, CacheOutcome::Fetched);
}

#[tokio::test]
async fn test_waiter_shares_failed_fetch_and_next_call_retries() {
    let cache = Arc::new(ResultCache::new(Duration::from_secs(60), None));
    let fetches = Arc::new(AtomicUsize::new(0));
    let filter = Filter::new().with_location("Bristol");

    let leader = {
        let cache = Arc::clone(&cache);
        let fetches = Arc::clone(&fetches);
        let filter = filter.clone();
        tokio::spawn(async move {
            cache
                .get_or_fetch(&filter, || async {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Err::<Vec<Resource>, _>("store down".to_string())
                })
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;

    let follower = {
        let cache = Arc::clone(&cache);
        let fetches = Arc::clone(&fetches);
        let filter = filter.clone();
        tokio::spawn(async move {
            cache
                .get_or_fetch(&filter, || async {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(vec![resource("7")])
                })
                .await
        })
    };

    let leader_err = leader.await.unwrap().unwrap_err();
    let follower_err = follower.await.unwrap().unwrap_err();
    assert_eq!(leader_err.as_str(), "store down");
    assert_eq!(follower_err.as_str(), "store down");
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
    assert!(cache.is_empty().await);

    // Nothing was cached, so the next call fetches again
    let (value, outcome) = cache
        .get_or_fetch(&filter, || async {
            fetches.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(vec![resource("7")])
        })
        .await
        .unwrap();
    assert_eq!(value[0].id, "7");
    assert_eq!(outcome, CacheOutcome::Fetched);
    assert_eq!(fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_expired_entry_is_refetched() {
    let cache = ResultCache::new(Duration::from_millis(30), None);
    let filter = Filter::new().with_location("Oslo");

    let (_, first) = cache
        .get_or_fetch(&filter, || async { Ok::<_, String>(vec![resource("1")]) })
        .await
        .unwrap();
    let (_, second) = cache
        .get_or_fetch(&filter, || async { Ok::<_, String>(vec![resource("1")]) })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    let (_, third) = cache
        .get_or_fetch(&filter, || async { Ok::<_, String>(vec![resource("1")]) })
        .await
        .unwrap();

    assert_eq!(
        (first, second, third),
        (CacheOutcome::Fetched, CacheOutcome::Hit, CacheOutcome::Fetched)
    );
    let stats = cache.stats().await;
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 2);
}
