//! Integration tests for the session orchestrator
//!
//! Uses an instrumented in-memory store to count fetches and to simulate
//! slow or failing backends.

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use roster_engine::cache::{CacheOutcome, ResultCache};
use roster_engine::config::{RanksConfig, TranslatorConfig};
use roster_engine::filter::Filter;
use roster_engine::orchestrator::{
    Orchestrator, OrchestratorSettings, ReplyKind, ResourceSource, TurnState,
};
use roster_engine::rank::RankHierarchy;
use roster_engine::session::SessionRegistry;
use roster_engine::store::{
    AvailabilityMap, MemoryResourceStore, ResourceQuery, ResourceStore, StoreError,
};
use roster_engine::translator::{QueryTranslator, TurnKind};
use sdk::errors::EngineError;
use sdk::types::{AvailabilityRecord, AvailabilityStatus, Resource};

/// Wraps the in-memory store with call counters and failure switches
struct InstrumentedStore {
    inner: MemoryResourceStore,
    finds: AtomicUsize,
    lookups: AtomicUsize,
    fail: AtomicBool,
    delay: Duration,
}

impl InstrumentedStore {
    fn new(inner: MemoryResourceStore) -> Self {
        Self {
            inner,
            finds: AtomicUsize::new(0),
            lookups: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            delay: Duration::ZERO,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl ResourceStore for InstrumentedStore {
    fn name(&self) -> &str {
        "instrumented"
    }

    async fn find_resources(&self, query: &ResourceQuery) -> Result<Vec<Resource>, StoreError> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        self.inner.find_resources(query).await
    }

    async fn availability(
        &self,
        ids: &[String],
        weeks: &BTreeSet<u32>,
    ) -> Result<AvailabilityMap, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        self.inner.availability(ids, weeks).await
    }
}

fn person(id: &str, name: &str, location: &str, rank: &str, skills: &[&str]) -> Resource {
    Resource {
        id: id.to_string(),
        name: name.to_string(),
        employee_number: format!("E{}", id),
        location: location.to_string(),
        rank_name: rank.to_string(),
        skills: skills.iter().map(|s| s.to_string()).collect(),
    }
}

fn week(week_number: u32, status: AvailabilityStatus) -> AvailabilityRecord {
    AvailabilityRecord {
        week_number,
        status,
        hours: match status {
            AvailabilityStatus::Available => 40.0,
            AvailabilityStatus::Partial => 20.0,
            AvailabilityStatus::Unavailable => 0.0,
        },
        notes: None,
    }
}

fn roster() -> MemoryResourceStore {
    use AvailabilityStatus::*;
    let mut store = MemoryResourceStore::new();
    store.insert(
        person("1", "Ada", "London", "Senior Consultant", &["python", "rust"]),
        vec![week(2, Available), week(3, Unavailable)],
    );
    store.insert(
        person("2", "Bo", "London", "Consultant", &["python"]),
        vec![week(2, Unavailable), week(3, Unavailable)],
    );
    store.insert(
        person("3", "Cy", "Oslo", "Partner", &["java"]),
        vec![week(2, Partial)],
    );
    store.insert(person("4", "Di", "Belfast", "Analyst", &["python"]), vec![]);
    store
}

fn build(store: Arc<InstrumentedStore>, settings: OrchestratorSettings) -> Orchestrator {
    let hierarchy = Arc::new(RankHierarchy::from_config(&RanksConfig::default()).unwrap());
    let translator =
        Arc::new(QueryTranslator::new(&TranslatorConfig::default(), hierarchy).unwrap());

    Orchestrator::new(
        translator,
        Arc::new(ResultCache::new(Duration::from_secs(3600), None)),
        store,
        Arc::new(SessionRegistry::new(10)),
        settings,
    )
}

fn setup() -> (Orchestrator, Arc<InstrumentedStore>) {
    let store = Arc::new(InstrumentedStore::new(roster()));
    (
        build(Arc::clone(&store), OrchestratorSettings::default()),
        store,
    )
}

#[tokio::test]
async fn test_fresh_query_then_cache_hit() {
    let (o, store) = setup();

    let first = o.handle_turn("a", "python people in London").await.unwrap();
    assert_eq!(first.kind, ReplyKind::Answer);
    assert_eq!(first.resources.len(), 2);
    assert_eq!(first.source, Some(ResourceSource::Cache(CacheOutcome::Fetched)));
    assert!(first.text.starts_with("Found 2 resources"));

    // Another session with the same criteria in a different order and case
    let second = o.handle_turn("b", "LONDON python").await.unwrap();
    assert_eq!(second.source, Some(ResourceSource::Cache(CacheOutcome::Hit)));
    assert_eq!(store.finds.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_availability_follow_up_reuses_context() {
    let (o, store) = setup();

    o.handle_turn("s", "python developers in London").await.unwrap();
    let reply = o.handle_turn("s", "which of them are unavailable in week 2?").await.unwrap();

    assert_eq!(reply.turn_kind, TurnKind::FollowUp);
    assert_eq!(reply.source, Some(ResourceSource::Context));
    let names: Vec<_> = reply.resources.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Bo"]);
    assert_eq!(
        reply.filter,
        Some(
            Filter::new()
                .with_location("London")
                .with_skill("python")
                .with_week(2)
                .with_status(AvailabilityStatus::Unavailable)
        )
    );

    // One fetch for the first turn, none for the follow-up
    assert_eq!(store.finds.load(Ordering::SeqCst), 1);
    assert_eq!(store.lookups.load(Ordering::SeqCst), 1);
    assert!(reply.states.contains(&TurnState::ResolvingAvailability));
}

#[tokio::test]
async fn test_available_follow_up_without_weeks_checks_every_week() {
    let (o, store) = setup();

    o.handle_turn("s", "python people in London").await.unwrap();
    let reply = o.handle_turn("s", "are any of them available?").await.unwrap();

    assert_eq!(reply.turn_kind, TurnKind::FollowUp);
    assert_eq!(reply.source, Some(ResourceSource::Context));
    let names: Vec<_> = reply.resources.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Ada"]);
    assert_eq!(
        reply.filter,
        Some(
            Filter::new()
                .with_location("London")
                .with_skill("python")
                .with_status(AvailabilityStatus::Available)
        )
    );
    assert_eq!(store.finds.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_follow_up_with_new_location_refetches() {
    let (o, store) = setup();

    o.handle_turn("s", "python people in London").await.unwrap();
    let reply = o.handle_turn("s", "what about Belfast?").await.unwrap();

    assert_eq!(reply.turn_kind, TurnKind::FollowUp);
    assert_eq!(reply.resources.len(), 1);
    assert_eq!(reply.resources[0].name, "Di");
    assert_eq!(store.finds.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_empty_result_suggests_relaxing_skills() {
    let (o, _) = setup();

    let reply = o.handle_turn("s", "rust people in Belfast").await.unwrap();
    assert_eq!(reply.kind, ReplyKind::Answer);
    assert!(reply.resources.is_empty());
    assert!(reply.text.contains("Try relaxing the skills criterion"));
}

#[tokio::test]
async fn test_impossible_rank_skips_fetch() {
    let (o, store) = setup();

    let reply = o.handle_turn("s", "anyone above partner").await.unwrap();
    assert_eq!(reply.source, Some(ResourceSource::Empty));
    assert!(reply.resources.is_empty());
    assert_eq!(store.finds.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_store_failure_degrades_and_keeps_context() {
    let (o, store) = setup();

    o.handle_turn("s", "python people in London").await.unwrap();
    let before = o.context("s").await.unwrap();

    store.fail.store(true, Ordering::SeqCst);
    let reply = o.handle_turn("s", "java people in Oslo").await.unwrap();
    assert_eq!(reply.kind, ReplyKind::Degraded);
    assert!(reply.text.contains("try again"));

    let after = o.context("s").await.unwrap();
    assert_eq!(after.last_filter(), before.last_filter());
    assert_eq!(after.history_len(), 1);
    // The failed fetch was not cached
    assert_eq!(o.cache_stats().await.size, 1);

    store.fail.store(false, Ordering::SeqCst);
    let reply = o.handle_turn("s", "java people in Oslo").await.unwrap();
    assert_eq!(reply.kind, ReplyKind::Answer);
    assert_eq!(reply.resources[0].name, "Cy");
}

#[tokio::test]
async fn test_store_timeout_degrades() {
    let store = Arc::new(InstrumentedStore::new(roster()).with_delay(Duration::from_secs(2)));
    let o = build(
        Arc::clone(&store),
        OrchestratorSettings {
            store_timeout: Duration::from_millis(50),
            fetch_limit: 200,
        },
    );

    let reply = o.handle_turn("s", "partners in Oslo").await.unwrap();
    assert_eq!(reply.kind, ReplyKind::Degraded);
    assert!(reply.text.contains("took too long"));
    assert!(o.context("s").await.unwrap().last_filter().is_none());
    assert_eq!(o.cache_stats().await.size, 0);
}

#[tokio::test]
async fn test_end_session_abandons_in_flight_turn() {
    let store = Arc::new(InstrumentedStore::new(roster()).with_delay(Duration::from_millis(300)));
    let o = Arc::new(build(Arc::clone(&store), OrchestratorSettings::default()));

    let turn = {
        let o = Arc::clone(&o);
        tokio::spawn(async move { o.handle_turn("s", "python people in London").await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(o.end_session("s"));

    let result = turn.await.unwrap();
    assert!(matches!(result, Err(EngineError::SessionClosed(_))));
    assert_eq!(o.cache_stats().await.size, 0);

    // The next turn starts a fresh conversation
    let reply = o.handle_turn("s", "what about week 2?").await.unwrap();
    assert_eq!(reply.turn_kind, TurnKind::Fresh);
}

#[tokio::test]
async fn test_turns_in_one_session_run_in_order() {
    let store = Arc::new(InstrumentedStore::new(roster()).with_delay(Duration::from_millis(50)));
    let o = Arc::new(build(Arc::clone(&store), OrchestratorSettings::default()));

    let first = {
        let o = Arc::clone(&o);
        tokio::spawn(async move { o.handle_turn("s", "python people in London").await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = {
        let o = Arc::clone(&o);
        tokio::spawn(async move { o.handle_turn("s", "which are free in week 2").await })
    };

    first.await.unwrap().unwrap();
    let reply = second.await.unwrap().unwrap();

    // The second turn saw the first turn's context
    assert_eq!(reply.turn_kind, TurnKind::FollowUp);
    assert_eq!(reply.resources.len(), 1);
    assert_eq!(reply.resources[0].name, "Ada");
}

#[tokio::test]
async fn test_concurrent_sessions_share_one_fetch() {
    let store = Arc::new(InstrumentedStore::new(roster()).with_delay(Duration::from_millis(50)));
    let o = Arc::new(build(Arc::clone(&store), OrchestratorSettings::default()));

    let mut handles = Vec::new();
    for i in 0..5 {
        let o = Arc::clone(&o);
        handles.push(tokio::spawn(async move {
            o.handle_turn(&format!("s{}", i), "partners in Oslo").await
        }));
    }
    for result in join_all(handles).await {
        let reply = result.unwrap().unwrap();
        assert_eq!(reply.resources.len(), 1);
    }

    assert_eq!(store.finds.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_admin_operations() {
    let (o, store) = setup();

    o.handle_turn("s", "partners in Oslo").await.unwrap();
    assert_eq!(o.cache_stats().await.size, 1);

    o.clear_cache().await;
    assert_eq!(o.cache_stats().await.size, 0);

    o.set_cache_ttl(60).unwrap();
    assert_eq!(o.cache_stats().await.ttl_secs, 60);

    o.handle_turn("s", "partners in Oslo").await.unwrap();
    assert_eq!(store.finds.load(Ordering::SeqCst), 2);

    assert!(o.end_session("s"));
    assert!(!o.end_session("s"));
    assert!(o.context("s").await.is_none());
}

#[tokio::test]
async fn test_chit_chat_gets_clarification() {
    let (o, store) = setup();

    let reply = o.handle_turn("s", "thanks, that's all").await.unwrap();
    assert_eq!(reply.kind, ReplyKind::Clarification);
    assert_eq!(
        reply.states,
        vec![
            TurnState::Idle,
            TurnState::Classifying,
            TurnState::Responding,
            TurnState::Idle
        ]
    );
    assert_eq!(store.finds.load(Ordering::SeqCst), 0);
}
