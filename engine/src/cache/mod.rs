//! Result cache
//!
//! Process-wide cache of resource lists keyed by filter fingerprint, backed
//! by a `moka` future cache.
//!
//! - Each entry keeps the TTL in force when it was written, so a runtime TTL
//!   change only affects later writes. Expired entries read as misses.
//! - With `max_entries` set, the least recently used entry is evicted.
//! - [`ResultCache::get_or_fetch`] collapses concurrent calls for one
//!   fingerprint into a single fetch. A failed fetch is handed to every
//!   caller waiting on it and is never cached. If the fetching caller is
//!   dropped, a waiting caller takes over.

use crate::filter::{Filter, Fingerprint};
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use moka::Expiry;
use sdk::types::Resource;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Shared, immutable list of resources
pub type ResourceList = Arc<Vec<Resource>>;

/// How a lookup was served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheOutcome {
    /// Found on the first read
    Hit,
    /// Fetched by a concurrent caller while this one waited
    Coalesced,
    /// Fetched from the store by this caller
    Fetched,
}

impl fmt::Display for CacheOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Hit => "hit",
            Self::Coalesced => "coalesced",
            Self::Fetched => "fetched",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub ttl_secs: u64,
    pub max_entries: Option<usize>,
    pub hit_rate: f64,
}

#[derive(Clone)]
struct Cached {
    value: ResourceList,
    ttl: Duration,
}

/// Expires every entry after the TTL it was written with
struct WrittenTtl;

impl Expiry<Fingerprint, Cached> for WrittenTtl {
    fn expire_after_create(
        &self,
        _key: &Fingerprint,
        value: &Cached,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &Fingerprint,
        value: &Cached,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

pub struct ResultCache {
    entries: Cache<Fingerprint, Cached>,
    max_entries: Option<usize>,
    /// TTL for new entries, in nanoseconds
    ttl_nanos: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

fn nanos(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_nanos()).unwrap_or(u64::MAX)
}

impl ResultCache {
    pub fn new(ttl: Duration, max_entries: Option<usize>) -> Self {
        let mut builder = Cache::builder()
            .expire_after(WrittenTtl)
            .eviction_policy(EvictionPolicy::lru());
        if let Some(max) = max_entries {
            builder = builder.max_capacity(max as u64);
        }
        let entries: Cache<Fingerprint, Cached> = builder.build();

        Self {
            entries,
            max_entries,
            ttl_nanos: AtomicU64::new(nanos(ttl)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &crate::config::CacheConfig) -> Self {
        Self::new(Duration::from_secs(config.ttl_secs), config.max_entries)
    }

    /// Look up a filter; `None` is a miss
    pub async fn get(&self, filter: &Filter) -> Option<ResourceList> {
        self.get_by_key(&filter.fingerprint()).await
    }

    pub async fn get_by_key(&self, key: &Fingerprint) -> Option<ResourceList> {
        match self.entries.get(key).await {
            Some(cached) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(cached.value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a value with an explicit TTL, replacing any existing entry
    pub async fn put(&self, filter: &Filter, value: ResourceList, ttl: Duration) {
        self.entries
            .insert(filter.fingerprint(), Cached { value, ttl })
            .await;
        self.settle().await;
    }

    /// Store a value with the current default TTL
    pub async fn insert(&self, filter: &Filter, value: ResourceList) {
        self.put(filter, value, self.ttl()).await;
    }

    /// Drop the entry for a filter; true if one existed
    pub async fn invalidate(&self, filter: &Filter) -> bool {
        self.entries.remove(&filter.fingerprint()).await.is_some()
    }

    /// Drop every entry. Counters are kept.
    pub async fn clear(&self) {
        self.entries.invalidate_all();
        self.settle().await;
    }

    /// Change the TTL applied to subsequent writes
    pub fn set_ttl(&self, ttl: Duration) {
        self.ttl_nanos.store(nanos(ttl), Ordering::Relaxed);
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_nanos(self.ttl_nanos.load(Ordering::Relaxed))
    }

    /// Apply pending recency updates and evictions
    async fn settle(&self) {
        self.entries.run_pending_tasks().await;
    }

    /// Live entries. Entries past their TTL but not yet swept are skipped.
    pub async fn len(&self) -> usize {
        self.settle().await;
        self.entries.iter().count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> CacheStats {
        let size = self.len().await;
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            hits,
            misses,
            size,
            ttl_secs: self.ttl().as_secs(),
            max_entries: self.max_entries,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }

    /// Return the cached value or run `fetch` and cache its result.
    ///
    /// Concurrent calls for the same fingerprint wait for the first caller's
    /// fetch instead of issuing their own. An error is shared with the
    /// callers that waited for it and is never cached.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        filter: &Filter,
        fetch: F,
    ) -> Result<(ResourceList, CacheOutcome), Arc<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Resource>, E>>,
        E: Send + Sync + 'static,
    {
        let key = filter.fingerprint();

        if let Some(value) = self.get_by_key(&key).await {
            return Ok((value, CacheOutcome::Hit));
        }

        let ttl = self.ttl();
        let mut fetched = false;
        let cached = self
            .entries
            .try_get_with(key, async {
                fetched = true;
                let value = fetch().await?;
                Ok::<_, E>(Cached {
                    value: Arc::new(value),
                    ttl,
                })
            })
            .await?;

        if fetched {
            debug!("Cached {} resources", cached.value.len());
            if self.max_entries.is_some() {
                self.settle().await;
            }
            Ok((cached.value, CacheOutcome::Fetched))
        } else {
            Ok((cached.value, CacheOutcome::Coalesced))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(id: &str) -> Resource {
        Resource {
            id: id.to_string(),
            name: format!("Person {}", id),
            employee_number: format!("E{}", id),
            location: "London".to_string(),
            rank_name: "Consultant".to_string(),
            skills: vec!["python".to_string()],
        }
    }

    fn list(ids: &[&str]) -> ResourceList {
        Arc::new(ids.iter().map(|id| resource(id)).collect())
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let cache = ResultCache::new(Duration::from_secs(60), None);
        let filter = Filter::new().with_location("London");
        cache
            .put(&filter, list(&["1", "2"]), Duration::from_secs(60))
            .await;

        let value = cache.get(&filter).await.unwrap();
        assert_eq!(value.len(), 2);

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.size, 1);
    }

    #[tokio::test]
    async fn test_get_is_case_and_order_independent() {
        let cache = ResultCache::new(Duration::from_secs(60), None);
        let a = Filter::new().with_location("London").with_location("Oslo");
        let b = Filter::new().with_location("oslo").with_location("LONDON");
        cache.insert(&a, list(&["1"])).await;
        assert!(cache.get(&b).await.is_some());
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss_and_removed() {
        let cache = ResultCache::new(Duration::from_secs(60), None);
        let filter = Filter::new().with_skill("python");
        cache
            .put(&filter, list(&["1"]), Duration::from_millis(20))
            .await;
        assert_eq!(cache.stats().await.size, 1);

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(cache.get(&filter).await.is_none());
        let stats = cache.stats().await;
        assert_eq!(stats.size, 0);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_set_ttl_applies_to_later_writes_only() {
        let cache = ResultCache::new(Duration::from_secs(3600), None);
        let early = Filter::new().with_location("London");
        cache.insert(&early, list(&["1"])).await;

        cache.set_ttl(Duration::from_millis(10));
        let late = Filter::new().with_location("Oslo");
        cache.insert(&late, list(&["2"])).await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.get(&early).await.is_some());
        assert!(cache.get(&late).await.is_none());
        assert_eq!(cache.stats().await.ttl_secs, 0);
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let cache = ResultCache::new(Duration::from_secs(60), Some(2));
        let a = Filter::new().with_location("London");
        let b = Filter::new().with_location("Oslo");
        let c = Filter::new().with_location("Bristol");

        cache.insert(&a, list(&["1"])).await;
        cache.insert(&b, list(&["2"])).await;
        // Touch a so b becomes the oldest
        assert!(cache.get(&a).await.is_some());
        cache.insert(&c, list(&["3"])).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get(&a).await.is_some());
        assert!(cache.get(&b).await.is_none());
        assert!(cache.get(&c).await.is_some());
    }

    #[tokio::test]
    async fn test_replace_existing_key() {
        let cache = ResultCache::new(Duration::from_secs(60), Some(2));
        let a = Filter::new().with_location("London");
        cache.insert(&a, list(&["1"])).await;
        cache.insert(&a, list(&["1", "2", "3"])).await;
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get(&a).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let cache = ResultCache::new(Duration::from_secs(60), None);
        let a = Filter::new().with_location("London");
        let b = Filter::new().with_location("Oslo");
        cache.insert(&a, list(&["1"])).await;
        cache.insert(&b, list(&["2"])).await;

        assert!(cache.invalidate(&a).await);
        assert!(!cache.invalidate(&a).await);
        assert_eq!(cache.len().await, 1);

        cache.clear().await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_hit_rate() {
        let cache = ResultCache::new(Duration::from_secs(60), None);
        let a = Filter::new().with_location("London");
        assert!(cache.get(&a).await.is_none());
        cache.insert(&a, list(&["1"])).await;
        assert!(cache.get(&a).await.is_some());
        assert!(cache.get(&a).await.is_some());
        let stats = cache.stats().await;
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let cache = ResultCache::new(Duration::from_secs(60), None);
        let filter = Filter::new().with_location("London");

        let result = cache
            .get_or_fetch(&filter, || async { Err::<Vec<Resource>, _>("store down".to_string()) })
            .await;
        assert_eq!(result.unwrap_err().as_str(), "store down");
        assert!(cache.is_empty().await);

        let (value, outcome) = cache
            .get_or_fetch(&filter, || async { Ok::<_, String>(vec![resource("1")]) })
            .await
            .unwrap();
        assert_eq!(outcome, CacheOutcome::Fetched);
        assert_eq!(value.len(), 1);

        let (_, outcome) = cache
            .get_or_fetch(&filter, || async { Ok::<_, String>(vec![]) })
            .await
            .unwrap();
        assert_eq!(outcome, CacheOutcome::Hit);
    }
}
