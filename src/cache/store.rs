//! The shared key-value cache every component writes into.
//!
//! The store owns freshness timestamps and in-flight deduplication:
//! - concurrent requests for one key share a single fetch (single-flight)
//! - each fetch runs in its own task, so it completes and populates the
//!   cache even if every caller has gone away
//! - an entry is replaced whole under the write lock, so a reader never sees
//!   a half-written value
//! - a fetch whose key is removed while it runs still answers its callers
//!   but is not stored
//!
//! No operation is atomic across more than one key.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::fetcher::{FetcherRegistry, Payload};
use crate::cache::key::{KeyPattern, ResourceKey};
use crate::error::{CacheError, FetchError};

type SharedFetch = Shared<BoxFuture<'static, Result<Payload, FetchError>>>;

/// One cached value.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Payload,
    pub fetched_at: Instant,
    /// Set by `invalidate`; the next read refetches.
    pub invalidated: bool,
}

impl CacheEntry {
    fn new(value: Payload) -> Self {
        Self {
            value,
            fetched_at: Instant::now(),
            invalidated: false,
        }
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.fetched_at)
    }

    pub fn is_fresh(&self, stale_time: Duration, now: Instant) -> bool {
        !self.invalidated && self.age(now) < stale_time
    }
}

/// Cache counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// Network fetches actually started.
    pub fetches: u64,
    /// Requests that joined an already in-flight fetch.
    pub deduplicated: u64,
    pub failures: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    fetches: AtomicU64,
    deduplicated: AtomicU64,
    failures: AtomicU64,
}

struct InFlight {
    fetch: SharedFetch,
    /// Set when the key was removed mid-fetch.
    discard: bool,
}

// Lock order: `in_flight` before `entries`.
struct Inner {
    entries: RwLock<HashMap<ResourceKey, CacheEntry>>,
    in_flight: Mutex<HashMap<ResourceKey, InFlight>>,
    fetchers: FetcherRegistry,
    stale_time: Duration,
    counters: Counters,
}

/// Cloneable handle on the shared cache.
#[derive(Clone)]
pub struct SharedCache {
    inner: Arc<Inner>,
}

impl SharedCache {
    pub fn new(fetchers: FetcherRegistry, stale_time: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: RwLock::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
                fetchers,
                stale_time,
                counters: Counters::default(),
            }),
        }
    }

    /// Cached value, fresh or not.
    pub async fn get(&self, key: &ResourceKey) -> Option<Payload> {
        self.inner
            .entries
            .read()
            .await
            .get(key)
            .map(|entry| entry.value.clone())
    }

    /// Full entry including freshness metadata.
    pub async fn entry(&self, key: &ResourceKey) -> Option<CacheEntry> {
        self.inner.entries.read().await.get(key).cloned()
    }

    pub async fn set(&self, key: ResourceKey, value: Payload) {
        self.inner
            .entries
            .write()
            .await
            .insert(key, CacheEntry::new(value));
    }

    pub async fn contains(&self, key: &ResourceKey) -> bool {
        self.inner.entries.read().await.contains_key(key)
    }

    pub async fn is_fresh(&self, key: &ResourceKey) -> bool {
        let now = Instant::now();
        self.inner
            .entries
            .read()
            .await
            .get(key)
            .is_some_and(|entry| entry.is_fresh(self.inner.stale_time, now))
    }

    /// Mark every matching entry stale. Returns the matched keys.
    pub async fn invalidate(&self, pattern: &KeyPattern) -> Vec<ResourceKey> {
        let mut entries = self.inner.entries.write().await;
        let mut matched = Vec::new();
        for (key, entry) in entries.iter_mut() {
            if pattern.matches(key) {
                entry.invalidated = true;
                matched.push(key.clone());
            }
        }
        debug!(?pattern, count = matched.len(), "Invalidated entries");
        matched
    }

    /// Remove one entry. Refused while a fetch for the key is in flight.
    pub async fn remove(&self, key: &ResourceKey) -> Result<bool, CacheError> {
        if self.inner.in_flight.lock().await.contains_key(key) {
            return Err(CacheError::InFlight(key.clone()));
        }
        Ok(self.inner.entries.write().await.remove(key).is_some())
    }

    /// Remove every entry matching the pattern. Returns how many were removed.
    ///
    /// Fetches in flight for matching keys finish for their callers but do
    /// not repopulate the cache.
    pub async fn remove_matching(&self, pattern: &KeyPattern) -> usize {
        let mut in_flight = self.inner.in_flight.lock().await;
        for (key, pending) in in_flight.iter_mut() {
            if pattern.matches(key) {
                pending.discard = true;
                debug!(%key, "In-flight fetch will be discarded");
            }
        }
        let mut entries = self.inner.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !pattern.matches(key));
        before - entries.len()
    }

    /// Keys and ages of every entry, oldest first.
    pub async fn ages(&self) -> Vec<(ResourceKey, Duration)> {
        let now = Instant::now();
        let entries = self.inner.entries.read().await;
        let mut ages: Vec<_> = entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.age(now)))
            .collect();
        ages.sort_by(|a, b| b.1.cmp(&a.1));
        ages
    }

    /// Fresh cached value, or fetch it.
    pub async fn fetch(&self, key: &ResourceKey) -> Result<Payload, FetchError> {
        let now = Instant::now();
        if let Some(entry) = self.inner.entries.read().await.get(key) {
            if entry.is_fresh(self.inner.stale_time, now) {
                self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entry.value.clone());
            }
        }
        self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
        self.fetch_shared(key).await
    }

    /// Warm one key. Fresh entries are left alone.
    pub async fn prefetch(&self, key: &ResourceKey) -> Result<(), FetchError> {
        if self.is_fresh(key).await {
            return Ok(());
        }
        self.fetch_shared(key).await.map(|_| ())
    }

    /// Fetch regardless of freshness, still joining an in-flight fetch.
    pub async fn refetch(&self, key: &ResourceKey) -> Result<Payload, FetchError> {
        self.fetch_shared(key).await
    }

    pub async fn in_flight(&self) -> usize {
        self.inner.in_flight.lock().await.len()
    }

    pub async fn len(&self) -> usize {
        self.inner.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> CacheStats {
        let counters = &self.inner.counters;
        CacheStats {
            entries: self.len().await,
            hits: counters.hits.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            fetches: counters.fetches.load(Ordering::Relaxed),
            deduplicated: counters.deduplicated.load(Ordering::Relaxed),
            failures: counters.failures.load(Ordering::Relaxed),
        }
    }

    /// Join the in-flight fetch for `key`, or start one.
    async fn fetch_shared(&self, key: &ResourceKey) -> Result<Payload, FetchError> {
        let shared = {
            let mut in_flight = self.inner.in_flight.lock().await;
            if let Some(existing) = in_flight.get(key) {
                self.inner
                    .counters
                    .deduplicated
                    .fetch_add(1, Ordering::Relaxed);
                debug!(%key, "Joined in-flight fetch");
                existing.fetch.clone()
            } else {
                self.inner.counters.fetches.fetch_add(1, Ordering::Relaxed);
                // The task cannot remove itself from `in_flight` until this
                // lock is released, so the entry below is always cleaned up.
                let handle = tokio::spawn(run_fetch(self.inner.clone(), key.clone()));
                let shared = async move {
                    handle
                        .await
                        .unwrap_or_else(|err| Err(FetchError::Aborted(err.to_string())))
                }
                .boxed()
                .shared();
                in_flight.insert(
                    key.clone(),
                    InFlight {
                        fetch: shared.clone(),
                        discard: false,
                    },
                );
                shared
            }
        };
        shared.await
    }
}

async fn run_fetch(inner: Arc<Inner>, key: ResourceKey) -> Result<Payload, FetchError> {
    debug!(%key, "Fetch started");
    let result = inner.fetchers.fetch(&key).await;

    // Held across the store so `remove_matching` cannot slip in between.
    let mut in_flight = inner.in_flight.lock().await;
    let discard = in_flight.remove(&key).is_some_and(|pending| pending.discard);
    match &result {
        Ok(_) if discard => debug!(%key, "Key removed while fetching, result not stored"),
        Ok(value) => {
            inner
                .entries
                .write()
                .await
                .insert(key.clone(), CacheEntry::new(value.clone()));
            debug!(%key, "Fetch stored");
        }
        Err(err) => {
            inner.counters.failures.fetch_add(1, Ordering::Relaxed);
            warn!(%key, error = %err, retryable = err.is_retryable(), "Fetch failed");
        }
    }
    drop(in_flight);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::fetcher::FnFetcher;
    use crate::cache::key::ResourceKind;
    use serde_json::json;

    fn counting_cache(latency: Duration) -> (SharedCache, Arc<AtomicU64>) {
        let calls = Arc::new(AtomicU64::new(0));
        let counter = calls.clone();
        let fetchers = FetcherRegistry::new().with(
            ResourceKind::Subjects,
            Arc::new(FnFetcher(move |_key: ResourceKey| {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(latency).await;
                    Ok::<_, FetchError>(json!({ "revision": n }))
                }
            })),
        );
        (SharedCache::new(fetchers, Duration::from_secs(60)), calls)
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_fetches_share_one_request() {
        let (cache, calls) = counting_cache(Duration::from_millis(100));
        let key = ResourceKey::new(ResourceKind::Subjects);

        let (a, b, c) = tokio::join!(cache.fetch(&key), cache.prefetch(&key), cache.refetch(&key));
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = cache.stats().await;
        assert_eq!(stats.fetches, 1);
        assert_eq!(stats.deduplicated, 2);
        assert_eq!(cache.in_flight().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_entry_is_served_from_cache() {
        let (cache, calls) = counting_cache(Duration::ZERO);
        let key = ResourceKey::new(ResourceKind::Subjects);

        cache.fetch(&key).await.unwrap();
        cache.fetch(&key).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().await.hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_refetch() {
        let (cache, calls) = counting_cache(Duration::ZERO);
        let key = ResourceKey::new(ResourceKind::Subjects);

        cache.fetch(&key).await.unwrap();
        let matched = cache.invalidate(&KeyPattern::Kind(ResourceKind::Subjects)).await;
        assert_eq!(matched, vec![key.clone()]);
        assert!(!cache.is_fresh(&key).await);

        let value = cache.fetch(&key).await.unwrap();
        assert_eq!(value, json!({ "revision": 1 }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_is_not_cached() {
        let cache = SharedCache::new(FetcherRegistry::new(), Duration::from_secs(60));
        let key = ResourceKey::new(ResourceKind::Quiz).with("quizId", "1");

        let err = cache.fetch(&key).await.unwrap_err();
        assert_eq!(err, FetchError::NoFetcher(ResourceKind::Quiz));
        assert!(!cache.contains(&key).await);
        assert_eq!(cache.stats().await.failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_refused_while_in_flight() {
        let (cache, _) = counting_cache(Duration::from_secs(5));
        let key = ResourceKey::new(ResourceKind::Subjects);
        cache.set(key.clone(), json!("old")).await;

        let pending = {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move { cache.refetch(&key).await })
        };
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(cache.remove(&key).await, Err(CacheError::InFlight(key.clone())));
        pending.await.unwrap().unwrap();
        assert_eq!(cache.remove(&key).await, Ok(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_key_is_not_repopulated_by_in_flight_fetch() {
        let (cache, calls) = counting_cache(Duration::from_secs(5));
        let key = ResourceKey::new(ResourceKind::Subjects);

        let pending = {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move { cache.refetch(&key).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cache.in_flight().await, 1);

        assert_eq!(cache.remove_matching(&KeyPattern::Kind(ResourceKind::Subjects)).await, 0);
        // The caller still gets its answer.
        assert_eq!(pending.await.unwrap().unwrap(), json!({ "revision": 0 }));
        assert!(!cache.contains(&key).await);
        assert_eq!(cache.in_flight().await, 0);

        // Later fetches store as usual.
        cache.fetch(&key).await.unwrap();
        assert!(cache.contains(&key).await);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_ages_oldest_first() {
        let (cache, _) = counting_cache(Duration::ZERO);
        let first = ResourceKey::new(ResourceKind::Topic).with("topicId", "1");
        let second = ResourceKey::new(ResourceKind::Topic).with("topicId", "2");
        cache.set(first.clone(), json!(1)).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.set(second.clone(), json!(2)).await;

        let ages = cache.ages().await;
        assert_eq!(ages[0].0, first);
        assert_eq!(ages[1].0, second);
    }
}
