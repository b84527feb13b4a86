//! Resource fetch functions.
//!
//! The data-access layer supplies one fetcher per [`ResourceKind`]. The
//! engine treats them as opaque async functions and never lets their errors
//! escape a background path.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::cache::key::{ResourceKey, ResourceKind};
use crate::error::FetchError;

/// Cached payload. Opaque to the engine.
pub type Payload = Value;

/// An async fetch function for one resource type.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, key: &ResourceKey) -> Result<Payload, FetchError>;
}

/// Adapter turning an async closure into a [`ResourceFetcher`].
pub struct FnFetcher<F>(pub F);

#[async_trait]
impl<F, Fut> ResourceFetcher for FnFetcher<F>
where
    F: Fn(ResourceKey) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Payload, FetchError>> + Send,
{
    async fn fetch(&self, key: &ResourceKey) -> Result<Payload, FetchError> {
        (self.0)(key.clone()).await
    }
}

/// Fetchers indexed by resource kind.
#[derive(Clone, Default)]
pub struct FetcherRegistry {
    fetchers: HashMap<ResourceKind, Arc<dyn ResourceFetcher>>,
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: ResourceKind, fetcher: Arc<dyn ResourceFetcher>) {
        self.fetchers.insert(kind, fetcher);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, kind: ResourceKind, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        self.register(kind, fetcher);
        self
    }

    /// Register the same fetcher for every kind.
    pub fn with_all(mut self, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        for kind in ALL_KINDS {
            self.fetchers.insert(kind, fetcher.clone());
        }
        self
    }

    pub fn contains(&self, kind: ResourceKind) -> bool {
        self.fetchers.contains_key(&kind)
    }

    pub async fn fetch(&self, key: &ResourceKey) -> Result<Payload, FetchError> {
        let fetcher = self
            .fetchers
            .get(&key.kind)
            .ok_or(FetchError::NoFetcher(key.kind))?;
        fetcher.fetch(key).await
    }
}

const ALL_KINDS: [ResourceKind; 16] = [
    ResourceKind::Subjects,
    ResourceKind::Subject,
    ResourceKind::Topics,
    ResourceKind::Topic,
    ResourceKind::Quizzes,
    ResourceKind::Quiz,
    ResourceKind::DailyChallenge,
    ResourceKind::Leaderboard,
    ResourceKind::UserProfile,
    ResourceKind::UserStats,
    ResourceKind::UserProgress,
    ResourceKind::UserStreak,
    ResourceKind::ActiveQuests,
    ResourceKind::ActiveSessions,
    ResourceKind::Achievements,
    ResourceKind::Recommendations,
];

/// Synthetic backend for the demo binary and benchmarks.
///
/// Sleeps for a fixed latency and answers with a small JSON document
/// describing the key. Kinds listed in `failing` answer with a 503.
pub struct SimulatedFetcher {
    latency: Duration,
    failing: Vec<ResourceKind>,
    calls: AtomicU64,
}

impl SimulatedFetcher {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            failing: Vec::new(),
            calls: AtomicU64::new(0),
        }
    }

    pub fn failing(mut self, kind: ResourceKind) -> Self {
        self.failing.push(kind);
        self
    }

    /// Number of fetches served so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ResourceFetcher for SimulatedFetcher {
    async fn fetch(&self, key: &ResourceKey) -> Result<Payload, FetchError> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failing.contains(&key.kind) {
            return Err(FetchError::Http {
                status: 503,
                message: format!("{} unavailable", key.kind),
            });
        }
        Ok(json!({
            "kind": key.kind,
            "params": key.params,
            "revision": call,
        }))
    }
}
