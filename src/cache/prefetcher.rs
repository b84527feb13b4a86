//! Prefetching: predicts which resources will be needed soon and warms them
//! into the shared cache before a page asks for them.
//!
//! Strategies:
//! 1. Route: the fixed resource set of the route being navigated to
//! 2. Predictive: recent subjects/topics and preferred difficulty from the
//!    user's behaviour profile, at lower priority and concurrency
//! 3. Background: periodic refetch of live user counters
//!
//! Every path is gated by the adaptive policy and swallows fetch errors.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, info, warn};

use crate::behavior::profile::BehaviorProfile;
use crate::cache::key::{ResourceKey, ResourceKind};
use crate::cache::queue::{FetchOp, FetchPriority, FetchQueue};
use crate::cache::routes::{RouteParams, RouteTable};
use crate::cache::store::SharedCache;
use crate::config::PrefetchConfig;
use crate::identity::UserId;
use crate::metrics::Metrics;
use crate::network::policy::Policy;
use crate::task::{spawn_periodic, TaskHandle};

/// User data refreshed by the background path.
pub const LIVE_KINDS: [ResourceKind; 4] = [
    ResourceKind::UserStats,
    ResourceKind::UserProgress,
    ResourceKind::UserStreak,
    ResourceKind::ActiveQuests,
];

/// Outcome of one prefetch call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefetchReport {
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// The policy disabled this call; nothing was fetched.
    pub skipped_by_policy: bool,
}

impl PrefetchReport {
    fn skipped() -> Self {
        Self {
            skipped_by_policy: true,
            ..Default::default()
        }
    }
}

/// Issues background fetches into the shared cache.
pub struct DataPrefetcher {
    cache: SharedCache,
    policy: Policy,
    routes: RouteTable,
    config: PrefetchConfig,
    metrics: Arc<Metrics>,
}

impl DataPrefetcher {
    pub fn new(
        cache: SharedCache,
        policy: Policy,
        routes: RouteTable,
        config: PrefetchConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            cache,
            policy,
            routes,
            config,
            metrics,
        }
    }

    /// Warm the resources of `route`. A no-op while prefetch is disabled.
    pub async fn prefetch_for_route(
        &self,
        route: &str,
        user: Option<&UserId>,
        params: &RouteParams,
    ) -> PrefetchReport {
        if !self.policy.settings().prefetch_enabled {
            debug!(route, quality = %self.policy.quality(), "Route prefetch disabled by policy");
            return PrefetchReport::skipped();
        }

        let ops = self
            .routes
            .resolve(route, user, params)
            .into_iter()
            .map(|key| FetchOp {
                key,
                priority: FetchPriority::Route,
            })
            .collect();

        let report = self.execute(ops, self.config.route_concurrency).await;
        debug!(route, ?report, "Route prefetch complete");
        report
    }

    /// Speculative keys for a user, excluding what `current_route` already loads.
    pub fn plan_predictive(
        &self,
        user: &UserId,
        current_route: &str,
        profile: &BehaviorProfile,
    ) -> Vec<ResourceKey> {
        let implied: HashSet<ResourceKey> = self
            .routes
            .resolve(current_route, Some(user), &RouteParams::new())
            .into_iter()
            .collect();

        let mut planned = Vec::new();
        for subject in profile.top_subjects(self.config.predictive_subjects) {
            planned.push(ResourceKey::new(ResourceKind::Subject).with("subjectId", subject));
            planned.push(ResourceKey::new(ResourceKind::Topics).with("subjectId", subject));
        }
        for topic in profile.latest_topics(self.config.predictive_topics) {
            planned.push(ResourceKey::new(ResourceKind::Topic).with("topicId", topic));
        }
        if let Some(difficulty) = &profile.preferred_difficulty {
            planned.push(
                ResourceKey::new(ResourceKind::Quizzes).with("difficulty", difficulty.as_str()),
            );
        }

        let mut seen = HashSet::new();
        planned
            .into_iter()
            .filter(|key| !implied.contains(key) && seen.insert(key.clone()))
            .take(self.config.max_predictive_fetches)
            .collect()
    }

    /// Warm speculative resources from the behaviour profile.
    pub async fn prefetch_predictive_data(
        &self,
        user: &UserId,
        current_route: &str,
        profile: &BehaviorProfile,
    ) -> PrefetchReport {
        if !self.policy.settings().prefetch_enabled {
            debug!(%user, "Predictive prefetch disabled by policy");
            return PrefetchReport::skipped();
        }

        let ops: Vec<FetchOp> = self
            .plan_predictive(user, current_route, profile)
            .into_iter()
            .map(|key| FetchOp {
                key,
                priority: FetchPriority::Predictive,
            })
            .collect();
        if ops.is_empty() {
            return PrefetchReport::default();
        }

        // Let route fetches issued in the same turn claim the network first.
        tokio::task::yield_now().await;

        let report = self.execute(ops, self.config.predictive_concurrency).await;
        debug!(%user, ?report, "Predictive prefetch complete");
        report
    }

    /// Refetch live user data once, if background sync is enabled.
    pub async fn refresh_live_data(&self, user: &UserId) -> PrefetchReport {
        if !self.policy.settings().background_sync_enabled {
            debug!(%user, "Background refresh skipped by policy");
            return PrefetchReport::skipped();
        }
        let ops = LIVE_KINDS
            .iter()
            .map(|kind| FetchOp {
                key: ResourceKey::for_user(*kind, user),
                priority: FetchPriority::Background,
            })
            .collect();
        self.execute(ops, self.config.route_concurrency).await
    }

    /// Start the recurring refresh of live user data.
    ///
    /// The returned handle must be kept for as long as the refresh should
    /// run; cancelling or dropping it stops the timer.
    pub fn start_background_refresh(self: &Arc<Self>, user: UserId) -> TaskHandle {
        let period = self.config.background_refresh_interval();
        info!(%user, period_secs = period.as_secs(), "Starting background refresh");

        let this = Arc::clone(self);
        spawn_periodic(format!("background-refresh:{user}"), period, move || {
            let this = Arc::clone(&this);
            let user = user.clone();
            async move {
                this.refresh_live_data(&user).await;
            }
        })
    }

    /// Drain planned operations through a priority queue.
    async fn execute(&self, ops: Vec<FetchOp>, concurrency: usize) -> PrefetchReport {
        let mut queue = FetchQueue::new(concurrency);
        for op in ops {
            queue.schedule(op);
        }

        let mut report = PrefetchReport {
            requested: queue.pending(),
            ..Default::default()
        };
        let mut running = FuturesUnordered::new();

        loop {
            while let Some(op) = queue.next() {
                let cache = self.cache.clone();
                running.push(async move {
                    let result = match op.priority {
                        FetchPriority::Background => cache.refetch(&op.key).await.map(|_| ()),
                        FetchPriority::Route | FetchPriority::Predictive => {
                            cache.prefetch(&op.key).await
                        }
                    };
                    (op, result)
                });
            }

            let Some((op, result)) = running.next().await else {
                break;
            };
            queue.complete(result.is_ok());
            self.metrics.record_fetch(op.priority.as_str(), result.is_ok());
            match result {
                Ok(()) => report.succeeded += 1,
                Err(err) => {
                    report.failed += 1;
                    warn!(key = %op.key, origin = %op.priority, error = %err, "Prefetch failed");
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::profile::{BehaviorAction, Difficulty};
    use crate::cache::fetcher::{FetcherRegistry, SimulatedFetcher};
    use crate::network::monitor::ConnectionQuality;
    use std::time::Duration;

    fn prefetcher(quality: ConnectionQuality) -> (DataPrefetcher, SharedCache) {
        let fetchers =
            FetcherRegistry::new().with_all(Arc::new(SimulatedFetcher::new(Duration::ZERO)));
        let cache = SharedCache::new(fetchers, Duration::from_secs(300));
        let prefetcher = DataPrefetcher::new(
            cache.clone(),
            Policy::fixed(quality),
            RouteTable::default(),
            PrefetchConfig::default(),
            Arc::new(Metrics::new().unwrap()),
        );
        (prefetcher, cache)
    }

    fn profile() -> BehaviorProfile {
        let mut profile = BehaviorProfile::default();
        for subject in ["math", "physics"] {
            profile.apply(&BehaviorAction::SubjectView {
                subject_id: subject.into(),
            });
        }
        for topic in ["algebra", "optics"] {
            profile.apply(&BehaviorAction::TopicView {
                topic_id: topic.into(),
            });
        }
        profile.apply(&BehaviorAction::QuizComplete {
            score: 90.0,
            difficulty: Difficulty::Hard,
        });
        profile
    }

    #[tokio::test]
    async fn test_route_prefetch_populates_cache() {
        let (prefetcher, cache) = prefetcher(ConnectionQuality::Fast);
        let report = prefetcher
            .prefetch_for_route("/subjects/42", None, &RouteParams::new())
            .await;

        assert_eq!(report.requested, 2);
        assert_eq!(report.succeeded, 2);
        assert!(
            cache
                .contains(&ResourceKey::new(ResourceKind::Topics).with("subjectId", "42"))
                .await
        );
    }

    #[tokio::test]
    async fn test_route_prefetch_disabled_on_slow() {
        let (prefetcher, cache) = prefetcher(ConnectionQuality::Slow);
        let report = prefetcher
            .prefetch_for_route("/quiz", None, &RouteParams::new())
            .await;

        assert!(report.skipped_by_policy);
        assert_eq!(report.requested, 0);
        assert!(cache.is_empty().await);
    }

    #[test]
    fn test_predictive_plan_excludes_current_route() {
        let (prefetcher, _) = prefetcher(ConnectionQuality::Fast);
        let user = UserId::new("alice");

        let plan = prefetcher.plan_predictive(&user, "/subjects/physics", &profile());
        assert!(!plan.contains(&ResourceKey::new(ResourceKind::Subject).with("subjectId", "physics")));
        assert!(plan.contains(&ResourceKey::new(ResourceKind::Subject).with("subjectId", "math")));
        assert!(plan.contains(&ResourceKey::new(ResourceKind::Topic).with("topicId", "optics")));
        assert!(plan.contains(&ResourceKey::new(ResourceKind::Quizzes).with("difficulty", "hard")));
        assert!(plan.len() <= PrefetchConfig::default().max_predictive_fetches);
    }

    #[test]
    fn test_predictive_plan_is_bounded() {
        let (prefetcher, _) = prefetcher(ConnectionQuality::Fast);
        let plan = prefetcher.plan_predictive(&UserId::new("alice"), "/dashboard", &profile());
        // 2 subjects x 2 + 2 topics + 1 difficulty = 7, capped at 6.
        assert_eq!(plan.len(), 6);
    }

    #[tokio::test]
    async fn test_predictive_skipped_when_disabled() {
        let (prefetcher, cache) = prefetcher(ConnectionQuality::Offline);
        let report = prefetcher
            .prefetch_predictive_data(&UserId::new("alice"), "/dashboard", &profile())
            .await;
        assert!(report.skipped_by_policy);
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_refresh_ticks_until_cancelled() {
        let (prefetcher, cache) = prefetcher(ConnectionQuality::Fast);
        let prefetcher = Arc::new(prefetcher);
        let user = UserId::new("alice");

        let mut handle = prefetcher.start_background_refresh(user.clone());
        tokio::time::sleep(Duration::from_secs(121)).await;
        assert!(cache.contains(&ResourceKey::for_user(ResourceKind::UserStats, &user)).await);
        let fetches = cache.stats().await.fetches;
        assert_eq!(fetches, 4);

        handle.cancel();
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(cache.stats().await.fetches, fetches);
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_raised() {
        let fetchers = FetcherRegistry::new().with_all(Arc::new(
            SimulatedFetcher::new(Duration::ZERO).failing(ResourceKind::DailyChallenge),
        ));
        let cache = SharedCache::new(fetchers, Duration::from_secs(300));
        let prefetcher = DataPrefetcher::new(
            cache,
            Policy::fixed(ConnectionQuality::Fast),
            RouteTable::default(),
            PrefetchConfig::default(),
            Arc::new(Metrics::new().unwrap()),
        );

        let report = prefetcher
            .prefetch_for_route("/quiz", None, &RouteParams::new())
            .await;
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
    }
}
