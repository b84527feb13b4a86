//! Cache manager: bulk lifecycle operations on the shared cache.
//!
//! - warm the essential, user-independent data at startup
//! - warm the signed-in user's data once an identity is known, replacing
//!   whatever was warmed for a previous user
//! - repeat both warms when the connection comes back, since they are
//!   skipped while offline
//! - sweep stale entries on a fixed interval, unless the policy says to
//!   keep data aggressively
//!
//! Each operation is idempotent. One failing fetch or eviction never stops
//! the rest of its batch.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::evictor::StaleSelector;
use crate::cache::key::{KeyPattern, ResourceKey, ResourceKind};
use crate::cache::store::SharedCache;
use crate::config::CacheConfig;
use crate::identity::UserId;
use crate::metrics::Metrics;
use crate::network::monitor::ConnectionQuality;
use crate::network::policy::{CacheStrategy, Policy};
use crate::task::{spawn_periodic, TaskHandle};

/// Catalog data every page may need before anything user-specific.
pub const ESSENTIAL_KINDS: [ResourceKind; 4] = [
    ResourceKind::Subjects,
    ResourceKind::Quizzes,
    ResourceKind::DailyChallenge,
    ResourceKind::Leaderboard,
];

/// User data warmed right after sign-in.
pub const POST_AUTH_KINDS: [ResourceKind; 7] = [
    ResourceKind::UserProfile,
    ResourceKind::UserStats,
    ResourceKind::UserProgress,
    ResourceKind::UserStreak,
    ResourceKind::ActiveQuests,
    ResourceKind::ActiveSessions,
    ResourceKind::Recommendations,
];

fn post_auth_keys(user: &UserId) -> Vec<ResourceKey> {
    POST_AUTH_KINDS
        .iter()
        .map(|kind| ResourceKey::for_user(*kind, user))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarmReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Not attempted: offline, or no signed-in user.
    pub skipped: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub examined: usize,
    pub evicted: usize,
    pub failed: usize,
    /// Not run because the cache strategy is aggressive.
    pub skipped: bool,
}

pub struct CacheManager {
    cache: SharedCache,
    policy: Policy,
    config: CacheConfig,
    selector: StaleSelector,
    metrics: Arc<Metrics>,
    /// User whose data was last warmed.
    warmed_user: Mutex<Option<UserId>>,
}

impl CacheManager {
    pub fn new(cache: SharedCache, policy: Policy, config: CacheConfig, metrics: Arc<Metrics>) -> Self {
        let selector = StaleSelector::new(config.stale_threshold());
        Self {
            cache,
            policy,
            config,
            selector,
            metrics,
            warmed_user: Mutex::new(None),
        }
    }

    /// Warm the catalog-level data. Independent of authentication.
    pub async fn warm_essential_cache(&self) -> WarmReport {
        let keys = ESSENTIAL_KINDS.iter().map(|kind| ResourceKey::new(*kind)).collect();
        let report = self.warm(keys, "essential").await;
        info!(?report, "Essential cache warmed");
        report
    }

    /// Warm the user-scoped data for `user`.
    ///
    /// Skipped without a user. Warming for a different user than last time
    /// first drops the previous user's entries.
    pub async fn warm_post_auth_cache(&self, user: Option<&UserId>) -> WarmReport {
        let Some(user) = user else {
            debug!("No authenticated user, post-auth warm skipped");
            return WarmReport {
                skipped: true,
                ..Default::default()
            };
        };

        {
            let mut warmed = self.warmed_user.lock().await;
            if let Some(previous) = warmed.as_ref().filter(|previous| *previous != user) {
                let removed = self
                    .cache
                    .remove_matching(&KeyPattern::User(previous.clone()))
                    .await;
                info!(%previous, %user, removed, "User switched, dropped previous user's entries");
            }
            *warmed = Some(user.clone());
        }

        let report = self.warm(post_auth_keys(user), "post_auth").await;
        info!(%user, ?report, "Post-auth cache warmed");
        report
    }

    /// Warm the essential set and the current user's set again. Only keys
    /// that are missing or stale are fetched.
    pub async fn warm_after_reconnect(&self) -> (WarmReport, WarmReport) {
        let essential = self.warm_essential_cache().await;

        // Held across the warm so a concurrent sign-out waits for it and
        // then drops what it stored.
        let warmed = self.warmed_user.lock().await;
        let post_auth = match warmed.as_ref() {
            Some(user) => {
                let report = self.warm(post_auth_keys(user), "post_auth").await;
                info!(%user, ?report, "Post-auth cache re-warmed");
                report
            }
            None => WarmReport {
                skipped: true,
                ..Default::default()
            },
        };
        (essential, post_auth)
    }

    /// Drop the signed-out user's entries.
    pub async fn forget_user(&self) -> usize {
        let Some(previous) = self.warmed_user.lock().await.take() else {
            return 0;
        };
        let removed = self.cache.remove_matching(&KeyPattern::User(previous.clone())).await;
        info!(user = %previous, removed, "Dropped signed-out user's entries");
        removed
    }

    /// Remove entries older than the staleness threshold.
    pub async fn cleanup_stale_cache(&self) -> CleanupReport {
        if self.policy.settings().cache_strategy == CacheStrategy::Aggressive {
            debug!("Aggressive cache strategy, stale sweep skipped");
            return CleanupReport {
                skipped: true,
                ..Default::default()
            };
        }

        let ages = self.cache.ages().await;
        let victims = self.selector.select_victims(ages.iter());
        let mut report = CleanupReport {
            examined: ages.len(),
            ..Default::default()
        };

        for victim in victims {
            match self.cache.remove(&victim.key).await {
                Ok(true) => {
                    report.evicted += 1;
                    self.metrics.evictions.inc();
                    debug!(key = %victim.key, age_secs = victim.age.as_secs(), "Evicted stale entry");
                }
                // Removed concurrently by someone else.
                Ok(false) => {}
                Err(err) => {
                    report.failed += 1;
                    warn!(key = %victim.key, error = %err, "Failed to evict stale entry");
                }
            }
        }

        if report.evicted > 0 || report.failed > 0 {
            info!(?report, "Stale sweep complete");
        }
        report
    }

    /// Run the stale sweep every `cleanup_interval`.
    pub fn start_cleanup(self: &Arc<Self>) -> TaskHandle {
        let this = Arc::clone(self);
        spawn_periodic("cache-cleanup", self.config.cleanup_interval(), move || {
            let this = Arc::clone(&this);
            async move {
                this.cleanup_stale_cache().await;
            }
        })
    }

    async fn warm(&self, keys: Vec<ResourceKey>, origin: &'static str) -> WarmReport {
        if self.policy.quality() == ConnectionQuality::Offline {
            debug!(origin, "Offline, warm skipped");
            return WarmReport {
                skipped: true,
                ..Default::default()
            };
        }

        let results: Vec<(ResourceKey, bool)> = stream::iter(keys)
            .map(|key| {
                let cache = self.cache.clone();
                async move {
                    let result = cache.prefetch(&key).await;
                    if let Err(err) = &result {
                        warn!(%key, origin, error = %err, "Warm fetch failed");
                    }
                    (key, result.is_ok())
                }
            })
            .buffer_unordered(self.config.warm_concurrency.max(1))
            .collect()
            .await;

        let mut report = WarmReport {
            attempted: results.len(),
            ..Default::default()
        };
        for (_, ok) in &results {
            self.metrics.record_fetch(origin, *ok);
            if *ok {
                report.succeeded += 1;
            } else {
                report.failed += 1;
            }
        }
        report
    }
}
