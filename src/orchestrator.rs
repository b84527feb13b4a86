//! The orchestrator context: builds every component once and owns the
//! recurring work they start.
//!
//! Hosts construct one [`Orchestrator`], call [`Orchestrator::start`] and
//! feed it network events, host events and navigation. Identity changes
//! arrive through a watch channel and drive post-auth warming and the
//! background refresh of live user data.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tracing::{debug, info};

use crate::behavior::profile::{BehaviorAction, BehaviorProfile};
use crate::behavior::storage::DurableStorage;
use crate::behavior::tracker::BehaviorTracker;
use crate::cache::fetcher::FetcherRegistry;
use crate::cache::key::KeyPattern;
use crate::cache::manager::CacheManager;
use crate::cache::prefetcher::{DataPrefetcher, PrefetchReport};
use crate::cache::routes::{RouteParams, RouteTable};
use crate::cache::store::SharedCache;
use crate::config::Config;
use crate::error::OrchestratorError;
use crate::identity::UserId;
use crate::metrics::Metrics;
use crate::network::monitor::{ConnectionMonitor, ConnectionQuality, NetworkEvent, NetworkStatus};
use crate::network::policy::{AdaptiveSettings, Policy};
use crate::pagination::{InfiniteLoader, PageFetcher};
use crate::sync::{HostEvent, SmartSyncController, SyncHandle};
use crate::task::TaskHandle;

const HOST_EVENT_CAPACITY: usize = 16;

/// Result of a navigation: the route's own prefetch, then the speculative one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationReport {
    pub route: PrefetchReport,
    /// `None` when nobody is signed in.
    pub predictive: Option<PrefetchReport>,
}

pub struct Orchestrator {
    config: Config,
    cache: SharedCache,
    monitor: ConnectionMonitor,
    policy: Policy,
    tracker: BehaviorTracker,
    manager: Arc<CacheManager>,
    prefetcher: Arc<DataPrefetcher>,
    sync: SmartSyncController,
    metrics: Arc<Metrics>,
    identity: watch::Receiver<Option<UserId>>,
    host_events: broadcast::Sender<HostEvent>,
    current_route: RwLock<Option<String>>,
    tasks: Mutex<Vec<TaskHandle>>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        fetchers: FetcherRegistry,
        storage: Arc<dyn DurableStorage>,
        identity: watch::Receiver<Option<UserId>>,
        network: NetworkStatus,
    ) -> Result<Self, OrchestratorError> {
        let metrics = Arc::new(Metrics::new()?);
        let cache = SharedCache::new(fetchers, config.cache.stale_time());
        let monitor = ConnectionMonitor::new(network);
        let policy = Policy::new(monitor.subscribe());
        metrics.connection_quality.set(monitor.quality().level());

        let tracker = BehaviorTracker::new(storage, config.behavior.namespace.clone());
        let manager = Arc::new(CacheManager::new(
            cache.clone(),
            policy.clone(),
            config.cache.clone(),
            Arc::clone(&metrics),
        ));
        let prefetcher = Arc::new(DataPrefetcher::new(
            cache.clone(),
            policy.clone(),
            RouteTable::default(),
            config.prefetch.clone(),
            Arc::clone(&metrics),
        ));
        let (host_events, _) = broadcast::channel(HOST_EVENT_CAPACITY);
        let sync = SmartSyncController::new(
            cache.clone(),
            policy.clone(),
            config.sync.clone(),
            Arc::clone(&metrics),
            host_events.clone(),
        );

        Ok(Self {
            config,
            cache,
            monitor,
            policy,
            tracker,
            manager,
            prefetcher,
            sync,
            metrics,
            identity,
            host_events,
            current_route: RwLock::new(None),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Warm the essential cache and start the recurring work. Calling it
    /// again while running is a no-op.
    pub async fn start(&self) {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            debug!("Orchestrator already started");
            return;
        }

        self.manager.warm_essential_cache().await;
        tasks.push(self.manager.start_cleanup());
        tasks.push(self.spawn_identity_watcher());
        tasks.push(self.spawn_quality_gauge());
        tasks.push(self.spawn_reconnect_warmer());
        info!(
            quality = %self.policy.quality(),
            tasks = tasks.len(),
            "Orchestrator started"
        );
    }

    /// Cancel every task the orchestrator started.
    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        for task in tasks.iter_mut() {
            task.cancel();
        }
        let stopped = tasks.len();
        tasks.clear();
        info!(stopped, "Orchestrator shut down");
    }

    pub async fn is_running(&self) -> bool {
        !self.tasks.lock().await.is_empty()
    }

    /// Sign-in warms the user's data and starts the live refresh; a switch
    /// restarts both for the new user; sign-out drops the old user's data.
    fn spawn_identity_watcher(&self) -> TaskHandle {
        let manager = Arc::clone(&self.manager);
        let prefetcher = Arc::clone(&self.prefetcher);
        let mut identity = self.identity.clone();

        TaskHandle::spawn("identity-watcher", async move {
            // Dropped with the watcher, which stops the refresh with it.
            let mut refresh: Option<TaskHandle> = None;
            loop {
                let user = identity.borrow_and_update().clone();
                if let Some(mut previous) = refresh.take() {
                    previous.cancel();
                }
                match user {
                    Some(user) => {
                        info!(%user, "User signed in");
                        manager.warm_post_auth_cache(Some(&user)).await;
                        refresh = Some(prefetcher.start_background_refresh(user));
                    }
                    None => {
                        manager.forget_user().await;
                    }
                }
                if identity.changed().await.is_err() {
                    debug!("Identity source closed");
                    break;
                }
            }
        })
    }

    fn spawn_quality_gauge(&self) -> TaskHandle {
        let mut changes = self.monitor.changes();
        let metrics = Arc::clone(&self.metrics);
        TaskHandle::spawn("quality-gauge", async move {
            while let Some(quality) = changes.next().await {
                metrics.connection_quality.set(quality.level());
            }
        })
    }

    /// Warming is skipped while offline, so every return from offline
    /// warms again.
    fn spawn_reconnect_warmer(&self) -> TaskHandle {
        let mut changes = self.monitor.changes();
        let manager = Arc::clone(&self.manager);
        TaskHandle::spawn("reconnect-warmer", async move {
            let mut last = None;
            while let Some(quality) = changes.next().await {
                let reconnected =
                    last == Some(ConnectionQuality::Offline) && quality != ConnectionQuality::Offline;
                last = Some(quality);
                if reconnected {
                    info!(%quality, "Back online, warming cache");
                    manager.warm_after_reconnect().await;
                }
            }
        })
    }

    pub fn current_user(&self) -> Option<UserId> {
        self.identity.borrow().clone()
    }

    /// Warm the resources `route` reads.
    pub async fn prefetch_for_route(&self, route: &str, params: &RouteParams) -> PrefetchReport {
        let user = self.current_user();
        self.prefetcher
            .prefetch_for_route(route, user.as_ref(), params)
            .await
    }

    /// Speculative prefetch from the signed-in user's behaviour profile.
    pub async fn prefetch_predictive_data(&self, current_route: &str) -> Option<PrefetchReport> {
        let user = self.current_user()?;
        let profile = self.tracker.load(&user).await;
        Some(
            self.prefetcher
                .prefetch_predictive_data(&user, current_route, &profile)
                .await,
        )
    }

    /// Route prefetch first, then predictive prefetch at lower priority.
    pub async fn navigate(&self, route: &str, params: &RouteParams) -> NavigationReport {
        *self.current_route.write().await = Some(route.to_string());
        let route_report = self.prefetch_for_route(route, params).await;
        let predictive = self.prefetch_predictive_data(route).await;
        debug!(route, ?route_report, ?predictive, "Navigation prefetch complete");
        NavigationReport {
            route: route_report,
            predictive,
        }
    }

    pub async fn current_route(&self) -> Option<String> {
        self.current_route.read().await.clone()
    }

    /// Record a user action. Returns `None` when nobody is signed in.
    pub async fn track_behavior(&self, action: &BehaviorAction) -> Option<BehaviorProfile> {
        let Some(user) = self.current_user() else {
            debug!(action = action.name(), "No signed-in user, action not tracked");
            return None;
        };
        Some(self.tracker.record(&user, action).await)
    }

    pub async fn behavior_profile(&self) -> Option<BehaviorProfile> {
        let user = self.current_user()?;
        Some(self.tracker.load(&user).await)
    }

    pub fn connection_quality(&self) -> ConnectionQuality {
        self.policy.quality()
    }

    pub fn adaptive_settings(&self) -> AdaptiveSettings {
        self.policy.settings()
    }

    pub fn handle_network_event(&self, event: NetworkEvent) -> ConnectionQuality {
        self.monitor.handle(event)
    }

    /// Relay a host document event to every sync registration.
    pub fn notify_host(&self, event: HostEvent) {
        match self.host_events.send(event) {
            Ok(receivers) => debug!(?event, receivers, "Host event relayed"),
            Err(_) => debug!(?event, "Host event dropped, no sync registered"),
        }
    }

    pub fn register_sync(&self, patterns: Vec<KeyPattern>, interval: Option<Duration>) -> SyncHandle {
        self.sync.register(patterns, interval)
    }

    /// A pagination session with the configured page size and threshold.
    pub fn infinite_loader<T>(&self, fetcher: Arc<dyn PageFetcher<T>>) -> InfiniteLoader<T>
    where
        T: Clone + Send + 'static,
    {
        InfiniteLoader::new(
            fetcher,
            self.config.pagination.page_size,
            self.config.pagination.prefetch_threshold,
        )
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    pub fn manager(&self) -> &CacheManager {
        &self.manager
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
