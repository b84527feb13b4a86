//! Smart sync controller.
//!
//! Each registration owns a key set and a background task that syncs it on
//! a timer, when the host regains visibility or focus, and when the network
//! comes back online. A sync marks matching entries invalidated and, when
//! configured, refetches the ones that were cached.
//!
//! Sync is best effort: a call that arrives while another sync of the same
//! registration is running is dropped, never queued.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::RwLock;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::key::{KeyPattern, ResourceKey};
use crate::cache::store::SharedCache;
use crate::config::SyncConfig;
use crate::metrics::Metrics;
use crate::network::monitor::ConnectionQuality;
use crate::network::policy::Policy;
use crate::task::TaskHandle;

/// Host document events relayed by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    VisibilityGained,
    FocusGained,
}

/// What started a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    Timer,
    Host(HostEvent),
    Reconnect,
    Manual,
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncTrigger::Timer => write!(f, "timer"),
            SyncTrigger::Host(HostEvent::VisibilityGained) => write!(f, "visibility"),
            SyncTrigger::Host(HostEvent::FocusGained) => write!(f, "focus"),
            SyncTrigger::Reconnect => write!(f, "reconnect"),
            SyncTrigger::Manual => write!(f, "manual"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another sync of this registration is running.
    InProgress,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Skipped(SkipReason),
    Completed { invalidated: usize, refetched: usize },
    /// Entries were invalidated but at least one refetch failed.
    Failed { invalidated: usize, failures: usize },
}

impl SyncOutcome {
    fn label(&self) -> &'static str {
        match self {
            SyncOutcome::Skipped(_) => "skipped",
            SyncOutcome::Completed { .. } => "completed",
            SyncOutcome::Failed { .. } => "failed",
        }
    }
}

/// Snapshot of one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncState {
    pub last_sync: Option<Instant>,
    pub is_syncing: bool,
}

/// Clears the syncing flag when the sync ends, however it ends.
struct SyncGuard<'a>(&'a AtomicBool);

impl<'a> SyncGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SyncGuard(flag))
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct SyncTarget {
    id: Uuid,
    patterns: Vec<KeyPattern>,
    cache: SharedCache,
    policy: Policy,
    metrics: Arc<Metrics>,
    refetch_on_invalidate: bool,
    syncing: AtomicBool,
    last_sync: RwLock<Option<Instant>>,
}

impl SyncTarget {
    async fn sync(&self, trigger: SyncTrigger) -> SyncOutcome {
        let outcome = self.run(trigger).await;
        self.metrics.record_sync(outcome.label());
        outcome
    }

    async fn run(&self, trigger: SyncTrigger) -> SyncOutcome {
        if self.policy.quality() == ConnectionQuality::Offline {
            debug!(sync = %self.id, %trigger, "Offline, sync skipped");
            return SyncOutcome::Skipped(SkipReason::Offline);
        }
        let Some(_guard) = SyncGuard::acquire(&self.syncing) else {
            debug!(sync = %self.id, %trigger, "Sync already running, dropped");
            return SyncOutcome::Skipped(SkipReason::InProgress);
        };

        let mut matched: HashSet<ResourceKey> = HashSet::new();
        for pattern in &self.patterns {
            matched.extend(self.cache.invalidate(pattern).await);
        }
        let invalidated = matched.len();

        let mut refetched = 0;
        let mut failures = 0;
        if self.refetch_on_invalidate && !matched.is_empty() {
            let results = join_all(matched.iter().map(|key| async move {
                (key, self.cache.refetch(key).await)
            }))
            .await;
            for (key, result) in results {
                match result {
                    Ok(_) => refetched += 1,
                    Err(err) => {
                        failures += 1;
                        warn!(
                            sync = %self.id,
                            %key,
                            error = %err,
                            retryable = err.is_retryable(),
                            "Sync refetch failed"
                        );
                    }
                }
            }
        }

        if failures > 0 {
            warn!(sync = %self.id, %trigger, invalidated, failures, "Sync failed");
            return SyncOutcome::Failed {
                invalidated,
                failures,
            };
        }

        *self.last_sync.write().await = Some(Instant::now());
        debug!(sync = %self.id, %trigger, invalidated, refetched, "Sync complete");
        SyncOutcome::Completed {
            invalidated,
            refetched,
        }
    }

    async fn state(&self) -> SyncState {
        SyncState {
            last_sync: *self.last_sync.read().await,
            is_syncing: self.syncing.load(Ordering::Acquire),
        }
    }
}

/// A live sync registration. Cancelling or dropping it stops the task.
#[must_use = "dropping a SyncHandle unregisters the sync"]
pub struct SyncHandle {
    target: Arc<SyncTarget>,
    task: TaskHandle,
}

impl SyncHandle {
    pub fn id(&self) -> Uuid {
        self.target.id
    }

    /// Sync immediately, subject to the same guard as automatic triggers.
    pub async fn sync_now(&self) -> SyncOutcome {
        self.target.sync(SyncTrigger::Manual).await
    }

    pub async fn state(&self) -> SyncState {
        self.target.state().await
    }

    pub fn cancel(&mut self) {
        if !self.task.is_cancelled() {
            info!(sync = %self.target.id, "Sync unregistered");
        }
        self.task.cancel();
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl fmt::Debug for SyncHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncHandle")
            .field("id", &self.target.id)
            .field("patterns", &self.target.patterns)
            .finish()
    }
}

pub struct SmartSyncController {
    cache: SharedCache,
    policy: Policy,
    config: SyncConfig,
    metrics: Arc<Metrics>,
    host_events: broadcast::Sender<HostEvent>,
}

impl SmartSyncController {
    pub fn new(
        cache: SharedCache,
        policy: Policy,
        config: SyncConfig,
        metrics: Arc<Metrics>,
        host_events: broadcast::Sender<HostEvent>,
    ) -> Self {
        Self {
            cache,
            policy,
            config,
            metrics,
            host_events,
        }
    }

    /// Register a key set. `interval` defaults to `sync.default_interval_secs`.
    pub fn register(&self, patterns: Vec<KeyPattern>, interval: Option<Duration>) -> SyncHandle {
        let period = interval.unwrap_or_else(|| self.config.default_interval());
        let target = Arc::new(SyncTarget {
            id: Uuid::new_v4(),
            patterns,
            cache: self.cache.clone(),
            policy: self.policy.clone(),
            metrics: Arc::clone(&self.metrics),
            refetch_on_invalidate: self.config.refetch_on_invalidate,
            syncing: AtomicBool::new(false),
            last_sync: RwLock::new(None),
        });
        info!(
            sync = %target.id,
            patterns = target.patterns.len(),
            interval_secs = period.as_secs(),
            "Sync registered"
        );

        let task = TaskHandle::spawn(
            format!("sync-{}", target.id),
            drive(Arc::clone(&target), period, self.host_events.subscribe()),
        );
        SyncHandle { target, task }
    }
}

async fn run_sync(target: Arc<SyncTarget>, trigger: SyncTrigger) -> SyncOutcome {
    target.sync(trigger).await
}

// Syncs run beside the event loop rather than inside it, so a trigger that
// lands mid-sync meets the guard and is dropped instead of waiting its turn.
async fn drive(target: Arc<SyncTarget>, period: Duration, mut host: broadcast::Receiver<HostEvent>) {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut quality = target.policy.subscribe();
    let mut last_quality = *quality.borrow_and_update();
    let mut host_open = true;
    let mut quality_open = true;
    let mut running = FuturesUnordered::new();

    loop {
        tokio::select! {
            Some(_) = running.next(), if !running.is_empty() => {}
            _ = interval.tick() => {
                if !target.policy.settings().background_sync_enabled {
                    debug!(sync = %target.id, "Background sync disabled, tick skipped");
                    continue;
                }
                running.push(run_sync(Arc::clone(&target), SyncTrigger::Timer));
            }
            event = host.recv(), if host_open => match event {
                Ok(event) => {
                    running.push(run_sync(Arc::clone(&target), SyncTrigger::Host(event)));
                }
                // Missed events collapse into one sync.
                Err(RecvError::Lagged(missed)) => {
                    debug!(sync = %target.id, missed, "Host events lagged");
                    running.push(run_sync(
                        Arc::clone(&target),
                        SyncTrigger::Host(HostEvent::VisibilityGained),
                    ));
                }
                Err(RecvError::Closed) => host_open = false,
            },
            changed = quality.changed(), if quality_open => match changed {
                Ok(()) => {
                    let current = *quality.borrow_and_update();
                    let reconnected = last_quality == ConnectionQuality::Offline
                        && current != ConnectionQuality::Offline;
                    last_quality = current;
                    if reconnected {
                        running.push(run_sync(Arc::clone(&target), SyncTrigger::Reconnect));
                    }
                }
                Err(_) => quality_open = false,
            },
        }
    }
}
