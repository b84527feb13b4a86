//! Simulated client session driven through the prefetch orchestrator.
//!
//! Signs a user in, navigates the given routes against a synthetic backend,
//! pages through a listing and prints cache statistics and metrics.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use prefetch_orchestrator::behavior::profile::{BehaviorAction, Difficulty};
use prefetch_orchestrator::behavior::storage::FileStorage;
use prefetch_orchestrator::cache::fetcher::{FetcherRegistry, SimulatedFetcher};
use prefetch_orchestrator::cache::key::{KeyPattern, ResourceKind};
use prefetch_orchestrator::cache::routes::RouteParams;
use prefetch_orchestrator::config::{Cli, Config};
use prefetch_orchestrator::error::FetchError;
use prefetch_orchestrator::identity::{IdentitySource, UserId};
use prefetch_orchestrator::network::monitor::{LinkInfo, NetworkStatus};
use prefetch_orchestrator::pagination::PageFetcher;
use prefetch_orchestrator::sync::HostEvent;
use prefetch_orchestrator::Orchestrator;

/// Size of the synthetic quiz history listing.
const HISTORY_LEN: usize = 45;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "prefetch_orchestrator=debug"
    } else {
        "prefetch_orchestrator=info"
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| filter.into());
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);
    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("prefetch-orchestrator v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load(&cli.config)?;
    info!(
        stale_time_secs = config.cache.stale_time_secs,
        cleanup_interval_secs = config.cache.cleanup_interval_secs,
        background_refresh_secs = config.prefetch.background_refresh_secs,
        page_size = config.pagination.page_size,
        "Configuration loaded"
    );

    let fetcher = Arc::new(SimulatedFetcher::new(Duration::from_millis(cli.latency_ms)));
    let fetchers = FetcherRegistry::new().with_all(fetcher.clone());
    let storage = Arc::new(FileStorage::new(config.behavior.storage_dir.clone()).await?);
    let identity = IdentitySource::default();

    let network = if cli.offline {
        NetworkStatus::offline()
    } else {
        NetworkStatus::online(Some(LinkInfo::new(cli.effective_type, cli.downlink)))
    };

    let orchestrator = Orchestrator::new(config, fetchers, storage, identity.subscribe(), network)?;
    info!(
        quality = %orchestrator.connection_quality(),
        settings = ?orchestrator.adaptive_settings(),
        "Connection classified"
    );

    orchestrator.start().await;
    identity.sign_in(UserId::new(cli.user.clone()));
    // Give the identity watcher a moment to warm the user's data.
    tokio::time::sleep(Duration::from_millis(cli.latency_ms * 2 + 10)).await;

    orchestrator
        .track_behavior(&BehaviorAction::SubjectView {
            subject_id: "algebra".into(),
        })
        .await;
    orchestrator
        .track_behavior(&BehaviorAction::QuizComplete {
            score: 82.0,
            difficulty: Difficulty::Medium,
        })
        .await;

    for route in &cli.routes {
        let report = orchestrator.navigate(route, &RouteParams::new()).await;
        info!(route = %route, ?report, "Navigated");
    }

    let mut progress_sync = orchestrator.register_sync(
        vec![
            KeyPattern::Kind(ResourceKind::UserProgress),
            KeyPattern::Kind(ResourceKind::UserStats),
        ],
        None,
    );
    orchestrator.notify_host(HostEvent::FocusGained);

    let history: Arc<dyn PageFetcher<usize>> = Arc::new(|offset: usize, limit: usize| async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let end = (offset + limit).min(HISTORY_LEN);
        Ok::<_, FetchError>((offset..end).collect::<Vec<_>>())
    });
    let loader = orchestrator.infinite_loader(history);
    loop {
        let outcome = loader.load_more().await;
        let view = loader.view().await;
        info!(?outcome, loaded = view.data.len(), has_more = view.has_more, "Quiz history page");
        if !view.has_more || view.error.is_some() {
            break;
        }
    }

    tokio::time::sleep(Duration::from_secs(cli.run_secs)).await;

    let sync_state = progress_sync.state().await;
    info!(sync = %progress_sync.id(), ?sync_state, "Progress sync state");
    progress_sync.cancel();

    let stats = orchestrator.cache().stats().await;
    info!(
        entries = stats.entries,
        hits = stats.hits,
        misses = stats.misses,
        fetches = stats.fetches,
        deduplicated = stats.deduplicated,
        failures = stats.failures,
        hit_rate = stats.hit_rate(),
        backend_calls = fetcher.calls(),
        "Cache statistics"
    );

    orchestrator.shutdown().await;
    println!("{}", orchestrator.metrics().encode());

    Ok(())
}
