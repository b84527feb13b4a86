//! Integration tests for stale-entry selection and the cleanup sweep.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use prefetch_orchestrator::cache::evictor::StaleSelector;
use prefetch_orchestrator::cache::fetcher::FetcherRegistry;
use prefetch_orchestrator::cache::key::{ResourceKey, ResourceKind};
use prefetch_orchestrator::cache::manager::CacheManager;
use prefetch_orchestrator::cache::store::SharedCache;
use prefetch_orchestrator::config::CacheConfig;
use prefetch_orchestrator::metrics::Metrics;
use prefetch_orchestrator::network::monitor::{
    ConnectionMonitor, ConnectionQuality, EffectiveType, LinkInfo, NetworkEvent, NetworkStatus,
};
use prefetch_orchestrator::network::policy::Policy;

fn topic(id: u32) -> ResourceKey {
    ResourceKey::new(ResourceKind::Topic).with("topicId", id.to_string())
}

#[test]
fn test_victims_oldest_first() {
    let selector = StaleSelector::new(Duration::from_secs(1800));
    let entries = vec![
        (topic(0), Duration::from_secs(60)),
        (topic(1), Duration::from_secs(3600)),
        (topic(2), Duration::from_secs(1800)),
        (topic(3), Duration::from_secs(7200)),
    ];

    let victims: Vec<_> = selector
        .select_victims(entries.iter())
        .into_iter()
        .map(|c| c.key)
        .collect();
    assert_eq!(victims, vec![topic(3), topic(1), topic(2)]);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_pauses_while_connection_is_fast() {
    let monitor = ConnectionMonitor::new(NetworkStatus::online(Some(LinkInfo::new(
        EffectiveType::FourG,
        10.0,
    ))));
    let cache = SharedCache::new(FetcherRegistry::new(), Duration::from_secs(300));
    let metrics = Arc::new(Metrics::new().unwrap());
    let manager = Arc::new(CacheManager::new(
        cache.clone(),
        Policy::new(monitor.subscribe()),
        CacheConfig::default(),
        metrics.clone(),
    ));
    for id in 0..3 {
        cache.set(topic(id), json!({ "id": id })).await;
    }

    let _sweep = manager.start_cleanup();
    tokio::time::sleep(Duration::from_secs(61 * 60)).await;
    // Aggressive strategy on a fast link keeps everything.
    assert_eq!(cache.len().await, 3);

    assert_eq!(
        monitor.handle(NetworkEvent::LinkChanged(LinkInfo::new(EffectiveType::ThreeG, 1.0))),
        ConnectionQuality::Slow
    );
    tokio::time::sleep(Duration::from_secs(10 * 60)).await;
    assert!(cache.is_empty().await);
    assert!(metrics.encode().contains("prefetch_cache_evictions_total 3"));
}

#[tokio::test(start_paused = true)]
async fn test_custom_threshold() {
    let cache = SharedCache::new(FetcherRegistry::new(), Duration::from_secs(300));
    let manager = CacheManager::new(
        cache.clone(),
        Policy::fixed(ConnectionQuality::Offline),
        CacheConfig {
            stale_threshold_secs: 60,
            ..CacheConfig::default()
        },
        Arc::new(Metrics::new().unwrap()),
    );
    cache.set(topic(1), json!(1)).await;
    tokio::time::advance(Duration::from_secs(59)).await;
    assert_eq!(manager.cleanup_stale_cache().await.evicted, 0);

    tokio::time::advance(Duration::from_secs(1)).await;
    let report = manager.cleanup_stale_cache().await;
    assert_eq!(report.examined, 1);
    assert_eq!(report.evicted, 1);
}
