//! Connection classification and adaptive policy tests.

use prefetch_orchestrator::network::monitor::{
    classify, classify_link, ConnectionMonitor, ConnectionQuality, EffectiveType, LinkInfo,
    NetworkEvent, NetworkStatus,
};
use prefetch_orchestrator::network::policy::{AdaptiveSettings, Policy};

const TYPES: [EffectiveType; 4] = [
    EffectiveType::Slow2g,
    EffectiveType::TwoG,
    EffectiveType::ThreeG,
    EffectiveType::FourG,
];

#[test]
fn test_classification_is_pure() {
    for effective_type in TYPES {
        for downlink in [0.0, 0.3, 1.0, 2.0, 2.01, 3.0, 50.0] {
            let link = LinkInfo::new(effective_type, downlink);
            let expected = if effective_type == EffectiveType::FourG && downlink > 2.0 {
                ConnectionQuality::Fast
            } else {
                ConnectionQuality::Slow
            };
            assert_eq!(classify_link(&link), expected, "{effective_type:?} {downlink}");
            assert_eq!(classify_link(&link), classify_link(&link));

            // Offline wins regardless of metadata or history.
            let offline = NetworkStatus {
                online: false,
                link: Some(link),
            };
            for previous in [ConnectionQuality::Fast, ConnectionQuality::Slow] {
                assert_eq!(classify(&offline, previous), ConnectionQuality::Offline);
            }
        }
    }
}

#[test]
fn test_missing_metadata_keeps_last_known() {
    let status = NetworkStatus::online(None);
    assert_eq!(classify(&status, ConnectionQuality::Fast), ConnectionQuality::Fast);
    assert_eq!(classify(&status, ConnectionQuality::Slow), ConnectionQuality::Slow);
    assert_eq!(classify(&status, ConnectionQuality::Offline), ConnectionQuality::Slow);
}

#[test]
fn test_settings_follow_latest_quality() {
    let monitor = ConnectionMonitor::new(NetworkStatus::online(Some(LinkInfo::new(
        EffectiveType::FourG,
        5.0,
    ))));
    let policy = Policy::new(monitor.subscribe());

    let events = [
        NetworkEvent::LinkChanged(LinkInfo::new(EffectiveType::ThreeG, 1.0)),
        NetworkEvent::Offline,
        NetworkEvent::Online,
        NetworkEvent::LinkChanged(LinkInfo::new(EffectiveType::FourG, 8.0)),
        NetworkEvent::LinkUnavailable,
        NetworkEvent::LinkChanged(LinkInfo::new(EffectiveType::Slow2g, 0.05)),
    ];
    for event in events {
        let quality = monitor.handle(event);
        assert_eq!(policy.quality(), quality);
        assert_eq!(policy.settings(), AdaptiveSettings::for_quality(quality));
    }
}

#[tokio::test]
async fn test_subscribers_see_only_real_changes() {
    let monitor = ConnectionMonitor::new(NetworkStatus::online(Some(LinkInfo::new(
        EffectiveType::FourG,
        5.0,
    ))));
    let mut rx = monitor.subscribe();
    rx.borrow_and_update();

    monitor.handle(NetworkEvent::LinkChanged(LinkInfo::new(EffectiveType::FourG, 9.0)));
    assert!(!rx.has_changed().unwrap());

    monitor.handle(NetworkEvent::Offline);
    assert!(rx.has_changed().unwrap());
    assert_eq!(*rx.borrow_and_update(), ConnectionQuality::Offline);
}
