//! Connection quality monitor.
//!
//! The host adapter forwards online/offline transitions and link metadata
//! changes as [`NetworkEvent`]s. Every event reclassifies immediately; there
//! is no debounce, so subscribers must tolerate rapid flips.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info};

/// Downlink above which a 4g link counts as fast, in Mbps.
pub const FAST_DOWNLINK_MBPS: f64 = 2.0;

/// Downlink above which a link is at least usable, in Mbps.
pub const SLOW_DOWNLINK_MBPS: f64 = 0.5;

/// Classified network condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionQuality {
    Fast,
    Slow,
    Offline,
}

impl ConnectionQuality {
    /// Numeric level for gauges: 2 = fast, 1 = slow, 0 = offline.
    pub fn level(self) -> i64 {
        match self {
            ConnectionQuality::Fast => 2,
            ConnectionQuality::Slow => 1,
            ConnectionQuality::Offline => 0,
        }
    }
}

impl fmt::Display for ConnectionQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionQuality::Fast => write!(f, "fast"),
            ConnectionQuality::Slow => write!(f, "slow"),
            ConnectionQuality::Offline => write!(f, "offline"),
        }
    }
}

/// Effective connection type as reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum EffectiveType {
    #[serde(rename = "slow-2g")]
    #[value(name = "slow-2g")]
    Slow2g,
    #[serde(rename = "2g")]
    #[value(name = "2g")]
    TwoG,
    #[serde(rename = "3g")]
    #[value(name = "3g")]
    ThreeG,
    #[serde(rename = "4g")]
    #[value(name = "4g")]
    FourG,
}

/// Link quality metadata.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkInfo {
    pub effective_type: EffectiveType,

    /// Downlink bandwidth estimate in Mbps.
    pub downlink_mbps: f64,

    /// Round-trip estimate in milliseconds, when reported.
    pub rtt_ms: Option<u32>,
}

impl LinkInfo {
    pub fn new(effective_type: EffectiveType, downlink_mbps: f64) -> Self {
        Self {
            effective_type,
            downlink_mbps,
            rtt_ms: None,
        }
    }
}

/// Input events from the host runtime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NetworkEvent {
    Online,
    Offline,
    LinkChanged(LinkInfo),
    LinkUnavailable,
}

/// Raw network state as last reported.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkStatus {
    pub online: bool,
    pub link: Option<LinkInfo>,
}

impl NetworkStatus {
    pub fn online(link: Option<LinkInfo>) -> Self {
        Self { online: true, link }
    }

    pub fn offline() -> Self {
        Self {
            online: false,
            link: None,
        }
    }
}

/// Classify a link from its metadata.
///
/// 4g with more than 2 Mbps is fast. Everything else that is online is slow,
/// including links weaker than 3g / 0.5 Mbps: fast needs a positive signal.
pub fn classify_link(link: &LinkInfo) -> ConnectionQuality {
    if link.effective_type == EffectiveType::FourG && link.downlink_mbps > FAST_DOWNLINK_MBPS {
        ConnectionQuality::Fast
    } else {
        ConnectionQuality::Slow
    }
}

/// Whether a link is usable-slow (3g or above 0.5 Mbps) rather than degraded.
pub fn is_usable_link(link: &LinkInfo) -> bool {
    link.effective_type == EffectiveType::ThreeG
        || link.effective_type == EffectiveType::FourG
        || link.downlink_mbps > SLOW_DOWNLINK_MBPS
}

/// Classify a full network status given the previously computed quality.
///
/// Without link metadata the previous value is kept, except that coming back
/// online from `Offline` lands on `Slow`.
pub fn classify(status: &NetworkStatus, previous: ConnectionQuality) -> ConnectionQuality {
    if !status.online {
        return ConnectionQuality::Offline;
    }
    match &status.link {
        Some(link) => classify_link(link),
        None if previous == ConnectionQuality::Offline => ConnectionQuality::Slow,
        None => previous,
    }
}

/// Tracks network status and publishes quality changes.
pub struct ConnectionMonitor {
    status: watch::Sender<NetworkStatus>,
    quality: watch::Sender<ConnectionQuality>,
}

impl ConnectionMonitor {
    /// Create a monitor from the status observed at process start.
    pub fn new(initial: NetworkStatus) -> Self {
        let quality = classify(&initial, ConnectionQuality::Slow);
        info!(%quality, online = initial.online, "Connection monitor initialized");
        let (status, _) = watch::channel(initial);
        let (quality, _) = watch::channel(quality);
        Self { status, quality }
    }

    /// Apply a host event and reclassify. Returns the quality after the event.
    pub fn handle(&self, event: NetworkEvent) -> ConnectionQuality {
        self.status.send_modify(|status| match event {
            NetworkEvent::Online => status.online = true,
            NetworkEvent::Offline => status.online = false,
            NetworkEvent::LinkChanged(link) => status.link = Some(link),
            NetworkEvent::LinkUnavailable => status.link = None,
        });

        let status = *self.status.borrow();
        let previous = *self.quality.borrow();
        let next = classify(&status, previous);

        self.quality.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            info!(from = %current, to = %next, ?event, "Connection quality changed");
            *current = next;
            true
        });
        debug!(
            ?event,
            quality = %next,
            degraded = status.link.map(|link| !is_usable_link(&link)),
            "Network event handled"
        );
        next
    }

    /// Current classified quality.
    pub fn quality(&self) -> ConnectionQuality {
        *self.quality.borrow()
    }

    /// Last reported raw status.
    pub fn status(&self) -> NetworkStatus {
        *self.status.borrow()
    }

    /// Receiver notified on every quality change.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionQuality> {
        self.quality.subscribe()
    }

    /// Quality changes as a stream; yields the current value first.
    pub fn changes(&self) -> WatchStream<ConnectionQuality> {
        WatchStream::new(self.quality.subscribe())
    }
}
