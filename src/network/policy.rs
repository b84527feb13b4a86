//! Adaptive policy: a fixed lookup from connection quality to settings.
//!
//! Settings are never stored. [`Policy::settings`] derives them from the
//! latest quality on every call, so a reader can never observe a blend of two
//! rows of the table.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::network::monitor::ConnectionQuality;

/// Image quality the UI should request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageQuality {
    High,
    Medium,
    Low,
}

/// How eagerly cached data is retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStrategy {
    /// Keep everything; the stale sweep does not run.
    Aggressive,
    Moderate,
    Minimal,
}

/// Settings bundle consumed by every other component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdaptiveSettings {
    pub prefetch_enabled: bool,
    pub background_sync_enabled: bool,
    pub image_quality: ImageQuality,
    pub cache_strategy: CacheStrategy,
}

impl AdaptiveSettings {
    /// The policy table.
    pub const fn for_quality(quality: ConnectionQuality) -> Self {
        match quality {
            ConnectionQuality::Fast => Self {
                prefetch_enabled: true,
                background_sync_enabled: true,
                image_quality: ImageQuality::High,
                cache_strategy: CacheStrategy::Aggressive,
            },
            ConnectionQuality::Slow => Self {
                prefetch_enabled: false,
                background_sync_enabled: false,
                image_quality: ImageQuality::Medium,
                cache_strategy: CacheStrategy::Moderate,
            },
            ConnectionQuality::Offline => Self {
                prefetch_enabled: false,
                background_sync_enabled: false,
                image_quality: ImageQuality::Low,
                cache_strategy: CacheStrategy::Minimal,
            },
        }
    }
}

/// Read handle on the current policy, cheap to clone into each component.
#[derive(Debug, Clone)]
pub struct Policy {
    quality: watch::Receiver<ConnectionQuality>,
}

impl Policy {
    pub fn new(quality: watch::Receiver<ConnectionQuality>) -> Self {
        Self { quality }
    }

    /// A policy pinned to one quality. Used by tests and tools.
    pub fn fixed(quality: ConnectionQuality) -> Self {
        let (tx, rx) = watch::channel(quality);
        // The receiver keeps the last value after the sender is gone.
        drop(tx);
        Self { quality: rx }
    }

    pub fn quality(&self) -> ConnectionQuality {
        *self.quality.borrow()
    }

    pub fn settings(&self) -> AdaptiveSettings {
        AdaptiveSettings::for_quality(self.quality())
    }

    /// Receiver for quality changes, for components that react to transitions.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionQuality> {
        self.quality.clone()
    }
}
