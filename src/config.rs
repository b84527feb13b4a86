//! Runtime configuration for the prefetch orchestrator.
//!
//! Configuration can be loaded from a JSON file or constructed programmatically.
//! Every interval, budget and threshold the engine uses lives here.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::network::monitor::EffectiveType;

/// Command-line arguments for the simulation binary.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "prefetch-orchestrator",
    about = "Run a simulated client session through the prefetch orchestrator"
)]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub json_logs: bool,

    /// User to sign in as once the essential cache is warm.
    #[arg(long, default_value = "demo-user")]
    pub user: String,

    /// Routes to navigate in order (repeatable).
    #[arg(long = "route", default_values_t = vec!["/dashboard".to_string(), "/quiz".to_string()])]
    pub routes: Vec<String>,

    /// Reported effective connection type.
    #[arg(long, value_enum, default_value = "4g")]
    pub effective_type: EffectiveType,

    /// Reported downlink estimate in Mbps.
    #[arg(long, default_value_t = 10.0)]
    pub downlink: f64,

    /// Start the session offline.
    #[arg(long)]
    pub offline: bool,

    /// Simulated latency of every fetch, in milliseconds.
    #[arg(long, default_value_t = 50)]
    pub latency_ms: u64,

    /// Seconds to keep the session alive after navigating.
    #[arg(long, default_value_t = 2)]
    pub run_secs: u64,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Shared cache freshness and sweep settings.
    pub cache: CacheConfig,

    /// Route, predictive and background prefetch settings.
    pub prefetch: PrefetchConfig,

    /// Smart sync settings.
    pub sync: SyncConfig,

    /// Infinite loading defaults.
    pub pagination: PaginationConfig,

    /// Behaviour profile persistence.
    pub behavior: BehaviorConfig,
}

/// Shared cache lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// An entry younger than this is served without refetching.
    pub stale_time_secs: u64,

    /// Entries older than this are removed by the cleanup sweep.
    pub stale_threshold_secs: u64,

    /// Period of the cleanup sweep.
    pub cleanup_interval_secs: u64,

    /// Maximum concurrent warm fetches per batch.
    pub warm_concurrency: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time_secs: 5 * 60,
            stale_threshold_secs: 30 * 60,
            cleanup_interval_secs: 10 * 60,
            warm_concurrency: 4,
        }
    }
}

impl CacheConfig {
    pub fn stale_time(&self) -> Duration {
        Duration::from_secs(self.stale_time_secs)
    }

    pub fn stale_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_threshold_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// Prefetch strategy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    /// Concurrent fetches for one route prefetch call.
    pub route_concurrency: usize,

    /// Concurrent fetches for one predictive prefetch call.
    pub predictive_concurrency: usize,

    /// Frequent subjects considered by the predictive path.
    pub predictive_subjects: usize,

    /// Recent topics considered by the predictive path.
    pub predictive_topics: usize,

    /// Hard cap on speculative fetches per predictive call.
    pub max_predictive_fetches: usize,

    /// Period of the background refresh of live user data.
    pub background_refresh_secs: u64,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            route_concurrency: 4,
            predictive_concurrency: 1,
            predictive_subjects: 3,
            predictive_topics: 3,
            max_predictive_fetches: 6,
            background_refresh_secs: 120,
        }
    }
}

impl PrefetchConfig {
    pub fn background_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.background_refresh_secs)
    }
}

/// Smart sync settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Interval used by registrations that do not name one.
    pub default_interval_secs: u64,

    /// Refetch matching cached entries right after invalidating them.
    pub refetch_on_invalidate: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_interval_secs: 5 * 60,
            refetch_on_invalidate: true,
        }
    }
}

impl SyncConfig {
    pub fn default_interval(&self) -> Duration {
        Duration::from_secs(self.default_interval_secs)
    }
}

/// Infinite loading defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Items requested per page.
    pub page_size: usize,

    /// Load the next page once the viewer is this close to the end.
    pub prefetch_threshold: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            prefetch_threshold: 5,
        }
    }
}

/// Behaviour profile persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Directory for the file-backed profile store.
    pub storage_dir: PathBuf,

    /// Namespace prefix; profiles are stored under `{namespace}:{user}`.
    pub namespace: String,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from(".prefetch-orchestrator"),
            namespace: "user-behavior".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }
}
