//! Prometheus counters for the orchestrator.
//!
//! One registry per orchestrator, never a process global, so two contexts
//! in one process (tests, user switch) keep separate counts.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,

    /// Fetches issued by the engine, by origin and outcome.
    pub fetches: IntCounterVec,

    /// Sync attempts by outcome.
    pub sync_runs: IntCounterVec,

    /// Entries removed by the stale sweep.
    pub evictions: IntCounter,

    /// Current connection quality level (2 fast, 1 slow, 0 offline).
    pub connection_quality: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let fetches = IntCounterVec::new(
            Opts::new("prefetch_fetches_total", "Fetches issued by the engine"),
            &["origin", "outcome"],
        )?;
        let sync_runs = IntCounterVec::new(
            Opts::new("prefetch_sync_runs_total", "Smart sync attempts"),
            &["outcome"],
        )?;
        let evictions = IntCounter::new(
            "prefetch_cache_evictions_total",
            "Entries removed by the stale sweep",
        )?;
        let connection_quality = IntGauge::new(
            "prefetch_connection_quality",
            "Connection quality level (2 fast, 1 slow, 0 offline)",
        )?;

        registry.register(Box::new(fetches.clone()))?;
        registry.register(Box::new(sync_runs.clone()))?;
        registry.register(Box::new(evictions.clone()))?;
        registry.register(Box::new(connection_quality.clone()))?;

        Ok(Self {
            registry,
            fetches,
            sync_runs,
            evictions,
            connection_quality,
        })
    }

    pub fn record_fetch(&self, origin: &str, success: bool) {
        let outcome = if success { "ok" } else { "error" };
        self.fetches.with_label_values(&[origin, outcome]).inc();
    }

    pub fn record_sync(&self, outcome: &str) {
        self.sync_runs.with_label_values(&[outcome]).inc();
    }

    /// Text exposition format.
    pub fn encode(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(err) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %err, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}
