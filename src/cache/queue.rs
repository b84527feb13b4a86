//! Prioritized fetch queue.
//!
//! Holds planned prefetch operations in priority order and hands them out
//! while an in-flight cap allows. The prefetcher drains one queue per call,
//! so route fetches and speculative fetches never compete for the same slots.

use std::collections::VecDeque;
use std::fmt;

use tracing::debug;

use crate::cache::key::ResourceKey;

/// Why a fetch was planned. Higher variants are more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FetchPriority {
    Background,
    Predictive,
    Route,
}

impl FetchPriority {
    /// Label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            FetchPriority::Background => "background",
            FetchPriority::Predictive => "predictive",
            FetchPriority::Route => "route",
        }
    }
}

impl fmt::Display for FetchPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A planned fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOp {
    pub key: ResourceKey,
    pub priority: FetchPriority,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct QueueStats {
    pub total_scheduled: u64,
    pub total_completed: u64,
    pub total_failed: u64,
    pub total_dropped: u64,
}

/// Priority queue with an in-flight cap.
pub struct FetchQueue {
    queue: VecDeque<FetchOp>,
    max_concurrent: usize,
    in_flight: usize,
    stats: QueueStats,
}

impl FetchQueue {
    /// `max_concurrent` is clamped to at least one.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            max_concurrent: max_concurrent.max(1),
            in_flight: 0,
            stats: QueueStats::default(),
        }
    }

    /// Queue an operation behind every operation of equal or higher priority.
    /// A key already queued is not queued twice.
    pub fn schedule(&mut self, op: FetchOp) -> bool {
        if self.queue.iter().any(|existing| existing.key == op.key) {
            self.stats.total_dropped += 1;
            return false;
        }

        let pos = self
            .queue
            .iter()
            .position(|existing| existing.priority < op.priority)
            .unwrap_or(self.queue.len());

        debug!(key = %op.key, priority = %op.priority, "Scheduled fetch");

        self.queue.insert(pos, op);
        self.stats.total_scheduled += 1;
        true
    }

    /// Dequeue the next operation if a slot is free.
    pub fn next(&mut self) -> Option<FetchOp> {
        if self.in_flight >= self.max_concurrent {
            return None;
        }
        let op = self.queue.pop_front()?;
        self.in_flight += 1;
        Some(op)
    }

    /// Release a slot.
    pub fn complete(&mut self, success: bool) {
        self.in_flight = self.in_flight.saturating_sub(1);
        if success {
            self.stats.total_completed += 1;
        } else {
            self.stats.total_failed += 1;
        }
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.in_flight == 0
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }
}
