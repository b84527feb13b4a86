//! Stale-entry selection for the cleanup sweep.
//!
//! An entry is a victim once its age reaches the staleness threshold.
//! Victims come back oldest first so that a sweep interrupted part-way has
//! already dropped the worst offenders.

use std::collections::BinaryHeap;
use std::time::Duration;

use crate::cache::key::ResourceKey;

/// An eviction candidate and its age.
#[derive(Debug, Clone)]
pub struct StaleCandidate {
    pub key: ResourceKey,
    pub age: Duration,
}

// Older = higher eviction priority.
impl PartialEq for StaleCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.age == other.age
    }
}

impl Eq for StaleCandidate {}

impl PartialOrd for StaleCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StaleCandidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.age.cmp(&other.age)
    }
}

/// Picks stale entries.
#[derive(Debug, Clone)]
pub struct StaleSelector {
    threshold: Duration,
}

impl StaleSelector {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn is_stale(&self, age: Duration) -> bool {
        age >= self.threshold
    }

    /// Every entry at or past the threshold, oldest first.
    pub fn select_victims<'a>(
        &self,
        entries: impl Iterator<Item = &'a (ResourceKey, Duration)>,
    ) -> Vec<StaleCandidate> {
        let mut heap: BinaryHeap<StaleCandidate> = entries
            .filter(|(_, age)| self.is_stale(*age))
            .map(|(key, age)| StaleCandidate {
                key: key.clone(),
                age: *age,
            })
            .collect();

        let mut victims = Vec::with_capacity(heap.len());
        while let Some(candidate) = heap.pop() {
            victims.push(candidate);
        }
        victims
    }
}
