//! prefetch-orchestrator: adaptive prefetch and cache orchestration for a
//! data-driven learning client.
//!
//! The engine decides what to fetch ahead of need, when to refresh, when to
//! evict and how to page long listings, adapting to connection quality and
//! to the user's recorded behaviour:
//!   connection monitor → adaptive policy → {cache manager, prefetcher, smart sync}
//!
//! [`orchestrator::Orchestrator`] wires everything together.

pub mod behavior;
pub mod cache;
pub mod config;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod network;
pub mod orchestrator;
pub mod pagination;
pub mod sync;
pub mod task;

pub use orchestrator::{NavigationReport, Orchestrator};
