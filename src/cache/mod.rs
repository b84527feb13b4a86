//! Client-side resource cache and everything that fills or drains it.
//!
//! - [`key`]: ResourceKey, ResourceKind and invalidation patterns
//! - [`fetcher`]: per-kind fetchers and the registry that routes to them
//! - [`store`]: the shared cache with single-flight fetches
//! - [`queue`]: priority queue for prefetch operations
//! - [`routes`]: route → resource key mapping
//! - [`prefetcher`]: route, predictive and background prefetch
//! - [`evictor`]: stale-entry selection
//! - [`manager`]: warm-up and periodic stale cleanup

pub mod evictor;
pub mod fetcher;
pub mod key;
pub mod manager;
pub mod prefetcher;
pub mod queue;
pub mod routes;
pub mod store;
