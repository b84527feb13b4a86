//! Error types for the orchestration engine.
//!
//! Background paths (warm, prefetch, sync, behaviour persistence) log these
//! and carry on. Only [`FetchError`] on an explicit page load ever reaches a
//! caller, as the session error of an infinite-loading listing.

use thiserror::Error;

use crate::cache::key::{ResourceKey, ResourceKind};

/// Failure of a single resource fetch.
///
/// `Clone` so that one in-flight fetch result can be handed to every caller
/// waiting on the same key.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Transport-level failure (connection refused, DNS, reset).
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },

    /// The request did not complete in time.
    #[error("request timeout after {0}ms")]
    Timeout(u64),

    /// No fetch function is registered for this resource type.
    #[error("no fetcher registered for resource kind {0}")]
    NoFetcher(ResourceKind),

    /// The payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The fetch task was aborted or panicked.
    #[error("fetch aborted: {0}")]
    Aborted(String),
}

impl FetchError {
    /// Whether retrying the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(_) | FetchError::Timeout(_) | FetchError::Aborted(_) => true,
            FetchError::Http { status, .. } => *status >= 500 || *status == 429,
            FetchError::NoFetcher(_) | FetchError::Decode(_) => false,
        }
    }
}

/// Durable client storage failure.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid storage namespace: {0:?}")]
    InvalidNamespace(String),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Shared cache operation refused.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    /// A fetch for this key is in flight; removing it now would race the write.
    #[error("fetch in flight for {0}")]
    InFlight(ResourceKey),
}

/// Failure constructing the orchestrator context.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
