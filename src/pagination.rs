//! Infinite loading: an incrementally growing, paginated result set.
//!
//! [`SessionState`] holds the state machine as pure transition functions.
//! [`InfiniteLoader`] is the async adapter a listing drives: it calls the
//! page fetcher between `begin_load` and `complete`, outside the lock.
//!
//! ```text
//!   idle ──loadMore──▶ loading ──items──▶ idle
//!     ▲                  │  │
//!     │ reset            │  └──empty──▶ exhausted
//!     │                  └──error──▶ errored ──loadMore (retry, same offset)──▶ loading
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Exhausted,
    Errored,
}

/// A page request handed out by [`SessionState::begin_load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
    generation: u64,
}

/// What a `load_more` call did.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// Already loading or exhausted; nothing was fetched.
    Skipped,
    Appended(usize),
    Exhausted,
    Failed(FetchError),
    /// The session was reset while this page was in flight; the page was dropped.
    Discarded,
}

/// The listing-facing view: `{data, is_loading, has_more, error}`.
#[derive(Debug, Clone, PartialEq)]
pub struct InfiniteView<T> {
    pub data: Vec<T>,
    pub is_loading: bool,
    pub has_more: bool,
    pub error: Option<FetchError>,
}

/// Pagination session state.
#[derive(Debug, Clone)]
pub struct SessionState<T> {
    accumulated: Vec<T>,
    state: LoadState,
    last_error: Option<FetchError>,
    page_size: usize,
    prefetch_threshold: usize,
    generation: u64,
}

impl<T> SessionState<T> {
    pub fn new(page_size: usize, prefetch_threshold: usize) -> Self {
        Self {
            accumulated: Vec::new(),
            state: LoadState::Idle,
            last_error: None,
            page_size,
            prefetch_threshold,
            generation: 0,
        }
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn items(&self) -> &[T] {
        &self.accumulated
    }

    /// Next offset to request. Errors never advance it.
    pub fn offset(&self) -> usize {
        self.accumulated.len()
    }

    pub fn has_more(&self) -> bool {
        self.state != LoadState::Exhausted
    }

    pub fn is_loading(&self) -> bool {
        self.state == LoadState::Loading
    }

    pub fn last_error(&self) -> Option<&FetchError> {
        self.last_error.as_ref()
    }

    /// Enter `loading` and return the page to fetch, or `None` when already
    /// loading or exhausted.
    pub fn begin_load(&mut self) -> Option<PageRequest> {
        match self.state {
            LoadState::Loading | LoadState::Exhausted => None,
            LoadState::Idle | LoadState::Errored => {
                self.state = LoadState::Loading;
                Some(PageRequest {
                    offset: self.offset(),
                    limit: self.page_size,
                    generation: self.generation,
                })
            }
        }
    }

    /// Apply the result of a page fetch.
    pub fn complete(&mut self, request: PageRequest, result: Result<Vec<T>, FetchError>) -> LoadOutcome {
        if request.generation != self.generation {
            return LoadOutcome::Discarded;
        }
        match result {
            Ok(items) if items.is_empty() => {
                self.state = LoadState::Exhausted;
                self.last_error = None;
                LoadOutcome::Exhausted
            }
            Ok(items) => {
                let count = items.len();
                self.accumulated.extend(items);
                self.state = LoadState::Idle;
                self.last_error = None;
                LoadOutcome::Appended(count)
            }
            Err(err) => {
                self.state = LoadState::Errored;
                self.last_error = Some(err.clone());
                LoadOutcome::Failed(err)
            }
        }
    }

    /// Clear everything and start over from offset 0. A page still in
    /// flight will be discarded when it lands.
    pub fn reset(&mut self) {
        self.accumulated.clear();
        self.state = LoadState::Idle;
        self.last_error = None;
        self.generation += 1;
    }

    /// Whether the viewer at `visible_index` is close enough to the end to
    /// load the next page.
    pub fn should_load_more(&self, visible_index: usize) -> bool {
        !self.is_loading()
            && self.has_more()
            && visible_index.saturating_add(self.prefetch_threshold) >= self.accumulated.len()
    }
}

impl<T: Clone> SessionState<T> {
    pub fn view(&self) -> InfiniteView<T> {
        InfiniteView {
            data: self.accumulated.clone(),
            is_loading: self.is_loading(),
            has_more: self.has_more(),
            error: self.last_error.clone(),
        }
    }
}

/// Fetches one page: `(offset, limit) -> items`.
#[async_trait]
pub trait PageFetcher<T>: Send + Sync {
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Vec<T>, FetchError>;
}

#[async_trait]
impl<T, F, Fut> PageFetcher<T> for F
where
    T: Send + 'static,
    F: Fn(usize, usize) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<T>, FetchError>> + Send,
{
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Vec<T>, FetchError> {
        self(offset, limit).await
    }
}

/// One listing's pagination session.
pub struct InfiniteLoader<T> {
    state: Arc<Mutex<SessionState<T>>>,
    fetcher: Arc<dyn PageFetcher<T>>,
}

impl<T> Clone for InfiniteLoader<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            fetcher: Arc::clone(&self.fetcher),
        }
    }
}

impl<T: Clone + Send + 'static> InfiniteLoader<T> {
    pub fn new(fetcher: Arc<dyn PageFetcher<T>>, page_size: usize, prefetch_threshold: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::new(page_size, prefetch_threshold))),
            fetcher,
        }
    }

    /// Fetch and append the next page. At most one load runs at a time;
    /// calls made while loading or after exhaustion return `Skipped`.
    pub async fn load_more(&self) -> LoadOutcome {
        let Some(request) = self.state.lock().await.begin_load() else {
            return LoadOutcome::Skipped;
        };
        debug!(offset = request.offset, limit = request.limit, "Loading page");

        let result = self.fetcher.fetch_page(request.offset, request.limit).await;
        if let Err(err) = &result {
            warn!(
                offset = request.offset,
                error = %err,
                retryable = err.is_retryable(),
                "Page load failed"
            );
        }

        let outcome = self.state.lock().await.complete(request, result);
        debug!(?outcome, "Page load complete");
        outcome
    }

    /// Load only if the viewer is near the end.
    pub async fn load_if_needed(&self, visible_index: usize) -> LoadOutcome {
        if !self.should_load_more(visible_index).await {
            return LoadOutcome::Skipped;
        }
        self.load_more().await
    }

    pub async fn should_load_more(&self, visible_index: usize) -> bool {
        self.state.lock().await.should_load_more(visible_index)
    }

    pub async fn reset(&self) {
        self.state.lock().await.reset();
    }

    pub async fn view(&self) -> InfiniteView<T> {
        self.state.lock().await.view()
    }

    pub async fn state(&self) -> LoadState {
        self.state.lock().await.state()
    }
}
