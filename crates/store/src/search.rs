//! Debounced, cancelable, cached search.
//!
//! Each `search` call starts a task that waits out the debounce window,
//! consults the per-exact-query cache, and only then hits the network. A
//! newer query cancels the previous task at whatever stage it is in, so
//! only the most recent query's results ever reach state (a slow earlier
//! response can never overwrite a faster later one).

use instago_client::ScreenshotApi;
use instago_core::{CacheManager, Screenshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// What the embedding search UI renders.
#[derive(Debug, Clone, Default)]
pub struct SearchState {
    pub results: Vec<Screenshot>,
    pub searching: bool,
    pub error: Option<String>,
    pub last_query: String,
}

/// Handle to one pending or in-flight search.
pub struct CancelableSearch {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl CancelableSearch {
    /// Cancel the search. Idempotent; once this returns, the task's
    /// completion path never touches state again.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Debounced search executor with per-query result caching.
pub struct SearchCache {
    cache: Arc<CacheManager>,
    api: Arc<dyn ScreenshotApi>,
    state: Arc<RwLock<SearchState>>,
    active: Mutex<Option<CancelableSearch>>,
    debounce: Duration,
}

impl SearchCache {
    pub fn new(cache: Arc<CacheManager>, api: Arc<dyn ScreenshotApi>, debounce: Duration) -> Self {
        Self { cache, api, state: Arc::new(RwLock::new(SearchState::default())), active: Mutex::new(None), debounce }
    }

    /// Current search state.
    pub async fn state(&self) -> SearchState {
        self.state.read().await.clone()
    }

    /// Current result list.
    pub async fn results(&self) -> Vec<Screenshot> {
        self.state.read().await.results.clone()
    }

    /// Schedule a search for `query`.
    ///
    /// Cancels any previous pending/in-flight search. Rapid successive
    /// calls inside the debounce window therefore collapse to one network
    /// call, for the final query. An empty or whitespace query clears the
    /// results immediately without touching cache or network.
    pub async fn search(&self, query: &str) {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            previous.cancel();
        }

        let trimmed = query.trim();
        if trimmed.is_empty() {
            drop(active);
            *self.state.write().await = SearchState::default();
            return;
        }

        let token = CancellationToken::new();
        let task_token = token.clone();
        let cache = self.cache.clone();
        let api = self.api.clone();
        let state = self.state.clone();
        let owned_query = trimmed.to_string();
        let debounce = self.debounce;

        let handle = tokio::spawn(async move {
            run_search(cache, api, state, owned_query, debounce, task_token).await;
        });

        *active = Some(CancelableSearch { token, handle });
    }

    /// Cancel any pending search and reset the state.
    pub async fn clear(&self) {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            previous.cancel();
        }
        drop(active);

        *self.state.write().await = SearchState::default();
    }
}

impl Drop for SearchCache {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.try_lock()
            && let Some(previous) = active.take()
        {
            previous.cancel();
        }
    }
}

async fn run_search(
    cache: Arc<CacheManager>, api: Arc<dyn ScreenshotApi>, state: Arc<RwLock<SearchState>>, query: String,
    debounce: Duration, token: CancellationToken,
) {
    // Debounce window: a newer query cancels us while we sit here.
    tokio::select! {
        _ = token.cancelled() => return,
        _ = tokio::time::sleep(debounce) => {}
    }

    {
        let mut s = state.write().await;
        s.searching = true;
        s.error = None;
        s.last_query = query.clone();
    }

    match cache.search_results(&query).await {
        Ok(Some(results)) => {
            tracing::debug!("using cached search results for {query:?}");
            let mut s = state.write().await;
            s.results = results;
            s.searching = false;
            return;
        }
        Ok(None) => {}
        Err(e) => tracing::warn!("search cache read failed for {query:?}: {e}"),
    }

    tracing::debug!("searching for {query:?}");
    let response = tokio::select! {
        _ = token.cancelled() => return,
        response = api.search(&query) => response,
    };

    if token.is_cancelled() {
        return;
    }

    match response {
        Ok(hits) => {
            let results: Vec<Screenshot> = hits.into_iter().map(|hit| hit.screenshot).collect();
            tracing::debug!("search for {query:?} returned {} results", results.len());

            if let Err(e) = cache.set_search_results(&query, &results).await {
                tracing::warn!("failed to cache search results for {query:?}: {e}");
            }

            let mut s = state.write().await;
            s.results = results;
            s.searching = false;
        }
        Err(e) => {
            tracing::warn!("search for {query:?} failed: {e}");
            let mut s = state.write().await;
            s.error = Some(e.to_string());
            s.results.clear();
            s.searching = false;
        }
    }
}
