//! Cached-first screenshot store.
//!
//! State machine: a cache hit is displayed immediately and, when the sync
//! interval has elapsed, an incremental update runs in the background; a
//! cache miss triggers a full fetch with `loading` raised. Fetch failures
//! fall back to whatever is cached (stale included) before surfacing an
//! error. Background work never regresses visible state: incremental and
//! scheduled failures are logged and swallowed.

use chrono::{DateTime, TimeZone, Utc};
use instago_client::{ListOptions, ScreenshotApi, ThumbnailGenerator, ThumbnailRequest};
use instago_core::cache::CacheStats;
use instago_core::{AppConfig, CacheManager, CachedScreenshot, Screenshot, ScreenshotPatch};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Ceiling on the scheduler tick regardless of the refresh interval.
const MAX_TICK_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Behavior knobs for the store.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub thumbnails_enabled: bool,
    pub auto_refresh: bool,
    /// Base full-refresh interval; the scheduler ticks at a quarter of it,
    /// capped at five minutes.
    pub refresh_interval: Duration,
    /// Page size cap for incremental fetches.
    pub incremental_limit: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            thumbnails_enabled: true,
            auto_refresh: true,
            refresh_interval: Duration::from_secs(15 * 60),
            incremental_limit: 50,
        }
    }
}

impl StoreOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            thumbnails_enabled: config.thumbnails_enabled,
            auto_refresh: true,
            refresh_interval: config.refresh_interval(),
            incremental_limit: config.incremental_limit,
        }
    }
}

/// What the embedding UI renders.
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub screenshots: Vec<CachedScreenshot>,
    pub loading: bool,
    pub error: Option<String>,
    /// Records added by incremental syncs since the last full refresh.
    pub new_items_count: usize,
}

/// Counts reported by one incremental update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCounts {
    pub new_count: usize,
    pub updated_count: usize,
}

impl SyncCounts {
    pub fn is_empty(&self) -> bool {
        self.new_count == 0 && self.updated_count == 0
    }
}

/// Sync bookkeeping exposed to the UI.
#[derive(Debug, Clone, Default)]
pub struct LastUpdateInfo {
    pub last_sync: Option<DateTime<Utc>>,
    pub new_items_count: usize,
}

/// Handle to the background refresh scheduler. Cancels the loop when
/// shut down or dropped.
pub struct AutoRefreshHandle {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl AutoRefreshHandle {
    /// Stop the scheduler. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Stop the scheduler and wait for the loop task to finish.
    pub async fn stopped(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for AutoRefreshHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Orchestrates cache, network, and thumbnails behind one view state.
pub struct ScreenshotStore {
    cache: Arc<CacheManager>,
    api: Arc<dyn ScreenshotApi>,
    thumbs: Arc<ThumbnailGenerator>,
    options: StoreOptions,
    state: RwLock<ViewState>,
    initialized: AtomicBool,
}

impl ScreenshotStore {
    pub fn new(
        cache: Arc<CacheManager>, api: Arc<dyn ScreenshotApi>, thumbs: Arc<ThumbnailGenerator>,
        options: StoreOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            cache,
            api,
            thumbs,
            options,
            state: RwLock::new(ViewState { loading: true, ..ViewState::default() }),
            initialized: AtomicBool::new(false),
        })
    }

    /// Current view state.
    pub async fn state(&self) -> ViewState {
        self.state.read().await.clone()
    }

    /// Current collection.
    pub async fn screenshots(&self) -> Vec<CachedScreenshot> {
        self.state.read().await.screenshots.clone()
    }

    /// Load cached data or perform the initial fetch. Runs exactly once;
    /// later calls return immediately.
    ///
    /// On a cache hit the collection is displayed before any network
    /// activity; a due incremental sync is deferred to a background task
    /// so first paint is never blocked on it.
    pub async fn initialize(self: &Arc<Self>) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return;
        }

        match self.cache.screenshots().await {
            Ok(Some(cached)) if !cached.is_empty() => {
                tracing::debug!("loaded {} screenshots from cache", cached.len());
                {
                    let mut state = self.state.write().await;
                    state.screenshots = cached.clone();
                    state.loading = false;
                }

                self.spawn_preload(cached.iter().map(|c| &c.record));

                if self.cache.should_incremental_update().await {
                    let store = self.clone();
                    tokio::spawn(async move {
                        store.incremental_update().await;
                    });
                }
            }
            Ok(_) => {
                tracing::debug!("no cached screenshots, performing initial fetch");
                self.fetch_and_cache().await;
            }
            Err(e) => {
                tracing::warn!("could not read screenshot cache, performing initial fetch: {e}");
                self.fetch_and_cache().await;
            }
        }
    }

    /// Smart refresh: prefer an incremental update when any cached data
    /// exists; fall back to a full fetch when it reports nothing (or
    /// there is no cache at all). A refresh already in flight (`loading`)
    /// is not stacked.
    pub async fn refresh(self: &Arc<Self>) {
        if self.state.read().await.loading {
            return;
        }

        if self.cache.has_cached_data().await {
            tracing::debug!("smart refresh: trying incremental update first");
            let counts = self.incremental_update().await;
            if !counts.is_empty() {
                return;
            }
        }

        self.state.write().await.loading = true;
        self.fetch_and_cache().await;
    }

    /// Drop every cache namespace, then fetch from scratch.
    pub async fn force_refresh(self: &Arc<Self>) {
        if let Err(e) = self.cache.clear_all_cache().await {
            tracing::warn!("failed to clear cache before force refresh: {e}");
        }
        self.state.write().await.loading = true;
        self.fetch_and_cache().await;
    }

    /// Fetch records changed since the last sync and merge them in.
    ///
    /// Always stamps `last_sync`, even when the server returns nothing,
    /// so an idle collection is not re-polled in a tight loop. Network
    /// failures are logged and swallowed (the UI keeps showing cached
    /// data) and read as zero counts by callers.
    pub async fn incremental_update(self: &Arc<Self>) -> SyncCounts {
        let since = match self.cache.last_sync().await {
            Ok(stamp) => stamp.and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            Err(e) => {
                tracing::warn!("could not read last-sync stamp: {e}");
                None
            }
        };

        tracing::debug!("incremental update since {since:?}");
        let opts = ListOptions::incremental(since, self.options.incremental_limit);

        let records = match self.api.list(&opts).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("incremental update failed, will retry on next check: {e}");
                return SyncCounts::default();
            }
        };

        if records.is_empty() {
            tracing::debug!("no new screenshots since last sync");
            if let Err(e) = self.cache.stamp_last_sync().await {
                tracing::warn!("failed to stamp last-sync time: {e}");
            }
            return SyncCounts::default();
        }

        match self.cache.merge_screenshots(records.clone()).await {
            Ok(outcome) => {
                let counts = SyncCounts { new_count: outcome.new_count, updated_count: outcome.updated_count };
                {
                    let mut state = self.state.write().await;
                    state.screenshots = outcome.merged;
                    state.new_items_count += counts.new_count;
                }

                // Only the freshly fetched records need thumbnails.
                self.spawn_preload(records.iter());

                tracing::debug!("incremental update completed: {} new, {} updated", counts.new_count, counts.updated_count);
                counts
            }
            Err(e) => {
                tracing::warn!("failed to merge incremental page: {e}");
                SyncCounts::default()
            }
        }
    }

    /// Optimistically add a record to the cache and view state.
    /// Reconciling with the server is the caller's responsibility.
    pub async fn add_screenshot(&self, record: Screenshot) {
        match self.cache.add_screenshot(record.clone()).await {
            Ok(list) => self.state.write().await.screenshots = list,
            Err(e) => tracing::warn!("failed to cache added screenshot: {e}"),
        }
        self.spawn_preload(std::iter::once(&record));
    }

    /// Optimistically patch a cached record.
    pub async fn update_screenshot(&self, id: &str, patch: &ScreenshotPatch) {
        match self.cache.update_screenshot(id, patch).await {
            Ok(Some(list)) => self.state.write().await.screenshots = list,
            Ok(None) => {}
            Err(e) => tracing::warn!("failed to update cached screenshot {id}: {e}"),
        }
    }

    /// Optimistically remove a cached record (and its thumbnail).
    pub async fn remove_screenshot(&self, id: &str) {
        match self.cache.remove_screenshot(id).await {
            Ok(Some(list)) => self.state.write().await.screenshots = list,
            Ok(None) => {}
            Err(e) => tracing::warn!("failed to remove cached screenshot {id}: {e}"),
        }
    }

    /// Cached thumbnail data URL for `id`, or `None` when thumbnails are
    /// disabled or not yet generated (callers fall back to `image_url`).
    pub async fn thumbnail_url(&self, id: &str) -> Option<String> {
        if !self.options.thumbnails_enabled {
            return None;
        }
        self.thumbs.cached(id).await
    }

    /// Cache statistics for diagnostics UI.
    pub async fn cache_stats(&self) -> CacheStats {
        match self.cache.stats().await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!("failed to read cache stats: {e}");
                CacheStats::default()
            }
        }
    }

    /// Sync bookkeeping exposed to the UI.
    pub async fn last_update_info(&self) -> LastUpdateInfo {
        let last_sync = match self.cache.last_sync().await {
            Ok(stamp) => stamp.and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            Err(_) => None,
        };
        LastUpdateInfo { last_sync, new_items_count: self.state.read().await.new_items_count }
    }

    /// Clear every namespace and re-run initialization.
    pub async fn clear_cache(self: &Arc<Self>) {
        if let Err(e) = self.cache.clear_all_cache().await {
            tracing::warn!("failed to clear cache: {e}");
        }
        {
            let mut state = self.state.write().await;
            state.screenshots.clear();
            state.new_items_count = 0;
            state.loading = true;
        }
        self.initialized.store(false, Ordering::SeqCst);
        self.initialize().await;
    }

    /// Start the background scheduler. Ticks at
    /// `min(refresh_interval / 4, 5 min)`, preferring an incremental
    /// update when due, else a full refresh when due. Returns `None` when
    /// auto refresh is disabled.
    pub fn spawn_auto_refresh(self: &Arc<Self>) -> Option<AutoRefreshHandle> {
        if !self.options.auto_refresh {
            return None;
        }

        let token = CancellationToken::new();
        let store = self.clone();
        let loop_token = token.clone();
        let handle = tokio::spawn(async move { store.auto_refresh_loop(loop_token).await });

        Some(AutoRefreshHandle { token, handle: Some(handle) })
    }

    async fn auto_refresh_loop(self: Arc<Self>, token: CancellationToken) {
        let tick = (self.options.refresh_interval / 4).min(MAX_TICK_INTERVAL);
        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // interval fires immediately; skip that one

        loop {
            tokio::select! {
                _ = ticker.tick() => self.run_due_refresh().await,
                _ = token.cancelled() => {
                    tracing::debug!("auto refresh loop shutting down");
                    break;
                }
            }
        }
    }

    async fn run_due_refresh(self: &Arc<Self>) {
        if self.cache.should_incremental_update().await {
            tracing::debug!("scheduled incremental update");
            self.incremental_update().await;
        } else if self.cache.should_refresh_cache().await {
            tracing::debug!("scheduled full refresh");
            self.refresh().await;
        }
    }

    /// Run the scheduler's preference-ordered check once, off the caller's
    /// task. The analog of catching up when the app returns to the
    /// foreground; must never block UI interaction.
    pub fn notify_foreground(self: &Arc<Self>) {
        let store = self.clone();
        tokio::spawn(async move {
            tracing::debug!("foreground catch-up check");
            store.run_due_refresh().await;
        });
    }

    /// Full fetch: replace cache and state with the server's collection.
    /// On failure, fall back to stale cache and surface the error.
    async fn fetch_and_cache(&self) {
        self.state.write().await.error = None;
        tracing::debug!("fetching screenshots from API (full refresh)");

        match self.api.list(&ListOptions::default()).await {
            Ok(records) => {
                let now = Utc::now();
                let list: Vec<CachedScreenshot> =
                    records.into_iter().map(|r| CachedScreenshot::cached_now(r, now)).collect();

                if let Err(e) = self.cache.set_screenshots(&list).await {
                    tracing::warn!("failed to persist fetched screenshots: {e}");
                }
                tracing::debug!("fetched and cached {} screenshots", list.len());

                {
                    let mut state = self.state.write().await;
                    state.screenshots = list.clone();
                    state.new_items_count = 0;
                    state.error = None;
                    state.loading = false;
                }

                self.spawn_preload(list.iter().map(|c| &c.record));
            }
            Err(e) => {
                tracing::warn!("full refresh failed: {e}");
                let stale = self.cache.screenshots_stale().await.ok().flatten();

                let mut state = self.state.write().await;
                if let Some(stale) = stale {
                    tracing::debug!("using stale cache as fallback");
                    state.screenshots = stale;
                }
                state.error = Some(e.to_string());
                state.loading = false;
            }
        }
    }

    fn spawn_preload<'a>(&self, records: impl Iterator<Item = &'a Screenshot>) {
        if !self.options.thumbnails_enabled {
            return;
        }

        let items: Vec<ThumbnailRequest> = records
            .filter(|r| !r.image_url.is_empty())
            .map(|r| ThumbnailRequest { screenshot_id: r.id.clone(), image_url: r.image_url.clone() })
            .collect();
        if items.is_empty() {
            return;
        }

        let thumbs = self.thumbs.clone();
        tokio::spawn(async move {
            thumbs.preload(&items).await;
        });
    }
}
