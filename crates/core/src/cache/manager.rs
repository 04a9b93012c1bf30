//! Domain cache built on the key-value layer.
//!
//! `CacheManager` owns the four logical namespaces (screenshot collection,
//! thumbnail map, search-result map, sync bookkeeping) and applies the
//! namespace-specific TTLs from `CachePolicy`. One manager is constructed
//! at startup and shared by reference; there is no hidden global.

use crate::config::AppConfig;
use crate::{Error, KvStore};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::kv::now_ms;

/// Storage keys for the cache namespaces.
pub(crate) mod keys {
    pub const SCREENSHOTS: &str = "instago_screenshots";
    pub const THUMBNAILS: &str = "instago_thumbnails";
    pub const SEARCH_RESULTS: &str = "instago_search_results";
    pub const LAST_FETCH: &str = "instago_last_fetch";
    pub const LAST_SYNC: &str = "instago_last_sync";

    pub const ALL: &[&str] = &[SCREENSHOTS, THUMBNAILS, SEARCH_RESULTS, LAST_FETCH, LAST_SYNC];
}

/// Envelope TTL for the thumbnail and search-result maps. Their entries
/// expire on the internal per-item timestamps, not the outer envelope.
pub(crate) const MAP_TTL_MS: i64 = i64::MAX;

/// Envelope TTL for the sync timestamps. Freshness against them is always
/// compared explicitly; the envelope just has to outlive every comparison.
pub(crate) const STAMP_TTL_MS: i64 = 30 * 24 * 60 * 60 * 1000;

/// Per-namespace TTLs and the incremental sync interval.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    /// TTL for the cached screenshot collection.
    pub screenshot_ttl_ms: i64,
    /// TTL for individual thumbnail entries.
    pub thumbnail_ttl_ms: i64,
    /// TTL for individual search-result entries.
    pub search_ttl_ms: i64,
    /// Minimum interval between incremental syncs. Shorter than
    /// `screenshot_ttl_ms` so incremental checks fire more often than full
    /// refreshes.
    pub sync_interval_ms: i64,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            screenshot_ttl_ms: 15 * 60 * 1000,
            thumbnail_ttl_ms: 7 * 24 * 60 * 60 * 1000,
            search_ttl_ms: 5 * 60 * 1000,
            sync_interval_ms: 2 * 60 * 1000,
        }
    }
}

impl CachePolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            screenshot_ttl_ms: config.screenshot_ttl_ms,
            thumbnail_ttl_ms: config.thumbnail_ttl_ms,
            search_ttl_ms: config.search_ttl_ms,
            sync_interval_ms: config.sync_interval_ms,
        }
    }
}

/// Per-namespace entry counts plus an approximate total serialized size.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub screenshots: usize,
    pub thumbnails: usize,
    pub search_results: usize,
    pub total_size: String,
}

/// Typed cache over the four namespaces.
#[derive(Clone, Debug)]
pub struct CacheManager {
    pub(crate) kv: KvStore,
    pub(crate) policy: CachePolicy,
}

impl CacheManager {
    pub fn new(kv: KvStore, policy: CachePolicy) -> Self {
        Self { kv, policy }
    }

    /// Open a manager over an on-disk store and sweep entries that timed
    /// out since the last run.
    pub async fn open(path: impl AsRef<Path>, policy: CachePolicy) -> Result<Self, Error> {
        let manager = Self::new(KvStore::open(path).await?, policy);
        if let Err(e) = manager.clear_expired_entries().await {
            tracing::warn!("startup expired-entry sweep failed: {e}");
        }
        Ok(manager)
    }

    /// Open a manager over an in-memory store.
    pub async fn open_in_memory(policy: CachePolicy) -> Result<Self, Error> {
        Ok(Self::new(KvStore::open_in_memory().await?, policy))
    }

    /// Open a manager over an on-disk store, degrading to an in-memory
    /// store when the path cannot be opened.
    ///
    /// The in-memory fallback loses persistence across restarts but keeps
    /// every operation functional; it never panics.
    pub async fn open_or_memory(path: impl AsRef<Path>, policy: CachePolicy) -> Result<Self, Error> {
        match KvStore::open(path.as_ref()).await {
            Ok(kv) => Ok(Self::new(kv, policy)),
            Err(e) => {
                tracing::warn!("could not open cache database at {}, using in-memory store: {e}", path.as_ref().display());
                Self::open_in_memory(policy).await
            }
        }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Time of the last full replace of the screenshot collection, in
    /// milliseconds since the epoch.
    pub async fn last_fetch(&self) -> Result<Option<i64>, Error> {
        self.kv.get_entry(keys::LAST_FETCH).await
    }

    pub(crate) async fn stamp_last_fetch(&self) -> Result<(), Error> {
        self.kv.set_entry(keys::LAST_FETCH, &now_ms(), STAMP_TTL_MS).await
    }

    /// Time of the last incremental merge, in milliseconds since the epoch.
    /// Independent of `last_fetch`: a full refresh does not reset it.
    pub async fn last_sync(&self) -> Result<Option<i64>, Error> {
        self.kv.get_entry(keys::LAST_SYNC).await
    }

    /// Record that an incremental sync completed now. Called by the merge
    /// path and by callers whose sync returned an empty page.
    pub async fn stamp_last_sync(&self) -> Result<(), Error> {
        self.kv.set_entry(keys::LAST_SYNC, &now_ms(), STAMP_TTL_MS).await
    }

    /// Whether a full refresh is due: no fetch recorded yet, or the last
    /// one is older than the screenshot TTL.
    pub async fn should_refresh_cache(&self) -> bool {
        match self.last_fetch().await {
            Ok(Some(last_fetch)) => now_ms() - last_fetch > self.policy.screenshot_ttl_ms,
            Ok(None) => true,
            Err(e) => {
                tracing::warn!("could not read last-fetch stamp, assuming refresh due: {e}");
                true
            }
        }
    }

    /// Whether an incremental sync is due: no sync recorded yet, or the
    /// last one is older than the sync interval.
    pub async fn should_incremental_update(&self) -> bool {
        match self.last_sync().await {
            Ok(Some(last_sync)) => now_ms() - last_sync > self.policy.sync_interval_ms,
            Ok(None) => true,
            Err(e) => {
                tracing::warn!("could not read last-sync stamp, assuming sync due: {e}");
                true
            }
        }
    }

    /// Whether a non-empty screenshot cache exists.
    pub async fn has_cached_data(&self) -> bool {
        matches!(self.screenshots().await, Ok(Some(list)) if !list.is_empty())
    }

    /// Sweep all namespaces, removing timed-out entries and leaving valid
    /// ones in place. Returns the number of removed entries (outer rows
    /// plus individual map items).
    pub async fn clear_expired_entries(&self) -> Result<u64, Error> {
        let mut removed = self.kv.sweep_expired().await?;
        removed += self.prune_expired_thumbnails().await?;
        removed += self.prune_expired_search_results().await?;
        Ok(removed)
    }

    /// Unconditionally remove every namespace key.
    pub async fn clear_all_cache(&self) -> Result<(), Error> {
        for key in keys::ALL {
            self.kv.remove_entry(key).await?;
        }
        Ok(())
    }

    /// Entry counts per namespace and the approximate total serialized
    /// size, human-formatted.
    pub async fn stats(&self) -> Result<CacheStats, Error> {
        let screenshots = self.screenshots().await?.map(|list| list.len()).unwrap_or(0);
        let thumbnails = self.thumbnail_map().await?.len();
        let search_results = self.search_results_map().await?.len();
        let total_size = format_size(self.kv.total_bytes().await?);

        Ok(CacheStats { screenshots, thumbnails, search_results, total_size })
    }
}

fn format_size(bytes: u64) -> String {
    if bytes > 1024 * 1024 {
        format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CachedScreenshot, Screenshot};
    use std::time::Duration;

    fn make_screenshot(id: &str) -> Screenshot {
        Screenshot {
            id: id.to_string(),
            user_id: "user-1".to_string(),
            created_at: "2024-01-01T00:00:00Z".parse().unwrap(),
            updated_at: "2024-01-01T00:00:00Z".parse().unwrap(),
            image_url: format!("https://cdn.example.com/{id}.png"),
            thumbnail_url: None,
            user_note: None,
            ai_title: None,
            ai_description: None,
            ai_tags: None,
            markdown_content: None,
            width: None,
            height: None,
            file_size: None,
            process_status: None,
            quick_link: None,
        }
    }

    fn short_sync_policy() -> CachePolicy {
        CachePolicy { sync_interval_ms: 50, ..CachePolicy::default() }
    }

    #[tokio::test]
    async fn test_fresh_manager_wants_both_refresh_kinds() {
        let cache = CacheManager::open_in_memory(CachePolicy::default()).await.unwrap();
        assert!(cache.should_refresh_cache().await);
        assert!(cache.should_incremental_update().await);
        assert!(!cache.has_cached_data().await);
    }

    #[tokio::test]
    async fn test_empty_merge_quiets_incremental_until_interval_passes() {
        let cache = CacheManager::open_in_memory(short_sync_policy()).await.unwrap();
        assert!(cache.should_incremental_update().await);

        cache.merge_screenshots(Vec::new()).await.unwrap();
        assert!(!cache.should_incremental_update().await);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cache.should_incremental_update().await);
    }

    #[tokio::test]
    async fn test_full_replace_quiets_full_refresh_only() {
        // last_fetch and last_sync are independent: a full replace must not
        // reset the incremental timer.
        let cache = CacheManager::open_in_memory(CachePolicy::default()).await.unwrap();
        cache.set_screenshots(&[CachedScreenshot::new(make_screenshot("a"))]).await.unwrap();

        assert!(!cache.should_refresh_cache().await);
        assert!(cache.should_incremental_update().await);
        assert!(cache.last_fetch().await.unwrap().is_some());
        assert!(cache.last_sync().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_all_cache_removes_every_namespace() {
        let cache = CacheManager::open_in_memory(CachePolicy::default()).await.unwrap();
        cache.set_screenshots(&[CachedScreenshot::new(make_screenshot("a"))]).await.unwrap();
        cache.set_thumbnail("a", "data:image/jpeg;base64,AAAA").await.unwrap();
        cache.set_search_results("cats", &[make_screenshot("a")]).await.unwrap();

        cache.clear_all_cache().await.unwrap();

        assert!(cache.screenshots().await.unwrap().is_none());
        assert!(cache.thumbnail("a").await.unwrap().is_none());
        assert!(cache.search_results("cats").await.unwrap().is_none());
        assert!(cache.last_fetch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_expired_keeps_valid_entries() {
        let policy = CachePolicy { search_ttl_ms: 20, ..CachePolicy::default() };
        let cache = CacheManager::open_in_memory(policy).await.unwrap();
        cache.set_screenshots(&[CachedScreenshot::new(make_screenshot("a"))]).await.unwrap();
        cache.set_search_results("old", &[make_screenshot("a")]).await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;

        let removed = cache.clear_expired_entries().await.unwrap();
        assert!(removed >= 1);
        assert!(cache.screenshots().await.unwrap().is_some());
        assert!(cache.search_results("old").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stats_counts_and_size() {
        let cache = CacheManager::open_in_memory(CachePolicy::default()).await.unwrap();
        cache
            .set_screenshots(&[
                CachedScreenshot::new(make_screenshot("a")),
                CachedScreenshot::new(make_screenshot("b")),
            ])
            .await
            .unwrap();
        cache.set_thumbnail("a", "data:image/jpeg;base64,AAAA").await.unwrap();
        cache.set_search_results("cats", &[make_screenshot("a")]).await.unwrap();

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.screenshots, 2);
        assert_eq!(stats.thumbnails, 1);
        assert_eq!(stats.search_results, 1);
        assert!(stats.total_size.ends_with("KB"));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0.0KB");
        assert_eq!(format_size(512), "0.5KB");
        assert_eq!(format_size(2 * 1024 * 1024), "2.0MB");
    }
}
