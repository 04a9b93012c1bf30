//! Screenshot collection operations.
//!
//! The collection is stored as a single envelope under one key; every
//! mutation reads the cached list, transforms it, and writes it back.

use super::manager::{CacheManager, keys};
use super::merge::{self, MergeOutcome};
use crate::Error;
use crate::model::{CachedScreenshot, Screenshot, ScreenshotPatch};
use chrono::Utc;

impl CacheManager {
    /// Replace the cached collection wholesale and stamp `last_fetch`.
    pub async fn set_screenshots(&self, list: &[CachedScreenshot]) -> Result<(), Error> {
        self.kv
            .set_entry(keys::SCREENSHOTS, list, self.policy.screenshot_ttl_ms)
            .await?;
        self.stamp_last_fetch().await
    }

    /// The cached collection, or `None` if missing or expired.
    pub async fn screenshots(&self) -> Result<Option<Vec<CachedScreenshot>>, Error> {
        self.kv.get_entry(keys::SCREENSHOTS).await
    }

    /// The cached collection even when expired. Fallback for failed
    /// refreshes; never evicts.
    pub async fn screenshots_stale(&self) -> Result<Option<Vec<CachedScreenshot>>, Error> {
        self.kv.get_entry_stale(keys::SCREENSHOTS).await
    }

    /// Prepend a record, deduplicating by id (the new record wins), and
    /// full-replace the collection.
    pub async fn add_screenshot(&self, record: Screenshot) -> Result<Vec<CachedScreenshot>, Error> {
        let cached = self.screenshots().await?.unwrap_or_default();
        let id = record.id.clone();

        let mut list = vec![CachedScreenshot::cached_now(record, Utc::now())];
        list.extend(cached.into_iter().filter(|c| c.record.id != id));

        self.set_screenshots(&list).await?;
        Ok(list)
    }

    /// Apply a shallow patch to the record with `id`.
    ///
    /// Returns the updated collection, or `None` when no collection is
    /// cached at all.
    pub async fn update_screenshot(
        &self, id: &str, patch: &ScreenshotPatch,
    ) -> Result<Option<Vec<CachedScreenshot>>, Error> {
        let Some(mut list) = self.screenshots().await? else {
            return Ok(None);
        };

        for cached in list.iter_mut().filter(|c| c.record.id == id) {
            patch.apply(&mut cached.record);
        }

        self.set_screenshots(&list).await?;
        Ok(Some(list))
    }

    /// Remove the record with `id` from the collection and evict its
    /// thumbnail. Returns the updated collection, or `None` when no
    /// collection is cached.
    pub async fn remove_screenshot(&self, id: &str) -> Result<Option<Vec<CachedScreenshot>>, Error> {
        let Some(list) = self.screenshots().await? else {
            return Ok(None);
        };

        let list: Vec<_> = list.into_iter().filter(|c| c.record.id != id).collect();
        self.set_screenshots(&list).await?;
        self.remove_thumbnail(id).await?;
        Ok(Some(list))
    }

    /// Merge an incoming server page into the cached collection and stamp
    /// `last_sync`.
    ///
    /// Local metadata on matched records is preserved; see
    /// [`merge::merge_collections`]. Does not touch `last_fetch`.
    pub async fn merge_screenshots(&self, incoming: Vec<Screenshot>) -> Result<MergeOutcome, Error> {
        let cached = self.screenshots().await?.unwrap_or_default();
        let outcome = merge::merge_collections(cached, incoming, Utc::now());

        self.kv
            .set_entry(keys::SCREENSHOTS, &outcome.merged, self.policy.screenshot_ttl_ms)
            .await?;
        self.stamp_last_sync().await?;
        Ok(outcome)
    }
}
