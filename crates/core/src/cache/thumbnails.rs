//! Thumbnail cache operations.
//!
//! Thumbnails are stored as one JSON map keyed by screenshot id (a single
//! storage key bounds the key count); each entry carries its own write
//! time, checked against the thumbnail TTL on read.

use super::kv::now_ms;
use super::manager::{CacheManager, MAP_TTL_MS, keys};
use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ThumbnailEntry {
    pub data_url: String,
    pub stored_at: i64,
}

pub(crate) type ThumbnailMap = HashMap<String, ThumbnailEntry>;

impl CacheManager {
    pub(crate) async fn thumbnail_map(&self) -> Result<ThumbnailMap, Error> {
        Ok(self.kv.get_entry_stale(keys::THUMBNAILS).await?.unwrap_or_default())
    }

    async fn write_thumbnail_map(&self, map: &ThumbnailMap) -> Result<(), Error> {
        self.kv.set_entry(keys::THUMBNAILS, map, MAP_TTL_MS).await
    }

    /// Store an encoded thumbnail for `id`.
    pub async fn set_thumbnail(&self, id: &str, data_url: &str) -> Result<(), Error> {
        let mut map = self.thumbnail_map().await?;
        map.insert(id.to_string(), ThumbnailEntry { data_url: data_url.to_string(), stored_at: now_ms() });
        self.write_thumbnail_map(&map).await
    }

    /// The cached thumbnail for `id`, or `None` if absent or expired
    /// (expired entries are evicted from the map).
    pub async fn thumbnail(&self, id: &str) -> Result<Option<String>, Error> {
        let mut map = self.thumbnail_map().await?;

        let (stored_at, data_url) = match map.get(id) {
            Some(entry) => (entry.stored_at, entry.data_url.clone()),
            None => return Ok(None),
        };

        if now_ms() - stored_at > self.policy.thumbnail_ttl_ms {
            map.remove(id);
            self.write_thumbnail_map(&map).await?;
            return Ok(None);
        }

        Ok(Some(data_url))
    }

    /// Drop the thumbnail for `id` if present.
    pub async fn remove_thumbnail(&self, id: &str) -> Result<(), Error> {
        let mut map = self.thumbnail_map().await?;
        if map.remove(id).is_some() {
            self.write_thumbnail_map(&map).await?;
        }
        Ok(())
    }

    pub(crate) async fn prune_expired_thumbnails(&self) -> Result<u64, Error> {
        let mut map = self.thumbnail_map().await?;
        let before = map.len();
        let now = now_ms();
        map.retain(|_, entry| now - entry.stored_at <= self.policy.thumbnail_ttl_ms);

        let removed = (before - map.len()) as u64;
        if removed > 0 {
            self.write_thumbnail_map(&map).await?;
        }
        Ok(removed)
    }
}
