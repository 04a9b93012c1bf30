//! Search-result cache operations.
//!
//! Results are keyed by the literal query string inside one JSON map (a
//! single storage key bounds the key count); each entry carries its own
//! write time, checked against the search TTL on read.

use super::kv::now_ms;
use super::manager::{CacheManager, MAP_TTL_MS, keys};
use crate::Error;
use crate::model::Screenshot;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SearchEntry {
    pub results: Vec<Screenshot>,
    pub stored_at: i64,
}

pub(crate) type SearchResultsMap = HashMap<String, SearchEntry>;

impl CacheManager {
    pub(crate) async fn search_results_map(&self) -> Result<SearchResultsMap, Error> {
        Ok(self.kv.get_entry_stale(keys::SEARCH_RESULTS).await?.unwrap_or_default())
    }

    async fn write_search_results_map(&self, map: &SearchResultsMap) -> Result<(), Error> {
        self.kv.set_entry(keys::SEARCH_RESULTS, map, MAP_TTL_MS).await
    }

    /// Cache results for the exact query string.
    pub async fn set_search_results(&self, query: &str, results: &[Screenshot]) -> Result<(), Error> {
        let mut map = self.search_results_map().await?;
        map.insert(query.to_string(), SearchEntry { results: results.to_vec(), stored_at: now_ms() });
        self.write_search_results_map(&map).await
    }

    /// Cached results for the exact query string, or `None` if absent or
    /// expired (expired entries are evicted from the map).
    pub async fn search_results(&self, query: &str) -> Result<Option<Vec<Screenshot>>, Error> {
        let mut map = self.search_results_map().await?;

        let (stored_at, results) = match map.get(query) {
            Some(entry) => (entry.stored_at, entry.results.clone()),
            None => return Ok(None),
        };

        if now_ms() - stored_at > self.policy.search_ttl_ms {
            map.remove(query);
            self.write_search_results_map(&map).await?;
            return Ok(None);
        }

        Ok(Some(results))
    }

    /// Drop all cached search results.
    pub async fn clear_search_results(&self) -> Result<(), Error> {
        self.kv.remove_entry(keys::SEARCH_RESULTS).await
    }

    pub(crate) async fn prune_expired_search_results(&self) -> Result<u64, Error> {
        let mut map = self.search_results_map().await?;
        let before = map.len();
        let now = now_ms();
        map.retain(|_, entry| now - entry.stored_at <= self.policy.search_ttl_ms);

        let removed = (before - map.len()) as u64;
        if removed > 0 {
            self.write_search_results_map(&map).await?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::super::manager::CachePolicy;
    use super::*;
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

    async fn make_cache(search_ttl_ms: i64) -> CacheManager {
        let policy = CachePolicy { search_ttl_ms, ..CachePolicy::default() };
        CacheManager::open_in_memory(policy).await.unwrap()
    }

    #[tokio::test]
    async fn test_set_then_get_results() {
        let cache = make_cache(60_000).await;
        cache.set_search_results("cats", &[make_screenshot("a")]).await.unwrap();

        let hit = cache.search_results("cats").await.unwrap().unwrap();
        assert_eq!(hit.len(), 1);
        assert_eq!(hit[0].id, "a");
    }

    #[tokio::test]
    async fn test_queries_are_exact_string_keys() {
        let cache = make_cache(60_000).await;
        cache.set_search_results("cats", &[make_screenshot("a")]).await.unwrap();

        assert!(cache.search_results("cat").await.unwrap().is_none());
        assert!(cache.search_results("Cats").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_results_are_evicted() {
        let cache = make_cache(20).await;
        cache.set_search_results("cats", &[make_screenshot("a")]).await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(cache.search_results("cats").await.unwrap().is_none());
        let map = cache.search_results_map().await.unwrap();
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn test_clear_search_results() {
        let cache = make_cache(60_000).await;
        cache.set_search_results("cats", &[make_screenshot("a")]).await.unwrap();
        cache.set_search_results("dogs", &[make_screenshot("b")]).await.unwrap();

        cache.clear_search_results().await.unwrap();

        assert!(cache.search_results("cats").await.unwrap().is_none());
        assert!(cache.search_results("dogs").await.unwrap().is_none());
    }
}
