//! Test doubles shared by the store test modules.

use async_trait::async_trait;
use instago_client::{ApiError, ListOptions, ScreenshotApi, SearchHit};
use instago_core::Screenshot;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub(crate) fn make_screenshot(id: &str, created_at: &str) -> Screenshot {
    Screenshot {
        id: id.to_string(),
        user_id: "user-1".to_string(),
        created_at: created_at.parse().unwrap(),
        updated_at: created_at.parse().unwrap(),
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

/// Scripted API backend.
///
/// List calls with `since` or an explicit `limit` are treated as
/// incremental and answered from `incremental`; plain calls are answered
/// from `full`. Every call is recorded for assertions.
#[derive(Default)]
pub(crate) struct MockApi {
    pub full: Mutex<Vec<Screenshot>>,
    pub incremental: Mutex<Vec<Screenshot>>,
    pub list_calls: Mutex<Vec<ListOptions>>,
    pub fail_list: AtomicBool,

    pub search_results: Mutex<HashMap<String, Vec<SearchHit>>>,
    pub search_delays: Mutex<HashMap<String, Duration>>,
    pub search_calls: Mutex<Vec<String>>,
    pub fail_search: AtomicBool,
}

impl MockApi {
    pub fn with_full(records: Vec<Screenshot>) -> Self {
        Self { full: Mutex::new(records), ..Self::default() }
    }

    pub fn set_incremental(&self, records: Vec<Screenshot>) {
        *self.incremental.lock().unwrap() = records;
    }

    pub fn add_search_results(&self, query: &str, hits: Vec<SearchHit>) {
        self.search_results.lock().unwrap().insert(query.to_string(), hits);
    }

    pub fn set_search_delay(&self, query: &str, delay: Duration) {
        self.search_delays.lock().unwrap().insert(query.to_string(), delay);
    }

    pub fn list_call_count(&self) -> usize {
        self.list_calls.lock().unwrap().len()
    }

    pub fn recorded_search_queries(&self) -> Vec<String> {
        self.search_calls.lock().unwrap().clone()
    }
}

pub(crate) fn hit(record: Screenshot, score: f32) -> SearchHit {
    SearchHit { screenshot: record, score }
}

#[async_trait]
impl ScreenshotApi for MockApi {
    async fn list(&self, opts: &ListOptions) -> Result<Vec<Screenshot>, ApiError> {
        self.list_calls.lock().unwrap().push(opts.clone());
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(ApiError::HttpError { status: 503 });
        }
        let incremental = opts.since.is_some() || opts.limit.is_some();
        if incremental {
            Ok(self.incremental.lock().unwrap().clone())
        } else {
            Ok(self.full.lock().unwrap().clone())
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ApiError> {
        self.search_calls.lock().unwrap().push(query.to_string());

        let delay = self.search_delays.lock().unwrap().get(query).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_search.load(Ordering::SeqCst) {
            return Err(ApiError::HttpError { status: 500 });
        }

        Ok(self.search_results.lock().unwrap().get(query).cloned().unwrap_or_default())
    }

    async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.full.lock().unwrap().retain(|r| r.id != id);
        Ok(())
    }

    async fn update_note(&self, id: &str, note: &str) -> Result<Screenshot, ApiError> {
        let mut full = self.full.lock().unwrap();
        match full.iter_mut().find(|r| r.id == id) {
            Some(record) => {
                record.user_note = Some(note.to_string());
                Ok(record.clone())
            }
            None => Err(ApiError::HttpError { status: 404 }),
        }
    }
}
