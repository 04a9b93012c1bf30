//! Screenshot data model.
//!
//! `Screenshot` is the wire format returned by the InstaGo server.
//! `CachedScreenshot` wraps it with `LocalMeta`, the client-side metadata
//! the cache layer maintains; `LocalMeta` is never sent to the network.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One uploaded image and its AI-derived annotations, as returned by the
/// server's list/search endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Screenshot {
    pub id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_status: Option<ProcessStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quick_link: Option<QuickLink>,
}

/// Server-side AI processing state of a screenshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Pending,
    Processed,
    Error,
}

/// AI-suggested follow-up action attached to a screenshot: either a direct
/// URL to open or a keyword to search for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum QuickLink {
    Direct(String),
    SearchStr(String),
}

/// Client-side metadata attached to cached records. Survives incremental
/// merges and is never serialized to the network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalMeta {
    /// When this record first entered the local cache.
    #[serde(default)]
    pub cached_at: Option<DateTime<Utc>>,
    /// Whether a thumbnail has been generated for this record.
    #[serde(default)]
    pub thumbnail_generated: bool,
    /// How often the record has been opened locally.
    #[serde(default)]
    pub view_count: u32,
}

/// A screenshot record plus its local-only metadata, as stored in the
/// screenshot cache namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedScreenshot {
    pub record: Screenshot,
    #[serde(default)]
    pub local: LocalMeta,
}

impl CachedScreenshot {
    /// Wrap a wire record with empty local metadata.
    pub fn new(record: Screenshot) -> Self {
        Self { record, local: LocalMeta::default() }
    }

    /// Wrap a wire record that just entered the cache, stamping `cached_at`.
    pub fn cached_now(record: Screenshot, now: DateTime<Utc>) -> Self {
        Self { record, local: LocalMeta { cached_at: Some(now), ..LocalMeta::default() } }
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }
}

/// Partial update applied to a cached record: every `Some` field overwrites
/// the corresponding record field, `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ScreenshotPatch {
    pub user_note: Option<String>,
    pub ai_title: Option<String>,
    pub ai_description: Option<String>,
    pub ai_tags: Option<Vec<String>>,
    pub markdown_content: Option<String>,
    pub thumbnail_url: Option<String>,
    pub process_status: Option<ProcessStatus>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ScreenshotPatch {
    /// Shallow-merge this patch into `record`.
    pub fn apply(&self, record: &mut Screenshot) {
        if let Some(note) = &self.user_note {
            record.user_note = Some(note.clone());
        }
        if let Some(title) = &self.ai_title {
            record.ai_title = Some(title.clone());
        }
        if let Some(description) = &self.ai_description {
            record.ai_description = Some(description.clone());
        }
        if let Some(tags) = &self.ai_tags {
            record.ai_tags = Some(tags.clone());
        }
        if let Some(markdown) = &self.markdown_content {
            record.markdown_content = Some(markdown.clone());
        }
        if let Some(url) = &self.thumbnail_url {
            record.thumbnail_url = Some(url.clone());
        }
        if let Some(status) = self.process_status {
            record.process_status = Some(status);
        }
        if let Some(updated_at) = self.updated_at {
            record.updated_at = updated_at;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn test_quick_link_wire_format() {
        let link = QuickLink::Direct("https://example.com".to_string());
        let json = serde_json::to_string(&link).unwrap();
        assert_eq!(json, r#"{"type":"direct","content":"https://example.com"}"#);

        let parsed: QuickLink = serde_json::from_str(r#"{"type":"search_str","content":"rust"}"#).unwrap();
        assert_eq!(parsed, QuickLink::SearchStr("rust".to_string()));
    }

    #[test]
    fn test_process_status_wire_format() {
        let json = serde_json::to_string(&ProcessStatus::Processed).unwrap();
        assert_eq!(json, r#""processed""#);
    }

    #[test]
    fn test_screenshot_optional_fields_absent() {
        let json = r#"{
            "id": "a",
            "user_id": "user-1",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z",
            "image_url": "https://cdn.example.com/a.png"
        }"#;
        let parsed: Screenshot = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.id, "a");
        assert!(parsed.ai_title.is_none());
        assert!(parsed.process_status.is_none());
    }

    #[test]
    fn test_local_meta_defaults_when_missing() {
        let record = make_screenshot("a");
        let json = serde_json::json!({ "record": record }).to_string();
        let parsed: CachedScreenshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.local, LocalMeta::default());
    }

    #[test]
    fn test_patch_apply_partial() {
        let mut record = make_screenshot("a");
        record.user_note = Some("keep me".to_string());

        let patch = ScreenshotPatch { ai_title: Some("New title".to_string()), ..ScreenshotPatch::default() };
        patch.apply(&mut record);

        assert_eq!(record.ai_title.as_deref(), Some("New title"));
        assert_eq!(record.user_note.as_deref(), Some("keep me"));
    }
}
