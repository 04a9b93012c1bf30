//! InstaGo API request types.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Options for the list endpoint.
///
/// `skip`/`limit` page through the collection; `since` restricts the
/// response to records created or updated after the given instant, which
/// is what incremental sync relies on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListOptions {
    pub skip: Option<u32>,
    pub limit: Option<u32>,
    pub since: Option<DateTime<Utc>>,
}

impl ListOptions {
    /// Options for an incremental fetch: everything after `since`, capped
    /// at `limit` records.
    pub fn incremental(since: Option<DateTime<Utc>>, limit: u32) -> Self {
        Self { skip: None, limit: Some(limit), since }
    }
}

/// Query-string form of [`ListOptions`] with defaults applied.
#[derive(Debug, Serialize)]
pub(crate) struct ListQuery {
    pub skip: u32,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
}

/// Body of the search endpoint.
#[derive(Debug, Serialize)]
pub(crate) struct SearchBody<'a> {
    pub query: &'a str,
}

/// Body of the note-update endpoint.
#[derive(Debug, Serialize)]
pub(crate) struct NoteBody<'a> {
    pub user_note: &'a str,
}
