//! Incremental merge of server pages into the cached collection.
//!
//! The merge is idempotent: applying the same page twice yields the same
//! collection, with every repeated record counted as an update.

use crate::model::{CachedScreenshot, LocalMeta, Screenshot};
use chrono::{DateTime, Utc};

/// Result of merging an incoming page into the cached collection.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// The merged collection, sorted newest-`created_at`-first.
    pub merged: Vec<CachedScreenshot>,
    /// Records that were not present before the merge.
    pub new_count: usize,
    /// Records that replaced an existing entry in place.
    pub updated_count: usize,
}

/// Merge `incoming` wire records into the `cached` collection.
///
/// A record whose id already exists replaces the cached one while keeping
/// its `LocalMeta`; unseen records are prepended with `cached_at = now`.
/// The result is sorted descending by `created_at` and contains each id
/// exactly once.
pub fn merge_collections(
    cached: Vec<CachedScreenshot>, incoming: Vec<Screenshot>, now: DateTime<Utc>,
) -> MergeOutcome {
    let mut merged = cached;
    let mut new_count = 0;
    let mut updated_count = 0;

    for record in incoming {
        if let Some(slot) = merged.iter_mut().find(|c| c.record.id == record.id) {
            let local = slot.local.clone();
            *slot = CachedScreenshot { record, local };
            updated_count += 1;
        } else {
            merged.insert(
                0,
                CachedScreenshot { record, local: LocalMeta { cached_at: Some(now), ..LocalMeta::default() } },
            );
            new_count += 1;
        }
    }

    merged.sort_by(|a, b| b.record.created_at.cmp(&a.record.created_at));

    MergeOutcome { merged, new_count, updated_count }
}
