//! Consumer-facing orchestration for the InstaGo cache layer.
//!
//! This crate wires the cache manager, API client, and thumbnail
//! generator into two stateful surfaces the embedding UI reads:
//!
//! - [`ScreenshotStore`]: cached-first display of the screenshot
//!   collection with background incremental sync, scheduled refresh,
//!   foreground catch-up, and optimistic local mutations.
//! - [`SearchCache`]: debounced, cancelable, cached search-as-you-type.

pub mod screenshots;
pub mod search;

pub use screenshots::{AutoRefreshHandle, LastUpdateInfo, ScreenshotStore, StoreOptions, SyncCounts, ViewState};
pub use search::{CancelableSearch, SearchCache, SearchState};

#[cfg(test)]
pub(crate) mod testing;
