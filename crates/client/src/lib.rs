//! Client code for the InstaGo cache layer.
//!
//! This crate provides the REST API client consumed by the cache
//! orchestration layer and the thumbnail generation pipeline.

pub mod api;
pub mod thumbs;

pub use api::{ApiClient, ApiConfig, ApiError, ListOptions, ScreenshotApi, SearchHit};
pub use thumbs::{
    HttpImageSource, ImageSource, ThumbnailError, ThumbnailFormat, ThumbnailGenerator, ThumbnailOptions,
    ThumbnailRequest,
};
