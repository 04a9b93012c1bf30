//! Image byte sources for thumbnail generation.
//!
//! The generator fetches source images through the [`ImageSource`] trait
//! so tests can count fetches and serve fixtures without a network.

use super::ThumbnailError;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

/// Provider of raw image bytes for a URL.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, ThumbnailError>;
}

/// HTTP-backed image source.
pub struct HttpImageSource {
    http: reqwest::Client,
}

impl HttpImageSource {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("failed to build HTTP client"),
        }
    }
}

impl Default for HttpImageSource {
    fn default() -> Self {
        Self::new(Duration::from_secs(20))
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn fetch(&self, url: &str) -> Result<Bytes, ThumbnailError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ThumbnailError::Network(Arc::new(e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ThumbnailError::HttpStatus { status: status.as_u16() });
        }

        response.bytes().await.map_err(|e| ThumbnailError::Network(Arc::new(e)))
    }
}
