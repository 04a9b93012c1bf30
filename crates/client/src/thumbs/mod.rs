//! Thumbnail generation pipeline.
//!
//! Produces bounded-size data-URL encodings of source images for fast
//! gallery rendering, cached by screenshot id through the cache manager.
//!
//! - Cached encodings are returned without touching the source image.
//! - Concurrent requests for the same id share one in-flight render
//!   (at most one decode per id at any time).
//! - Batch generation processes fixed-size chunks so decode work never
//!   bursts past [`BATCH_SIZE`] concurrent items; one item failing is
//!   logged and does not abort its siblings.

pub mod render;
pub mod source;

pub use render::fit_dimensions;
pub use source::{HttpImageSource, ImageSource};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared, join_all};
use instago_core::{AppConfig, CacheManager};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// Number of thumbnails rendered concurrently by batch generation.
pub const BATCH_SIZE: usize = 5;

/// Output encoding for generated thumbnails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ThumbnailFormat {
    #[default]
    Jpeg,
    Webp,
}

impl ThumbnailFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ThumbnailFormat::Jpeg => "image/jpeg",
            ThumbnailFormat::Webp => "image/webp",
        }
    }
}

/// Bounding box and encoding parameters for generated thumbnails.
#[derive(Debug, Clone)]
pub struct ThumbnailOptions {
    pub width: u32,
    pub height: u32,
    /// JPEG quality, 1-100. Ignored for lossless formats.
    pub quality: u8,
    pub format: ThumbnailFormat,
}

impl Default for ThumbnailOptions {
    fn default() -> Self {
        Self { width: 300, height: 200, quality: 80, format: ThumbnailFormat::Jpeg }
    }
}

impl ThumbnailOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            width: config.thumbnail_width,
            height: config.thumbnail_height,
            quality: config.thumbnail_quality,
            format: ThumbnailFormat::Jpeg,
        }
    }
}

/// One item of batch/preload work.
#[derive(Debug, Clone)]
pub struct ThumbnailRequest {
    pub screenshot_id: String,
    pub image_url: String,
}

/// Errors from thumbnail generation.
///
/// `Clone` so coalesced waiters on the same in-flight render can all
/// observe the one failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ThumbnailError {
    /// Network error while fetching the source image.
    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// Source image URL answered with a non-success status.
    #[error("HTTP error: {status}")]
    HttpStatus { status: u16 },

    /// Source bytes did not decode as an image.
    #[error("image decode failed: {0}")]
    Decode(String),

    /// Encoding the thumbnail failed.
    #[error("image encode failed: {0}")]
    Encode(String),

    /// The blocking render task was cancelled or panicked.
    #[error("render worker failed: {0}")]
    Worker(String),
}

type ThumbFuture = Shared<BoxFuture<'static, Result<String, ThumbnailError>>>;

/// Thumbnail generator with per-id request coalescing.
pub struct ThumbnailGenerator {
    cache: Arc<CacheManager>,
    source: Arc<dyn ImageSource>,
    in_flight: Mutex<HashMap<String, ThumbFuture>>,
    options: ThumbnailOptions,
    enabled: bool,
}

impl ThumbnailGenerator {
    pub fn new(cache: Arc<CacheManager>, source: Arc<dyn ImageSource>, options: ThumbnailOptions) -> Self {
        Self { cache, source, in_flight: Mutex::new(HashMap::new()), options, enabled: true }
    }

    /// A generator that performs no rendering: `generate` hands back the
    /// source URL unchanged. Used when thumbnails are disabled or no
    /// rendering environment is wanted.
    pub fn disabled(cache: Arc<CacheManager>) -> Self {
        Self {
            cache,
            source: Arc::new(HttpImageSource::default()),
            in_flight: Mutex::new(HashMap::new()),
            options: ThumbnailOptions::default(),
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Produce (or look up) the thumbnail data URL for `screenshot_id`.
    ///
    /// Returns the cached encoding when present; otherwise joins the
    /// in-flight render for that id, or starts one. Disabled generators
    /// return `image_url` unchanged.
    pub async fn generate(&self, image_url: &str, screenshot_id: &str) -> Result<String, ThumbnailError> {
        if !self.enabled {
            return Ok(image_url.to_string());
        }

        match self.cache.thumbnail(screenshot_id).await {
            Ok(Some(cached)) => return Ok(cached),
            Ok(None) => {}
            Err(e) => tracing::warn!("thumbnail cache read failed for {screenshot_id}: {e}"),
        }

        let fut = {
            let mut in_flight = self.in_flight.lock().await;
            match in_flight.get(screenshot_id) {
                Some(fut) => fut.clone(),
                None => {
                    let fut = render_and_cache(
                        self.cache.clone(),
                        self.source.clone(),
                        image_url.to_string(),
                        screenshot_id.to_string(),
                        self.options.clone(),
                    )
                    .boxed()
                    .shared();
                    in_flight.insert(screenshot_id.to_string(), fut.clone());
                    fut
                }
            }
        };

        let result = fut.await;
        self.in_flight.lock().await.remove(screenshot_id);
        result
    }

    /// Generate thumbnails for `items` in chunks of [`BATCH_SIZE`].
    ///
    /// `on_progress(completed, total)` fires after each item settles,
    /// success or failure. Failed items are logged and skipped; the rest
    /// of the batch continues. Returns the successful encodings by id.
    pub async fn generate_batch<F>(&self, items: &[ThumbnailRequest], on_progress: F) -> HashMap<String, String>
    where
        F: Fn(usize, usize),
    {
        let total = items.len();
        let completed = AtomicUsize::new(0);
        let mut results = HashMap::new();

        for chunk in items.chunks(BATCH_SIZE) {
            let outcomes = join_all(chunk.iter().map(|item| async {
                let outcome = self.generate(&item.image_url, &item.screenshot_id).await;
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                on_progress(done, total);
                (item.screenshot_id.clone(), outcome)
            }))
            .await;

            for (id, outcome) in outcomes {
                match outcome {
                    Ok(data_url) => {
                        results.insert(id, data_url);
                    }
                    Err(e) => tracing::warn!("thumbnail generation failed for {id}: {e}"),
                }
            }
        }

        results
    }

    /// Generate thumbnails only for items that have none cached yet.
    pub async fn preload(&self, items: &[ThumbnailRequest]) {
        if !self.enabled {
            return;
        }

        let mut missing = Vec::new();
        for item in items {
            if matches!(self.cache.thumbnail(&item.screenshot_id).await, Ok(Some(_))) {
                continue;
            }
            missing.push(item.clone());
        }

        if missing.is_empty() {
            return;
        }

        tracing::debug!("preloading {} thumbnails", missing.len());
        self.generate_batch(&missing, |done, total| tracing::debug!("thumbnail progress: {done}/{total}"))
            .await;
    }

    /// Pure cache lookup; never renders.
    pub async fn cached(&self, screenshot_id: &str) -> Option<String> {
        if !self.enabled {
            return None;
        }
        match self.cache.thumbnail(screenshot_id).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!("thumbnail cache read failed for {screenshot_id}: {e}");
                None
            }
        }
    }
}

async fn render_and_cache(
    cache: Arc<CacheManager>, source: Arc<dyn ImageSource>, image_url: String, screenshot_id: String,
    options: ThumbnailOptions,
) -> Result<String, ThumbnailError> {
    let bytes = source.fetch(&image_url).await?;

    let data_url = tokio::task::spawn_blocking(move || render::render_thumbnail(&bytes, &options))
        .await
        .map_err(|e| ThumbnailError::Worker(e.to_string()))??;

    if let Err(e) = cache.set_thumbnail(&screenshot_id, &data_url).await {
        tracing::warn!("failed to cache thumbnail for {screenshot_id}: {e}");
    }

    Ok(data_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use image::codecs::png::PngEncoder;
    use image::{DynamicImage, Rgba, RgbaImage};
    use instago_core::cache::CachePolicy;
    use std::io::Cursor;
    use std::time::Duration;

    fn png_fixture() -> Bytes {
        let img = RgbaImage::from_pixel(8, 8, Rgba([0, 128, 255, 255]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_with_encoder(PngEncoder::new(Cursor::new(&mut buf)))
            .unwrap();
        Bytes::from(buf)
    }

    struct CountingSource {
        png: Bytes,
        fetches: AtomicUsize,
        delay: Duration,
        fail_for: Option<String>,
    }

    impl CountingSource {
        fn new(delay: Duration) -> Self {
            Self { png: png_fixture(), fetches: AtomicUsize::new(0), delay, fail_for: None }
        }

        fn failing_for(url_fragment: &str) -> Self {
            Self { fail_for: Some(url_fragment.to_string()), ..Self::new(Duration::ZERO) }
        }

        fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ImageSource for CountingSource {
        async fn fetch(&self, url: &str) -> Result<Bytes, ThumbnailError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if let Some(fragment) = &self.fail_for
                && url.contains(fragment)
            {
                return Err(ThumbnailError::HttpStatus { status: 404 });
            }
            Ok(self.png.clone())
        }
    }

    async fn make_cache() -> Arc<CacheManager> {
        Arc::new(CacheManager::open_in_memory(CachePolicy::default()).await.unwrap())
    }

    fn small_options() -> ThumbnailOptions {
        ThumbnailOptions { width: 4, height: 4, ..ThumbnailOptions::default() }
    }

    #[tokio::test]
    async fn test_generate_renders_and_caches() {
        let cache = make_cache().await;
        let source = Arc::new(CountingSource::new(Duration::ZERO));
        let generator = ThumbnailGenerator::new(cache.clone(), source.clone(), small_options());

        let data_url = generator.generate("https://cdn.example.com/a.png", "a").await.unwrap();

        assert!(data_url.starts_with("data:image/jpeg;base64,"));
        assert_eq!(source.fetch_count(), 1);
        assert_eq!(cache.thumbnail("a").await.unwrap().as_deref(), Some(data_url.as_str()));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_fetch() {
        let cache = make_cache().await;
        cache.set_thumbnail("a", "data:image/jpeg;base64,AAAA").await.unwrap();

        let source = Arc::new(CountingSource::new(Duration::ZERO));
        let generator = ThumbnailGenerator::new(cache, source.clone(), small_options());

        let data_url = generator.generate("https://cdn.example.com/a.png", "a").await.unwrap();

        assert_eq!(data_url, "data:image/jpeg;base64,AAAA");
        assert_eq!(source.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_requests_for_same_id_coalesce() {
        let cache = make_cache().await;
        let source = Arc::new(CountingSource::new(Duration::from_millis(80)));
        let generator = ThumbnailGenerator::new(cache, source.clone(), small_options());

        let (first, second) = tokio::join!(
            generator.generate("https://cdn.example.com/a.png", "a"),
            generator.generate("https://cdn.example.com/a.png", "a"),
        );

        assert_eq!(first.unwrap(), second.unwrap());
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_distinct_ids_render_independently() {
        let cache = make_cache().await;
        let source = Arc::new(CountingSource::new(Duration::ZERO));
        let generator = ThumbnailGenerator::new(cache, source.clone(), small_options());

        let (a, b) = tokio::join!(
            generator.generate("https://cdn.example.com/a.png", "a"),
            generator.generate("https://cdn.example.com/b.png", "b"),
        );

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_disabled_generator_returns_source_url() {
        let cache = make_cache().await;
        let generator = ThumbnailGenerator::disabled(cache);

        let result = generator.generate("https://cdn.example.com/a.png", "a").await.unwrap();

        assert_eq!(result, "https://cdn.example.com/a.png");
        assert!(generator.cached("a").await.is_none());
    }

    #[tokio::test]
    async fn test_batch_reports_progress_and_survives_failures() {
        let cache = make_cache().await;
        let source = Arc::new(CountingSource::failing_for("bad"));
        let generator = ThumbnailGenerator::new(cache, source, small_options());

        let items: Vec<ThumbnailRequest> = (0..6)
            .map(|i| {
                let name = if i == 3 { "bad".to_string() } else { format!("img-{i}") };
                ThumbnailRequest {
                    screenshot_id: format!("id-{i}"),
                    image_url: format!("https://cdn.example.com/{name}.png"),
                }
            })
            .collect();

        let progress = std::sync::Mutex::new(Vec::new());
        let results = generator
            .generate_batch(&items, |done, total| progress.lock().unwrap().push((done, total)))
            .await;

        assert_eq!(results.len(), 5);
        assert!(!results.contains_key("id-3"));

        let progress = progress.lock().unwrap();
        assert_eq!(progress.len(), 6);
        assert_eq!(progress.last(), Some(&(6, 6)));
    }

    #[tokio::test]
    async fn test_preload_skips_already_cached() {
        let cache = make_cache().await;
        cache.set_thumbnail("a", "data:image/jpeg;base64,AAAA").await.unwrap();

        let source = Arc::new(CountingSource::new(Duration::ZERO));
        let generator = ThumbnailGenerator::new(cache.clone(), source.clone(), small_options());

        let items = vec![
            ThumbnailRequest { screenshot_id: "a".to_string(), image_url: "https://cdn.example.com/a.png".to_string() },
            ThumbnailRequest { screenshot_id: "b".to_string(), image_url: "https://cdn.example.com/b.png".to_string() },
        ];
        generator.preload(&items).await;

        assert_eq!(source.fetch_count(), 1);
        assert!(cache.thumbnail("b").await.unwrap().is_some());
    }
}
