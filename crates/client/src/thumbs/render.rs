//! Decode, downscale, and encode source images into data-URL thumbnails.
//!
//! Pure CPU work; the generator runs it on a blocking thread.

use super::{ThumbnailError, ThumbnailFormat, ThumbnailOptions};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use std::io::Cursor;

/// Target dimensions that fit `orig_w x orig_h` within `max_w x max_h`
/// while preserving the aspect ratio.
pub fn fit_dimensions(orig_w: u32, orig_h: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    let aspect = orig_w as f64 / orig_h as f64;

    let mut width;
    let mut height;
    if orig_w > orig_h {
        width = max_w as f64;
        height = width / aspect;
        if height > max_h as f64 {
            height = max_h as f64;
            width = height * aspect;
        }
    } else {
        height = max_h as f64;
        width = height * aspect;
        if width > max_w as f64 {
            width = max_w as f64;
            height = width / aspect;
        }
    }

    ((width.round() as u32).max(1), (height.round() as u32).max(1))
}

/// Decode `bytes`, resize to fit the option bounds, flatten transparency
/// onto an opaque white background, and encode as a data URL.
pub(crate) fn render_thumbnail(bytes: &[u8], opts: &ThumbnailOptions) -> Result<String, ThumbnailError> {
    let img = image::load_from_memory(bytes).map_err(|e| ThumbnailError::Decode(e.to_string()))?;

    let (width, height) = fit_dimensions(img.width(), img.height(), opts.width, opts.height);
    let resized = img.resize_exact(width, height, FilterType::Triangle);

    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
    imageops::overlay(&mut canvas, &resized.to_rgba8(), 0, 0);

    let mut buf = Vec::new();
    match opts.format {
        ThumbnailFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(canvas).to_rgb8();
            let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut buf), opts.quality);
            DynamicImage::ImageRgb8(rgb)
                .write_with_encoder(encoder)
                .map_err(|e| ThumbnailError::Encode(e.to_string()))?;
        }
        ThumbnailFormat::Webp => {
            let encoder = WebPEncoder::new_lossless(Cursor::new(&mut buf));
            DynamicImage::ImageRgba8(canvas)
                .write_with_encoder(encoder)
                .map_err(|e| ThumbnailError::Encode(e.to_string()))?;
        }
    }

    Ok(format!("data:{};base64,{}", opts.format.mime_type(), STANDARD.encode(&buf)))
}
