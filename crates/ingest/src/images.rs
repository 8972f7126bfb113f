//! Image processor: validates uploads, shrinks them under the upstream
//! pixel and byte ceilings, and base64-encodes them for inline transport.

use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{Duration as ChronoDuration, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use thiserror::Error;

use shared::session::StoredImage;

/// Upload cap; anything above this is refused before decoding.
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Pixel-count ceiling the vision endpoint accepts.
pub const MAX_PIXELS: u64 = 33_177_600;

/// Raw byte budget targeted before base64 encoding for inline transport.
pub const MAX_INLINE_BYTES: usize = 4 * 1024 * 1024;

/// Retention limits for staged images; oldest pruned first.
pub const MAX_RETAINED_IMAGES: usize = 10;
pub const MAX_IMAGE_AGE_SECS: i64 = 3600;

const JPEG_QUALITY_START: u8 = 95;
const JPEG_QUALITY_FLOOR: u8 = 30;
const JPEG_QUALITY_STEP: u8 = 5;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image is too large: {size_mb:.2}MB (maximum {max_mb}MB)")]
    TooLarge { size_mb: f64, max_mb: usize },
    #[error("file is not a valid image: {0}")]
    Invalid(String),
    #[error("image encoding failed: {0}")]
    Encode(String),
}

/// An image ready for inline transport.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub base64_data: String,
    pub media_type: String,
    pub width: u32,
    pub height: u32,
}

impl PreparedImage {
    pub fn encoded_len(&self) -> usize {
        self.base64_data.len()
    }
}

/// Checks size and decodability; returns the dimensions on success.
pub fn validate_image(bytes: &[u8]) -> Result<(u32, u32), ImageError> {
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(ImageError::TooLarge {
            size_mb: bytes.len() as f64 / (1024.0 * 1024.0),
            max_mb: MAX_UPLOAD_BYTES / (1024 * 1024),
        });
    }
    let img = image::load_from_memory(bytes).map_err(|e| ImageError::Invalid(e.to_string()))?;
    Ok((img.width(), img.height()))
}

/// Validates, resizes under the pixel ceiling, recompresses under the byte
/// budget, and base64-encodes. Inputs already within both ceilings pass
/// through byte-identical in their original format; everything else comes
/// out as JPEG.
pub fn prepare_for_inline(bytes: &[u8]) -> Result<PreparedImage, ImageError> {
    validate_image(bytes)?;
    let img = image::load_from_memory(bytes).map_err(|e| ImageError::Invalid(e.to_string()))?;
    let pixels = u64::from(img.width()) * u64::from(img.height());

    if pixels <= MAX_PIXELS && bytes.len() <= MAX_INLINE_BYTES {
        let media_type = media_type_of(bytes);
        return Ok(PreparedImage {
            base64_data: BASE64.encode(bytes),
            media_type,
            width: img.width(),
            height: img.height(),
        });
    }

    let img = resize_to_pixels(img, MAX_PIXELS);
    let jpeg = compress_to_budget(&img, MAX_INLINE_BYTES)?;
    tracing::info!(
        width = img.width(),
        height = img.height(),
        bytes = jpeg.len(),
        "image recompressed for inline transport"
    );
    Ok(PreparedImage {
        base64_data: BASE64.encode(&jpeg),
        media_type: "image/jpeg".to_string(),
        width: img.width(),
        height: img.height(),
    })
}

/// Downscales so `width * height <= max_pixels`, preserving aspect ratio.
pub fn resize_to_pixels(img: DynamicImage, max_pixels: u64) -> DynamicImage {
    let pixels = u64::from(img.width()) * u64::from(img.height());
    if pixels <= max_pixels {
        return img;
    }
    let ratio = (max_pixels as f64 / pixels as f64).sqrt();
    let new_width = ((f64::from(img.width()) * ratio) as u32).max(1);
    let new_height = ((f64::from(img.height()) * ratio) as u32).max(1);
    tracing::info!(
        from = format!("{}x{}", img.width(), img.height()),
        to = format!("{new_width}x{new_height}"),
        "resizing image under pixel ceiling"
    );
    img.resize(new_width, new_height, FilterType::Lanczos3)
}

/// JPEG-encodes with progressively lower quality until the budget is met
/// or the quality floor is reached. At the floor the best effort is
/// returned; the API client enforces the hard transport limit.
pub fn compress_to_budget(img: &DynamicImage, max_bytes: usize) -> Result<Vec<u8>, ImageError> {
    let rgb = img.to_rgb8();
    let mut quality = JPEG_QUALITY_START;
    loop {
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, quality)
            .encode_image(&rgb)
            .map_err(|e| ImageError::Encode(e.to_string()))?;
        if buf.len() <= max_bytes || quality <= JPEG_QUALITY_FLOOR {
            if buf.len() > max_bytes {
                tracing::warn!(bytes = buf.len(), quality, "image still over budget at quality floor");
            }
            return Ok(buf);
        }
        quality -= JPEG_QUALITY_STEP;
    }
}

/// Stages an upload in the system temp directory under a fresh name.
pub fn save_upload(bytes: &[u8], extension: &str) -> std::io::Result<PathBuf> {
    let path = std::env::temp_dir().join(format!("{}.{extension}", uuid::Uuid::new_v4()));
    std::fs::write(&path, bytes)?;
    Ok(path)
}

/// Drops staged images past the retention count (oldest first) and past
/// the age threshold, deleting their on-disk files. Missing files are
/// treated as already cleaned.
pub fn prune_stored(images: &mut Vec<StoredImage>) {
    prune_stored_with(images, MAX_RETAINED_IMAGES, MAX_IMAGE_AGE_SECS);
}

pub fn prune_stored_with(images: &mut Vec<StoredImage>, max_count: usize, max_age_secs: i64) {
    let cutoff = Utc::now() - ChronoDuration::seconds(max_age_secs);
    let mut expired: Vec<StoredImage> = Vec::new();
    images.retain(|img| {
        if img.created_at < cutoff {
            expired.push(img.clone());
            false
        } else {
            true
        }
    });
    while images.len() > max_count {
        expired.push(images.remove(0));
    }
    for img in expired {
        match std::fs::remove_file(&img.path) {
            Ok(()) => tracing::debug!(path = %img.path.display(), "pruned staged image"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %img.path.display(), error = %e, "failed to prune image"),
        }
    }
}

fn media_type_of(bytes: &[u8]) -> String {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::Gif) => "image/gif",
        Ok(ImageFormat::WebP) => "image/webp",
        Ok(ImageFormat::Bmp) => "image/bmp",
        _ => "application/octet-stream",
    }
    .to_string()
}
