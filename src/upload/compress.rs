//! Raster downscale and JPEG re-encoding for uploads.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::upload::UploadError;
use crate::upload::datauri::{self, DataUri};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionLimits {
    pub max_width: u32,
    pub max_height: u32,
    pub jpeg_quality: u8,
}

impl Default for CompressionLimits {
    fn default() -> Self {
        Self {
            max_width: 1380,
            max_height: 2000,
            jpeg_quality: 88,
        }
    }
}

/// Bounds for shrinking inline images while a document is being edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShrinkLimits {
    pub max_edge: u32,
    pub target_bytes: usize,
    pub qualities: Vec<u8>,
}

impl Default for ShrinkLimits {
    fn default() -> Self {
        Self {
            max_edge: 1280,
            target_bytes: 450 * 1024,
            qualities: vec![86, 80, 72],
        }
    }
}

/// Scales `(width, height)` into the bounds, width first, keeping the aspect ratio.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    let (mut w, mut h) = (width as f64, height as f64);
    if w > max_width as f64 {
        h = (h * max_width as f64 / w).round();
        w = max_width as f64;
    }
    if h > max_height as f64 {
        w = (w * max_height as f64 / h).round();
        h = max_height as f64;
    }
    ((w as u32).max(1), (h as u32).max(1))
}

/// Composites any alpha channel over white.
fn flatten_on_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    out
}

fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, UploadError> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    DynamicImage::ImageRgb8(image.clone())
        .write_with_encoder(encoder)
        .map_err(|e| UploadError::Image(e.to_string()))?;
    Ok(buf)
}

fn resized(image: DynamicImage, width: u32, height: u32) -> DynamicImage {
    if image.width() == width && image.height() == height {
        image
    } else {
        image.resize_exact(width, height, FilterType::Lanczos3)
    }
}

/// Downscales into `limits` and re-encodes as JPEG. The original is kept
/// whenever it cannot be decoded or the re-encoded output is not smaller.
pub fn compress_for_upload(original: &DataUri, limits: &CompressionLimits) -> DataUri {
    let Ok(decoded) = image::load_from_memory(&original.bytes) else {
        debug!(mime = %original.mime, "undecodable image, uploading as-is");
        return original.clone();
    };
    let (w, h) = fit_within(decoded.width(), decoded.height(), limits.max_width, limits.max_height);
    let flattened = flatten_on_white(&resized(decoded, w, h));
    match encode_jpeg(&flattened, limits.jpeg_quality) {
        Ok(jpeg) if jpeg.len() < original.bytes.len() => DataUri {
            mime: "image/jpeg".to_string(),
            bytes: Bytes::from(jpeg),
        },
        Ok(_) => original.clone(),
        Err(err) => {
            debug!(error = %err, "jpeg re-encode failed, uploading as-is");
            original.clone()
        }
    }
}

/// Formats editors accept as pasted or dropped files.
pub fn is_editor_friendly(mime: &str) -> bool {
    matches!(
        mime.to_ascii_lowercase().as_str(),
        "image/png" | "image/jpeg" | "image/jpg" | "image/gif"
    )
}

/// Converts anything other than PNG/JPEG/GIF to JPEG on a white background.
pub fn reencode_unsupported(file: DataUri) -> Result<DataUri, UploadError> {
    if is_editor_friendly(&file.mime) {
        return Ok(file);
    }
    let decoded =
        image::load_from_memory(&file.bytes).map_err(|e| UploadError::Image(e.to_string()))?;
    let jpeg = encode_jpeg(&flatten_on_white(&decoded), 90)?;
    Ok(DataUri {
        mime: "image/jpeg".to_string(),
        bytes: Bytes::from(jpeg),
    })
}

/// Shrinks an inline `data:` image for editing. Returns the input unchanged
/// unless the result was resized or is at least 8% smaller, and always
/// strictly smaller.
pub fn shrink_inline(data_uri: &str, limits: &ShrinkLimits) -> String {
    let Ok(original) = datauri::parse(data_uri) else {
        return data_uri.to_string();
    };
    if !original.mime.starts_with("image/") {
        return data_uri.to_string();
    }
    let Ok(decoded) = image::load_from_memory(&original.bytes) else {
        return data_uri.to_string();
    };
    let (orig_w, orig_h) = (decoded.width(), decoded.height());
    if orig_w == 0 || orig_h == 0 {
        return data_uri.to_string();
    }
    let (w, h) = fit_within(orig_w, orig_h, limits.max_edge, limits.max_edge);
    let flattened = flatten_on_white(&resized(decoded, w, h));

    let mut best: Option<Vec<u8>> = None;
    for quality in &limits.qualities {
        let Ok(candidate) = encode_jpeg(&flattened, *quality) else {
            continue;
        };
        let fits = candidate.len() <= limits.target_bytes;
        if best.as_ref().is_none_or(|b| candidate.len() < b.len()) || fits {
            best = Some(candidate);
        }
        if fits {
            break;
        }
    }
    let Some(best) = best else {
        return data_uri.to_string();
    };

    let was_resized = w != orig_w || h != orig_h;
    let enough_smaller = (best.len() as f64) < original.bytes.len() as f64 * 0.92;
    if (!was_resized && !enough_smaller) || best.len() >= original.bytes.len() {
        return data_uri.to_string();
    }
    datauri::encode(Some("image/jpeg"), &best)
}
