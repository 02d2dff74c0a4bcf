//! Screenshot preparation: decode, resize to the logical resolution,
//! re-encode as JPEG.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use browserpilot_core::{Error, Observation, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use tracing::debug;

use crate::normalizer::Resolution;

const JPEG_QUALITY: u8 = 80;

/// Accepts raw base64 or a `data:image/...;base64,` URL.
pub fn prepare(data: &str, logical: Resolution) -> Result<Observation> {
    let encoded = match data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    };
    let encoded = encoded.trim();
    if encoded.is_empty() {
        return Err(Error::ExecutorFailure("empty screenshot".to_string()));
    }

    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| Error::ExecutorFailure(format!("screenshot is not valid base64: {}", e)))?;
    let img = image::load_from_memory(&bytes)
        .map_err(|e| Error::ExecutorFailure(format!("screenshot could not be decoded: {}", e)))?;

    let (src_w, src_h) = (img.width(), img.height());
    let rgb = if (src_w, src_h) == (logical.width, logical.height) {
        img.to_rgb8()
    } else {
        img.resize_exact(logical.width, logical.height, FilterType::Triangle)
            .to_rgb8()
    };

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| Error::Other(format!("failed to encode screenshot: {}", e)))?;

    debug!(
        src_w,
        src_h,
        dst = %logical,
        bytes = jpeg.len(),
        "Screenshot prepared"
    );

    Ok(Observation {
        image_base64: STANDARD.encode(&jpeg),
        media_type: "image/jpeg".to_string(),
        width: logical.width,
        height: logical.height,
    })
}
