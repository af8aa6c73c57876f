//! Screenshot post-processing.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use tracing::warn;

/// Longest edge allowed in a vision payload.
const MAX_LONG_EDGE: u32 = 2048;
/// Shortest edge allowed in a vision payload.
const MAX_SHORT_EDGE: u32 = 768;

/// Produce a JPEG sized for vision services from raw PNG bytes.
///
/// The PNG is archived as-is; this derivative exists to keep vision
/// payloads small. Best effort: undecodable input is logged and skipped,
/// never an error.
pub fn jpeg_derivative(png: &[u8]) -> Option<Vec<u8>> {
    let decoded = match image::load_from_memory(png) {
        Ok(decoded) => decoded,
        Err(err) => {
            warn!(error = %err, "screenshot not decodable, skipping jpeg derivative");
            return None;
        }
    };

    let (width, height) = (decoded.width(), decoded.height());
    let long = width.max(height) as f64;
    let short = width.min(height) as f64;
    let scale = (MAX_LONG_EDGE as f64 / long)
        .min(MAX_SHORT_EDGE as f64 / short)
        .min(1.0);

    let resized = if scale < 1.0 {
        let w = ((width as f64 * scale).round() as u32).max(1);
        let h = ((height as f64 * scale).round() as u32).max(1);
        decoded.resize_exact(w, h, FilterType::Triangle)
    } else {
        decoded
    };

    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());
    let mut out = Vec::new();
    match rgb.write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg) {
        Ok(()) => Some(out),
        Err(err) => {
            warn!(error = %err, "jpeg encoding failed");
            None
        }
    }
}
