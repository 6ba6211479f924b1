//! Raw camera frames to encoded stills.

use image::{DynamicImage, RgbImage};

use super::types::{CaptureError, CaptureResult};
use crate::payload::{ImagePayload, MediaType};

/// Pixel layouts we know how to turn into a still
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Motion JPEG: every frame is already a JPEG
    Mjpeg,
    /// YUYV 4:2:2 packed
    Yuyv,
    /// 24-bit RGB
    Rgb24,
}

impl PixelFormat {
    pub fn from_fourcc(code: &[u8; 4]) -> Option<Self> {
        match code {
            b"MJPG" | b"JPEG" => Some(PixelFormat::Mjpeg),
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"RGB3" => Some(PixelFormat::Rgb24),
            _ => None,
        }
    }

    pub fn fourcc(&self) -> &'static [u8; 4] {
        match self {
            PixelFormat::Mjpeg => b"MJPG",
            PixelFormat::Yuyv => b"YUYV",
            PixelFormat::Rgb24 => b"RGB3",
        }
    }
}

/// Convert one YUV sample to RGB (ITU-R BT.601)
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = f32::from(y);
    let u = f32::from(u) - 128.0;
    let v = f32::from(v) - 128.0;

    let r = 1.402f32.mul_add(v, y);
    let g = 0.714_14f32.mul_add(-v, 0.344_14f32.mul_add(-u, y));
    let b = 1.772f32.mul_add(u, y);

    [r, g, b].map(|c| c.clamp(0.0, 255.0) as u8)
}

/// Bytes in a `width` x `height` frame at `bytes_per_pixel`
fn frame_len(width: u32, height: u32, bytes_per_pixel: usize) -> CaptureResult<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(bytes_per_pixel))
        .ok_or_else(|| CaptureError::Frame(format!("frame size {}x{} overflows", width, height)))
}

/// Expand a packed YUYV buffer into an RGB image
pub fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> CaptureResult<RgbImage> {
    let expected = frame_len(width, height, 2)?;
    if width % 2 != 0 || data.len() < expected {
        return Err(CaptureError::Frame(format!(
            "YUYV frame too short: expected {} bytes for {}x{}, got {}",
            expected,
            width,
            height,
            data.len()
        )));
    }

    let mut rgb = Vec::with_capacity(frame_len(width, height, 3)?);
    // [Y0 U Y1 V] covers two pixels sharing chroma
    for quad in data[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (quad[0], quad[1], quad[2], quad[3]);
        rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
        rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }

    RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| CaptureError::Frame("RGB buffer size mismatch".to_string()))
}

/// Turn a raw frame into the payload handed to the session.
///
/// MJPEG frames pass through untouched when they decode; everything else is
/// re-encoded as JPEG at `quality`.
pub fn frame_to_payload(
    format: PixelFormat,
    data: &[u8],
    width: u32,
    height: u32,
    quality: u8,
) -> CaptureResult<ImagePayload> {
    match format {
        PixelFormat::Mjpeg => {
            // Some webcams send truncated frames while the exposure settles
            image::load_from_memory(data)
                .map_err(|e| CaptureError::Frame(format!("corrupt MJPEG frame: {}", e)))?;
            Ok(ImagePayload::new(data.to_vec(), MediaType::Jpeg)?)
        }
        PixelFormat::Yuyv => {
            let rgb = yuyv_to_rgb(data, width, height)?;
            Ok(ImagePayload::encode_jpeg(&DynamicImage::ImageRgb8(rgb), quality)?)
        }
        PixelFormat::Rgb24 => {
            let expected = frame_len(width, height, 3)?;
            let rgb = data
                .get(..expected)
                .and_then(|slice| RgbImage::from_raw(width, height, slice.to_vec()))
                .ok_or_else(|| {
                    CaptureError::Frame(format!(
                        "RGB frame too short: expected {} bytes, got {}",
                        expected,
                        data.len()
                    ))
                })?;
            Ok(ImagePayload::encode_jpeg(&DynamicImage::ImageRgb8(rgb), quality)?)
        }
    }
}
