//! Capture provider abstraction for still-image acquisition.
//!
//! This module provides a unified interface for different image sources:
//! - Photos already on disk (`StillImageProvider`)
//! - A synthetic test card for demos and testing (`TestCardCamera`)
//! - Real cameras through V4L2 (`V4lCamera`, behind the `v4l` feature)
//!
//! Device access is scoped: `CaptureProvider::acquire` hands out a
//! `CaptureLease` that owns the device, and dropping the lease releases it.

use font8x8::{BASIC_FONTS, LATIN_FONTS, UnicodeFonts};
use image::{DynamicImage, ImageBuffer, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::types::{CaptureError, CaptureResult};
use crate::config::MAX_FRAME_SIDE;
use crate::payload::{ImagePayload, MediaType};

/// An opened device that can shoot stills until it is dropped
pub trait CaptureDevice: Send {
    /// Grab one still image
    fn capture(&mut self) -> CaptureResult<ImagePayload>;

    /// Human-readable device name for the camera screen
    fn description(&self) -> String;
}

/// Trait for capture providers
///
/// Implementations provide different ways of acquiring a device:
/// - `StillImageProvider` for photos taken elsewhere
/// - `TestCardCamera` for a generated frame
/// - `V4lCamera` for Video4Linux devices
pub trait CaptureProvider: Send {
    /// Acquire exclusive access to the device for the duration of the lease
    fn acquire(&mut self) -> CaptureResult<CaptureLease>;

    /// Get the source type identifier (e.g., "file", "test_card", "v4l")
    fn source_type(&self) -> &str;
}

/// Exclusive, scoped access to an acquired device.
///
/// The device is released when the lease is dropped, on every exit path.
pub struct CaptureLease {
    device: Box<dyn CaptureDevice>,
    source: String,
}

impl CaptureLease {
    pub fn new(source: impl Into<String>, device: Box<dyn CaptureDevice>) -> Self {
        let source = source.into();
        info!(source = %source, device = %device.description(), "camera acquired");
        Self { device, source }
    }

    /// Shoot one still through the leased device
    pub fn capture(&mut self) -> CaptureResult<ImagePayload> {
        let payload = self.device.capture()?;
        debug!(
            source = %self.source,
            media_type = %payload.media_type(),
            bytes = payload.len(),
            "still captured"
        );
        Ok(payload)
    }

    pub fn description(&self) -> String {
        self.device.description()
    }

    pub fn source_type(&self) -> &str {
        &self.source
    }
}

impl Drop for CaptureLease {
    fn drop(&mut self) {
        info!(source = %self.source, "camera released");
    }
}

impl std::fmt::Debug for CaptureLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureLease")
            .field("source", &self.source)
            .field("device", &self.device.description())
            .finish()
    }
}

/// Acquire, shoot one still, release.
pub fn capture_once(provider: &mut dyn CaptureProvider) -> CaptureResult<ImagePayload> {
    let mut lease = provider.acquire()?;
    lease.capture()
}

// =============================================================================
// Photos from disk
// =============================================================================

/// Provider that "captures" a photo file.
///
/// Files in a format the analysis service accepts are sent as-is; anything
/// else the `image` crate can read (BMP, GIF, TIFF...) is re-encoded as JPEG.
#[derive(Debug, Clone)]
pub struct StillImageProvider {
    path: PathBuf,
    quality: u8,
}

impl StillImageProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            quality: crate::config::get().camera.jpeg_quality,
        }
    }

    pub fn quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CaptureProvider for StillImageProvider {
    fn acquire(&mut self) -> CaptureResult<CaptureLease> {
        let metadata = fs::metadata(&self.path)?;
        if !metadata.is_file() {
            return Err(CaptureError::Unavailable(format!(
                "{} is not a file",
                self.path.display()
            )));
        }
        let device = StillImageDevice {
            path: self.path.clone(),
            quality: self.quality,
        };
        Ok(CaptureLease::new(self.source_type(), Box::new(device)))
    }

    fn source_type(&self) -> &str {
        "file"
    }
}

struct StillImageDevice {
    path: PathBuf,
    quality: u8,
}

impl CaptureDevice for StillImageDevice {
    fn capture(&mut self) -> CaptureResult<ImagePayload> {
        let bytes = fs::read(&self.path)?;
        if MediaType::sniff(&bytes).is_some() {
            return Ok(ImagePayload::sniffed(bytes)?);
        }
        let image = image::load_from_memory(&bytes)?;
        Ok(ImagePayload::encode_jpeg(&image, self.quality)?)
    }

    fn description(&self) -> String {
        format!("photo {}", self.path.display())
    }
}

// =============================================================================
// Synthetic test card
// =============================================================================

/// A drawable RGB frame used to fake camera output
///
/// Provides a small drawing API for building test frames:
/// - `fill()` - Fill the whole frame with a color
/// - `draw_rect()` - Draw a filled rectangle
/// - `draw_text()` - Draw text using font8x8 glyphs, scaled up
#[derive(Debug, Clone)]
pub struct TestCard {
    width: u32,
    height: u32,
    /// RGB pixel buffer (row-major, 3 bytes per pixel)
    buffer: Vec<u8>,
}

impl TestCard {
    /// Create a card of the given size filled with paper white.
    ///
    /// Each side is clamped to `MAX_FRAME_SIDE`.
    pub fn new(width: u32, height: u32) -> Self {
        let width = width.min(MAX_FRAME_SIDE);
        let height = height.min(MAX_FRAME_SIDE);
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(3))
            .unwrap_or(0);
        let mut card = Self {
            width,
            height,
            buffer: vec![0u8; len],
        };
        card.fill([250, 250, 245]);
        card
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn fill(&mut self, color: [u8; 3]) {
        for chunk in self.buffer.chunks_exact_mut(3) {
            chunk.copy_from_slice(&color);
        }
    }

    pub fn draw_rect(&mut self, x: u32, y: u32, w: u32, h: u32, color: [u8; 3]) {
        for py in y..y.saturating_add(h).min(self.height) {
            for px in x..x.saturating_add(w).min(self.width) {
                self.set_pixel(px, py, color);
            }
        }
    }

    /// Draw text with each glyph pixel blown up to `scale` x `scale`. Text does not wrap.
    pub fn draw_text(&mut self, x: u32, y: u32, text: &str, scale: u32, color: [u8; 3]) {
        let scale = scale.max(1);
        let mut cursor_x = x;
        for ch in text.chars() {
            if cursor_x >= self.width {
                break;
            }
            let glyph = BASIC_FONTS
                .get(ch)
                .or_else(|| LATIN_FONTS.get(ch))
                .unwrap_or([0u8; 8]);
            for (row_idx, row) in glyph.iter().enumerate() {
                for bit in 0..8u32 {
                    // font8x8 stores LSB as leftmost pixel
                    if (row >> bit) & 1 == 1 {
                        let px = cursor_x.saturating_add(bit.saturating_mul(scale));
                        let py = y.saturating_add((row_idx as u32).saturating_mul(scale));
                        self.draw_rect(px, py, scale, scale, color);
                    }
                }
            }
            cursor_x = cursor_x.saturating_add(scale.saturating_mul(8));
        }
    }

    /// Byte offset of a pixel, `None` outside the card
    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        (y as usize)
            .checked_mul(self.width as usize)
            .and_then(|row| row.checked_add(x as usize))
            .and_then(|pixel| pixel.checked_mul(3))
            .filter(|idx| idx + 3 <= self.buffer.len())
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        match self.offset(x, y) {
            Some(idx) => [self.buffer[idx], self.buffer[idx + 1], self.buffer[idx + 2]],
            None => [0, 0, 0],
        }
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 3]) {
        if let Some(idx) = self.offset(x, y) {
            self.buffer[idx..idx + 3].copy_from_slice(&color);
        }
    }

    pub fn to_image(&self) -> DynamicImage {
        let rgb: RgbImage = ImageBuffer::from_fn(self.width, self.height, |x, y| {
            image::Rgb(self.get_pixel(x, y))
        });
        DynamicImage::ImageRgb8(rgb)
    }
}

/// Camera that always returns the same synthetic homework sheet
#[derive(Debug, Clone)]
pub struct TestCardCamera {
    lines: Vec<String>,
    width: u32,
    height: u32,
    quality: u8,
}

impl Default for TestCardCamera {
    fn default() -> Self {
        Self::new(["Exercice 1", "12 + 30 = ?", "7 x 6 = ?"])
    }
}

impl TestCardCamera {
    pub fn new(lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let camera = &crate::config::get().camera;
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            width: camera.frame_width,
            height: camera.frame_height,
            quality: camera.jpeg_quality,
        }
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Render the sheet as it would be photographed
    pub fn render(&self) -> TestCard {
        let mut card = TestCard::new(self.width, self.height);
        let scale = (self.height / 120).max(1);
        let line_height = 12 * scale;
        for (idx, line) in self.lines.iter().enumerate() {
            let y = (idx as u32).saturating_add(2).saturating_mul(line_height);
            card.draw_text(4 * scale, y, line, scale, [20, 20, 60]);
        }
        card
    }
}

impl CaptureProvider for TestCardCamera {
    fn acquire(&mut self) -> CaptureResult<CaptureLease> {
        let device = TestCardDevice {
            frame: self.render(),
            quality: self.quality,
        };
        Ok(CaptureLease::new(self.source_type(), Box::new(device)))
    }

    fn source_type(&self) -> &str {
        "test_card"
    }
}

struct TestCardDevice {
    frame: TestCard,
    quality: u8,
}

impl CaptureDevice for TestCardDevice {
    fn capture(&mut self) -> CaptureResult<ImagePayload> {
        Ok(ImagePayload::encode_jpeg(&self.frame.to_image(), self.quality)?)
    }

    fn description(&self) -> String {
        format!("test card {}x{}", self.frame.width(), self.frame.height())
    }
}
