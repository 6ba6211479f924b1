//! V4L2 camera provider using the v4l crate.

use tracing::{debug, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::Device;

use super::backend::{CaptureDevice, CaptureLease, CaptureProvider};
use super::frame::{PixelFormat, frame_to_payload};
use super::types::{CaptureError, CaptureResult};
use crate::config::CameraSettings;
use crate::payload::ImagePayload;

/// Number of mmap buffers requested from the driver
const BUFFER_COUNT: u32 = 4;

/// A camera listed by the kernel
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
    pub path: String,
}

/// Enumerate /dev/video* nodes
pub fn list_devices() -> Vec<DeviceInfo> {
    let mut devices: Vec<DeviceInfo> = v4l::context::enum_devices()
        .into_iter()
        .map(|node| DeviceInfo {
            index: node.index(),
            name: node.name().unwrap_or_else(|| "unknown".to_string()),
            path: node.path().display().to_string(),
        })
        .collect();
    devices.sort_by_key(|d| d.index);
    devices
}

/// Provider opening a Video4Linux device by index
#[derive(Debug, Clone)]
pub struct V4lCamera {
    index: u32,
    settings: CameraSettings,
}

impl V4lCamera {
    pub fn new(index: u32, settings: CameraSettings) -> Self {
        Self { index, settings }
    }

    pub fn from_config() -> Self {
        let settings = crate::config::get().camera.clone();
        Self::new(settings.device_index, settings)
    }
}

impl CaptureProvider for V4lCamera {
    fn acquire(&mut self) -> CaptureResult<CaptureLease> {
        let device = Device::new(self.index as usize)?;

        let caps = device.query_caps()?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CaptureError::Unavailable(format!(
                "{} ({}) cannot capture video",
                caps.card, caps.driver
            )));
        }

        // Prefer MJPEG at the requested size, fall back to YUYV
        let mut fmt = device.format()?;
        fmt.width = self.settings.frame_width;
        fmt.height = self.settings.frame_height;
        fmt.fourcc = v4l::FourCC::new(PixelFormat::Mjpeg.fourcc());
        let mut fmt = device.set_format(&fmt)?;
        if PixelFormat::from_fourcc(&fmt.fourcc.repr).is_none() {
            fmt.fourcc = v4l::FourCC::new(PixelFormat::Yuyv.fourcc());
            fmt = device.set_format(&fmt)?;
        }
        let pixel_format = PixelFormat::from_fourcc(&fmt.fourcc.repr).ok_or_else(|| {
            CaptureError::Unavailable(format!(
                "unsupported pixel format {}",
                String::from_utf8_lossy(&fmt.fourcc.repr)
            ))
        })?;
        debug!(
            card = %caps.card,
            width = fmt.width,
            height = fmt.height,
            format = ?pixel_format,
            "camera format negotiated"
        );

        let camera = V4lDevice {
            device,
            card: caps.card,
            width: fmt.width,
            height: fmt.height,
            pixel_format,
            quality: self.settings.jpeg_quality,
            warmup_frames: self.settings.warmup_frames,
        };
        Ok(CaptureLease::new(self.source_type(), Box::new(camera)))
    }

    fn source_type(&self) -> &str {
        "v4l"
    }
}

/// An open device; closing the file descriptor on drop frees the camera
struct V4lDevice {
    device: Device,
    card: String,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    quality: u8,
    warmup_frames: u32,
}

impl CaptureDevice for V4lDevice {
    fn capture(&mut self) -> CaptureResult<ImagePayload> {
        // The stream only lives for this shot; the device handle stays with the lease
        let mut stream = Stream::with_buffers(&self.device, Type::VideoCapture, BUFFER_COUNT)
            .map_err(|e| CaptureError::Frame(format!("failed to start stream: {}", e)))?;

        for _ in 0..self.warmup_frames {
            stream
                .next()
                .map_err(|e| CaptureError::Frame(format!("warm-up frame failed: {}", e)))?;
        }

        // Retry once on a corrupt frame before giving up
        let mut last_error = None;
        for _ in 0..2 {
            let (buf, meta) = stream
                .next()
                .map_err(|e| CaptureError::Frame(format!("frame read failed: {}", e)))?;
            let used = (meta.bytesused as usize).min(buf.len());
            let used = if used == 0 { buf.len() } else { used };
            match frame_to_payload(self.pixel_format, &buf[..used], self.width, self.height, self.quality) {
                Ok(payload) => return Ok(payload),
                Err(err) => {
                    warn!(error = %err, "discarding unusable frame");
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| CaptureError::Frame("no frame delivered".to_string())))
    }

    fn description(&self) -> String {
        format!("{} {}x{}", self.card, self.width, self.height)
    }
}
