pub mod backend;
pub mod frame;
pub mod types;
#[cfg(feature = "v4l")]
pub mod v4l2;

pub use backend::{
    CaptureDevice, CaptureLease, CaptureProvider, StillImageProvider, TestCard, TestCardCamera,
    capture_once,
};
pub use frame::{PixelFormat, frame_to_payload, yuyv_to_rgb};
pub use types::{CaptureError, CaptureResult};
#[cfg(feature = "v4l")]
pub use v4l2::{DeviceInfo, V4lCamera, list_devices};
