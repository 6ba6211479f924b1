use std::io;

use crate::messages;
use crate::payload::PayloadError;

/// Result type for capture operations
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Error types for capture operations.
///
/// All variants are local to the camera screen: the user can retry or go back.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The OS refused access to the device
    #[error("camera access denied: {0}")]
    PermissionDenied(String),

    /// No usable device (missing, busy, or lacking capture support)
    #[error("camera unavailable: {0}")]
    Unavailable(String),

    /// The device opened but did not deliver a usable frame
    #[error("frame capture failed: {0}")]
    Frame(String),

    /// The frame could not be encoded as an image payload
    #[error("frame encoding failed: {0}")]
    Payload(#[from] PayloadError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(io::Error),
}

impl CaptureError {
    /// The localized message shown on the camera screen
    pub fn user_message(&self) -> &'static str {
        messages::CAMERA_FAILED
    }
}

impl From<io::Error> for CaptureError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => CaptureError::PermissionDenied(err.to_string()),
            io::ErrorKind::NotFound => CaptureError::Unavailable(err.to_string()),
            _ => CaptureError::Io(err),
        }
    }
}

impl From<image::ImageError> for CaptureError {
    fn from(err: image::ImageError) -> Self {
        CaptureError::Payload(PayloadError::Codec(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_are_classified() {
        let denied: CaptureError = io::Error::from(io::ErrorKind::PermissionDenied).into();
        assert!(matches!(denied, CaptureError::PermissionDenied(_)));

        let missing: CaptureError = io::Error::from(io::ErrorKind::NotFound).into();
        assert!(matches!(missing, CaptureError::Unavailable(_)));

        let other: CaptureError = io::Error::other("boom").into();
        assert!(matches!(other, CaptureError::Io(_)));
    }

    #[test]
    fn test_user_message_hides_cause() {
        let err = CaptureError::Unavailable("/dev/video0: busy".to_string());
        assert_eq!(err.user_message(), messages::CAMERA_FAILED);
        assert!(!err.user_message().contains("video0"));
    }
}
