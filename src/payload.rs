//! Encoded still images as they travel from the camera to the analysis service.

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;

/// Result type for payload operations
pub type PayloadResult<T> = Result<T, PayloadError>;

/// Errors raised while building or validating an image payload
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("image payload is empty")]
    Empty,
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("invalid base64 image data: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("image codec error: {0}")]
    Codec(#[from] image::ImageError),
}

/// Still-image formats accepted by the analysis service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Jpeg,
    Png,
    Webp,
    Heic,
    Heif,
}

impl MediaType {
    /// MIME string sent on the wire
    pub fn mime(&self) -> &'static str {
        match self {
            MediaType::Jpeg => "image/jpeg",
            MediaType::Png => "image/png",
            MediaType::Webp => "image/webp",
            MediaType::Heic => "image/heic",
            MediaType::Heif => "image/heif",
        }
    }

    pub fn from_mime(mime: &str) -> PayloadResult<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Ok(MediaType::Jpeg),
            "image/png" => Ok(MediaType::Png),
            "image/webp" => Ok(MediaType::Webp),
            "image/heic" => Ok(MediaType::Heic),
            "image/heif" => Ok(MediaType::Heif),
            other => Err(PayloadError::UnsupportedMediaType(other.to_string())),
        }
    }

    /// Detect the format from leading magic bytes
    pub fn sniff(data: &[u8]) -> Option<Self> {
        match data {
            [0xFF, 0xD8, 0xFF, ..] => Some(MediaType::Jpeg),
            [0x89, b'P', b'N', b'G', ..] => Some(MediaType::Png),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some(MediaType::Webp),
            [_, _, _, _, b'f', b't', b'y', b'p', b'h', b'e', b'i', b'c', ..] => Some(MediaType::Heic),
            [_, _, _, _, b'f', b't', b'y', b'p', b'm', b'i', b'f', b'1', ..] => Some(MediaType::Heif),
            _ => None,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

/// An encoded still image plus its declared media type.
///
/// Read-only once built: the session owns it after a successful capture.
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    data: Vec<u8>,
    media_type: MediaType,
}

impl ImagePayload {
    /// Wrap already-encoded bytes, rejecting empty data
    pub fn new(data: Vec<u8>, media_type: MediaType) -> PayloadResult<Self> {
        if data.is_empty() {
            return Err(PayloadError::Empty);
        }
        Ok(Self { data, media_type })
    }

    /// Wrap encoded bytes whose format is detected from the content
    pub fn sniffed(data: Vec<u8>) -> PayloadResult<Self> {
        if data.is_empty() {
            return Err(PayloadError::Empty);
        }
        let media_type = MediaType::sniff(&data)
            .ok_or_else(|| PayloadError::UnsupportedMediaType("unrecognized image data".to_string()))?;
        Ok(Self { data, media_type })
    }

    /// Parse a `data:image/...;base64,` URL or a bare base64 string.
    ///
    /// Bare strings are assumed to be JPEG unless the decoded bytes say otherwise.
    pub fn from_data_url(input: &str) -> PayloadResult<Self> {
        let input = input.trim();
        let (declared, encoded) = match input.strip_prefix("data:") {
            Some(rest) => {
                let (header, body) = rest.split_once(',').unwrap_or((rest, ""));
                let mime = header.split(';').next().unwrap_or_default();
                (Some(MediaType::from_mime(mime)?), body)
            }
            None => (None, input),
        };

        let data = base64::engine::general_purpose::STANDARD.decode(encoded.trim())?;
        if data.is_empty() {
            return Err(PayloadError::Empty);
        }
        let media_type = declared
            .or_else(|| MediaType::sniff(&data))
            .unwrap_or(MediaType::Jpeg);
        Ok(Self { data, media_type })
    }

    /// Encode a decoded image as JPEG at the given quality
    pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> PayloadResult<Self> {
        let rgb = image.to_rgb8();
        let mut bytes = Vec::new();
        {
            let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
            encoder.encode_image(&rgb)?;
        }
        Self::new(bytes, MediaType::Jpeg)
    }

    /// Encode a decoded image losslessly as PNG
    pub fn encode_png(image: &DynamicImage) -> PayloadResult<Self> {
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Self::new(bytes, MediaType::Png)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw base64 of the encoded bytes, without any data-URI prefix
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    /// Check the constraints the analysis service places on its input
    pub fn validate(&self) -> PayloadResult<()> {
        if self.data.is_empty() {
            return Err(PayloadError::Empty);
        }
        Ok(())
    }

    /// Decode back into pixels
    pub fn decode(&self) -> PayloadResult<DynamicImage> {
        Ok(image::load_from_memory(&self.data)?)
    }
}

// Payloads are megabytes of binary; print a summary instead.
impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("media_type", &self.media_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn tiny_image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([200, 10, 10])))
    }

    #[test]
    fn test_empty_payload_rejected() {
        assert!(matches!(ImagePayload::new(Vec::new(), MediaType::Jpeg), Err(PayloadError::Empty)));
    }

    #[test]
    fn test_from_data_url_strips_prefix() {
        let png = ImagePayload::encode_png(&tiny_image()).unwrap();
        let url = format!("data:image/png;base64,{}", png.to_base64());

        let parsed = ImagePayload::from_data_url(&url).unwrap();
        assert_eq!(parsed.media_type(), MediaType::Png);
        assert_eq!(parsed.data(), png.data());
        assert!(!parsed.to_base64().starts_with("data:"));
    }

    #[test]
    fn test_from_bare_base64_sniffs_format() {
        let jpeg = ImagePayload::encode_jpeg(&tiny_image(), 80).unwrap();
        let parsed = ImagePayload::from_data_url(&jpeg.to_base64()).unwrap();
        assert_eq!(parsed.media_type(), MediaType::Jpeg);
    }

    #[test]
    fn test_from_data_url_rejects_non_image() {
        let err = ImagePayload::from_data_url("data:text/plain;base64,aGVsbG8=").unwrap_err();
        assert!(matches!(err, PayloadError::UnsupportedMediaType(m) if m == "text/plain"));
    }

    #[test]
    fn test_from_data_url_empty_body() {
        assert!(matches!(
            ImagePayload::from_data_url("data:image/jpeg;base64,"),
            Err(PayloadError::Empty)
        ));
    }

    #[test]
    fn test_sniff_magic_bytes() {
        assert_eq!(MediaType::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(MediaType::Jpeg));
        assert_eq!(MediaType::sniff(b"\x89PNG\r\n\x1a\n"), Some(MediaType::Png));
        assert_eq!(MediaType::sniff(b"RIFF\0\0\0\0WEBPVP8 "), Some(MediaType::Webp));
        assert_eq!(MediaType::sniff(b"\0\0\0\x18ftypheic\0\0\0\0"), Some(MediaType::Heic));
        assert_eq!(MediaType::sniff(b"\0\0\0\x1cftypmif1\0\0\0\0"), Some(MediaType::Heif));
        assert_eq!(MediaType::sniff(b"\0\0\0\x18ftypisom"), None);
        assert_eq!(MediaType::sniff(b"GIF89a"), None);
    }

    #[test]
    fn test_sniffed_payload() {
        let png = ImagePayload::encode_png(&tiny_image()).unwrap();
        let sniffed = ImagePayload::sniffed(png.data().to_vec()).unwrap();
        assert_eq!(sniffed, png);

        assert!(matches!(ImagePayload::sniffed(Vec::new()), Err(PayloadError::Empty)));
        assert!(matches!(
            ImagePayload::sniffed(b"BM6\0\0\0".to_vec()),
            Err(PayloadError::UnsupportedMediaType(_))
        ));
    }

    #[test]
    fn test_encode_jpeg_header() {
        let payload = ImagePayload::encode_jpeg(&tiny_image(), 80).unwrap();
        assert_eq!(payload.media_type(), MediaType::Jpeg);
        assert_eq!(&payload.data()[..3], &[0xFF, 0xD8, 0xFF]);
    }

    #[test]
    fn test_debug_is_summary() {
        let payload = ImagePayload::new(vec![1, 2, 3], MediaType::Png).unwrap();
        assert_eq!(format!("{:?}", payload), "ImagePayload { media_type: Png, bytes: 3 }");
    }
}
