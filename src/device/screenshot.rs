//! Screenshot payloads captured from a controlled device.

use base64::{engine::general_purpose::STANDARD, Engine};
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Represents a captured screenshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Screenshot {
    /// Base64-encoded PNG data.
    pub base64: String,
    pub width: u32,
    pub height: u32,
}

impl Screenshot {
    /// Create a new screenshot.
    pub fn new(base64: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            base64: base64.into(),
            width,
            height,
        }
    }

    /// Build a screenshot from raw PNG bytes, reading the dimensions from the image.
    pub fn from_png_bytes(png_data: &[u8]) -> Result<Self, image::ImageError> {
        let img = image::load_from_memory(png_data)?;
        Ok(Self::new(STANDARD.encode(png_data), img.width(), img.height()))
    }

    /// A screenshot is usable only with image data and a non-empty viewport.
    pub fn is_valid(&self) -> bool {
        !self.base64.is_empty() && self.width > 0 && self.height > 0
    }

    /// Decode the payload back into an image.
    pub fn decode(&self) -> Result<DynamicImage, ScreenshotDecodeError> {
        let bytes = STANDARD.decode(&self.base64)?;
        Ok(image::load_from_memory(&bytes)?)
    }
}

/// Errors raised while decoding a screenshot payload.
#[derive(thiserror::Error, Debug)]
pub enum ScreenshotDecodeError {
    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Failed to read image: {0}")]
    Image(#[from] image::ImageError),
}

#[cfg(test)]
pub(crate) fn blank_png(width: u32, height: u32) -> Vec<u8> {
    use image::RgbImage;
    use std::io::Cursor;

    let img = DynamicImage::ImageRgb8(RgbImage::new(width, height));
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, image::ImageFormat::Png).unwrap();
    buffer.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_png_bytes() {
        let screenshot = Screenshot::from_png_bytes(&blank_png(64, 32)).unwrap();
        assert_eq!(screenshot.width, 64);
        assert_eq!(screenshot.height, 32);
        assert!(screenshot.is_valid());
        assert_eq!(screenshot.decode().unwrap().width(), 64);
    }

    #[test]
    fn test_invalid_screenshots() {
        assert!(!Screenshot::default().is_valid());
        assert!(!Screenshot::new("abc", 0, 100).is_valid());
        assert!(!Screenshot::new("abc", 100, 0).is_valid());
        assert!(!Screenshot::new("", 100, 100).is_valid());
    }

    #[test]
    fn test_from_garbage_bytes() {
        assert!(Screenshot::from_png_bytes(b"not a png").is_err());
    }
}
