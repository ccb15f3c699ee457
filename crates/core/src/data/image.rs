//! Decoded images

use super::codec;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Pixel layouts, 8 bits per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// Single luminance channel
    Gray8,
    /// Red, green, blue
    Rgb8,
    /// Red, green, blue, alpha
    Rgba8,
    /// Blue, green, red
    Bgr8,
}

impl PixelFormat {
    /// Bytes per pixel
    pub fn channels(&self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RawImage {
    width: u32,
    height: u32,
    format: PixelFormat,
    #[serde(with = "codec::bytes")]
    pixels: Vec<u8>,
}

/// Decoded pixel buffer plus its geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawImage", into = "RawImage")]
pub struct Image {
    width: u32,
    height: u32,
    format: PixelFormat,
    pixels: Vec<u8>,
}

impl Image {
    /// Create an image, checking the buffer length
    pub fn new(width: u32, height: u32, format: PixelFormat, pixels: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(format.channels()))
            .ok_or_else(|| Error::InvalidValue(format!("image {}x{} overflows", width, height)))?;
        if pixels.len() != expected {
            return Err(Error::InvalidValue(format!(
                "{}x{} {:?} image needs {} bytes, got {}",
                width,
                height,
                format,
                expected,
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            pixels,
        })
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel layout
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Raw pixel bytes, row-major
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Consume into the raw pixel bytes
    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }
}

impl TryFrom<RawImage> for Image {
    type Error = Error;

    fn try_from(raw: RawImage) -> Result<Self> {
        Image::new(raw.width, raw.height, raw.format, raw.pixels)
    }
}

impl From<Image> for RawImage {
    fn from(image: Image) -> Self {
        RawImage {
            width: image.width,
            height: image.height,
            format: image.format,
            pixels: image.pixels,
        }
    }
}
