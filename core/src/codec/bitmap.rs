//! Pixel buffers produced by the page renderer.

use anyhow::{anyhow, ensure};
use image::RgbaImage;

use crate::types::{ImageDimensions, PixelFormat, RenderParams};

use super::Result;

/// A rendered page in one of the supported [`PixelFormat`]s.
///
/// Pixels are stored row-major from top-left with no row padding. RGB565 pixels are
/// little-endian `u16` values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub dimensions: ImageDimensions,
    pub format: PixelFormat,
    pixels: Vec<u8>,
}

impl Bitmap {
    /// Wrap an existing buffer, checking that its length matches the dimensions.
    pub fn from_raw(
        dimensions: ImageDimensions,
        format: PixelFormat,
        pixels: Vec<u8>,
    ) -> Result<Self> {
        ensure!(!dimensions.is_empty(), "bitmap dimensions must be non-zero, got {dimensions:?}");
        let expected = expected_len(dimensions, format);
        if pixels.len() != expected {
            return Err(anyhow!(
                "{format:?} buffer for {}x{} must be {expected} bytes, got {}",
                dimensions.width,
                dimensions.height,
                pixels.len()
            ));
        }
        Ok(Self { dimensions, format, pixels })
    }

    /// Zero-filled bitmap sized for the given render parameters.
    pub fn blank(params: RenderParams) -> Self {
        Self {
            dimensions: params.dimensions(),
            format: params.format,
            pixels: vec![0; params.byte_len()],
        }
    }

    pub fn width(&self) -> u32 {
        self.dimensions.width
    }

    pub fn height(&self) -> u32 {
        self.dimensions.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Memory cost in bytes: width × height × bytes-per-pixel.
    pub fn byte_cost(&self) -> usize {
        expected_len(self.dimensions, self.format)
    }

    /// Expand into straight-alpha RGBA8888 for display surfaces.
    pub fn to_rgba_image(&self) -> Result<RgbaImage> {
        let rgba = match self.format {
            PixelFormat::Rgba8888 => self.pixels.clone(),
            PixelFormat::Rgb888 => {
                let mut out = Vec::with_capacity(self.pixels.len() / 3 * 4);
                for px in self.pixels.chunks_exact(3) {
                    out.extend_from_slice(&[px[0], px[1], px[2], 0xFF]);
                }
                out
            }
            PixelFormat::Rgb565 => {
                let mut out = Vec::with_capacity(self.pixels.len() * 2);
                for px in self.pixels.chunks_exact(2) {
                    let [r, g, b] = unpack_rgb565(u16::from_le_bytes([px[0], px[1]]));
                    out.extend_from_slice(&[r, g, b, 0xFF]);
                }
                out
            }
        };

        RgbaImage::from_raw(self.width(), self.height(), rgba)
            .ok_or_else(|| anyhow!("rgba buffer does not match {:?}", self.dimensions))
    }
}

fn expected_len(dimensions: ImageDimensions, format: PixelFormat) -> usize {
    dimensions.width as usize * dimensions.height as usize * format.bytes_per_pixel()
}

fn unpack_rgb565(value: u16) -> [u8; 3] {
    let r = ((value >> 11) & 0x1F) as u8;
    let g = ((value >> 5) & 0x3F) as u8;
    let b = (value & 0x1F) as u8;
    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]
}
