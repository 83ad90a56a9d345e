//! Platform capabilities used by the compositor: decoding source bytes and a
//! fixed-size drawing surface.
//!
//! The default implementations are headless and built on the `image` crate.
//! Other targets (GPU surfaces, a browser canvas through bindings) implement
//! the same two traits.

use std::fmt::Debug;
use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgba, RgbaImage};

use crate::error::{Result, UserInfoError};

/// Decodes encoded image bytes into RGBA pixels.
pub trait ImageDecoder: Send + Sync + Debug {
    fn decode(&self, bytes: &[u8]) -> Result<RgbaImage>;
}

/// Fixed-size square drawing surface.
///
/// A surface is shared mutable state: callers must hold exclusive access
/// from [`fill`](RasterSurface::fill) through
/// [`extract`](RasterSurface::extract).
pub trait RasterSurface: Send + Debug {
    /// Edge length in pixels.
    fn size(&self) -> u32;

    /// Overwrite every pixel with `color`.
    fn fill(&mut self, color: Rgba<u8>);

    /// Draw `image` scaled to exactly cover the surface, blending over the
    /// current contents. Aspect ratio is not preserved.
    fn draw_scaled(&mut self, image: &RgbaImage);

    /// Encode the current surface contents as PNG.
    fn extract(&mut self) -> Result<Vec<u8>>;
}

/// Decoder backed by `image::load_from_memory`, format guessed from content.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateDecoder;

impl ImageDecoder for ImageCrateDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<RgbaImage> {
        Ok(image::load_from_memory(bytes)?.to_rgba8())
    }
}

/// CPU surface over an RGBA pixel buffer.
#[derive(Debug, Clone)]
pub struct PixelSurface {
    canvas: RgbaImage,
}

impl PixelSurface {
    /// Transparent `size` x `size` canvas.
    pub fn new(size: u32) -> Self {
        Self {
            canvas: RgbaImage::new(size, size),
        }
    }

    /// Current canvas contents.
    pub fn pixels(&self) -> &RgbaImage {
        &self.canvas
    }
}

impl RasterSurface for PixelSurface {
    fn size(&self) -> u32 {
        self.canvas.width()
    }

    fn fill(&mut self, color: Rgba<u8>) {
        for pixel in self.canvas.pixels_mut() {
            *pixel = color;
        }
    }

    fn draw_scaled(&mut self, image: &RgbaImage) {
        if image.width() == 0 || image.height() == 0 {
            return;
        }
        let size = self.size();
        let scaled = if image.dimensions() == (size, size) {
            image.clone()
        } else {
            imageops::resize(image, size, size, FilterType::Triangle)
        };
        imageops::overlay(&mut self.canvas, &scaled, 0, 0);
    }

    fn extract(&mut self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut cursor = Cursor::new(&mut buffer);
        self.canvas.write_to(&mut cursor, ImageFormat::Png)?;
        Ok(buffer)
    }
}
