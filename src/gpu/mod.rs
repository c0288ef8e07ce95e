// src/gpu/mod.rs

//! The graphics capabilities the atlases need, as a trait.
//!
//! Every operation takes its complete state as arguments: there is no bound
//! shader, render target or blend state carried between calls. Drawing and pass
//! operations do not return errors; a device that cannot execute one logs it
//! and moves on, and correctness comes from issuing passes in order.
//!
//! Coordinate conventions: image regions for uploads, read-backs and pass
//! sources use a top-left origin. Pass destinations are render-target
//! rectangles with a bottom-left origin, as on most graphics APIs.

pub mod distance;
pub mod headless;

pub use headless::HeadlessGpu;

use crate::error::GpuError;
use crate::geometry::{PixelRect, Size, Vec2};
use crate::raster::FlattenedOutline;

/// Opaque handle to a device image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHandle(pub u32);

/// Opaque handle to a loaded shader program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderId(pub u32);

/// Pixel formats the atlases allocate. Glyph data is single channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    R8,
}

impl ImageFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            ImageFormat::R8 => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// Overwrite the destination.
    Replace,
    /// Add to the destination, so overlapping geometry sums.
    Additive,
}

/// A shader uniform value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Uniform {
    Float(f32),
    Vec2(Vec2),
}

/// A full-screen shader pass from one image region into another.
#[derive(Debug, Clone, Copy)]
pub struct FullscreenPass<'a> {
    pub shader: ShaderId,
    pub source: ImageHandle,
    /// Region of `source` to sample, top-left origin.
    pub source_rect: PixelRect,
    pub dest: ImageHandle,
    /// Render-target region to write, bottom-left origin.
    pub dest_rect: PixelRect,
    pub uniforms: &'a [(&'a str, Uniform)],
}

impl FullscreenPass<'_> {
    pub fn uniform(&self, name: &str) -> Option<Uniform> {
        self.uniforms
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, value)| *value)
    }

    pub fn float(&self, name: &str) -> Option<f32> {
        match self.uniform(name)? {
            Uniform::Float(v) => Some(v),
            Uniform::Vec2(_) => None,
        }
    }
}

/// Graphics operations consumed by the atlases and the SDF pipeline.
///
/// All calls are expected from one logical thread.
pub trait GpuDevice {
    /// Resolves a shader program by name.
    ///
    /// # Returns
    ///
    /// The program handle, or [`GpuError::ShaderUnavailable`] if it cannot be
    /// loaded or compiled.
    fn load_shader(&mut self, name: &str) -> Result<ShaderId, GpuError>;

    /// Allocates a zero-filled image.
    fn create_image(&mut self, size: Size, format: ImageFormat) -> Result<ImageHandle, GpuError>;

    /// Changes an image's size. With `preserve_contents` the overlapping
    /// top-left region is kept, otherwise the image is cleared.
    fn resize_image(&mut self, image: ImageHandle, size: Size, preserve_contents: bool) -> Result<(), GpuError>;

    fn image_size(&self, image: ImageHandle) -> Option<Size>;

    fn release_image(&mut self, image: ImageHandle);

    fn clear_image(&mut self, image: ImageHandle);

    /// Writes tightly packed `pixels` into `rect` (top-left origin).
    fn upload_sub_image(&mut self, image: ImageHandle, rect: PixelRect, pixels: &[u8]);

    /// Fills polygon outlines, given in target pixel coordinates (top-left
    /// origin), into `target`.
    fn draw_outlines(&mut self, target: ImageHandle, shader: ShaderId, outlines: &[FlattenedOutline], blend: BlendMode);

    fn run_fullscreen_pass(&mut self, pass: &FullscreenPass<'_>);

    /// Reads back `rect` (top-left origin) as tightly packed rows.
    fn read_region(&self, image: ImageHandle, rect: PixelRect) -> Result<Vec<u8>, GpuError>;
}
