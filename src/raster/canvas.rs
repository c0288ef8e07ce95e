// src/raster/canvas.rs

use crate::font::GlyphBounds;

/// Pixel footprint of a glyph at some scale, y down, relative to the pen
/// position on the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlyphFrame {
    pub origin_x: i32,
    pub origin_y: i32,
    pub width: u32,
    pub height: u32,
}

impl GlyphFrame {
    /// `ceil(size) + 1` pixels in each dimension, so the floor of the origin
    /// never cuts off the far edge. `None` for empty bounds.
    pub fn new(bounds: &GlyphBounds, scale: f32) -> Option<Self> {
        if bounds.is_empty() || scale <= 0.0 {
            return None;
        }
        Some(Self {
            origin_x: (bounds.x_min * scale).floor() as i32,
            origin_y: (-bounds.y_max * scale).floor() as i32,
            width: (bounds.width() * scale).ceil() as u32 + 1,
            height: (bounds.height() * scale).ceil() as u32 + 1,
        })
    }
}

/// An 8-bit coverage buffer for one glyph.
///
/// `origin_x`/`origin_y` give the pixel-space position of the top-left texel,
/// so a canvas can cover a glyph whose bounds do not start at zero.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CoverageCanvas {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub stride: usize,
    pub origin_x: i32,
    pub origin_y: i32,
}

impl CoverageCanvas {
    pub fn new(width: usize, height: usize) -> Self {
        Self::with_origin(width, height, 0, 0)
    }

    pub fn with_origin(width: usize, height: usize, origin_x: i32, origin_y: i32) -> Self {
        Self {
            data: vec![0; width * height],
            width,
            height,
            stride: width,
            origin_x,
            origin_y,
        }
    }

    /// A canvas covering a glyph's bounds at `scale` in a y-down pixel space,
    /// one pixel larger than the scaled box in each dimension.
    ///
    /// Empty bounds produce a zero-sized canvas.
    pub fn for_glyph(bounds: &GlyphBounds, scale: f32) -> Self {
        match GlyphFrame::new(bounds, scale) {
            Some(frame) => Self::with_origin(
                frame.width as usize,
                frame.height as usize,
                frame.origin_x,
                frame.origin_y,
            ),
            None => Self::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.stride + x]
    }

    pub fn row(&self, y: usize) -> &[u8] {
        let start = y * self.stride;
        &self.data[start..start + self.width]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        let start = y * self.stride;
        let width = self.width;
        &mut self.data[start..start + width]
    }

    /// Rows packed without stride padding, ready for an image upload.
    pub fn to_packed(&self) -> Vec<u8> {
        if self.stride == self.width {
            return self.data.clone();
        }
        (0..self.height).flat_map(|y| self.row(y).iter().copied()).collect()
    }
}
