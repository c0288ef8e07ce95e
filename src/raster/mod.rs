// src/raster/mod.rs

//! CPU glyph rasterization.
//!
//! [`flatten`] turns outline commands into polygon contours, [`scanline`]
//! converts contours into an antialiased [`CoverageCanvas`]. Both are pure
//! functions and may run on any thread.

pub mod canvas;
pub mod flatten;
pub mod scanline;

#[cfg(test)]
mod tests;

pub use canvas::{CoverageCanvas, GlyphFrame};
pub use flatten::{flatten, FlattenedOutline};
pub use scanline::rasterize;

use crate::font::GlyphOutline;

/// Squared flattening tolerance in font units for a pixel tolerance at `scale`.
pub fn tolerance_sq(flatness_px: f32, scale: f32) -> f32 {
    let tolerance = flatness_px / scale;
    tolerance * tolerance
}

/// Flattens and rasterizes one glyph at `scale` pixels per font unit.
///
/// The result is sized by [`CoverageCanvas::for_glyph`]; empty glyphs yield an
/// empty canvas.
pub fn rasterize_glyph(outline: &GlyphOutline, scale: f32, flatness_px: f32) -> CoverageCanvas {
    let mut canvas = CoverageCanvas::for_glyph(&outline.bounds, scale);
    if canvas.is_empty() || outline.is_empty() {
        return canvas;
    }
    let flat = flatten(&outline.commands, tolerance_sq(flatness_px, scale));
    rasterize(&flat, scale, true, &mut canvas);
    canvas
}
