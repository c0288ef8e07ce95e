// src/font/mod.rs

//! Font descriptors and glyph outlines.
//!
//! Outlines are produced by a font-parsing collaborator (see [`ttf`]) and are
//! immutable once loaded. Everything downstream of this module only reads them.

pub mod ttf;

use crate::geometry::Vec2;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::Arc;
use twox_hash::XxHash64;

/// A single drawing command of a glyph outline, in font design units (y up).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutlineCommand {
    MoveTo(Vec2),
    LineTo(Vec2),
    /// Quadratic curve: control point, end point.
    QuadTo(Vec2, Vec2),
    /// Cubic curve: two control points, end point.
    CubicTo(Vec2, Vec2, Vec2),
    Close,
}

/// Bounding box of a glyph in font units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GlyphBounds {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl GlyphBounds {
    pub fn width(&self) -> f32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f32 {
        self.y_max - self.y_min
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }
}

/// The vector outline of one character plus its horizontal metrics.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GlyphOutline {
    pub commands: Vec<OutlineCommand>,
    /// Horizontal advance in font units.
    pub advance_width: f32,
    /// Distance from the pen position to the left edge of the bounds.
    pub left_bearing: f32,
    pub bounds: GlyphBounds,
}

impl GlyphOutline {
    /// Builds an outline whose bounds are computed from its own points.
    ///
    /// Control points are included, so the box is conservative for curves.
    pub fn from_commands(commands: Vec<OutlineCommand>, advance_width: f32) -> Self {
        let bounds = bounds_of(&commands);
        Self {
            left_bearing: bounds.x_min,
            commands,
            advance_width,
            bounds,
        }
    }

    /// True when the glyph has nothing to draw (e.g. the space character).
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() || self.bounds.is_empty()
    }
}

fn bounds_of(commands: &[OutlineCommand]) -> GlyphBounds {
    let mut points = commands.iter().flat_map(|cmd| {
        let pts: [Option<Vec2>; 3] = match *cmd {
            OutlineCommand::MoveTo(p) | OutlineCommand::LineTo(p) => [Some(p), None, None],
            OutlineCommand::QuadTo(c, p) => [Some(c), Some(p), None],
            OutlineCommand::CubicTo(c1, c2, p) => [Some(c1), Some(c2), Some(p)],
            OutlineCommand::Close => [None, None, None],
        };
        pts.into_iter().flatten()
    });

    let Some(first) = points.next() else {
        return GlyphBounds::default();
    };
    points.fold(
        GlyphBounds {
            x_min: first.x,
            y_min: first.y,
            x_max: first.x,
            y_max: first.y,
        },
        |b, p| GlyphBounds {
            x_min: b.x_min.min(p.x),
            y_min: b.y_min.min(p.y),
            x_max: b.x_max.max(p.x),
            y_max: b.y_max.max(p.y),
        },
    )
}

/// Metrics describing the font's vertical layout, in font units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontMetrics {
    /// The number of font units per EM square.
    pub units_per_em: u16,
    /// Distance from the baseline to the top of the highest glyph.
    pub ascender: f32,
    /// Distance from the baseline to the bottom of the lowest glyph (negative).
    pub descender: f32,
    /// Recommended extra vertical distance between lines.
    pub line_gap: f32,
}

/// A loaded font: family and face names, metrics and the outline of every
/// known character.
///
/// Faces of one family (Regular, Bold, ...) share `family`. Atlases tell them
/// apart by [`face`](Self::face) and [`fingerprint`](Self::fingerprint).
#[derive(Debug, Clone)]
pub struct Font {
    family: String,
    face: String,
    metrics: FontMetrics,
    pixel_font: bool,
    glyphs: HashMap<char, Arc<GlyphOutline>>,
    fingerprint: OnceCell<u64>,
}

impl Font {
    /// A font whose face name is its family name until [`with_face`](Self::with_face).
    pub fn new(family: impl Into<String>, metrics: FontMetrics) -> Self {
        let family = family.into();
        Self {
            face: family.clone(),
            family,
            metrics,
            pixel_font: false,
            glyphs: HashMap::new(),
            fingerprint: OnceCell::new(),
        }
    }

    /// Sets the full face name, e.g. "DejaVu Sans Bold".
    pub fn with_face(mut self, face: impl Into<String>) -> Self {
        self.face = face.into();
        self
    }

    /// Marks the font as a pixel font, drawn only at sizes that keep its grid aligned.
    pub fn with_pixel_font(mut self, pixel_font: bool) -> Self {
        self.pixel_font = pixel_font;
        self.fingerprint = OnceCell::new();
        self
    }

    pub fn insert_glyph(&mut self, ch: char, outline: GlyphOutline) {
        self.glyphs.insert(ch, Arc::new(outline));
        self.fingerprint = OnceCell::new();
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn face(&self) -> &str {
        &self.face
    }

    /// A hash of the metrics, the pixel-font flag and every outline.
    ///
    /// Stable across runs, so it can name cache files. Computed on first use
    /// and reset by [`insert_glyph`](Self::insert_glyph).
    pub fn fingerprint(&self) -> u64 {
        *self.fingerprint.get_or_init(|| {
            let mut hasher = XxHash64::with_seed(0);
            hasher.write_u16(self.metrics.units_per_em);
            hash_f32(&mut hasher, self.metrics.ascender);
            hash_f32(&mut hasher, self.metrics.descender);
            hash_f32(&mut hasher, self.metrics.line_gap);
            hasher.write_u8(self.pixel_font as u8);

            let mut chars: Vec<char> = self.glyphs.keys().copied().collect();
            chars.sort_unstable();
            for ch in chars {
                hasher.write_u32(ch as u32);
                if let Some(outline) = self.glyphs.get(&ch) {
                    hash_outline(&mut hasher, outline);
                }
            }
            hasher.finish()
        })
    }

    pub fn metrics(&self) -> FontMetrics {
        self.metrics
    }

    pub fn is_pixel_font(&self) -> bool {
        self.pixel_font
    }

    /// `ascender - descender`, the denominator of every render scale.
    pub fn height(&self) -> f32 {
        self.metrics.ascender - self.metrics.descender
    }

    pub fn glyph(&self, ch: char) -> Option<&Arc<GlyphOutline>> {
        self.glyphs.get(&ch)
    }

    pub fn glyph_count(&self) -> usize {
        self.glyphs.len()
    }

    /// The scale (pixels per font unit) at which `size` pixels fit the font's height.
    ///
    /// Pixel fonts snap `size` so that `height / size` is a power of two.
    pub fn render_scale(&self, size: f32) -> f32 {
        let height = self.height();
        if height <= 0.0 || size <= 0.0 {
            return 0.0;
        }
        if !self.pixel_font {
            return size / height;
        }
        let factor = ((height / size).floor() as u32).max(1).next_power_of_two();
        1.0 / factor as f32
    }
}

fn hash_f32(hasher: &mut XxHash64, value: f32) {
    hasher.write_u32(value.to_bits());
}

fn hash_point(hasher: &mut XxHash64, p: Vec2) {
    hash_f32(hasher, p.x);
    hash_f32(hasher, p.y);
}

fn hash_outline(hasher: &mut XxHash64, outline: &GlyphOutline) {
    hash_f32(hasher, outline.advance_width);
    hash_f32(hasher, outline.left_bearing);
    for cmd in &outline.commands {
        match *cmd {
            OutlineCommand::MoveTo(p) => {
                hasher.write_u8(0);
                hash_point(hasher, p);
            }
            OutlineCommand::LineTo(p) => {
                hasher.write_u8(1);
                hash_point(hasher, p);
            }
            OutlineCommand::QuadTo(c, p) => {
                hasher.write_u8(2);
                hash_point(hasher, c);
                hash_point(hasher, p);
            }
            OutlineCommand::CubicTo(c1, c2, p) => {
                hasher.write_u8(3);
                hash_point(hasher, c1);
                hash_point(hasher, c2);
                hash_point(hasher, p);
            }
            OutlineCommand::Close => hasher.write_u8(4),
        }
    }
}
