// src/atlas/mod.rs

//! Per-font, per-size glyph atlases.
//!
//! A [`FontAtlas`] owns the character to [`DrawableGlyph`] mapping and
//! delegates pixel production to its [`AtlasBackend`], chosen once at
//! creation: CPU coverage uploaded into its own image, or distance fields
//! shared through the [`SdfPipeline`]'s reference atlas.

pub mod coverage;

#[cfg(test)]
mod tests;

pub use coverage::CoverageBackend;

use crate::error::AtlasError;
use crate::font::{Font, GlyphOutline};
use crate::geometry::{Rect, Vec2};
use crate::gpu::{GpuDevice, ImageHandle};
use crate::sdf::{ReferenceKey, SdfPipeline};
use bitflags::bitflags;
use log::{debug, trace};
use std::collections::HashMap;
use std::sync::Arc;

bitflags! {
    /// What a glyph batch did to an atlas.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FlushFlags: u8 {
        /// Pixel data was written.
        const UPLOADED = 1 << 0;
        /// The backing image grew.
        const GREW = 1 << 1;
        /// Existing glyphs moved; all UVs were re-issued.
        const REPACKED = 1 << 2;
        /// Other atlases sharing the reference had their UVs re-synced.
        const RESYNCED = 1 << 3;
        /// The reference atlas was restored from the disk cache.
        const FROM_CACHE = 1 << 4;
        /// Distance fields are disabled; glyphs were recorded without pixels.
        const SDF_UNAVAILABLE = 1 << 5;
    }
}

/// Index of an atlas inside its [`AtlasManager`](crate::manager::AtlasManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtlasId(pub usize);

/// A glyph as the text renderer sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawableGlyph {
    pub character: char,
    pub outline: Arc<GlyphOutline>,
    /// Horizontal advance in pixels.
    pub advance: f32,
    /// Region of the atlas image, in texels, top-left origin. Empty for
    /// glyphs without pixels.
    pub uv: Rect,
    /// From the pen position on the baseline to the quad's top-left corner,
    /// in pixels, y down.
    pub draw_offset: Vec2,
    /// Quad size in pixels.
    pub draw_size: Vec2,
}

impl DrawableGlyph {
    pub fn new(character: char, outline: Arc<GlyphOutline>, scale: f32) -> Self {
        Self {
            character,
            advance: outline.advance_width * scale,
            outline,
            uv: Rect::ZERO,
            draw_offset: Vec2::ZERO,
            draw_size: Vec2::ZERO,
        }
    }

    /// False for glyphs with nothing to draw, such as the space.
    pub fn can_be_shown(&self) -> bool {
        !self.outline.is_empty()
    }
}

/// Result of adding a batch of glyphs.
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphBatch {
    pub flags: FlushFlags,
    /// Other atlases whose UVs must be refreshed from the shared reference.
    pub resync: Vec<AtlasId>,
}

impl Default for GlyphBatch {
    fn default() -> Self {
        Self {
            flags: FlushFlags::empty(),
            resync: Vec::new(),
        }
    }
}

/// Where an atlas's pixels come from.
#[derive(Debug)]
pub enum AtlasBackend {
    Coverage(CoverageBackend),
    Sdf { reference: ReferenceKey },
}

/// Glyphs of one font at one size.
#[derive(Debug)]
pub struct FontAtlas {
    id: AtlasId,
    font: Arc<Font>,
    size: f32,
    scale: f32,
    ascent: f32,
    descent: f32,
    line_height: f32,
    glyphs: HashMap<char, DrawableGlyph>,
    backend: AtlasBackend,
    last_flush: FlushFlags,
}

impl FontAtlas {
    pub fn new(id: AtlasId, font: Arc<Font>, size: f32, backend: AtlasBackend) -> Self {
        let scale = font.render_scale(size);
        let metrics = font.metrics();
        Self {
            id,
            size: font.height() * scale,
            scale,
            ascent: metrics.ascender * scale,
            descent: metrics.descender * scale,
            line_height: (font.height() + metrics.line_gap) * scale,
            font,
            glyphs: HashMap::new(),
            backend,
            last_flush: FlushFlags::empty(),
        }
    }

    pub fn id(&self) -> AtlasId {
        self.id
    }

    pub fn font(&self) -> &Arc<Font> {
        &self.font
    }

    /// Effective size in pixels; pixel fonts may differ from the requested one.
    pub fn size(&self) -> f32 {
        self.size
    }

    /// Pixels per font unit.
    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn ascent(&self) -> f32 {
        self.ascent
    }

    pub fn descent(&self) -> f32 {
        self.descent
    }

    pub fn line_height(&self) -> f32 {
        self.line_height
    }

    pub fn backend(&self) -> &AtlasBackend {
        &self.backend
    }

    /// Flags of the most recent batch that produced pixels.
    pub fn last_flush(&self) -> FlushFlags {
        self.last_flush
    }

    pub fn glyph(&self, ch: char) -> Option<&DrawableGlyph> {
        self.glyphs.get(&ch)
    }

    pub fn glyph_count(&self) -> usize {
        self.glyphs.len()
    }

    /// The image the UVs of this atlas refer to.
    pub fn image(&self, sdf: &SdfPipeline) -> Option<ImageHandle> {
        match &self.backend {
            AtlasBackend::Coverage(backend) => backend.image(),
            AtlasBackend::Sdf { reference } => sdf.reference(reference).and_then(|r| r.image()),
        }
    }

    /// Makes sure every character in `chars` that the font knows has a record,
    /// rendering the missing ones as a single batch.
    ///
    /// Characters the font lacks are skipped. On error no record is added.
    pub fn request_glyphs<G: GpuDevice>(
        &mut self,
        gpu: &mut G,
        sdf: &mut SdfPipeline,
        chars: &[char],
    ) -> Result<GlyphBatch, AtlasError> {
        let mut pending: Vec<DrawableGlyph> = Vec::new();
        let mut empty: Vec<DrawableGlyph> = Vec::new();
        for &ch in chars {
            let seen = |g: &DrawableGlyph| g.character == ch;
            if self.glyphs.contains_key(&ch) || pending.iter().any(seen) || empty.iter().any(seen) {
                continue;
            }
            let Some(outline) = self.font.glyph(ch) else {
                trace!("FontAtlas: '{}' has no glyph for {:?}", self.font.face(), ch);
                continue;
            };
            let glyph = DrawableGlyph::new(ch, Arc::clone(outline), self.scale);
            if glyph.can_be_shown() {
                pending.push(glyph);
            } else {
                empty.push(glyph);
            }
        }

        let batch = if pending.is_empty() {
            GlyphBatch::default()
        } else {
            debug!(
                "FontAtlas: Adding {} glyphs to '{}' at {}px",
                pending.len(),
                self.font.face(),
                self.size
            );
            let batch = self.add_glyphs_to_atlas(gpu, sdf, pending)?;
            self.last_flush = batch.flags;
            batch
        };
        for glyph in empty {
            self.glyphs.insert(glyph.character, glyph);
        }
        Ok(batch)
    }

    fn add_glyphs_to_atlas<G: GpuDevice>(
        &mut self,
        gpu: &mut G,
        sdf: &mut SdfPipeline,
        pending: Vec<DrawableGlyph>,
    ) -> Result<GlyphBatch, AtlasError> {
        match &mut self.backend {
            AtlasBackend::Coverage(backend) => {
                let flags = backend.add_glyphs(gpu, self.scale, &mut self.glyphs, pending)?;
                Ok(GlyphBatch {
                    flags,
                    resync: Vec::new(),
                })
            }
            AtlasBackend::Sdf { reference } => {
                sdf.add_glyphs(gpu, reference, &self.font, self.id, self.scale, &mut self.glyphs, pending)
            }
        }
    }

    /// Re-reads every glyph's UV from the shared reference after it was repacked.
    pub fn resync_from_reference(&mut self, sdf: &SdfPipeline) {
        let AtlasBackend::Sdf { reference } = &self.backend else {
            return;
        };
        let Some(reference) = sdf.reference(reference) else {
            return;
        };
        let mut updated = 0;
        for glyph in self.glyphs.values_mut().filter(|g| g.can_be_shown()) {
            if reference.place(glyph, self.scale) {
                updated += 1;
            }
        }
        self.last_flush |= FlushFlags::RESYNCED;
        debug!(
            "FontAtlas: Re-synced {} UVs of '{}' at {}px",
            updated,
            self.font.face(),
            self.size
        );
    }
}
