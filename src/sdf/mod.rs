// src/sdf/mod.rs

//! Signed distance field glyphs shared across sizes.
//!
//! Every font face gets one [`AtlasReference`]: a distance-field image
//! rendered once at `reference_size` pixels. Atlases of any size point their
//! UVs into it and scale the quad, so a glyph is rendered at most once per
//! face no matter how many sizes use it.
//!
//! A batch of missing glyphs runs a fixed sequence of passes:
//!
//! 1. every outline drawn at `oversample` times the reference scale into a
//!    scratch image with additive blending,
//! 2. one winding pass turning the summed coverage into an inside/outside mask,
//! 3. one distance-field pass per glyph, written straight into the reference
//!    image at its packed cell.
//!
//! The reference image is then optionally written to the disk cache.

pub mod cache;


pub use cache::{CacheEntry, CacheKey, SdfCache};

use crate::atlas::{AtlasId, DrawableGlyph, FlushFlags, GlyphBatch};
use crate::config::{CacheConfig, SdfConfig};
use crate::error::AtlasError;
use crate::font::{Font, GlyphOutline};
use crate::geometry::{PixelRect, Rect, Size, Vec2};
use crate::gpu::{BlendMode, FullscreenPass, GpuDevice, ImageFormat, ImageHandle, ShaderId, Uniform};
use crate::packer::PackingState;
use crate::raster::{flatten, tolerance_sq, FlattenedOutline, GlyphFrame};
use log::{debug, info, trace, warn};
use once_cell::unsync::OnceCell;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Flattening tolerance of the high-resolution render, in high-resolution pixels.
const HIGH_RES_FLATNESS: f32 = 0.35;

/// Identifies the reference a font shares with its other sizes.
///
/// Faces of one family get separate references: `face` and `fingerprint`
/// follow the outlines, not the family name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferenceKey {
    pub family: String,
    pub face: String,
    pub fingerprint: u64,
    pub pixel_font: bool,
}

impl ReferenceKey {
    pub fn for_font(font: &Font) -> Self {
        Self {
            family: font.family().to_string(),
            face: font.face().to_string(),
            fingerprint: font.fingerprint(),
            pixel_font: font.is_pixel_font(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceState {
    /// The face has no reference image yet.
    NoReference,
    /// A batch is being rendered into the reference.
    Building,
    /// Every recorded glyph has pixels.
    Ready,
}

/// Where a glyph lives in the reference image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceGlyph {
    /// Glyph cell in reference pixels, top-left origin, without the halo.
    pub cell: PixelRect,
    /// From the pen position on the baseline to the cell's top-left corner,
    /// in reference pixels, y down.
    pub offset: Vec2,
}

/// The high-resolution distance-field atlas of one font face.
///
/// Owned by the [`SdfPipeline`]. Dependent atlases hold only its key and are
/// listed in `dependents` so their UVs can be re-synced when it is repacked.
#[derive(Debug)]
pub struct AtlasReference {
    key: ReferenceKey,
    font: Arc<Font>,
    scale: f32,
    halo: u32,
    image: Option<ImageHandle>,
    packing: PackingState<char>,
    glyphs: HashMap<char, ReferenceGlyph>,
    state: ReferenceState,
    dependents: Vec<AtlasId>,
}

impl AtlasReference {
    fn new(key: ReferenceKey, font: Arc<Font>, scale: f32, halo: u32) -> Self {
        Self {
            key,
            font,
            scale,
            halo,
            image: None,
            packing: PackingState::default(),
            glyphs: HashMap::new(),
            state: ReferenceState::NoReference,
            dependents: Vec::new(),
        }
    }

    pub fn key(&self) -> &ReferenceKey {
        &self.key
    }

    /// Reference pixels per font unit.
    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn image(&self) -> Option<ImageHandle> {
        self.image
    }

    pub fn size(&self) -> Size {
        self.packing.size()
    }

    pub fn state(&self) -> ReferenceState {
        self.state
    }

    pub fn dependents(&self) -> &[AtlasId] {
        &self.dependents
    }

    pub fn glyph(&self, ch: char) -> Option<&ReferenceGlyph> {
        self.glyphs.get(&ch)
    }

    pub fn glyph_count(&self) -> usize {
        self.glyphs.len()
    }

    /// Copies the reference UV of `glyph` into it, scaling the quad from the
    /// reference scale to `atlas_scale`. The UV includes the distance-field
    /// halo so the quad is padded by the same amount.
    ///
    /// Returns false when the reference does not hold the glyph.
    pub fn place(&self, glyph: &mut DrawableGlyph, atlas_scale: f32) -> bool {
        let Some(entry) = self.glyphs.get(&glyph.character) else {
            return false;
        };
        let ratio = atlas_scale / self.scale;
        let halo = self.halo as f32;
        let uv = entry.cell.inflate(self.halo);

        glyph.uv = Rect::from(uv);
        glyph.draw_offset = (entry.offset - Vec2::new(halo, halo)) * ratio;
        glyph.draw_size = Vec2::new(uv.width as f32, uv.height as f32) * ratio;
        true
    }
}

/// Shader programs of the distance-field passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdfShaderSet {
    pub fill: ShaderId,
    pub winding: ShaderId,
    pub generate: ShaderId,
}

/// One glyph of a render batch.
struct RenderItem {
    character: char,
    outline: Arc<GlyphOutline>,
    frame: GlyphFrame,
    /// Packed slot in the reference, halo and gutter included.
    slot: PixelRect,
}

/// A group of render items sharing one pass over the scratch images.
struct RenderChunk {
    items: Vec<usize>,
    layout: PackingState<usize>,
}

struct ExtendOutcome {
    rendered: usize,
    grew: bool,
    repacked: bool,
}

pub struct SdfPipeline {
    config: SdfConfig,
    flatness: f32,
    max_size: u32,
    cache: Option<SdfCache>,
    shaders: OnceCell<Option<SdfShaderSet>>,
    references: HashMap<ReferenceKey, AtlasReference>,
    scratch: Option<(ImageHandle, ImageHandle)>,
}

impl SdfPipeline {
    /// # Arguments
    ///
    /// * `config` - Reference size, oversampling, spread and shader names.
    /// * `cache` - Disk cache settings; a disabled cache is never touched.
    /// * `max_size` - Upper bound for either dimension of any image allocated.
    pub fn new(config: SdfConfig, cache: &CacheConfig, max_size: u32) -> Self {
        Self {
            config,
            flatness: HIGH_RES_FLATNESS,
            max_size,
            cache: cache.enabled.then(|| SdfCache::new(cache.directory.clone())),
            shaders: OnceCell::new(),
            references: HashMap::new(),
            scratch: None,
        }
    }

    pub fn config(&self) -> &SdfConfig {
        &self.config
    }

    pub fn cache(&self) -> Option<&SdfCache> {
        self.cache.as_ref()
    }

    /// Loads the three programs on first use.
    ///
    /// A failure disables the pipeline for the lifetime of this value and is
    /// logged once.
    pub fn shader_set<G: GpuDevice>(&self, gpu: &mut G) -> Option<SdfShaderSet> {
        *self.shaders.get_or_init(|| {
            let names = &self.config.shaders;
            let loaded = gpu.load_shader(&names.fill).and_then(|fill| {
                Ok(SdfShaderSet {
                    fill,
                    winding: gpu.load_shader(&names.winding)?,
                    generate: gpu.load_shader(&names.generate)?,
                })
            });
            match loaded {
                Ok(set) => {
                    debug!("SdfPipeline: Shader programs loaded");
                    Some(set)
                }
                Err(e) => {
                    warn!("SdfPipeline: Disabled, glyphs will render as empty cells: {}", e);
                    None
                }
            }
        })
    }

    pub fn is_available<G: GpuDevice>(&self, gpu: &mut G) -> bool {
        self.shader_set(gpu).is_some()
    }

    pub fn reference(&self, key: &ReferenceKey) -> Option<&AtlasReference> {
        self.references.get(key)
    }

    pub fn reference_state(&self, key: &ReferenceKey) -> ReferenceState {
        self.references
            .get(key)
            .map(|r| r.state)
            .unwrap_or(ReferenceState::NoReference)
    }

    fn cache_key(&self, key: &ReferenceKey) -> CacheKey {
        let c = &self.config;
        CacheKey {
            family: key.family.clone(),
            face: key.face.clone(),
            fingerprint: key.fingerprint,
            reference_size: c.reference_size,
            pixel_font: key.pixel_font,
            rasterizer: format!(
                "sdf-v1-x{}-s{}-g{}",
                c.oversample.max(1),
                c.spread,
                c.atlas_gutter
            ),
        }
    }

    /// Adds the glyphs of one atlas batch, rendering whatever the face's
    /// reference is missing, and records them in `glyphs`.
    ///
    /// # Returns
    ///
    /// The batch flags and the other atlases that must re-sync their UVs
    /// because the reference was repacked.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn add_glyphs<G: GpuDevice>(
        &mut self,
        gpu: &mut G,
        key: &ReferenceKey,
        font: &Arc<Font>,
        dependent: AtlasId,
        atlas_scale: f32,
        glyphs: &mut HashMap<char, DrawableGlyph>,
        pending: Vec<DrawableGlyph>,
    ) -> Result<GlyphBatch, AtlasError> {
        let Some(shaders) = self.shader_set(gpu) else {
            for glyph in pending {
                glyphs.insert(glyph.character, glyph);
            }
            return Ok(GlyphBatch {
                flags: FlushFlags::SDF_UNAVAILABLE,
                resync: Vec::new(),
            });
        };

        let mut flags = FlushFlags::empty();
        let mut reference = match self.references.remove(key) {
            Some(reference) => reference,
            None => self.open_reference(gpu, key, font, &mut flags),
        };
        let mut missing: Vec<(char, Arc<GlyphOutline>)> = Vec::new();
        for glyph in &pending {
            if !reference.glyphs.contains_key(&glyph.character) {
                missing.push((glyph.character, Arc::clone(&glyph.outline)));
            }
        }
        trace!(
            "SdfPipeline: {} of {} glyphs served by the '{}' reference",
            pending.len() - missing.len(),
            pending.len(),
            key.face
        );

        let result = if missing.is_empty() {
            Ok(None)
        } else {
            let previous = reference.state;
            reference.state = ReferenceState::Building;
            let result = self.extend_reference(gpu, shaders, &mut reference, missing);
            reference.state = if result.is_ok() {
                ReferenceState::Ready
            } else {
                previous
            };
            result.map(Some)
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.references.insert(key.clone(), reference);
                return Err(e);
            }
        };

        if !reference.dependents.contains(&dependent) {
            reference.dependents.push(dependent);
        }

        let mut resync = Vec::new();
        if let Some(outcome) = outcome {
            if outcome.rendered > 0 {
                flags |= FlushFlags::UPLOADED;
            }
            if outcome.grew {
                flags |= FlushFlags::GREW;
            }
            if outcome.repacked {
                flags |= FlushFlags::REPACKED;
                for glyph in glyphs.values_mut().filter(|g| g.can_be_shown()) {
                    reference.place(glyph, atlas_scale);
                }
                resync = reference
                    .dependents
                    .iter()
                    .copied()
                    .filter(|&id| id != dependent)
                    .collect();
            }
            self.store_reference(gpu, &reference);
        }

        for mut glyph in pending {
            reference.place(&mut glyph, atlas_scale);
            glyphs.insert(glyph.character, glyph);
        }
        self.references.insert(key.clone(), reference);
        Ok(GlyphBatch { flags, resync })
    }

    /// Creates the reference for `key`, restoring it from the disk cache when
    /// a valid entry exists.
    fn open_reference<G: GpuDevice>(
        &self,
        gpu: &mut G,
        key: &ReferenceKey,
        font: &Arc<Font>,
        flags: &mut FlushFlags,
    ) -> AtlasReference {
        let scale = font.render_scale(self.config.reference_size as f32);
        let mut reference = AtlasReference::new(key.clone(), Arc::clone(font), scale, self.config.spread);
        info!(
            "SdfPipeline: Created reference for '{}' at {}px",
            key.face, self.config.reference_size
        );

        let Some(cache) = &self.cache else {
            return reference;
        };
        let Some(entry) = cache.load_or_miss(&self.cache_key(key)) else {
            return reference;
        };
        let image = match gpu.create_image(entry.size, ImageFormat::R8) {
            Ok(image) => image,
            Err(e) => {
                warn!("SdfPipeline: Cannot restore cached reference for '{}': {}", key.face, e);
                return reference;
            }
        };
        gpu.upload_sub_image(image, PixelRect::new(0, 0, entry.size.width, entry.size.height), &entry.pixels);

        info!(
            "SdfPipeline: Restored {} glyphs of '{}' from cache",
            entry.glyphs.len(),
            key.face
        );
        reference.image = Some(image);
        reference.glyphs = entry.glyphs;
        reference.packing = entry.packing;
        reference.state = ReferenceState::Ready;
        *flags |= FlushFlags::FROM_CACHE;
        reference
    }

    /// Renders `missing` into the reference, re-rendering everything when the
    /// packer had to move existing cells.
    ///
    /// Every fallible step (packing, image allocation) happens before the
    /// reference is touched, so an error leaves it as it was.
    fn extend_reference<G: GpuDevice>(
        &mut self,
        gpu: &mut G,
        shaders: SdfShaderSet,
        reference: &mut AtlasReference,
        missing: Vec<(char, Arc<GlyphOutline>)>,
    ) -> Result<ExtendOutcome, AtlasError> {
        let pad = self.config.spread + self.config.atlas_gutter;
        let frames: Vec<(char, Arc<GlyphOutline>, GlyphFrame)> = missing
            .into_iter()
            .filter_map(|(ch, outline)| {
                let frame = GlyphFrame::new(&outline.bounds, reference.scale)?;
                Some((ch, outline, frame))
            })
            .collect();
        let requests: Vec<(char, Size)> = frames
            .iter()
            .map(|(ch, _, f)| (*ch, Size::new(f.width + pad * 2, f.height + pad * 2)))
            .collect();

        let mut packing = reference.packing.clone();
        let outcome = packing.pack(&requests, self.max_size)?;

        // A repack moves every cell, so the whole reference is drawn again.
        let mut items = Vec::new();
        let redraw: Vec<(char, Arc<GlyphOutline>, GlyphFrame)> = if outcome.repacked {
            reference
                .glyphs
                .keys()
                .filter_map(|&ch| {
                    let outline = reference.font.glyph(ch)?;
                    let frame = GlyphFrame::new(&outline.bounds, reference.scale)?;
                    Some((ch, Arc::clone(outline), frame))
                })
                .collect()
        } else {
            Vec::new()
        };
        for (character, outline, frame) in frames.into_iter().chain(redraw) {
            let Some(slot) = packing.get(character) else {
                continue;
            };
            items.push(RenderItem {
                character,
                outline,
                frame,
                slot,
            });
        }

        if items.is_empty() {
            reference.packing = packing;
            return Ok(ExtendOutcome {
                rendered: 0,
                grew: false,
                repacked: false,
            });
        }

        let chunks = self.plan_chunks(&items)?;
        let scratch_size = chunks.iter().fold(Size::default(), |acc, c| {
            Size::new(acc.width.max(c.layout.size().width), acc.height.max(c.layout.size().height))
        });
        let (fill_target, mask) = self.ensure_scratch(gpu, scratch_size)?;
        let image = ensure_reference_image(gpu, reference, packing.size(), outcome.repacked)?;

        if outcome.grew {
            info!(
                "SdfPipeline: Reference for '{}' is now {}x{}",
                reference.key.face,
                packing.size().width,
                packing.size().height
            );
        }

        for chunk in &chunks {
            self.render_chunk(gpu, shaders, reference, image, packing.size(), &items, chunk, (fill_target, mask));
        }

        reference.packing = packing;
        for item in &items {
            let cell = PixelRect::new(
                item.slot.x + pad,
                item.slot.y + pad,
                item.frame.width,
                item.frame.height,
            );
            let offset = Vec2::new(item.frame.origin_x as f32, item.frame.origin_y as f32);
            reference.glyphs.insert(item.character, ReferenceGlyph { cell, offset });
        }
        debug!(
            "SdfPipeline: Rendered {} glyphs of '{}' in {} chunks",
            items.len(),
            reference.key.face,
            chunks.len()
        );

        Ok(ExtendOutcome {
            rendered: items.len(),
            grew: outcome.grew,
            repacked: outcome.repacked,
        })
    }

    /// Size of a glyph's region in the scratch images: the frame at high
    /// resolution plus the high-resolution spread on every side.
    fn scratch_cell(&self, frame: &GlyphFrame) -> Size {
        let k = self.config.oversample.max(1);
        let spread = self.config.high_res_spread();
        Size::new(frame.width * k + spread * 2, frame.height * k + spread * 2)
    }

    /// Splits the batch so each scratch layout stays well inside `max_size`.
    fn plan_chunks(&self, items: &[RenderItem]) -> Result<Vec<RenderChunk>, AtlasError> {
        let budget = (self.max_size as u64 * self.max_size as u64) / 4;
        let mut groups: Vec<Vec<usize>> = Vec::new();
        let mut current: Vec<usize> = Vec::new();
        let mut area = 0u64;
        for (i, item) in items.iter().enumerate() {
            let cell = self.scratch_cell(&item.frame).area();
            if !current.is_empty() && area + cell > budget {
                groups.push(std::mem::take(&mut current));
                area = 0;
            }
            current.push(i);
            area += cell;
        }
        if !current.is_empty() {
            groups.push(current);
        }

        groups
            .into_iter()
            .map(|group| {
                let requests: Vec<(usize, Size)> = group
                    .iter()
                    .map(|&i| (i, self.scratch_cell(&items[i].frame)))
                    .collect();
                let mut layout = PackingState::default();
                layout.pack(&requests, self.max_size)?;
                Ok(RenderChunk { items: group, layout })
            })
            .collect()
    }

    /// Returns the fill and mask scratch images, grown to at least `size`.
    fn ensure_scratch<G: GpuDevice>(&mut self, gpu: &mut G, size: Size) -> Result<(ImageHandle, ImageHandle), AtlasError> {
        let (fill, mask) = match self.scratch {
            Some(pair) => pair,
            None => {
                let fill = gpu.create_image(size, ImageFormat::R8)?;
                let mask = match gpu.create_image(size, ImageFormat::R8) {
                    Ok(mask) => mask,
                    Err(e) => {
                        gpu.release_image(fill);
                        return Err(e.into());
                    }
                };
                self.scratch = Some((fill, mask));
                return Ok((fill, mask));
            }
        };

        let current = gpu.image_size(fill).unwrap_or_default();
        if !current.contains(size) {
            let grown = Size::new(current.width.max(size.width), current.height.max(size.height));
            gpu.resize_image(fill, grown, false)?;
            gpu.resize_image(mask, grown, false)?;
            debug!("SdfPipeline: Scratch images grown to {}x{}", grown.width, grown.height);
        }
        Ok((fill, mask))
    }

    /// Runs the fill, winding and distance passes of one chunk.
    #[allow(clippy::too_many_arguments)]
    fn render_chunk<G: GpuDevice>(
        &self,
        gpu: &mut G,
        shaders: SdfShaderSet,
        reference: &AtlasReference,
        image: ImageHandle,
        reference_size: Size,
        items: &[RenderItem],
        chunk: &RenderChunk,
        (fill_target, mask): (ImageHandle, ImageHandle),
    ) {
        let k = self.config.oversample.max(1);
        let spread = self.config.high_res_spread();
        let high_scale = reference.scale * k as f32;
        let tolerance = tolerance_sq(self.flatness, high_scale);

        let placed: Vec<(&RenderItem, PixelRect)> = chunk
            .items
            .iter()
            .filter_map(|&i| chunk.layout.get(i).map(|rect| (&items[i], rect)))
            .collect();

        let outlines: Vec<FlattenedOutline> = placed
            .par_iter()
            .map(|(item, rect)| {
                let dx = (rect.x + spread) as f32 - (item.frame.origin_x * k as i32) as f32;
                let dy = (rect.y + spread) as f32 - (item.frame.origin_y * k as i32) as f32;
                flatten(&item.outline.commands, tolerance)
                    .map_points(|p| Vec2::new(p.x * high_scale + dx, -p.y * high_scale + dy))
            })
            .collect();

        gpu.clear_image(fill_target);
        gpu.draw_outlines(fill_target, shaders.fill, &outlines, BlendMode::Additive);

        let scratch = gpu.image_size(fill_target).unwrap_or_default();
        let whole = PixelRect::new(0, 0, scratch.width, scratch.height);
        gpu.run_fullscreen_pass(&FullscreenPass {
            shader: shaders.winding,
            source: fill_target,
            source_rect: whole,
            dest: mask,
            dest_rect: whole,
            uniforms: &[],
        });

        let uniforms = [("spread", Uniform::Float(spread as f32))];
        for (item, rect) in &placed {
            // Cell plus halo, converted to the render target's bottom-left origin.
            let dest_rect = item
                .slot
                .deflate(self.config.atlas_gutter)
                .flip_y(reference_size.height);
            trace!(
                "SdfPipeline: {:?} scratch {:?} -> reference {:?}",
                item.character,
                rect,
                dest_rect
            );
            gpu.run_fullscreen_pass(&FullscreenPass {
                shader: shaders.generate,
                source: mask,
                source_rect: *rect,
                dest: image,
                dest_rect,
                uniforms: &uniforms,
            });
        }
    }

    /// Writes the reference to the disk cache. Failures are logged only.
    fn store_reference<G: GpuDevice>(&self, gpu: &G, reference: &AtlasReference) {
        let (Some(cache), Some(image)) = (&self.cache, reference.image) else {
            return;
        };
        let size = reference.packing.size();
        let pixels = match gpu.read_region(image, PixelRect::new(0, 0, size.width, size.height)) {
            Ok(pixels) => pixels,
            Err(e) => {
                warn!("SdfPipeline: Cannot read back '{}' for caching: {}", reference.key.face, e);
                return;
            }
        };
        let entry = CacheEntry {
            key: self.cache_key(&reference.key),
            size,
            pixels,
            glyphs: reference.glyphs.clone(),
            packing: reference.packing.clone(),
        };
        if let Err(e) = cache.store(&entry) {
            warn!("SdfPipeline: Cannot write cache for '{}': {}", reference.key.face, e);
        }
    }
}

/// Creates or resizes the reference image. Contents are kept unless the
/// layout changed.
fn ensure_reference_image<G: GpuDevice>(
    gpu: &mut G,
    reference: &mut AtlasReference,
    size: Size,
    repacked: bool,
) -> Result<ImageHandle, AtlasError> {
    match reference.image {
        None => {
            let image = gpu.create_image(size, ImageFormat::R8)?;
            reference.image = Some(image);
            Ok(image)
        }
        Some(image) => {
            if gpu.image_size(image) != Some(size) {
                gpu.resize_image(image, size, !repacked)?;
            } else if repacked {
                gpu.clear_image(image);
            }
            Ok(image)
        }
    }
}
