// src/atlas/coverage.rs

//! Coverage backend: glyphs rasterized on the CPU at the atlas's own size and
//! uploaded into a private image.

use super::{DrawableGlyph, FlushFlags};
use crate::config::AtlasConfig;
use crate::error::AtlasError;
use crate::geometry::{PixelRect, Rect, Size, Vec2};
use crate::gpu::{GpuDevice, ImageFormat, ImageHandle};
use crate::packer::PackingState;
use crate::raster::{rasterize_glyph, CoverageCanvas};
use log::{debug, info, trace};
use rayon::prelude::*;
use std::collections::HashMap;

#[derive(Debug)]
pub struct CoverageBackend {
    image: Option<ImageHandle>,
    packing: PackingState<char>,
    spacing: u32,
    flatness: f32,
    max_size: u32,
}

impl CoverageBackend {
    pub fn new(config: &AtlasConfig) -> Self {
        Self {
            image: None,
            packing: PackingState::default(),
            spacing: config.glyph_spacing,
            flatness: config.flatness,
            max_size: config.max_size,
        }
    }

    /// The backing image, allocated on the first batch with pixels.
    pub fn image(&self) -> Option<ImageHandle> {
        self.image
    }

    pub fn packing(&self) -> &PackingState<char> {
        &self.packing
    }

    /// Rasterizes, packs and uploads `pending`, then records them in `glyphs`.
    ///
    /// When the packer has to move existing glyphs the image is cleared, every
    /// glyph is uploaded again and all UVs are re-issued.
    pub(crate) fn add_glyphs<G: GpuDevice>(
        &mut self,
        gpu: &mut G,
        scale: f32,
        glyphs: &mut HashMap<char, DrawableGlyph>,
        pending: Vec<DrawableGlyph>,
    ) -> Result<FlushFlags, AtlasError> {
        let flatness = self.flatness;
        let canvases: Vec<CoverageCanvas> = pending
            .par_iter()
            .map(|glyph| rasterize_glyph(&glyph.outline, scale, flatness))
            .collect();

        let pad = self.spacing * 2;
        let requests: Vec<(char, Size)> = pending
            .iter()
            .zip(&canvases)
            .filter(|(_, canvas)| !canvas.is_empty())
            .map(|(glyph, canvas)| {
                let size = Size::new(canvas.width as u32 + pad, canvas.height as u32 + pad);
                (glyph.character, size)
            })
            .collect();

        let mut packing = self.packing.clone();
        let outcome = packing.pack(&requests, self.max_size)?;
        let image = self.ensure_image(gpu, packing.size(), outcome.repacked)?;
        self.packing = packing;

        let mut flags = FlushFlags::empty();
        if outcome.grew {
            flags |= FlushFlags::GREW;
        }

        if outcome.repacked {
            info!(
                "CoverageAtlas: Repacked {} glyphs into {}x{}",
                glyphs.len() + pending.len(),
                self.packing.size().width,
                self.packing.size().height
            );
            flags |= FlushFlags::REPACKED;
            let existing: Vec<&mut DrawableGlyph> =
                glyphs.values_mut().filter(|g| g.can_be_shown()).collect();
            let redrawn: Vec<CoverageCanvas> = existing
                .par_iter()
                .map(|glyph| rasterize_glyph(&glyph.outline, scale, flatness))
                .collect();
            for (glyph, canvas) in existing.into_iter().zip(&redrawn) {
                if self.upload(gpu, image, glyph, canvas) {
                    flags |= FlushFlags::UPLOADED;
                }
            }
        }

        for (mut glyph, canvas) in pending.into_iter().zip(&canvases) {
            if self.upload(gpu, image, &mut glyph, canvas) {
                flags |= FlushFlags::UPLOADED;
            }
            glyphs.insert(glyph.character, glyph);
        }

        debug!(
            "CoverageAtlas: Flushed {} glyphs ({:?})",
            requests.len(),
            flags
        );
        Ok(flags)
    }

    /// Creates or resizes the image to `size`. Contents are kept unless the
    /// layout changed.
    fn ensure_image<G: GpuDevice>(&mut self, gpu: &mut G, size: Size, repacked: bool) -> Result<ImageHandle, AtlasError> {
        let Some(image) = self.image else {
            let image = gpu.create_image(size, ImageFormat::R8)?;
            info!("CoverageAtlas: Created {}x{} image", size.width, size.height);
            self.image = Some(image);
            return Ok(image);
        };

        if gpu.image_size(image) != Some(size) {
            gpu.resize_image(image, size, !repacked)?;
            info!("CoverageAtlas: Grew image to {}x{}", size.width, size.height);
        } else if repacked {
            gpu.clear_image(image);
        }
        Ok(image)
    }

    /// Uploads `canvas` into the glyph's packed slot and points its UV there.
    fn upload<G: GpuDevice>(
        &self,
        gpu: &mut G,
        image: ImageHandle,
        glyph: &mut DrawableGlyph,
        canvas: &CoverageCanvas,
    ) -> bool {
        let Some(slot) = self.packing.get(glyph.character) else {
            return false;
        };
        let rect: PixelRect = slot.deflate(self.spacing);
        trace!("CoverageAtlas: {:?} -> {:?}", glyph.character, rect);
        gpu.upload_sub_image(image, rect, &canvas.to_packed());

        glyph.uv = Rect::from(rect);
        glyph.draw_offset = Vec2::new(canvas.origin_x as f32, canvas.origin_y as f32);
        glyph.draw_size = Vec2::new(canvas.width as f32, canvas.height as f32);
        true
    }
}
