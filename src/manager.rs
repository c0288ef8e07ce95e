// src/manager.rs

//! The entry point for text renderers: one [`FontAtlas`] per font and size,
//! created on first request, all drawing through one [`GpuDevice`].

use crate::atlas::{AtlasBackend, AtlasId, CoverageBackend, FlushFlags, FontAtlas, GlyphBatch};
use crate::config::{BackendKind, Config};
use crate::error::AtlasError;
use crate::font::Font;
use crate::gpu::{GpuDevice, ImageHandle};
use crate::sdf::{ReferenceKey, SdfPipeline};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;

/// Faces of one family are told apart by name and outline fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AtlasKey {
    face: String,
    fingerprint: u64,
    size_bits: u32,
    backend: BackendKind,
}

impl AtlasKey {
    fn new(font: &Font, size: f32, backend: BackendKind) -> Self {
        Self {
            face: font.face().to_string(),
            fingerprint: font.fingerprint(),
            size_bits: size.to_bits(),
            backend,
        }
    }
}

/// Owns the device, the SDF pipeline and every atlas.
///
/// All methods must be called from the thread that owns the device.
/// Rasterization inside a batch still fans out to the rayon pool.
pub struct AtlasManager<G: GpuDevice> {
    gpu: G,
    config: Config,
    sdf: SdfPipeline,
    atlases: Vec<FontAtlas>,
    index: HashMap<AtlasKey, AtlasId>,
    fallback_logged: bool,
}

impl<G: GpuDevice> AtlasManager<G> {
    pub fn new(gpu: G, config: Config) -> Self {
        let sdf = SdfPipeline::new(config.sdf.clone(), &config.cache, config.atlas.max_size);
        info!(
            "AtlasManager: Created (default backend {:?}, max atlas {}px)",
            config.atlas.backend, config.atlas.max_size
        );
        Self {
            gpu,
            config,
            sdf,
            atlases: Vec::new(),
            index: HashMap::new(),
            fallback_logged: false,
        }
    }

    pub fn gpu(&self) -> &G {
        &self.gpu
    }

    pub fn gpu_mut(&mut self) -> &mut G {
        &mut self.gpu
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sdf(&self) -> &SdfPipeline {
        &self.sdf
    }

    /// True when the device can run the distance-field passes.
    pub fn sdf_available(&mut self) -> bool {
        self.sdf.is_available(&mut self.gpu)
    }

    /// Requests `chars` of `font` at `size` pixels from an atlas of the
    /// configured backend.
    ///
    /// If that backend is SDF and the device lacks its programs, a coverage
    /// atlas is used instead.
    pub fn request_glyphs(&mut self, font: &Arc<Font>, size: f32, chars: &[char]) -> Result<AtlasId, AtlasError> {
        let mut backend = self.config.atlas.backend;
        if backend == BackendKind::Sdf && !self.sdf_available() {
            if !self.fallback_logged {
                warn!("AtlasManager: Distance fields unavailable, falling back to coverage atlases");
                self.fallback_logged = true;
            }
            backend = BackendKind::Coverage;
        }
        self.request_glyphs_with(font, size, backend, chars)
            .map(|(id, _)| id)
    }

    /// Requests `chars` from the `backend` atlas of `font` at `size`, creating
    /// the atlas on first use.
    ///
    /// When the batch repacked a shared reference, every other atlas of the
    /// same face has its UVs re-synced before this returns.
    ///
    /// # Returns
    ///
    /// The atlas and the flags of the batch.
    pub fn request_glyphs_with(
        &mut self,
        font: &Arc<Font>,
        size: f32,
        backend: BackendKind,
        chars: &[char],
    ) -> Result<(AtlasId, FlushFlags), AtlasError> {
        let id = self.atlas_for(font, size, backend);
        let GlyphBatch { mut flags, resync } =
            self.atlases[id.0].request_glyphs(&mut self.gpu, &mut self.sdf, chars)?;

        if !resync.is_empty() {
            for dependent in &resync {
                if let Some(atlas) = self.atlases.get_mut(dependent.0) {
                    atlas.resync_from_reference(&self.sdf);
                }
            }
            debug!("AtlasManager: Re-synced {} dependent atlases", resync.len());
            flags |= FlushFlags::RESYNCED;
        }
        Ok((id, flags))
    }

    fn atlas_for(&mut self, font: &Arc<Font>, size: f32, backend: BackendKind) -> AtlasId {
        let key = AtlasKey::new(font, size, backend);
        if let Some(&id) = self.index.get(&key) {
            return id;
        }

        let id = AtlasId(self.atlases.len());
        let atlas_backend = match backend {
            BackendKind::Coverage => AtlasBackend::Coverage(CoverageBackend::new(&self.config.atlas)),
            BackendKind::Sdf => AtlasBackend::Sdf {
                reference: ReferenceKey::for_font(font),
            },
        };
        let atlas = FontAtlas::new(id, Arc::clone(font), size, atlas_backend);
        info!(
            "AtlasManager: New {:?} atlas {} for '{}' at {}px",
            backend,
            id.0,
            font.face(),
            atlas.size()
        );
        self.atlases.push(atlas);
        self.index.insert(key, id);
        id
    }

    pub fn atlas(&self, id: AtlasId) -> Option<&FontAtlas> {
        self.atlases.get(id.0)
    }

    /// The existing atlas of `font` at `size` with the given backend.
    pub fn find_atlas(&self, font: &Font, size: f32, backend: BackendKind) -> Option<&FontAtlas> {
        let id = self.index.get(&AtlasKey::new(font, size, backend))?;
        self.atlases.get(id.0)
    }

    /// The image to bind when drawing glyphs of `id`. For SDF atlases this is
    /// the shared reference image.
    pub fn atlas_image(&self, id: AtlasId) -> Option<ImageHandle> {
        self.atlases.get(id.0)?.image(&self.sdf)
    }

    pub fn atlas_count(&self) -> usize {
        self.atlases.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::font::{FontMetrics, GlyphOutline, OutlineCommand};
    use crate::geometry::Vec2;
    use crate::gpu::headless::{HeadlessGpu, SDF_SHADER};
    use test_log::test;

    fn square_font(family: &str) -> Arc<Font> {
        let mut font = Font::new(
            family,
            FontMetrics {
                units_per_em: 100,
                ascender: 80.0,
                descender: -20.0,
                line_gap: 10.0,
            },
        );
        for (i, ch) in "ABCDEFGH".chars().enumerate() {
            let w = 20.0 + i as f32 * 5.0;
            font.insert_glyph(
                ch,
                GlyphOutline::from_commands(
                    vec![
                        OutlineCommand::MoveTo(Vec2::new(5.0, 0.0)),
                        OutlineCommand::LineTo(Vec2::new(5.0 + w, 0.0)),
                        OutlineCommand::LineTo(Vec2::new(5.0 + w, 70.0)),
                        OutlineCommand::LineTo(Vec2::new(5.0, 70.0)),
                        OutlineCommand::Close,
                    ],
                    w + 10.0,
                ),
            );
        }
        font.insert_glyph(' ', GlyphOutline::from_commands(Vec::new(), 30.0));
        Arc::new(font)
    }

    fn bar_font(family: &str, width: f32) -> Arc<Font> {
        let mut font = Font::new(
            family,
            FontMetrics {
                units_per_em: 100,
                ascender: 80.0,
                descender: -20.0,
                line_gap: 0.0,
            },
        );
        font.insert_glyph(
            'A',
            GlyphOutline::from_commands(
                vec![
                    OutlineCommand::MoveTo(Vec2::new(5.0, 0.0)),
                    OutlineCommand::LineTo(Vec2::new(5.0 + width, 0.0)),
                    OutlineCommand::LineTo(Vec2::new(5.0 + width, 70.0)),
                    OutlineCommand::LineTo(Vec2::new(5.0, 70.0)),
                    OutlineCommand::Close,
                ],
                width + 10.0,
            ),
        );
        Arc::new(font)
    }

    fn config(backend: BackendKind) -> Config {
        let mut config = Config::default();
        config.atlas.backend = backend;
        config.sdf.reference_size = 20;
        config.sdf.oversample = 2;
        config.sdf.spread = 2;
        config.cache = CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        };
        config
    }

    #[test]
    fn same_font_and_size_reuse_one_atlas() {
        let mut manager = AtlasManager::new(HeadlessGpu::new(), config(BackendKind::Coverage));
        let font = square_font("Box");
        let a = manager.request_glyphs(&font, 10.0, &['A']).unwrap();
        let b = manager.request_glyphs(&font, 10.0, &['B']).unwrap();
        let c = manager.request_glyphs(&font, 12.0, &['A']).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(manager.atlas_count(), 2);
        assert_eq!(manager.atlas(a).unwrap().glyph_count(), 2);
        assert!(manager.atlas_image(a).is_some());
    }

    #[test]
    fn atlas_metrics_follow_font_height() {
        let mut manager = AtlasManager::new(HeadlessGpu::new(), config(BackendKind::Coverage));
        let font = square_font("Box");
        let id = manager.request_glyphs(&font, 50.0, &['A']).unwrap();
        let atlas = manager.atlas(id).unwrap();
        assert_eq!(atlas.scale(), 0.5);
        assert_eq!(atlas.ascent(), 40.0);
        assert_eq!(atlas.descent(), -10.0);
        assert_eq!(atlas.line_height(), 55.0);
        assert!(manager.find_atlas(&font, 50.0, BackendKind::Coverage).is_some());
        assert!(manager.find_atlas(&font, 50.0, BackendKind::Sdf).is_none());
    }

    #[test]
    fn sdf_atlases_bind_the_shared_reference_image() {
        let mut manager = AtlasManager::new(HeadlessGpu::new(), config(BackendKind::Sdf));
        let font = square_font("Box");
        let small = manager.request_glyphs(&font, 10.0, &['A', 'B']).unwrap();
        let large = manager.request_glyphs(&font, 30.0, &['A', 'B']).unwrap();
        assert_ne!(small, large);
        assert_eq!(manager.atlas_image(small), manager.atlas_image(large));
        assert_eq!(manager.gpu().stats().outline_draws, 1);
    }

    #[test]
    fn missing_sdf_programs_fall_back_to_coverage() {
        let gpu = HeadlessGpu::new().without_shader(SDF_SHADER);
        let mut manager = AtlasManager::new(gpu, config(BackendKind::Sdf));
        assert!(!manager.sdf_available());

        let font = square_font("Box");
        let id = manager.request_glyphs(&font, 10.0, &['A']).unwrap();
        let atlas = manager.atlas(id).unwrap();
        assert!(matches!(atlas.backend(), AtlasBackend::Coverage(_)));
        assert!(!atlas.glyph('A').unwrap().uv.is_empty());
    }

    #[test]
    fn repacked_reference_resyncs_other_sizes() {
        let mut manager = AtlasManager::new(HeadlessGpu::new(), config(BackendKind::Sdf));
        let font = square_font("Box");
        let (small, _) = manager
            .request_glyphs_with(&font, 10.0, BackendKind::Sdf, &['A'])
            .unwrap();
        let before = manager.atlas(small).unwrap().glyph('A').unwrap().clone();

        let all: Vec<char> = "ABCDEFGH".chars().collect();
        let (large, flags) = manager
            .request_glyphs_with(&font, 30.0, BackendKind::Sdf, &all)
            .unwrap();
        assert!(flags.contains(FlushFlags::REPACKED));
        assert!(flags.contains(FlushFlags::RESYNCED));

        let reference = manager
            .sdf()
            .reference(&ReferenceKey::for_font(&font))
            .unwrap();
        assert_eq!(reference.dependents(), &[small, large]);

        let small_a = manager.atlas(small).unwrap().glyph('A').unwrap();
        let large_a = manager.atlas(large).unwrap().glyph('A').unwrap();
        assert_eq!(small_a.uv, large_a.uv);
        assert_eq!(small_a.draw_size, before.draw_size);
        assert!(manager.atlas(small).unwrap().last_flush().contains(FlushFlags::RESYNCED));
    }

    #[test]
    fn faces_sharing_a_family_name_keep_their_own_glyphs() {
        for backend in [BackendKind::Coverage, BackendKind::Sdf] {
            let mut manager = AtlasManager::new(HeadlessGpu::new(), config(backend));
            let regular = bar_font("DejaVu Sans", 20.0);
            let bold = bar_font("DejaVu Sans", 60.0);

            let a = manager.request_glyphs(&regular, 20.0, &['A']).unwrap();
            let b = manager.request_glyphs(&bold, 20.0, &['A']).unwrap();
            assert_ne!(a, b, "{:?}", backend);
            assert_eq!(manager.atlas_count(), 2);

            let narrow = manager.atlas(a).unwrap().glyph('A').unwrap().clone();
            let wide = manager.atlas(b).unwrap().glyph('A').unwrap().clone();
            let scale = manager.atlas(b).unwrap().scale();
            assert_eq!(narrow.advance, 30.0 * scale);
            assert_eq!(wide.advance, 70.0 * scale);
            assert!(wide.draw_size.x > narrow.draw_size.x, "{:?}", backend);
            assert!(manager.find_atlas(&bold, 20.0, backend).is_some());
        }

        let mut manager = AtlasManager::new(HeadlessGpu::new(), config(BackendKind::Sdf));
        let regular = bar_font("DejaVu Sans", 20.0);
        let bold = bar_font("DejaVu Sans", 60.0);
        let a = manager.request_glyphs(&regular, 20.0, &['A']).unwrap();
        let b = manager.request_glyphs(&bold, 20.0, &['A']).unwrap();
        assert_ne!(ReferenceKey::for_font(&regular), ReferenceKey::for_font(&bold));
        assert_ne!(manager.atlas_image(a), manager.atlas_image(b));
        assert_eq!(manager.gpu().stats().outline_draws, 2);
    }
}
