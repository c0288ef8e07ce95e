use super::*;
use crate::config::{AtlasConfig, CacheConfig, SdfConfig};
use crate::error::GpuError;
use crate::font::{FontMetrics, OutlineCommand};
use crate::geometry::{PixelRect, Size};
use crate::gpu::HeadlessGpu;
use crate::raster::rasterize_glyph;
use test_log::test;

fn test_font() -> Arc<Font> {
    let mut font = Font::new(
        "Boxes",
        FontMetrics {
            units_per_em: 100,
            ascender: 80.0,
            descender: -20.0,
            line_gap: 0.0,
        },
    );
    for (i, ch) in "ABCDEFGHIJ".chars().enumerate() {
        let w = 10.0 + i as f32 * 6.0;
        font.insert_glyph(
            ch,
            GlyphOutline::from_commands(
                vec![
                    OutlineCommand::MoveTo(Vec2::new(2.0, -10.0)),
                    OutlineCommand::LineTo(Vec2::new(2.0 + w, -10.0)),
                    OutlineCommand::QuadTo(Vec2::new(2.0 + w, 70.0), Vec2::new(2.0 + w / 2.0, 70.0)),
                    OutlineCommand::LineTo(Vec2::new(2.0, 70.0)),
                    OutlineCommand::Close,
                ],
                w + 4.0,
            ),
        );
    }
    font.insert_glyph(' ', GlyphOutline::from_commands(Vec::new(), 25.0));
    Arc::new(font)
}

fn pipeline() -> SdfPipeline {
    let cache = CacheConfig {
        enabled: false,
        ..CacheConfig::default()
    };
    SdfPipeline::new(SdfConfig::default(), &cache, 8192)
}

fn coverage_atlas(font: &Arc<Font>, size: f32, config: &AtlasConfig) -> FontAtlas {
    FontAtlas::new(
        AtlasId(0),
        Arc::clone(font),
        size,
        AtlasBackend::Coverage(CoverageBackend::new(config)),
    )
}

fn pixel_rect(uv: Rect) -> PixelRect {
    PixelRect::new(uv.x as u32, uv.y as u32, uv.width as u32, uv.height as u32)
}

fn assert_uploaded_matches_raster(gpu: &HeadlessGpu, atlas: &FontAtlas, sdf: &SdfPipeline, flatness: f32) {
    let image = atlas.image(sdf).unwrap();
    for ch in "ABCDEFGHIJ".chars() {
        let Some(glyph) = atlas.glyph(ch) else {
            continue;
        };
        let expected = rasterize_glyph(&glyph.outline, atlas.scale(), flatness);
        let pixels = gpu.read_region(image, pixel_rect(glyph.uv)).unwrap();
        assert_eq!(pixels, expected.data, "pixels of {:?}", ch);
        assert_eq!(glyph.draw_size, Vec2::new(expected.width as f32, expected.height as f32));
    }
}

#[test]
fn coverage_upload_matches_cpu_raster() {
    let config = AtlasConfig::default();
    let font = test_font();
    let mut gpu = HeadlessGpu::new();
    let mut sdf = pipeline();
    let mut atlas = coverage_atlas(&font, 20.0, &config);

    let batch = atlas
        .request_glyphs(&mut gpu, &mut sdf, &['A', 'B', 'C'])
        .unwrap();
    assert!(batch.flags.contains(FlushFlags::UPLOADED | FlushFlags::GREW));
    assert!(batch.resync.is_empty());
    assert_eq!(atlas.glyph_count(), 3);
    assert_uploaded_matches_raster(&gpu, &atlas, &sdf, config.flatness);

    let a = atlas.glyph('A').unwrap();
    // x_min 2 at scale 0.2 floors to 0; y_max 70 floors to -14.
    assert_eq!(a.draw_offset, Vec2::new(0.0, -14.0));
    assert_eq!(a.advance, 14.0 * 0.2);
}

#[test]
fn non_drawable_characters() {
    let font = test_font();
    let mut gpu = HeadlessGpu::new();
    let mut sdf = pipeline();
    let mut atlas = coverage_atlas(&font, 20.0, &AtlasConfig::default());

    let batch = atlas
        .request_glyphs(&mut gpu, &mut sdf, &[' ', 'z'])
        .unwrap();
    assert_eq!(batch, GlyphBatch::default());
    assert!(atlas.glyph('z').is_none());

    let space = atlas.glyph(' ').unwrap();
    assert!(!space.can_be_shown());
    assert!(space.uv.is_empty());
    assert_eq!(space.advance, 5.0);
    assert_eq!(gpu.stats().images_created, 0);
}

#[test]
fn cached_glyphs_are_not_rendered_again() {
    let font = test_font();
    let mut gpu = HeadlessGpu::new();
    let mut sdf = pipeline();
    let mut atlas = coverage_atlas(&font, 20.0, &AtlasConfig::default());

    atlas.request_glyphs(&mut gpu, &mut sdf, &['A', 'B']).unwrap();
    let uploads = gpu.stats().uploads;
    let uv = atlas.glyph('A').unwrap().uv;

    let batch = atlas
        .request_glyphs(&mut gpu, &mut sdf, &['B', 'A', 'B'])
        .unwrap();
    assert!(batch.flags.is_empty());
    assert_eq!(gpu.stats().uploads, uploads);
    assert_eq!(atlas.glyph('A').unwrap().uv, uv);
}

#[test]
fn repack_reissues_every_uv() {
    let config = AtlasConfig::default();
    let font = test_font();
    let mut gpu = HeadlessGpu::new();
    let mut sdf = pipeline();
    let mut atlas = coverage_atlas(&font, 40.0, &config);

    atlas.request_glyphs(&mut gpu, &mut sdf, &['A']).unwrap();
    let all: Vec<char> = "ABCDEFGHIJ".chars().collect();
    let batch = atlas.request_glyphs(&mut gpu, &mut sdf, &all).unwrap();
    assert!(batch.flags.contains(FlushFlags::REPACKED | FlushFlags::GREW | FlushFlags::UPLOADED));
    assert_eq!(atlas.last_flush(), batch.flags);

    let rects: Vec<PixelRect> = all
        .iter()
        .map(|&ch| pixel_rect(atlas.glyph(ch).unwrap().uv))
        .collect();
    for (i, a) in rects.iter().enumerate() {
        for b in &rects[i + 1..] {
            assert!(!a.inflate(1).intersects(b), "{:?} touches {:?}", a, b);
        }
    }
    assert_uploaded_matches_raster(&gpu, &atlas, &sdf, config.flatness);
}

#[test]
fn atlas_full_leaves_atlas_unchanged() {
    let config = AtlasConfig {
        max_size: 20,
        ..AtlasConfig::default()
    };
    let font = test_font();
    let mut gpu = HeadlessGpu::new();
    let mut sdf = pipeline();
    let mut atlas = coverage_atlas(&font, 20.0, &config);

    atlas.request_glyphs(&mut gpu, &mut sdf, &['A']).unwrap();
    let image = atlas.image(&sdf);

    let err = atlas
        .request_glyphs(&mut gpu, &mut sdf, &['J', 'I', 'H'])
        .unwrap_err();
    assert!(matches!(err, AtlasError::AtlasFull { max: 20, .. }));
    assert_eq!(atlas.glyph_count(), 1);
    assert!(atlas.glyph('J').is_none());
    assert_eq!(atlas.image(&sdf), image);
}

fn packing_size(atlas: &FontAtlas) -> Size {
    match atlas.backend() {
        AtlasBackend::Coverage(backend) => backend.packing().size(),
        AtlasBackend::Sdf { .. } => Size::default(),
    }
}

#[test]
fn image_allocation_failure_leaves_atlas_unchanged() {
    let font = test_font();
    let mut gpu = HeadlessGpu::new().with_max_image_size(20);
    let mut sdf = pipeline();
    let mut atlas = coverage_atlas(&font, 20.0, &AtlasConfig::default());

    atlas.request_glyphs(&mut gpu, &mut sdf, &['A']).unwrap();
    let image = atlas.image(&sdf).unwrap();
    let image_size = gpu.image_size(image);
    let packed = packing_size(&atlas);
    let uv = atlas.glyph('A').unwrap().uv;

    // The packer accepts the layout; the device refuses the larger image.
    let err = atlas
        .request_glyphs(&mut gpu, &mut sdf, &['J', 'I', 'H', ' '])
        .unwrap_err();
    assert!(matches!(err, AtlasError::Gpu(GpuError::ImageTooLarge { max: 20, .. })));

    assert_eq!(atlas.glyph_count(), 1);
    assert!(atlas.glyph('J').is_none());
    assert!(atlas.glyph(' ').is_none());
    assert_eq!(packing_size(&atlas), packed);
    assert_eq!(atlas.image(&sdf), Some(image));
    assert_eq!(gpu.image_size(image), image_size);
    assert_eq!(atlas.glyph('A').unwrap().uv, uv);

    // Glyphs that fit the existing image still go through.
    atlas.request_glyphs(&mut gpu, &mut sdf, &[' ']).unwrap();
    assert_eq!(atlas.glyph_count(), 2);
}

#[test]
fn pixel_font_size_snaps() {
    let mut font = Font::new(
        "Pixels",
        FontMetrics {
            units_per_em: 16,
            ascender: 12.0,
            descender: -4.0,
            line_gap: 0.0,
        },
    )
    .with_pixel_font(true);
    font.insert_glyph('.', GlyphOutline::from_commands(Vec::new(), 8.0));
    let font = Arc::new(font);

    let atlas = coverage_atlas(&font, 7.0, &AtlasConfig::default());
    // 16 / 7 floors to 2, already a power of two.
    assert_eq!(atlas.size(), 8.0);
    assert_eq!(atlas.scale(), 0.5);
}
