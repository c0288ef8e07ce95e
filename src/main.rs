// src/main.rs

use anyhow::{bail, Context};
use glyph_atlas::config::{BackendKind, Config};
use glyph_atlas::font::ttf::{default_charset, load_font};
use glyph_atlas::geometry::PixelRect;
use glyph_atlas::gpu::{GpuDevice, HeadlessGpu};
use glyph_atlas::AtlasManager;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const USAGE: &str = "usage: glyph-atlas <font> [--size N] [--chars S] [--backend coverage|sdf] [--config path] [--out file.pgm]";

struct Args {
    font: PathBuf,
    size: f32,
    chars: Option<String>,
    backend: Option<BackendKind>,
    config: Option<PathBuf>,
    out: PathBuf,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Args> {
    let mut font = None;
    let mut parsed = Args {
        font: PathBuf::new(),
        size: 32.0,
        chars: None,
        backend: None,
        config: None,
        out: PathBuf::from("atlas.pgm"),
    };

    while let Some(arg) = args.next() {
        let mut value = |name: &str| args.next().with_context(|| format!("{} needs a value\n{}", name, USAGE));
        match arg.as_str() {
            "--size" => {
                parsed.size = value("--size")?
                    .parse()
                    .context("--size must be a number")?
            }
            "--chars" => parsed.chars = Some(value("--chars")?),
            "--backend" => {
                parsed.backend = Some(match value("--backend")?.as_str() {
                    "coverage" => BackendKind::Coverage,
                    "sdf" => BackendKind::Sdf,
                    other => bail!("Unknown backend '{}'\n{}", other, USAGE),
                })
            }
            "--config" => parsed.config = Some(PathBuf::from(value("--config")?)),
            "--out" => parsed.out = PathBuf::from(value("--out")?),
            "-h" | "--help" => bail!("{}", USAGE),
            _ if font.is_none() && !arg.starts_with("--") => font = Some(PathBuf::from(&arg)),
            _ => bail!("Unexpected argument '{}'\n{}", arg, USAGE),
        }
    }

    parsed.font = font.with_context(|| USAGE.to_string())?;
    if parsed.size <= 0.0 {
        bail!("--size must be positive");
    }
    Ok(parsed)
}

/// Binary PGM: a text header followed by one byte per pixel.
fn write_pgm(path: &Path, width: u32, height: u32, pixels: &[u8]) -> anyhow::Result<()> {
    let mut out = format!("P5\n{} {}\n255\n", width, height).into_bytes();
    out.extend_from_slice(pixels);
    std::fs::write(path, out).with_context(|| format!("Failed to write {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    let args = parse_args(std::env::args().skip(1))?;

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(backend) = args.backend {
        config.atlas.backend = backend;
    }

    let data = std::fs::read(&args.font)
        .with_context(|| format!("Failed to read font {}", args.font.display()))?;
    let chars: Vec<char> = match &args.chars {
        Some(s) => s.chars().collect(),
        None => default_charset().collect(),
    };
    let font = Arc::new(
        load_font(&data, chars.iter().copied())
            .with_context(|| format!("Failed to load font {}", args.font.display()))?,
    );
    info!(
        "Loaded '{}' with {} glyphs",
        font.face(),
        font.glyph_count()
    );

    let mut manager = AtlasManager::new(HeadlessGpu::new(), config);
    let id = manager
        .request_glyphs(&font, args.size, &chars)
        .context("Failed to build the atlas")?;

    let atlas = manager.atlas(id).context("Atlas vanished")?;
    info!(
        "Atlas holds {} glyphs at {}px (line height {:.1}px)",
        atlas.glyph_count(),
        atlas.size(),
        atlas.line_height()
    );

    let Some(image) = manager.atlas_image(id) else {
        warn!("No glyph produced pixels; nothing written");
        return Ok(());
    };
    let size = manager
        .gpu()
        .image_size(image)
        .context("Atlas image has no size")?;
    let pixels = manager
        .gpu()
        .read_region(image, PixelRect::new(0, 0, size.width, size.height))
        .context("Failed to read back the atlas")?;
    write_pgm(&args.out, size.width, size.height, &pixels)?;
    info!(
        "Wrote {}x{} atlas to {}",
        size.width,
        size.height,
        args.out.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn args(list: &[&str]) -> anyhow::Result<Args> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_every_option() {
        let parsed = args(&[
            "font.ttf", "--size", "18", "--chars", "abc", "--backend", "coverage", "--out", "a.pgm",
        ])
        .unwrap();
        assert_eq!(parsed.font, PathBuf::from("font.ttf"));
        assert_eq!(parsed.size, 18.0);
        assert_eq!(parsed.chars.as_deref(), Some("abc"));
        assert_eq!(parsed.backend, Some(BackendKind::Coverage));
        assert_eq!(parsed.out, PathBuf::from("a.pgm"));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(args(&[]).is_err());
        assert!(args(&["font.ttf", "--size"]).is_err());
        assert!(args(&["font.ttf", "--backend", "bitmap"]).is_err());
        assert!(args(&["font.ttf", "other.ttf"]).is_err());
    }
}
