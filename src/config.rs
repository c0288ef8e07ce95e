// src/config.rs

//! Configuration for the atlas manager, the SDF pipeline and its disk cache.
//!
//! Every struct deserializes with defaults for missing fields, so a config file
//! only needs to name what it changes.

use crate::gpu::headless::{FILL_SHADER, SDF_SHADER, WINDING_SHADER};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Atlas packing and rasterization settings.
    pub atlas: AtlasConfig,
    /// Distance-field pipeline settings.
    pub sdf: SdfConfig,
    /// Reference atlas disk cache.
    pub cache: CacheConfig,
}

impl Config {
    /// Parses a JSON configuration document.
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        serde_json::from_str(text).context("Failed to parse configuration JSON")
    }

    /// Reads and parses a JSON configuration file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        Self::from_json(&text)
    }
}

/// Which renderer an atlas uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Antialiased coverage rasterized on the CPU at the requested size.
    Coverage,
    /// Distance field generated from a shared reference atlas.
    Sdf,
}

/// Settings shared by every atlas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    /// Largest width or height an atlas image may grow to.
    pub max_size: u32,
    /// Empty pixels kept around each glyph of a coverage atlas.
    pub glyph_spacing: u32,
    /// Maximum curve flattening error, in pixels.
    pub flatness: f32,
    /// Backend used by `AtlasManager::request_glyphs`.
    pub backend: BackendKind,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        AtlasConfig {
            max_size: 8192,
            glyph_spacing: 1,
            flatness: 0.35,
            backend: BackendKind::Sdf,
        }
    }
}

/// Names of the programs the SDF pipeline loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdfShaders {
    pub fill: String,
    pub winding: String,
    pub generate: String,
}

impl Default for SdfShaders {
    fn default() -> Self {
        SdfShaders {
            fill: FILL_SHADER.to_string(),
            winding: WINDING_SHADER.to_string(),
            generate: SDF_SHADER.to_string(),
        }
    }
}

/// Distance-field pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdfConfig {
    /// Font size, in pixels, of the shared reference atlas.
    pub reference_size: u32,
    /// High-resolution render scale relative to the reference.
    pub oversample: u32,
    /// Distance-field radius in reference pixels. Also the halo kept around
    /// each glyph cell.
    pub spread: u32,
    /// Extra empty pixels between neighbouring halos.
    pub atlas_gutter: u32,
    pub shaders: SdfShaders,
}

impl Default for SdfConfig {
    fn default() -> Self {
        SdfConfig {
            reference_size: 100,
            oversample: 4,
            spread: 5,
            atlas_gutter: 2,
            shaders: SdfShaders::default(),
        }
    }
}

impl SdfConfig {
    /// Distance-field radius at high resolution, in high-resolution pixels.
    pub fn high_res_spread(&self) -> u32 {
        self.spread * self.oversample.max(1)
    }
}

/// Reference atlas disk cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Directory holding one file per reference atlas.
    pub directory: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: true,
            directory: PathBuf::from("sdf-cache"),
        }
    }
}
