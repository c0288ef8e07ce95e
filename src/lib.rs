// src/lib.rs

//! Glyph rasterization and texture atlases for GPU text rendering.
//!
//! Outlines are flattened and rasterized on the CPU into coverage bitmaps, or
//! rendered once per font face into a shared signed distance field reference
//! that atlases of every size draw from. [`manager::AtlasManager`] is the entry
//! point.

pub mod atlas;
pub mod config;
pub mod error;
pub mod font;
pub mod geometry;
pub mod gpu;
pub mod manager;
pub mod packer;
pub mod raster;
pub mod sdf;

pub use atlas::{AtlasId, DrawableGlyph, FlushFlags, FontAtlas};
pub use config::{BackendKind, Config};
pub use error::{AtlasError, CacheError, GpuError};
pub use manager::AtlasManager;
