// src/error.rs

use crate::geometry::{PixelRect, Size};
use crate::gpu::ImageHandle;
use thiserror::Error;

/// Errors surfaced to the caller of a glyph request.
#[derive(Error, Debug)]
pub enum AtlasError {
    #[error("Atlas would need {requested:?}, exceeding the {max}x{max} limit")]
    AtlasFull { requested: Size, max: u32 },
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),
}

/// Errors reported by a [`GpuDevice`](crate::gpu::GpuDevice).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GpuError {
    #[error("Image of {size:?} exceeds the device limit of {max}")]
    ImageTooLarge { size: Size, max: u32 },
    #[error("Unknown image {0:?}")]
    UnknownImage(ImageHandle),
    #[error("Shader program '{0}' is not available")]
    ShaderUnavailable(String),
    #[error("Region {rect:?} lies outside an image of {size:?}")]
    RegionOutOfBounds { rect: PixelRect, size: Size },
}

/// Reasons a disk cache entry is rejected. All of them are treated as a miss.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Not a reference atlas cache file")]
    BadMagic,
    #[error("Cache version {found}, expected {expected}")]
    VersionMismatch { found: u32, expected: u32 },
    #[error("Cache belongs to a different font or rasterizer")]
    KeyMismatch,
    #[error("Malformed cache header: {0}")]
    Header(#[from] serde_json::Error),
    #[error("Cache ends before the declared pixel data")]
    Truncated,
    #[error("Cache pixel checksum mismatch")]
    ChecksumMismatch,
    #[error("Cache contents are inconsistent: {0}")]
    Inconsistent(String),
}
