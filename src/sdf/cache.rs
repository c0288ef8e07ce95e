// src/sdf/cache.rs

//! On-disk copies of reference atlases.
//!
//! One file per reference. Layout, all integers little endian:
//!
//! ```text
//! magic      8 bytes   "GLYPHSDF"
//! version    u32       CACHE_VERSION
//! header_len u32
//! header     JSON      CacheHeader
//! pixels     width * height bytes, top row first
//! ```
//!
//! Anything that does not match exactly is rejected; callers treat every
//! rejection as a miss and rebuild the reference.

use super::ReferenceGlyph;
use crate::error::CacheError;
use crate::geometry::Size;
use crate::packer::PackingState;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use twox_hash::XxHash64;

const MAGIC: &[u8; 8] = b"GLYPHSDF";
pub const CACHE_VERSION: u32 = 1;
const PREAMBLE_LEN: usize = MAGIC.len() + 8;

/// Identity of a reference atlas. A file written under one key is never
/// loaded under another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub family: String,
    pub face: String,
    /// [`Font::fingerprint`](crate::font::Font::fingerprint) of the face.
    pub fingerprint: u64,
    pub reference_size: u32,
    pub pixel_font: bool,
    /// Describes every setting that changes the pixels.
    pub rasterizer: String,
}

impl CacheKey {
    fn file_name(&self) -> String {
        let stem: String = self
            .face
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let identity = format!(
            "{}|{}|{:016x}|{}|{}|{}",
            self.family,
            self.face,
            self.fingerprint,
            self.reference_size,
            self.pixel_font,
            self.rasterizer
        );
        format!("{}-{:016x}.sdf", stem, XxHash64::oneshot(0, identity.as_bytes()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CachedGlyph {
    character: char,
    #[serde(flatten)]
    glyph: ReferenceGlyph,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheHeader {
    key: CacheKey,
    width: u32,
    height: u32,
    checksum: u64,
    glyphs: Vec<CachedGlyph>,
    packing: PackingState<char>,
}

/// Everything needed to restore a reference atlas without rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub size: Size,
    pub pixels: Vec<u8>,
    pub glyphs: HashMap<char, ReferenceGlyph>,
    pub packing: PackingState<char>,
}

impl CacheEntry {
    pub fn encode(&self) -> Result<Vec<u8>, CacheError> {
        let mut glyphs: Vec<CachedGlyph> = self
            .glyphs
            .iter()
            .map(|(&character, &glyph)| CachedGlyph { character, glyph })
            .collect();
        glyphs.sort_by_key(|g| g.character);

        let header = serde_json::to_vec(&CacheHeader {
            key: self.key.clone(),
            width: self.size.width,
            height: self.size.height,
            checksum: XxHash64::oneshot(0, &self.pixels),
            glyphs,
            packing: self.packing.clone(),
        })?;

        let mut out = Vec::with_capacity(PREAMBLE_LEN + header.len() + self.pixels.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&CACHE_VERSION.to_le_bytes());
        out.extend_from_slice(&(header.len() as u32).to_le_bytes());
        out.extend_from_slice(&header);
        out.extend_from_slice(&self.pixels);
        Ok(out)
    }

    /// Parses and validates a cache file written for `expected`.
    pub fn decode(bytes: &[u8], expected: &CacheKey) -> Result<Self, CacheError> {
        if bytes.len() < PREAMBLE_LEN || &bytes[..MAGIC.len()] != MAGIC {
            return Err(CacheError::BadMagic);
        }
        let version = read_u32(&bytes[8..12]);
        if version != CACHE_VERSION {
            return Err(CacheError::VersionMismatch {
                found: version,
                expected: CACHE_VERSION,
            });
        }
        let header_len = read_u32(&bytes[12..16]) as usize;
        let header_end = PREAMBLE_LEN
            .checked_add(header_len)
            .filter(|&end| end <= bytes.len())
            .ok_or(CacheError::Truncated)?;
        let header: CacheHeader = serde_json::from_slice(&bytes[PREAMBLE_LEN..header_end])?;
        if header.key != *expected {
            return Err(CacheError::KeyMismatch);
        }

        let size = Size::new(header.width, header.height);
        let pixels = &bytes[header_end..];
        let expected_len = size.area() as usize;
        if pixels.len() < expected_len {
            return Err(CacheError::Truncated);
        }
        if pixels.len() > expected_len {
            return Err(CacheError::Inconsistent(format!(
                "{} trailing bytes",
                pixels.len() - expected_len
            )));
        }
        if XxHash64::oneshot(0, pixels) != header.checksum {
            return Err(CacheError::ChecksumMismatch);
        }
        if header.packing.size() != size {
            return Err(CacheError::Inconsistent(format!(
                "packing {:?} does not match image {:?}",
                header.packing.size(),
                size
            )));
        }
        if let Some(bad) = header.glyphs.iter().find(|g| !g.glyph.cell.fits_in(size)) {
            return Err(CacheError::Inconsistent(format!(
                "glyph {:?} lies outside the image",
                bad.character
            )));
        }

        Ok(CacheEntry {
            key: header.key,
            size,
            pixels: pixels.to_vec(),
            glyphs: header
                .glyphs
                .into_iter()
                .map(|g| (g.character, g.glyph))
                .collect(),
            packing: header.packing,
        })
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(buf)
}

/// A directory of reference atlas files.
#[derive(Debug, Clone)]
pub struct SdfCache {
    directory: PathBuf,
}

impl SdfCache {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.directory.join(key.file_name())
    }

    /// Reads the entry for `key`. A missing file is `Ok(None)`.
    pub fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entry = CacheEntry::decode(&bytes, key)?;
        debug!(
            "SdfCache: Loaded {} glyphs for '{}' from {}",
            entry.glyphs.len(),
            key.face,
            path.display()
        );
        Ok(Some(entry))
    }

    /// Writes `entry` atomically: a temporary file renamed over the old one.
    pub fn store(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        fs::create_dir_all(&self.directory)?;
        let path = self.path_for(&entry.key);
        let tmp = path.with_extension("sdf.tmp");
        fs::write(&tmp, entry.encode()?)?;
        fs::rename(&tmp, &path)?;
        debug!(
            "SdfCache: Stored {} glyphs for '{}' in {}",
            entry.glyphs.len(),
            entry.key.face,
            path.display()
        );
        Ok(())
    }

    /// [`load`](Self::load) with every failure reported and turned into a miss.
    pub fn load_or_miss(&self, key: &CacheKey) -> Option<CacheEntry> {
        match self.load(key) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(
                    "SdfCache: Ignoring cache for '{}' at {}: {}",
                    key.face,
                    self.path_for(key).display(),
                    e
                );
                None
            }
        }
    }
}
