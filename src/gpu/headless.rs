// src/gpu/headless.rs

//! A software [`GpuDevice`].
//!
//! Images live in system memory and the three glyph programs are evaluated on
//! the CPU. Used by tests and by the command line tool, and counts the work it
//! is asked to do so callers can assert how many passes ran.

use super::distance::squared_distances;
use super::{BlendMode, FullscreenPass, GpuDevice, ImageFormat, ImageHandle, ShaderId};
use crate::error::GpuError;
use crate::geometry::{PixelRect, Size, Vec2};
use crate::raster::FlattenedOutline;
use log::{debug, error, trace, warn};
use std::collections::HashMap;

/// Default name of the additive outline fill program.
pub const FILL_SHADER: &str = "glyph_fill";
/// Default name of the parity resolve program.
pub const WINDING_SHADER: &str = "winding_resolve";
/// Default name of the distance-field program.
pub const SDF_SHADER: &str = "generate_sdf";

const DEFAULT_MAX_IMAGE_SIZE: u32 = 16384;
const DEFAULT_SPREAD: f32 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Program {
    Fill,
    WindingResolve,
    GenerateSdf,
}

/// Work counters, reset only by creating a new device.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GpuStats {
    pub images_created: usize,
    pub uploads: usize,
    /// Calls to `draw_outlines`.
    pub outline_draws: usize,
    /// Outlines filled across all `draw_outlines` calls.
    pub outlines_drawn: usize,
    pub winding_passes: usize,
    pub sdf_passes: usize,
}

struct Image {
    size: Size,
    data: Vec<u8>,
}

impl Image {
    fn new(size: Size) -> Self {
        Self {
            size,
            data: vec![0; size.width as usize * size.height as usize],
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.size.width as usize + x as usize
    }
}

pub struct HeadlessGpu {
    images: HashMap<ImageHandle, Image>,
    next_image: u32,
    available: HashMap<String, Program>,
    programs: Vec<Program>,
    max_image_size: u32,
    stats: GpuStats,
}

impl Default for HeadlessGpu {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessGpu {
    pub fn new() -> Self {
        let available = [
            (FILL_SHADER, Program::Fill),
            (WINDING_SHADER, Program::WindingResolve),
            (SDF_SHADER, Program::GenerateSdf),
        ]
        .into_iter()
        .map(|(name, program)| (name.to_string(), program))
        .collect();

        Self {
            images: HashMap::new(),
            next_image: 1,
            available,
            programs: Vec::new(),
            max_image_size: DEFAULT_MAX_IMAGE_SIZE,
            stats: GpuStats::default(),
        }
    }

    pub fn with_max_image_size(mut self, max: u32) -> Self {
        self.max_image_size = max;
        self
    }

    /// Makes `name` fail to load, as a driver missing that program would.
    pub fn without_shader(mut self, name: &str) -> Self {
        self.available.remove(name);
        self
    }

    pub fn stats(&self) -> GpuStats {
        self.stats
    }

    /// The full contents of an image, top row first.
    pub fn pixels(&self, image: ImageHandle) -> Option<&[u8]> {
        self.images.get(&image).map(|img| img.data.as_slice())
    }

    fn program(&self, shader: ShaderId) -> Option<Program> {
        self.programs.get(shader.0 as usize).copied()
    }

    fn check_size(&self, size: Size) -> Result<(), GpuError> {
        if size.width > self.max_image_size || size.height > self.max_image_size {
            return Err(GpuError::ImageTooLarge {
                size,
                max: self.max_image_size,
            });
        }
        Ok(())
    }

    fn copy_region(&self, image: ImageHandle, rect: PixelRect) -> Result<Vec<u8>, GpuError> {
        let img = self.images.get(&image).ok_or(GpuError::UnknownImage(image))?;
        if !rect.fits_in(img.size) {
            return Err(GpuError::RegionOutOfBounds { rect, size: img.size });
        }
        let mut out = Vec::with_capacity(rect.width as usize * rect.height as usize);
        for y in rect.y..rect.bottom() {
            let start = img.index(rect.x, y);
            out.extend_from_slice(&img.data[start..start + rect.width as usize]);
        }
        Ok(out)
    }

    /// Evaluates `shade(u, v)` for every texel of the pass destination, where
    /// `(u, v)` is the nearest source texel relative to the source rect.
    fn shade_pass(&mut self, pass: &FullscreenPass<'_>, shade: impl Fn(u32, u32) -> u8) -> Result<(), GpuError> {
        let dest = self
            .images
            .get_mut(&pass.dest)
            .ok_or(GpuError::UnknownImage(pass.dest))?;
        if !pass.dest_rect.fits_in(dest.size) {
            return Err(GpuError::RegionOutOfBounds {
                rect: pass.dest_rect,
                size: dest.size,
            });
        }
        let target = pass.dest_rect.flip_y(dest.size.height);
        let (sw, sh) = (pass.source_rect.width, pass.source_rect.height);
        let (dw, dh) = (target.width, target.height);
        if sw == 0 || sh == 0 {
            return Ok(());
        }

        for row in 0..dh {
            let v = (((row as f32 + 0.5) * sh as f32 / dh as f32) as u32).min(sh - 1);
            for col in 0..dw {
                let u = (((col as f32 + 0.5) * sw as f32 / dw as f32) as u32).min(sw - 1);
                let idx = dest.index(target.x + col, target.y + row);
                dest.data[idx] = shade(u, v);
            }
        }
        Ok(())
    }

    fn winding_pass(&mut self, pass: &FullscreenPass<'_>) -> Result<(), GpuError> {
        let source = self.copy_region(pass.source, pass.source_rect)?;
        let width = pass.source_rect.width as usize;
        self.shade_pass(pass, |u, v| {
            if source[v as usize * width + u as usize] % 2 == 1 {
                255
            } else {
                0
            }
        })?;
        self.stats.winding_passes += 1;
        Ok(())
    }

    fn sdf_pass(&mut self, pass: &FullscreenPass<'_>) -> Result<(), GpuError> {
        let spread = pass.float("spread").unwrap_or(DEFAULT_SPREAD).max(f32::EPSILON);
        let source = self.copy_region(pass.source, pass.source_rect)?;
        let (w, h) = (pass.source_rect.width as usize, pass.source_rect.height as usize);
        let inside = |x: usize, y: usize| source[y * w + x] >= 128;

        let to_inside = squared_distances(w, h, inside);
        let to_outside = squared_distances(w, h, |x, y| !inside(x, y));

        self.shade_pass(pass, |u, v| {
            let i = v as usize * w + u as usize;
            // Texel centers sit half a texel from the boundary between them.
            let distance = if inside(u as usize, v as usize) {
                to_outside[i].sqrt() as f32 - 0.5
            } else {
                0.5 - to_inside[i].sqrt() as f32
            };
            let normalized = (0.5 + distance / (2.0 * spread)).clamp(0.0, 1.0);
            (normalized * 255.0).round() as u8
        })?;
        self.stats.sdf_passes += 1;
        Ok(())
    }

    fn fill_outline(image: &mut Image, outline: &FlattenedOutline, blend: BlendMode) {
        for contour in outline.contours() {
            let Some((&anchor, rest)) = contour.split_first() else {
                continue;
            };
            for pair in rest.windows(2) {
                fill_triangle(image, [anchor, pair[0], pair[1]], blend);
            }
        }
    }
}

// Top-left style tie rule: a texel center exactly on an edge belongs to the
// triangle on one side only.
fn owns_edge(d: Vec2) -> bool {
    d.y > 0.0 || (d.y == 0.0 && d.x < 0.0)
}

fn cross(a: Vec2, b: Vec2) -> f32 {
    a.x * b.y - a.y * b.x
}

/// Adds one to every texel whose center lies inside the triangle. Counts wrap,
/// only their parity is consumed.
fn fill_triangle(image: &mut Image, tri: [Vec2; 3], blend: BlendMode) {
    let [a, mut b, mut c] = tri;
    let area = cross(b - a, c - a);
    if area == 0.0 || !area.is_finite() {
        return;
    }
    if area < 0.0 {
        std::mem::swap(&mut b, &mut c);
    }
    let edges = [(a, b), (b, c), (c, a)];

    let (w, h) = (image.size.width as f32, image.size.height as f32);
    let min_x = a.x.min(b.x).min(c.x).floor().clamp(0.0, w) as u32;
    let max_x = a.x.max(b.x).max(c.x).ceil().clamp(0.0, w) as u32;
    let min_y = a.y.min(b.y).min(c.y).floor().clamp(0.0, h) as u32;
    let max_y = a.y.max(b.y).max(c.y).ceil().clamp(0.0, h) as u32;

    for y in min_y..max_y {
        for x in min_x..max_x {
            let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
            let inside = edges.iter().all(|&(from, to)| {
                let e = cross(to - from, p - from);
                e > 0.0 || (e == 0.0 && owns_edge(to - from))
            });
            if inside {
                let idx = image.index(x, y);
                image.data[idx] = match blend {
                    BlendMode::Additive => image.data[idx].wrapping_add(1),
                    BlendMode::Replace => 1,
                };
            }
        }
    }
}

impl GpuDevice for HeadlessGpu {
    fn load_shader(&mut self, name: &str) -> Result<ShaderId, GpuError> {
        let program = *self
            .available
            .get(name)
            .ok_or_else(|| GpuError::ShaderUnavailable(name.to_string()))?;
        let id = ShaderId(self.programs.len() as u32);
        self.programs.push(program);
        debug!("HeadlessGpu: Loaded shader '{}' as {:?}", name, id);
        Ok(id)
    }

    fn create_image(&mut self, size: Size, format: ImageFormat) -> Result<ImageHandle, GpuError> {
        self.check_size(size)?;
        let handle = ImageHandle(self.next_image);
        self.next_image += 1;
        debug_assert_eq!(format.bytes_per_pixel(), 1);
        self.images.insert(handle, Image::new(size));
        self.stats.images_created += 1;
        debug!(
            "HeadlessGpu: Created image {:?} {}x{} ({:?})",
            handle, size.width, size.height, format
        );
        Ok(handle)
    }

    fn resize_image(&mut self, image: ImageHandle, size: Size, preserve_contents: bool) -> Result<(), GpuError> {
        self.check_size(size)?;
        let old = self.images.get_mut(&image).ok_or(GpuError::UnknownImage(image))?;
        let mut resized = Image::new(size);
        if preserve_contents {
            let w = old.size.width.min(size.width) as usize;
            for y in 0..old.size.height.min(size.height) {
                let src = old.index(0, y);
                let dst = resized.index(0, y);
                resized.data[dst..dst + w].copy_from_slice(&old.data[src..src + w]);
            }
        }
        debug!(
            "HeadlessGpu: Resized image {:?} {:?} -> {:?} (preserve: {})",
            image, old.size, size, preserve_contents
        );
        *old = resized;
        Ok(())
    }

    fn image_size(&self, image: ImageHandle) -> Option<Size> {
        self.images.get(&image).map(|img| img.size)
    }

    fn release_image(&mut self, image: ImageHandle) {
        if self.images.remove(&image).is_none() {
            warn!("HeadlessGpu: Release of unknown image {:?}", image);
        }
    }

    fn clear_image(&mut self, image: ImageHandle) {
        match self.images.get_mut(&image) {
            Some(img) => img.data.fill(0),
            None => error!("HeadlessGpu: Clear of unknown image {:?}", image),
        }
    }

    fn upload_sub_image(&mut self, image: ImageHandle, rect: PixelRect, pixels: &[u8]) {
        let Some(img) = self.images.get_mut(&image) else {
            error!("HeadlessGpu: Upload to unknown image {:?}", image);
            return;
        };
        let expected = rect.width as usize * rect.height as usize;
        if !rect.fits_in(img.size) || pixels.len() != expected {
            error!(
                "HeadlessGpu: Rejected upload of {} bytes to {:?} in {:?}",
                pixels.len(),
                rect,
                img.size
            );
            return;
        }
        for (row, src) in pixels.chunks_exact(rect.width.max(1) as usize).enumerate() {
            let dst = img.index(rect.x, rect.y + row as u32);
            img.data[dst..dst + src.len()].copy_from_slice(src);
        }
        self.stats.uploads += 1;
        trace!("HeadlessGpu: Uploaded {:?} to {:?}", rect, image);
    }

    fn draw_outlines(&mut self, target: ImageHandle, shader: ShaderId, outlines: &[FlattenedOutline], blend: BlendMode) {
        if self.program(shader) != Some(Program::Fill) {
            error!("HeadlessGpu: Shader {:?} cannot fill outlines", shader);
            return;
        }
        let Some(image) = self.images.get_mut(&target) else {
            error!("HeadlessGpu: Draw to unknown image {:?}", target);
            return;
        };
        for outline in outlines {
            Self::fill_outline(image, outline, blend);
        }
        self.stats.outline_draws += 1;
        self.stats.outlines_drawn += outlines.len();
        trace!("HeadlessGpu: Filled {} outlines into {:?}", outlines.len(), target);
    }

    fn run_fullscreen_pass(&mut self, pass: &FullscreenPass<'_>) {
        let result = match self.program(pass.shader) {
            Some(Program::WindingResolve) => self.winding_pass(pass),
            Some(Program::GenerateSdf) => self.sdf_pass(pass),
            Some(Program::Fill) | None => {
                error!("HeadlessGpu: Shader {:?} is not a full-screen program", pass.shader);
                return;
            }
        };
        if let Err(e) = result {
            error!("HeadlessGpu: Full-screen pass dropped: {}", e);
        }
    }

    fn read_region(&self, image: ImageHandle, rect: PixelRect) -> Result<Vec<u8>, GpuError> {
        self.copy_region(image, rect)
    }
}
