// src/packer.rs

//! Resumable shelf packing.
//!
//! Rectangles are placed left to right along shelves; a new shelf opens below
//! the last one when no existing shelf has room. New requests are first placed
//! into the existing layout. Only when that fails is everything repacked,
//! tallest first, into an atlas grown just enough to fit.

use crate::error::AtlasError;
use crate::geometry::{PixelRect, Size};
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Shelf {
    y: u32,
    height: u32,
    cursor_x: u32,
}

/// Where a rectangle ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement<K> {
    pub id: K,
    pub rect: PixelRect,
}

/// Result of one [`PackingState::pack`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct PackOutcome<K> {
    /// Placement of every requested id, in request order.
    pub placements: Vec<Placement<K>>,
    /// Previously placed rectangles moved; every UV of the atlas is stale.
    pub repacked: bool,
    /// The atlas size increased.
    pub grew: bool,
}

/// Resumable allocator state: atlas size, shelves and placed rectangles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackingState<K> {
    size: Size,
    shelves: Vec<Shelf>,
    placed: Vec<Placement<K>>,
}

impl<K> Default for PackingState<K> {
    fn default() -> Self {
        Self::with_size(Size::default())
    }
}

impl<K> PackingState<K> {
    pub fn with_size(size: Size) -> Self {
        Self {
            size,
            shelves: Vec::new(),
            placed: Vec::new(),
        }
    }

    /// Current atlas size. Never decreases.
    pub fn size(&self) -> Size {
        self.size
    }

    pub fn placements(&self) -> &[Placement<K>] {
        &self.placed
    }

    pub fn is_empty(&self) -> bool {
        self.placed.is_empty()
    }

    fn next_shelf_y(&self) -> u32 {
        self.shelves.last().map(|s| s.y + s.height).unwrap_or(0)
    }

    /// Finds room for `size` in the current layout without growing.
    fn try_place(&mut self, size: Size) -> Option<PixelRect> {
        let best = self
            .shelves
            .iter()
            .enumerate()
            .filter(|(_, s)| s.height >= size.height && s.cursor_x + size.width <= self.size.width)
            .min_by_key(|(_, s)| s.height - size.height)
            .map(|(i, _)| i);

        if let Some(i) = best {
            let shelf = &mut self.shelves[i];
            let rect = PixelRect::new(shelf.cursor_x, shelf.y, size.width, size.height);
            shelf.cursor_x += size.width;
            return Some(rect);
        }

        let y = self.next_shelf_y();
        if size.width > self.size.width || y + size.height > self.size.height {
            return None;
        }
        self.shelves.push(Shelf {
            y,
            height: size.height,
            cursor_x: size.width,
        });
        Some(PixelRect::new(0, y, size.width, size.height))
    }

    /// The smallest single-axis growth that would let `failed` fit next time.
    ///
    /// Prefers the candidate that keeps the atlas closer to square, and
    /// height on a tie.
    fn grown_size(&self, failed: Size) -> Size {
        let size = self.size;
        if failed.width > size.width {
            return Size::new(failed.width, size.height.max(failed.height));
        }
        let taller = Size::new(size.width, self.next_shelf_y() + failed.height);
        let wider = self
            .shelves
            .iter()
            .filter(|s| s.height >= failed.height)
            .map(|s| s.cursor_x + failed.width)
            .min()
            .map(|width| Size::new(width, size.height));

        match wider {
            Some(wider) if aspect(wider) < aspect(taller) => wider,
            _ => taller,
        }
    }
}

fn aspect(size: Size) -> f32 {
    let long = size.width.max(size.height) as f32;
    let short = size.width.min(size.height).max(1) as f32;
    long / short
}

/// Initial atlas guess for a full repack: wide enough for the widest
/// rectangle and roughly square by area.
fn initial_size(rects: &[Size]) -> Size {
    let area: u64 = rects.iter().map(Size::area).sum();
    let max_w = rects.iter().map(|r| r.width).max().unwrap_or(0);
    let max_h = rects.iter().map(|r| r.height).max().unwrap_or(0);
    let side = (area as f64).sqrt().ceil() as u32;
    let width = max_w.max(side).max(1);
    let height = max_h.max(area.div_ceil(width as u64) as u32).max(1);
    Size::new(width, height)
}

impl<K: Copy + PartialEq> PackingState<K> {
    /// Position of an already placed id.
    pub fn get(&self, id: K) -> Option<PixelRect> {
        self.placed.iter().find(|p| p.id == id).map(|p| p.rect)
    }

    /// Places every requested rectangle, keeping existing placements when
    /// there is room and repacking everything otherwise.
    ///
    /// Ids that are already placed keep their rectangle; zero-area requests
    /// get an empty rectangle and occupy no space. On error the state is left
    /// unchanged.
    ///
    /// # Arguments
    ///
    /// * `requests` - `(id, size)` pairs, sizes including any caller spacing.
    /// * `max_size` - Upper bound for either atlas dimension.
    pub fn pack(&mut self, requests: &[(K, Size)], max_size: u32) -> Result<PackOutcome<K>, AtlasError> {
        let mut fresh: Vec<(K, Size)> = Vec::new();
        for &(id, size) in requests {
            if size.is_empty() || self.get(id).is_some() || fresh.iter().any(|(f, _)| *f == id) {
                continue;
            }
            fresh.push((id, size));
        }

        let old_size = self.size;
        let mut repacked = false;
        if !fresh.is_empty() {
            let mut next = self.clone();
            let fits_in_place = fresh.iter().all(|&(id, size)| match next.try_place(size) {
                Some(rect) => {
                    next.placed.push(Placement { id, rect });
                    true
                }
                None => false,
            });

            if fits_in_place {
                trace!("AtlasPacker: Placed {} rectangles in place", fresh.len());
                *self = next;
            } else {
                repacked = !self.placed.is_empty();
                *self = self.repack(&fresh, max_size)?;
            }
        }

        let placements = requests
            .iter()
            .map(|&(id, size)| Placement {
                id,
                rect: if size.is_empty() {
                    PixelRect::default()
                } else {
                    self.get(id).unwrap_or_default()
                },
            })
            .collect();

        Ok(PackOutcome {
            placements,
            repacked,
            grew: self.size != old_size,
        })
    }

    fn repack(&self, fresh: &[(K, Size)], max_size: u32) -> Result<PackingState<K>, AtlasError> {
        let mut all: Vec<(K, Size)> = self
            .placed
            .iter()
            .map(|p| (p.id, p.rect.size()))
            .chain(fresh.iter().copied())
            .collect();
        all.sort_by(|a, b| b.1.height.cmp(&a.1.height).then(b.1.width.cmp(&a.1.width)));

        let sizes: Vec<Size> = all.iter().map(|(_, s)| *s).collect();
        let guess = initial_size(&sizes);
        let mut size = Size::new(
            guess.width.max(self.size.width),
            guess.height.max(self.size.height),
        );

        let mut attempts = 0;
        loop {
            if size.width > max_size || size.height > max_size {
                debug!(
                    "AtlasPacker: Giving up on {} rectangles at {:?} after {} attempts",
                    all.len(),
                    size,
                    attempts
                );
                return Err(AtlasError::AtlasFull {
                    requested: size,
                    max: max_size,
                });
            }
            attempts += 1;

            let mut attempt = PackingState::with_size(size);
            let failed = all.iter().find_map(|&(id, rect_size)| match attempt.try_place(rect_size) {
                Some(rect) => {
                    attempt.placed.push(Placement { id, rect });
                    None
                }
                None => Some(rect_size),
            });

            match failed {
                None => {
                    info!(
                        "AtlasPacker: Packed {} rectangles into {}x{} ({} attempts)",
                        all.len(),
                        size.width,
                        size.height,
                        attempts
                    );
                    return Ok(attempt);
                }
                Some(failed) => size = attempt.grown_size(failed),
            }
        }
    }
}
