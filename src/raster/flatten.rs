// src/raster/flatten.rs

//! Curve flattening: outline commands to closed polygon contours.

use crate::font::OutlineCommand;
use crate::geometry::Vec2;

/// Subdivision stops at this depth even if the curve is still not flat.
pub const MAX_SUBDIVISION_DEPTH: u32 = 16;

/// Polygon contours produced from one glyph outline.
///
/// `contour_lengths` holds the number of points of each contour; the lengths
/// sum to `points.len()`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlattenedOutline {
    pub points: Vec<Vec2>,
    pub contour_lengths: Vec<usize>,
}

impl FlattenedOutline {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Iterates the contours as point slices.
    pub fn contours(&self) -> impl Iterator<Item = &[Vec2]> {
        let mut start = 0;
        self.contour_lengths.iter().map(move |&len| {
            let contour = &self.points[start..start + len];
            start += len;
            contour
        })
    }

    /// Applies `f` to every point, keeping the contour structure.
    pub fn map_points(&self, f: impl Fn(Vec2) -> Vec2) -> FlattenedOutline {
        FlattenedOutline {
            points: self.points.iter().map(|&p| f(p)).collect(),
            contour_lengths: self.contour_lengths.clone(),
        }
    }
}

/// Converts outline commands into line-segment contours.
///
/// Curves are split at `t = 0.5` while the squared distance between the
/// curve midpoint and the chord midpoint exceeds `tolerance_sq`.
pub fn flatten(commands: &[OutlineCommand], tolerance_sq: f32) -> FlattenedOutline {
    let mut flattener = Flattener {
        out: FlattenedOutline::default(),
        tolerance_sq,
        run_start: 0,
        start: None,
        current: Vec2::ZERO,
    };

    for command in commands {
        match *command {
            OutlineCommand::MoveTo(p) => {
                flattener.finish_run();
                flattener.begin_run(p);
            }
            OutlineCommand::LineTo(p) => {
                flattener.ensure_run();
                flattener.push(p);
            }
            OutlineCommand::QuadTo(c, p) => {
                flattener.ensure_run();
                let p0 = flattener.current;
                flattener.quad(p0, c, p, 0);
            }
            OutlineCommand::CubicTo(c1, c2, p) => {
                flattener.ensure_run();
                let p0 = flattener.current;
                flattener.cubic(p0, c1, c2, p, 0);
            }
            OutlineCommand::Close => {
                if let Some(start) = flattener.start {
                    flattener.push(start);
                    flattener.finish_run();
                }
            }
        }
    }
    flattener.finish_run();
    flattener.out
}

struct Flattener {
    out: FlattenedOutline,
    tolerance_sq: f32,
    run_start: usize,
    start: Option<Vec2>,
    current: Vec2,
}

impl Flattener {
    fn begin_run(&mut self, p: Vec2) {
        self.run_start = self.out.points.len();
        self.start = Some(p);
        self.push(p);
    }

    // A Line or Curve with no open contour starts one at the pen position.
    fn ensure_run(&mut self) {
        if self.start.is_none() {
            let p = self.current;
            self.begin_run(p);
        }
    }

    fn finish_run(&mut self) {
        if self.start.take().is_none() {
            return;
        }
        let len = self.out.points.len() - self.run_start;
        if len > 0 {
            self.out.contour_lengths.push(len);
        }
    }

    fn push(&mut self, p: Vec2) {
        self.out.points.push(p);
        self.current = p;
    }

    fn quad(&mut self, p0: Vec2, c: Vec2, p1: Vec2, depth: u32) {
        // curve(0.5) - chord midpoint
        let error = (c * 2.0 - p0 - p1) * 0.25;
        if depth < MAX_SUBDIVISION_DEPTH && error.length_squared() > self.tolerance_sq {
            let p01 = p0.midpoint(c);
            let p12 = c.midpoint(p1);
            let mid = p01.midpoint(p12);
            self.quad(p0, p01, mid, depth + 1);
            self.quad(mid, p12, p1, depth + 1);
        } else {
            self.push(p1);
        }
    }

    fn cubic(&mut self, p0: Vec2, c1: Vec2, c2: Vec2, p1: Vec2, depth: u32) {
        let error = (c1 * 3.0 + c2 * 3.0 - p0 * 3.0 - p1 * 3.0) * 0.125;
        if depth < MAX_SUBDIVISION_DEPTH && error.length_squared() > self.tolerance_sq {
            let p01 = p0.midpoint(c1);
            let p12 = c1.midpoint(c2);
            let p23 = c2.midpoint(p1);
            let p012 = p01.midpoint(p12);
            let p123 = p12.midpoint(p23);
            let mid = p012.midpoint(p123);
            self.cubic(p0, p01, p012, mid, depth + 1);
            self.cubic(mid, p123, p23, p1, depth + 1);
        } else {
            self.push(p1);
        }
    }
}
