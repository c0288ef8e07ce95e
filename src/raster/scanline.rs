// src/raster/scanline.rs

//! Antialiased scan conversion with signed-area coverage accumulation.
//!
//! Each scanline accumulates the exact area covered by every active edge into
//! two float buffers: `scanline` holds the coverage inside the pixel an edge
//! crosses, `fill` carries the edge's height to every pixel to its right.
//! Integrating `fill` left to right and adding `scanline` yields the signed
//! winding coverage of each pixel.

use super::canvas::CoverageCanvas;
use super::flatten::FlattenedOutline;
use crate::geometry::Vec2;

/// A non-horizontal outline segment, normalized so `y0 < y1`.
#[derive(Debug, Clone, Copy)]
struct Edge {
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
    invert: bool,
}

/// An edge crossing the current scanline.
#[derive(Debug, Clone, Copy)]
struct ActiveEdge {
    /// x at the top of the current scanline, relative to the canvas origin.
    fx: f32,
    /// x change per scanline.
    fdx: f32,
    /// y change per unit of x, or 0 for vertical edges.
    fdy: f32,
    direction: f32,
    sy: f32,
    ey: f32,
}

impl ActiveEdge {
    fn new(edge: &Edge, off_x: i32, start_y: f32) -> Self {
        let dxdy = (edge.x1 - edge.x0) / (edge.y1 - edge.y0);
        Self {
            fx: edge.x0 + dxdy * (start_y - edge.y0) - off_x as f32,
            fdx: dxdy,
            fdy: if dxdy != 0.0 { 1.0 / dxdy } else { 0.0 },
            direction: if edge.invert { 1.0 } else { -1.0 },
            sy: edge.y0,
            ey: edge.y1,
        }
    }
}

/// Rasterizes `outline` into `canvas`.
///
/// Points are multiplied by `scale`; with `flip_y` the y axis is negated so a
/// y-up outline lands upright on the y-down canvas. The canvas origin selects
/// which part of pixel space is written. A zero-sized canvas is left untouched.
pub fn rasterize(outline: &FlattenedOutline, scale: f32, flip_y: bool, canvas: &mut CoverageCanvas) {
    if canvas.is_empty() || outline.is_empty() {
        return;
    }

    let mut edges = build_edges(outline, scale, flip_y);
    edges.sort_by(|a, b| a.y0.total_cmp(&b.y0));
    let terminator_y = (canvas.origin_y + canvas.height as i32) as f32 + 1.0;
    edges.push(Edge {
        x0: 0.0,
        y0: terminator_y,
        x1: 0.0,
        y1: terminator_y,
        invert: false,
    });

    sweep(&edges, canvas);
}

fn build_edges(outline: &FlattenedOutline, scale: f32, flip_y: bool) -> Vec<Edge> {
    let y_scale = if flip_y { -scale } else { scale };
    let to_pixels = |p: Vec2| Vec2::new(p.x * scale, p.y * y_scale);
    let mut edges = Vec::with_capacity(outline.points.len());

    for contour in outline.contours() {
        let Some(mut j) = contour.len().checked_sub(1) else {
            continue;
        };
        for k in 0..contour.len() {
            let (pj, pk) = (contour[j], contour[k]);
            j = k;
            if pj.y == pk.y {
                continue;
            }
            let upward = if flip_y { pj.y > pk.y } else { pj.y < pk.y };
            let (a, b) = if upward { (pj, pk) } else { (pk, pj) };
            let (a, b) = (to_pixels(a), to_pixels(b));
            edges.push(Edge {
                x0: a.x,
                y0: a.y,
                x1: b.x,
                y1: b.y,
                invert: upward,
            });
        }
    }
    edges
}

fn sweep(edges: &[Edge], canvas: &mut CoverageCanvas) {
    let width = canvas.width;
    let off_x = canvas.origin_x;
    let off_y = canvas.origin_y;

    let mut scanline = vec![0.0f32; width];
    let mut fill = vec![0.0f32; width + 1];
    let mut active: Vec<ActiveEdge> = Vec::new();
    let mut next = 0;

    for row in 0..canvas.height {
        let scan_top = (off_y + row as i32) as f32;
        let scan_bottom = scan_top + 1.0;

        scanline.fill(0.0);
        fill.fill(0.0);

        active.retain(|e| e.ey > scan_top);

        while edges[next].y0 <= scan_bottom {
            let edge = &edges[next];
            if edge.y0 != edge.y1 {
                let mut z = ActiveEdge::new(edge, off_x, scan_top);
                if row == 0 && off_y != 0 && z.ey < scan_top {
                    z.ey = scan_top;
                }
                active.push(z);
            }
            next += 1;
        }

        for edge in &active {
            fill_active_edge(&mut scanline, &mut fill, edge, scan_top);
        }

        let mut sum = 0.0f32;
        let out = canvas.row_mut(row);
        for (x, px) in out.iter_mut().enumerate() {
            sum += fill[x];
            let k = (scanline[x] + sum).abs() * 255.0 + 0.5;
            *px = k.min(255.0) as u8;
        }

        for edge in &mut active {
            edge.fx += edge.fdx;
        }
    }
}

/// Adds the coverage of the part of `e` between `(x0, y0)` and `(x1, y1)`
/// to pixel `x`, clipped to the edge's vertical extent.
fn handle_clipped_edge(
    buf: &mut [f32],
    x: usize,
    e: &ActiveEdge,
    mut x0: f32,
    mut y0: f32,
    mut x1: f32,
    mut y1: f32,
) {
    if y0 == y1 || y0 > e.ey || y1 < e.sy {
        return;
    }
    if y0 < e.sy {
        x0 += (x1 - x0) * (e.sy - y0) / (y1 - y0);
        y0 = e.sy;
    }
    if y1 > e.ey {
        x1 += (x1 - x0) * (e.ey - y1) / (y1 - y0);
        y1 = e.ey;
    }

    let xf = x as f32;
    if x0 <= xf && x1 <= xf {
        buf[x] += e.direction * (y1 - y0);
    } else if x0 >= xf + 1.0 && x1 >= xf + 1.0 {
        // entirely right of the pixel
    } else {
        // 1 - average x position inside the pixel
        buf[x] += e.direction * (y1 - y0) * (1.0 - ((x0 - xf) + (x1 - xf)) / 2.0);
    }
}

fn sized_trapezoid_area(height: f32, top_width: f32, bottom_width: f32) -> f32 {
    (top_width + bottom_width) / 2.0 * height
}

fn position_trapezoid_area(height: f32, tx0: f32, tx1: f32, bx0: f32, bx1: f32) -> f32 {
    sized_trapezoid_area(height, tx1 - tx0, bx1 - bx0)
}

fn sized_triangle_area(height: f32, width: f32) -> f32 {
    height * width / 2.0
}

fn fill_active_edge(scanline: &mut [f32], fill: &mut [f32], e: &ActiveEdge, y_top: f32) {
    let len = scanline.len();
    let lenf = len as f32;
    let y_bottom = y_top + 1.0;

    if e.fdx == 0.0 {
        let x0 = e.fx;
        if x0 < lenf {
            if x0 >= 0.0 {
                handle_clipped_edge(scanline, x0 as usize, e, x0, y_top, x0, y_bottom);
                handle_clipped_edge(fill, x0 as usize + 1, e, x0, y_top, x0, y_bottom);
            } else {
                handle_clipped_edge(fill, 0, e, x0, y_top, x0, y_bottom);
            }
        }
        return;
    }

    let mut x0 = e.fx;
    let mut dx = e.fdx;
    let mut xb = x0 + dx;
    let mut dy = e.fdy;

    // Segment endpoints clipped to this scanline.
    let (mut x_top, mut sy0) = if e.sy > y_top {
        (x0 + dx * (e.sy - y_top), e.sy)
    } else {
        (x0, y_top)
    };
    let (mut x_bottom, mut sy1) = if e.ey < y_bottom {
        (x0 + dx * (e.ey - y_top), e.ey)
    } else {
        (xb, y_bottom)
    };

    if x_top >= 0.0 && x_bottom >= 0.0 && x_top < lenf && x_bottom < lenf {
        if x_top as usize == x_bottom as usize {
            // Spans a single pixel.
            let x = x_top as usize;
            let height = (sy1 - sy0) * e.direction;
            scanline[x] += position_trapezoid_area(height, x_top, x as f32 + 1.0, x_bottom, x as f32 + 1.0);
            fill[x + 1] += height;
            return;
        }

        if x_top > x_bottom {
            // Mirror vertically so the edge runs down-right; the signed area is unchanged.
            sy0 = y_bottom - (sy0 - y_top);
            sy1 = y_bottom - (sy1 - y_top);
            std::mem::swap(&mut sy0, &mut sy1);
            std::mem::swap(&mut x_bottom, &mut x_top);
            dx = -dx;
            dy = -dy;
            std::mem::swap(&mut x0, &mut xb);
        }
        debug_assert!(dy >= 0.0 && dx >= 0.0);

        let x1 = x_top as usize;
        let x2 = x_bottom as usize;
        let mut y_crossing = y_top + dy * ((x1 + 1) as f32 - x0);
        let mut y_final = y_top + dy * (x2 as f32 - x0);

        if y_crossing > y_bottom {
            y_crossing = y_bottom;
        }

        let sign = e.direction;
        let mut area = sign * (y_crossing - sy0);

        // Triangle in the first pixel.
        scanline[x1] += sized_triangle_area(area, (x1 + 1) as f32 - x_top);

        if y_final > y_bottom {
            let denom = x2 - (x1 + 1);
            y_final = y_bottom;
            if denom != 0 {
                dy = (y_final - y_crossing) / denom as f32;
            }
        }

        // Interior pixels get the rectangle from the pixels to their left plus
        // a trapezoid sliding down by `dy` per pixel.
        let step = sign * dy;
        for px in scanline.iter_mut().take(x2).skip(x1 + 1) {
            *px += area + step / 2.0;
            area += step;
        }

        scanline[x2] += area
            + sign * position_trapezoid_area(sy1 - y_final, x2 as f32, x2 as f32 + 1.0, x_bottom, x2 as f32 + 1.0);
        fill[x2 + 1] += sign * (sy1 - sy0);
        return;
    }

    // The edge leaves the canvas horizontally: split it at every pixel
    // boundary and clip each piece separately.
    for x in 0..len {
        let y0 = y_top;
        let x1 = x as f32;
        let x2 = x as f32 + 1.0;
        let x3 = xb;
        let y3 = y_bottom;

        let y1 = (x1 - x0) / dx + y_top;
        let y2 = (x2 - x0) / dx + y_top;

        if x0 < x1 && x3 > x2 {
            handle_clipped_edge(scanline, x, e, x0, y0, x1, y1);
            handle_clipped_edge(scanline, x, e, x1, y1, x2, y2);
            handle_clipped_edge(scanline, x, e, x2, y2, x3, y3);
        } else if x3 < x1 && x0 > x2 {
            handle_clipped_edge(scanline, x, e, x0, y0, x2, y2);
            handle_clipped_edge(scanline, x, e, x2, y2, x1, y1);
            handle_clipped_edge(scanline, x, e, x1, y1, x3, y3);
        } else if (x0 < x1 && x3 > x1) || (x3 < x1 && x0 > x1) {
            handle_clipped_edge(scanline, x, e, x0, y0, x1, y1);
            handle_clipped_edge(scanline, x, e, x1, y1, x3, y3);
        } else if (x0 < x2 && x3 > x2) || (x3 < x2 && x0 > x2) {
            handle_clipped_edge(scanline, x, e, x0, y0, x2, y2);
            handle_clipped_edge(scanline, x, e, x2, y2, x3, y3);
        } else {
            handle_clipped_edge(scanline, x, e, x0, y0, x3, y3);
        }
    }
}
