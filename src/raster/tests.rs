use super::*;
use crate::font::{GlyphOutline, OutlineCommand};
use crate::geometry::Vec2;
use test_log::test;

fn polygon(points: &[(f32, f32)]) -> FlattenedOutline {
    FlattenedOutline {
        points: points.iter().map(|&(x, y)| Vec2::new(x, y)).collect(),
        contour_lengths: vec![points.len()],
    }
}

fn rect_commands(x0: f32, y0: f32, x1: f32, y1: f32) -> Vec<OutlineCommand> {
    vec![
        OutlineCommand::MoveTo(Vec2::new(x0, y0)),
        OutlineCommand::LineTo(Vec2::new(x1, y0)),
        OutlineCommand::LineTo(Vec2::new(x1, y1)),
        OutlineCommand::LineTo(Vec2::new(x0, y1)),
        OutlineCommand::Close,
    ]
}

// --- Flattening ---

#[test]
fn flatten_empty_outline_is_empty() {
    let flat = flatten(&[], 0.1);
    assert!(flat.is_empty());
    assert!(flat.contour_lengths.is_empty());
}

#[test]
fn flatten_close_reemits_start_point() {
    let flat = flatten(&rect_commands(0.0, 0.0, 10.0, 5.0), 0.1);
    assert_eq!(flat.contour_lengths, vec![5]);
    assert_eq!(flat.points.first(), flat.points.last());
}

#[test]
fn flatten_contour_lengths_sum_to_point_count() {
    let mut commands = rect_commands(0.0, 0.0, 10.0, 10.0);
    commands.extend([
        OutlineCommand::MoveTo(Vec2::new(2.0, 2.0)),
        OutlineCommand::QuadTo(Vec2::new(5.0, 9.0), Vec2::new(8.0, 2.0)),
        OutlineCommand::Close,
    ]);
    let flat = flatten(&commands, 0.01);
    assert_eq!(flat.contour_lengths.len(), 2);
    assert_eq!(flat.contour_lengths.iter().sum::<usize>(), flat.points.len());
    assert_eq!(flat.contours().count(), 2);
}

#[test]
fn flatten_subdivides_curves_until_flat() {
    let commands = [
        OutlineCommand::MoveTo(Vec2::new(0.0, 0.0)),
        OutlineCommand::QuadTo(Vec2::new(50.0, 100.0), Vec2::new(100.0, 0.0)),
    ];
    let coarse = flatten(&commands, 100.0);
    let fine = flatten(&commands, 0.01);
    assert!(fine.points.len() > coarse.points.len());

    // Every emitted point lies on the parabola y = 2x - x^2/50.
    for p in &fine.points {
        let expected = 2.0 * p.x - p.x * p.x / 50.0;
        assert!((p.y - expected).abs() < 1e-2, "{:?} off curve", p);
    }
}

#[test]
fn flatten_terminates_at_depth_cap() {
    let commands = [
        OutlineCommand::MoveTo(Vec2::new(0.0, 0.0)),
        OutlineCommand::CubicTo(Vec2::new(10.0, 10.0), Vec2::new(-10.0, 10.0), Vec2::new(1.0, 0.0)),
        OutlineCommand::LineTo(Vec2::new(0.0, -1.0)),
    ];
    // A negative tolerance never accepts a segment as flat.
    let flat = flatten(&commands, -1.0);
    let move_and_line_count = 2;
    assert!(flat.points.len() >= move_and_line_count);
    // 1 move + 2^16 curve segments + 1 line
    assert_eq!(flat.points.len(), 1 + (1 << flatten::MAX_SUBDIVISION_DEPTH) + 1);
    assert_eq!(flat.points.last(), Some(&Vec2::new(0.0, -1.0)));
}

#[test]
fn flatten_line_without_move_starts_at_pen() {
    let flat = flatten(
        &[
            OutlineCommand::LineTo(Vec2::new(4.0, 0.0)),
            OutlineCommand::LineTo(Vec2::new(4.0, 4.0)),
            OutlineCommand::Close,
        ],
        0.1,
    );
    assert_eq!(flat.points[0], Vec2::ZERO);
    assert_eq!(flat.contour_lengths, vec![4]);
}

// --- Rasterization ---

#[test]
fn rectangle_glyph_has_solid_interior_rows() {
    let outline = GlyphOutline::from_commands(rect_commands(0.0, 0.0, 10.0, 100.0), 12.0);
    let canvas = rasterize_glyph(&outline, 1.0, 0.35);

    assert_eq!(canvas.width, (10.0f32 * 1.0).ceil() as usize + 1);
    assert_eq!(canvas.height, 101);

    for y in 0..100 {
        let row = canvas.row(y);
        let run: Vec<usize> = (0..canvas.width).filter(|&x| row[x] == 255).collect();
        assert_eq!(run.len(), 10, "row {} = {:?}", y, row);
        assert_eq!(run.first(), Some(&0));
        assert_eq!(run.last(), Some(&9));
        assert_eq!(row[10], 0);
    }
    assert!(canvas.row(100).iter().all(|&v| v == 0));
}

#[test]
fn fractional_edges_produce_intermediate_coverage() {
    let outline = GlyphOutline::from_commands(rect_commands(0.5, 0.0, 10.5, 100.0), 12.0);
    let canvas = rasterize_glyph(&outline, 1.0, 0.35);
    assert_eq!(canvas.width, 11);

    let row = canvas.row(50);
    assert_eq!(row[0], 128);
    assert_eq!(row[10], 128);
    assert!(row[1..10].iter().all(|&v| v == 255));
}

#[test]
fn both_windings_produce_identical_coverage() {
    let diamond = [(10.0, 0.0), (20.0, 10.0), (10.0, 20.0), (0.0, 10.0)];
    let reversed: Vec<(f32, f32)> = diamond.iter().rev().copied().collect();

    let mut cw = CoverageCanvas::new(21, 21);
    let mut ccw = CoverageCanvas::new(21, 21);
    rasterize(&polygon(&diamond), 1.0, false, &mut cw);
    rasterize(&polygon(&reversed), 1.0, false, &mut ccw);

    assert_eq!(cw, ccw);
    assert_eq!(cw.get(10, 10), 255);
    assert_eq!(cw.get(0, 0), 0);
}

#[test]
fn reverse_wound_inner_contour_is_a_hole() {
    let outer = [(0.0, 0.0), (20.0, 0.0), (20.0, 20.0), (0.0, 20.0)];
    let inner = [(5.0, 5.0), (5.0, 15.0), (15.0, 15.0), (15.0, 5.0)];
    let outline = FlattenedOutline {
        points: outer
            .iter()
            .chain(inner.iter())
            .map(|&(x, y)| Vec2::new(x, y))
            .collect(),
        contour_lengths: vec![4, 4],
    };

    let mut canvas = CoverageCanvas::new(21, 21);
    rasterize(&outline, 1.0, false, &mut canvas);

    for y in 5..15 {
        for x in 5..15 {
            assert_eq!(canvas.get(x, y), 0, "hole pixel ({}, {})", x, y);
        }
    }
    for &(x, y) in &[(2, 2), (10, 2), (17, 10), (10, 17), (2, 18)] {
        assert_eq!(canvas.get(x, y), 255, "ring pixel ({}, {})", x, y);
    }
}

#[test]
fn overlapping_same_winding_saturates_instead_of_wrapping() {
    let square = [(0.0, 0.0), (8.0, 0.0), (8.0, 8.0), (0.0, 8.0)];
    let outline = FlattenedOutline {
        points: square
            .iter()
            .chain(square.iter())
            .map(|&(x, y)| Vec2::new(x, y))
            .collect(),
        contour_lengths: vec![4, 4],
    };
    let mut canvas = CoverageCanvas::new(9, 9);
    rasterize(&outline, 1.0, false, &mut canvas);
    assert_eq!(canvas.get(4, 4), 255);
}

#[test]
fn edges_outside_canvas_are_clipped() {
    // A thin sliver leaning far to the left of the canvas.
    let sliver = [(-30.0, 0.0), (6.0, 0.0), (6.0, 10.0), (-25.0, 10.0)];
    let mut canvas = CoverageCanvas::new(10, 10);
    rasterize(&polygon(&sliver), 1.0, false, &mut canvas);
    for y in 0..10 {
        assert_eq!(canvas.get(0, y), 255);
        assert_eq!(canvas.get(5, y), 255);
        assert_eq!(canvas.get(8, y), 0);
    }
}

#[test]
fn horizontal_only_contour_rasterizes_nothing() {
    let flat = polygon(&[(0.0, 3.0), (9.0, 3.0)]);
    let mut canvas = CoverageCanvas::new(10, 10);
    rasterize(&flat, 1.0, false, &mut canvas);
    assert!(canvas.data.iter().all(|&v| v == 0));
}

#[test]
fn empty_glyph_yields_empty_canvas() {
    let space = GlyphOutline::from_commands(Vec::new(), 25.0);
    let canvas = rasterize_glyph(&space, 1.0, 0.35);
    assert!(canvas.is_empty());

    let mut zero = CoverageCanvas::new(0, 5);
    rasterize(&polygon(&[(0.0, 0.0), (1.0, 4.0), (2.0, 0.0)]), 1.0, false, &mut zero);
    assert!(zero.data.is_empty());
}

#[test]
fn curved_glyph_coverage_is_bounded_and_nonempty() {
    let commands = vec![
        OutlineCommand::MoveTo(Vec2::new(0.0, 0.0)),
        OutlineCommand::QuadTo(Vec2::new(0.0, 40.0), Vec2::new(20.0, 40.0)),
        OutlineCommand::QuadTo(Vec2::new(40.0, 40.0), Vec2::new(40.0, 0.0)),
        OutlineCommand::Close,
    ];
    let outline = GlyphOutline::from_commands(commands, 45.0);
    let canvas = rasterize_glyph(&outline, 0.5, 0.35);
    assert_eq!(canvas.width, 21);
    assert_eq!(canvas.height, 21);
    let filled = canvas.data.iter().filter(|&&v| v == 255).count();
    assert!(filled > 100);
    assert!(canvas.data.iter().any(|&v| v > 0 && v < 255));
}
