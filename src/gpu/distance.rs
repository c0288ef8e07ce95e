// src/gpu/distance.rs

//! Exact squared Euclidean distance transform (Felzenszwalb & Huttenlocher).
//!
//! Used by the headless device to evaluate distance-field passes in linear time
//! instead of a per-texel radius search. Results are identical to searching an
//! unbounded radius; callers clamp to their spread.

const INF: f64 = 1e20;

/// For every cell, the squared distance to the nearest cell where `feature`
/// is true. Cells with no feature anywhere in the grid keep a huge value.
pub fn squared_distances(width: usize, height: usize, feature: impl Fn(usize, usize) -> bool) -> Vec<f64> {
    let mut grid: Vec<f64> = (0..width * height)
        .map(|i| if feature(i % width, i / width) { 0.0 } else { INF })
        .collect();
    if width == 0 || height == 0 {
        return grid;
    }

    let n = width.max(height);
    let mut f = vec![0.0; n];
    let mut d = vec![0.0; n];
    let mut v = vec![0usize; n];
    let mut z = vec![0.0; n + 1];

    for x in 0..width {
        for y in 0..height {
            f[y] = grid[y * width + x];
        }
        transform_1d(&f[..height], &mut d[..height], &mut v, &mut z);
        for y in 0..height {
            grid[y * width + x] = d[y];
        }
    }
    for y in 0..height {
        let row = &mut grid[y * width..(y + 1) * width];
        f[..width].copy_from_slice(row);
        transform_1d(&f[..width], &mut d[..width], &mut v, &mut z);
        row.copy_from_slice(&d[..width]);
    }
    grid
}

/// Lower envelope of the parabolas rooted at each `f[q]`.
fn transform_1d(f: &[f64], d: &mut [f64], v: &mut [usize], z: &mut [f64]) {
    let n = f.len();
    let mut k = 0;
    v[0] = 0;
    z[0] = -INF;
    z[1] = INF;

    let intersect = |q: usize, p: usize| {
        let (qf, pf) = (q as f64, p as f64);
        ((f[q] + qf * qf) - (f[p] + pf * pf)) / (2.0 * qf - 2.0 * pf)
    };

    for q in 1..n {
        let mut s = intersect(q, v[k]);
        // z[0] is -INF, so this never pops past the first parabola.
        while s <= z[k] {
            k -= 1;
            s = intersect(q, v[k]);
        }
        k += 1;
        v[k] = q;
        z[k] = s;
        z[k + 1] = INF;
    }

    k = 0;
    for (q, out) in d.iter_mut().enumerate() {
        let qf = q as f64;
        while z[k + 1] < qf {
            k += 1;
        }
        let p = v[k] as f64;
        *out = (qf - p) * (qf - p) + f[v[k]];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_feature_gives_euclidean_distances() {
        let dist = squared_distances(5, 5, |x, y| x == 2 && y == 2);
        assert_eq!(dist[2 * 5 + 2], 0.0);
        assert_eq!(dist[2 * 5 + 4], 4.0);
        assert_eq!(dist[0], 8.0);
    }

    #[test]
    fn matches_brute_force() {
        let feature = |x: usize, y: usize| (x * 7 + y * 3) % 11 == 0;
        let (w, h) = (13, 9);
        let dist = squared_distances(w, h, feature);
        for y in 0..h {
            for x in 0..w {
                let mut best = f64::MAX;
                for fy in 0..h {
                    for fx in 0..w {
                        if feature(fx, fy) {
                            let dx = fx as f64 - x as f64;
                            let dy = fy as f64 - y as f64;
                            best = best.min(dx * dx + dy * dy);
                        }
                    }
                }
                assert_eq!(dist[y * w + x], best, "({}, {})", x, y);
            }
        }
    }

    #[test]
    fn no_features_stay_far() {
        let dist = squared_distances(3, 2, |_, _| false);
        assert!(dist.iter().all(|&d| d >= 1e19));
    }
}
