//! Shared helpers for the terrain-shaping stages.
//!
//! Bilinear sampling and gradients, the circular erosion brush, the
//! percentile threshold used by the valley and softening stages, and
//! smoothstep interpolation.

use crate::grid::Grid;

/// Height and gradient at a fractional position, by bilinear interpolation
/// over the containing cell. The gradient points toward steepest ascent.
pub fn height_and_gradient(map: &Grid, x: f32, y: f32) -> (f32, f32, f32) {
    let x0 = x as usize;
    let y0 = y as usize;
    let x1 = (x0 + 1).min(map.width() - 1);
    let y1 = (y0 + 1).min(map.height() - 1);

    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let h00 = map.get(x0, y0);
    let h10 = map.get(x1, y0);
    let h01 = map.get(x0, y1);
    let h11 = map.get(x1, y1);

    let h0 = h00 * (1.0 - fx) + h10 * fx;
    let h1 = h01 * (1.0 - fx) + h11 * fx;
    let height = h0 * (1.0 - fy) + h1 * fy;

    let grad_x = (h10 - h00) * (1.0 - fy) + (h11 - h01) * fy;
    let grad_y = (h01 - h00) * (1.0 - fx) + (h11 - h10) * fx;

    (height, grad_x, grad_y)
}

/// Precomputed circular brush with inverse-linear falloff weights.
/// Offsets outside the radius are excluded.
pub fn falloff_brush(radius: i32) -> Vec<(i32, i32, f32)> {
    let mut brush = Vec::new();
    let r = radius as f32;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let dist = ((dx * dx + dy * dy) as f32).sqrt();
            if dist <= r {
                let weight = (1.0 - dist / r).max(0.0);
                brush.push((dx, dy, weight));
            }
        }
    }
    brush
}

/// Elevation at the given quantile of the grid, found with a partial
/// selection rather than a full sort.
pub fn percentile_threshold(map: &Grid, quantile: f32) -> f32 {
    let data = map.as_slice();
    let mut sorted = data.to_vec();
    let idx = ((sorted.len() as f32 * quantile) as usize).min(sorted.len() - 1);
    let (_, nth, _) = sorted.select_nth_unstable_by(idx, f32::total_cmp);
    *nth
}

#[inline]
pub fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bilinear_matches_cell_corners() {
        let mut map = Grid::new(4, 4).unwrap();
        map.set(1, 1, 0.8);
        let (h, _, _) = height_and_gradient(&map, 1.0, 1.0);
        assert!((h - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_bilinear_interpolates_between_cells() {
        let mut map = Grid::new(4, 4).unwrap();
        map.set(0, 0, 0.0);
        map.set(1, 0, 1.0);
        let (h, gx, _) = height_and_gradient(&map, 0.5, 0.0);
        assert!((h - 0.5).abs() < 1e-6);
        assert!((gx - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_brush_weights_peak_at_center() {
        let brush = falloff_brush(3);
        let center = brush.iter().find(|(dx, dy, _)| *dx == 0 && *dy == 0).unwrap();
        assert!((center.2 - 1.0).abs() < 1e-6);
        for &(_, _, w) in &brush {
            assert!((0.0..=1.0).contains(&w));
        }
    }

    #[test]
    fn test_percentile_threshold_median() {
        let mut map = Grid::new(4, 1).unwrap();
        map.set(0, 0, 0.1);
        map.set(1, 0, 0.2);
        map.set(2, 0, 0.3);
        map.set(3, 0, 0.4);
        let t = percentile_threshold(&map, 0.5);
        assert_eq!(t, 0.3);
    }
}
