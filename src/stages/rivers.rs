//! Simple rivers: straight-line channels carved from the nearest map
//! edge to low interior valleys.

use crate::grid::Grid;

#[derive(Clone, Copy, Debug)]
struct Point {
    x: i32,
    y: i32,
    height: f32,
}

pub fn apply(map: &mut Grid, intensity: f32, river_width: f32) {
    if intensity < 0.01 {
        return;
    }

    // 3 to 11 rivers depending on intensity.
    let num_rivers = (intensity * 8.0) as usize + 3;
    let targets = find_lowest_valleys(map, num_rivers);

    for target in &targets {
        carve_river_from_edge(map, target, intensity, river_width);
    }
}

/// Well-spaced low points of the interior, lowest first.
fn find_lowest_valleys(map: &Grid, count: usize) -> Vec<Point> {
    let width = map.width();
    let height = map.height();

    let margin = (width as f32 * 0.15) as usize;
    const STEP: usize = 8;

    let mut valleys = Vec::new();
    let mut y = margin;
    while y < height.saturating_sub(margin) {
        let mut x = margin;
        while x < width.saturating_sub(margin) {
            let h = map.get(x, y);
            if h < 0.35 {
                valleys.push(Point {
                    x: x as i32,
                    y: y as i32,
                    height: h,
                });
            }
            x += STEP;
        }
        y += STEP;
    }

    valleys.sort_by(|a, b| a.height.total_cmp(&b.height));

    let min_spacing = width as f32 * 0.2;
    let mut selected: Vec<Point> = Vec::new();
    for valley in valleys {
        if selected.len() >= count {
            break;
        }
        let too_close = selected.iter().any(|s| {
            let dx = (valley.x - s.x) as f32;
            let dy = (valley.y - s.y) as f32;
            (dx * dx + dy * dy).sqrt() < min_spacing
        });
        if !too_close {
            selected.push(valley);
        }
    }
    selected
}

fn carve_river_from_edge(map: &mut Grid, target: &Point, intensity: f32, river_width: f32) {
    let width = map.width() as i32;
    let height = map.height() as i32;

    let edges = [
        (0, target.y),
        (width - 1, target.y),
        (target.x, 0),
        (target.x, height - 1),
    ];

    let mut closest = edges[0];
    let mut min_dist = f32::INFINITY;
    for &(ex, ey) in &edges {
        let dx = (ex - target.x) as f32;
        let dy = (ey - target.y) as f32;
        let dist = (dx * dx + dy * dy).sqrt();
        if dist < min_dist {
            min_dist = dist;
            closest = (ex, ey);
        }
    }

    carve_path(map, closest, (target.x, target.y), intensity, river_width);
}

fn carve_path(
    map: &mut Grid,
    start: (i32, i32),
    end: (i32, i32),
    intensity: f32,
    river_width: f32,
) {
    let dx = (end.0 - start.0) as f32;
    let dy = (end.1 - start.1) as f32;
    let distance = (dx * dx + dy * dy).sqrt();

    let steps = (distance / 2.0) as i32;
    if steps < 2 {
        return;
    }

    let base_width = river_width * 800.0;

    for i in 0..=steps {
        let t = i as f32 / steps as f32;
        let smooth_t = t * t * (3.0 - 2.0 * t);

        let x = (start.0 as f32 + dx * smooth_t) as i32;
        let y = (start.1 as f32 + dy * smooth_t) as i32;

        // Width holds near constant, depth grows toward the valley.
        let width = base_width * (0.9 + t * 0.1);
        let depth = 0.5 + t * 0.5;

        carve_segment(map, x, y, width, depth, intensity);
    }
}

fn carve_segment(map: &mut Grid, cx: i32, cy: i32, radius: f32, depth: f32, intensity: f32) {
    let map_width = map.width() as i32;
    let map_height = map.height() as i32;
    let i_radius = radius.max(2.0) as i32;

    for dy in -i_radius..=i_radius {
        for dx in -i_radius..=i_radius {
            let x = cx + dx;
            let y = cy + dy;
            if x < 0 || x >= map_width || y < 0 || y >= map_height {
                continue;
            }

            let dist = ((dx * dx + dy * dy) as f32).sqrt();
            if dist > radius {
                continue;
            }

            let falloff = (1.0 - dist / radius).powf(1.8);
            let carving = intensity * 0.12 * falloff * depth;

            let (ux, uy) = (x as usize, y as usize);
            map.set(ux, uy, (map.get(ux, uy) - carving).max(0.0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valley_grid(n: usize) -> Grid {
        let mut map = Grid::new(n, n).unwrap();
        map.fill(0.6);
        // Low basin in the interior.
        for y in n / 3..n / 2 {
            for x in n / 3..n / 2 {
                map.set(x, y, 0.2);
            }
        }
        map
    }

    #[test]
    fn test_low_intensity_is_noop() {
        let mut map = valley_grid(64);
        let before = map.clone();
        apply(&mut map, 0.005, 0.02);
        assert_eq!(before, map);
    }

    #[test]
    fn test_rivers_only_lower_terrain() {
        let mut map = valley_grid(64);
        let before = map.clone();
        apply(&mut map, 0.5, 0.02);
        for (a, b) in before.as_slice().iter().zip(map.as_slice()) {
            assert!(*b <= *a + 1e-6);
        }
    }

    #[test]
    fn test_carving_stays_nonnegative() {
        let mut map = Grid::new(64, 64).unwrap();
        map.fill(0.01);
        apply(&mut map, 1.0, 0.05);
        for &h in map.as_slice() {
            assert!(h >= 0.0);
        }
    }

    #[test]
    fn test_flat_high_terrain_untouched() {
        // No point below the valley threshold, so nothing is carved.
        let mut map = Grid::new(64, 64).unwrap();
        map.fill(0.9);
        let before = map.clone();
        apply(&mut map, 0.8, 0.02);
        assert_eq!(before, map);
    }
}
