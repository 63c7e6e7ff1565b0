//! Valley connectivity: locates disconnected low-lying regions and
//! carves corridors between the closest pairs so valleys form a
//! traversable network.

use std::collections::{HashSet, VecDeque};

use crate::grid::Grid;
use crate::stages::utils::smoothstep;

#[derive(Clone, Copy, Debug)]
struct Point {
    x: i32,
    y: i32,
}

struct Region {
    points: Vec<Point>,
}

struct Connection {
    from: Point,
    to: Point,
    distance: f32,
}

const SCAN_STEP: usize = 4;
const FILL_STEP: i32 = 2;
const MAX_REGION_SIZE: usize = 500;
const MIN_REGION_SIZE: usize = 50;
const MAX_REGIONS: usize = 6;

pub fn apply(map: &mut Grid, connectivity: f32, valley_threshold: f32) {
    if connectivity < 0.01 {
        return;
    }

    let mut regions = identify_valley_regions(map, valley_threshold);
    if regions.len() <= 1 {
        return;
    }

    regions.sort_by(|a, b| b.points.len().cmp(&a.points.len()));
    regions.truncate(MAX_REGIONS);

    let connections = find_connections(&regions, map);

    // 8 corridors at full strength, 8-20 px wide.
    let max_connections = ((connectivity * 8.0) as usize).min(connections.len());
    let base_width = 8.0 + connectivity * 12.0;

    for conn in connections.iter().take(max_connections) {
        create_corridor(map, conn.from, conn.to, base_width, valley_threshold);
    }
}

fn identify_valley_regions(map: &Grid, threshold: f32) -> Vec<Region> {
    let width = map.width();
    let height = map.height();

    let mut regions = Vec::new();
    let mut visited = HashSet::new();

    let mut y = 0;
    while y < height {
        let mut x = 0;
        while x < width {
            let idx = y * width + x;
            if !visited.contains(&idx) && map.get(x, y) < threshold {
                let region = flood_fill(map, x as i32, y as i32, threshold, &mut visited);
                if region.points.len() > MIN_REGION_SIZE {
                    regions.push(region);
                }
            }
            x += SCAN_STEP;
        }
        y += SCAN_STEP;
    }

    regions
}

/// Coarse BFS over a stride-2 lattice, capped for performance.
fn flood_fill(
    map: &Grid,
    start_x: i32,
    start_y: i32,
    threshold: f32,
    visited: &mut HashSet<usize>,
) -> Region {
    let width = map.width() as i32;
    let height = map.height() as i32;

    let mut region = Region { points: Vec::new() };
    let mut queue = VecDeque::new();

    queue.push_back(Point {
        x: start_x,
        y: start_y,
    });
    visited.insert((start_y * width + start_x) as usize);

    while let Some(current) = queue.pop_front() {
        if region.points.len() >= MAX_REGION_SIZE {
            break;
        }
        region.points.push(current);

        let neighbors = [
            (current.x - FILL_STEP, current.y),
            (current.x + FILL_STEP, current.y),
            (current.x, current.y - FILL_STEP),
            (current.x, current.y + FILL_STEP),
        ];

        for (nx, ny) in neighbors {
            if nx < 0 || nx >= width || ny < 0 || ny >= height {
                continue;
            }
            let n_idx = (ny * width + nx) as usize;
            if !visited.contains(&n_idx) && map.get(nx as usize, ny as usize) < threshold {
                visited.insert(n_idx);
                queue.push_back(Point { x: nx, y: ny });
            }
        }
    }

    region
}

/// Closest point pairs between every region pair, sampled roughly 20
/// points per side, kept when within 40% of the map width.
fn find_connections(regions: &[Region], map: &Grid) -> Vec<Connection> {
    let mut connections = Vec::new();

    for i in 0..regions.len() {
        for j in i + 1..regions.len() {
            let a_points = &regions[i].points;
            let b_points = &regions[j].points;

            let sample = 20usize.min(a_points.len());
            let step_a = (a_points.len() / sample).max(1);
            let step_b = (b_points.len() / sample).max(1);

            let mut min_dist = f32::INFINITY;
            let mut closest = None;

            for pa in a_points.iter().step_by(step_a) {
                for pb in b_points.iter().step_by(step_b) {
                    let dx = (pa.x - pb.x) as f32;
                    let dy = (pa.y - pb.y) as f32;
                    let dist = (dx * dx + dy * dy).sqrt();
                    if dist < min_dist {
                        min_dist = dist;
                        closest = Some((*pa, *pb));
                    }
                }
            }

            if let Some((from, to)) = closest {
                if min_dist < map.width() as f32 * 0.4 {
                    connections.push(Connection {
                        from,
                        to,
                        distance: min_dist,
                    });
                }
            }
        }
    }

    connections.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    connections
}

fn create_corridor(map: &mut Grid, from: Point, to: Point, width: f32, threshold: f32) {
    let dx = (to.x - from.x) as f32;
    let dy = (to.y - from.y) as f32;
    let distance = (dx * dx + dy * dy).sqrt();

    let steps = ((distance / 3.0) as i32).max(2);

    for i in 0..=steps {
        let t = i as f32 / steps as f32;
        let x = (from.x as f32 + dx * t) as i32;
        let y = (from.y as f32 + dy * t) as i32;
        flatten_corridor_point(map, x, y, width / 2.0, threshold);
    }
}

fn flatten_corridor_point(map: &mut Grid, cx: i32, cy: i32, radius: f32, threshold: f32) {
    let map_width = map.width() as i32;
    let map_height = map.height() as i32;
    let i_radius = radius.ceil() as i32;

    // Corridors lower terrain toward a floor below the valley threshold,
    // never raise it.
    let target = threshold * 0.7;

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

            let falloff = smoothstep(1.0 - dist / radius);
            let (ux, uy) = (x as usize, y as usize);
            let current = map.get(ux, uy);
            if current > target {
                let blend = falloff * 0.8;
                map.set(ux, uy, current * (1.0 - blend) + target * blend);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two low basins separated by a high ridge.
    fn twin_basin_grid(n: usize) -> Grid {
        let mut map = Grid::new(n, n).unwrap();
        map.fill(0.8);
        for y in n / 4..3 * n / 4 {
            for x in n / 8..3 * n / 8 {
                map.set(x, y, 0.1);
            }
            for x in 5 * n / 8..7 * n / 8 {
                map.set(x, y, 0.1);
            }
        }
        map
    }

    #[test]
    fn test_low_connectivity_is_noop() {
        let mut map = twin_basin_grid(96);
        let before = map.clone();
        apply(&mut map, 0.005, 0.4);
        assert_eq!(before, map);
    }

    #[test]
    fn test_corridor_lowers_the_ridge() {
        let mut map = twin_basin_grid(96);
        let before = map.clone();
        apply(&mut map, 1.0, 0.4);

        // Some part of the ridge separating the basins must be carved.
        let mut carved = 0;
        for y in 0..96 {
            for x in 36..60 {
                if map.get(x, y) < before.get(x, y) - 1e-3 {
                    carved += 1;
                }
            }
        }
        assert!(carved > 0);
    }

    #[test]
    fn test_never_raises_terrain() {
        let mut map = twin_basin_grid(96);
        let before = map.clone();
        apply(&mut map, 1.0, 0.4);
        for (a, b) in before.as_slice().iter().zip(map.as_slice()) {
            assert!(*b <= *a + 1e-6);
        }
    }

    #[test]
    fn test_single_region_untouched() {
        let mut map = Grid::new(96, 96).unwrap();
        map.fill(0.1);
        let before = map.clone();
        apply(&mut map, 1.0, 0.4);
        assert_eq!(before, map);
    }
}
