//! Valley flattening: pulls low-lying terrain toward its local valley
//! floor, then smooths the valley boundaries so walls meet floors
//! without a visible seam.

use std::collections::HashMap;

use crate::executor::{ExecutorError, ParallelExecutor};
use crate::grid::{Grid, ScratchGrids};
use crate::stages::utils::percentile_threshold;

const SEARCH_RADIUS: i32 = 10;
const SMOOTH_RADIUS: i32 = 10;
const TRANSITION_ZONE: i32 = 20;
const BOUNDARY_RADIUS: i32 = 25;
const SMOOTHING_ROUNDS: u32 = 4;

pub fn apply(
    map: &mut Grid,
    strength: f32,
    pool: &ParallelExecutor,
    scratch: &mut ScratchGrids,
) -> Result<(), ExecutorError> {
    if strength < 0.01 {
        return Ok(());
    }

    let threshold = threshold_for(map, strength);
    let floors = detect_valley_floors(map, threshold);
    if floors.is_empty() {
        return Ok(());
    }

    flatten(map, &floors, threshold, strength, pool, scratch)?;
    smooth_transitions(map, &floors, pool, scratch)
}

/// Flattening affects the lower 35-70% of the terrain; stronger
/// settings reach higher.
pub fn threshold_for(map: &Grid, strength: f32) -> f32 {
    percentile_threshold(map, 0.35 + strength * 0.35)
}

/// For every below-threshold pixel, the lowest below-threshold elevation
/// within the search radius. Keyed by row-major index.
fn detect_valley_floors(map: &Grid, threshold: f32) -> HashMap<usize, f32> {
    let width = map.width();
    let height = map.height();
    let mut floors = HashMap::new();

    for y in 0..height {
        for x in 0..width {
            let current = map.get(x, y);
            if current >= threshold {
                continue;
            }

            let mut min_neighbor = current;
            for dy in -SEARCH_RADIUS..=SEARCH_RADIUS {
                for dx in -SEARCH_RADIUS..=SEARCH_RADIUS {
                    let nx = (x as i32 + dx).clamp(0, width as i32 - 1) as usize;
                    let ny = (y as i32 + dy).clamp(0, height as i32 - 1) as usize;
                    let neighbor = map.get(nx, ny);
                    if neighbor < threshold {
                        min_neighbor = min_neighbor.min(neighbor);
                    }
                }
            }

            floors.insert(y * width + x, min_neighbor);
        }
    }

    floors
}

fn flatten(
    map: &mut Grid,
    floors: &HashMap<usize, f32>,
    threshold: f32,
    strength: f32,
    pool: &ParallelExecutor,
    scratch: &mut ScratchGrids,
) -> Result<(), ExecutorError> {
    let width = map.width();
    let height = map.height();

    let mut temp = scratch.acquire();
    temp.copy_from(map);

    {
        let source = &*map;
        let writer = temp.row_writer();
        pool.parallel_range(
            0,
            height,
            |y| {
                for x in 0..width {
                    let idx = y * width + x;
                    let current = source.get(x, y);

                    if current < threshold {
                        if let Some(&floor) = floors.get(&idx) {
                            let depth = (threshold - current) / threshold;
                            // Base 85% pull, up to 15% more with depth.
                            let factor = strength * (0.85 + depth * 0.15);
                            writer.set(x, y, current * (1.0 - factor) + floor * factor);
                        }
                    }
                }
            },
            8,
        )?;
    }

    map.copy_from(&temp);
    scratch.release(temp);
    Ok(())
}

/// Distance to the nearest valley/non-valley boundary, or infinity if no
/// boundary lies within the search radius.
fn boundary_distance(
    floors: &HashMap<usize, f32>,
    width: usize,
    height: usize,
    x: usize,
    y: usize,
) -> f32 {
    let mut min_dist = f32::INFINITY;
    let is_valley = floors.contains_key(&(y * width + x));

    for dy in -BOUNDARY_RADIUS..=BOUNDARY_RADIUS {
        for dx in -BOUNDARY_RADIUS..=BOUNDARY_RADIUS {
            let nx = (x as i32 + dx).clamp(0, width as i32 - 1) as usize;
            let ny = (y as i32 + dy).clamp(0, height as i32 - 1) as usize;

            let neighbor_is_valley = floors.contains_key(&(ny * width + nx));
            if is_valley != neighbor_is_valley {
                let dist = ((dx * dx + dy * dy) as f32).sqrt();
                min_dist = min_dist.min(dist);
            }
        }
    }

    min_dist
}

fn smooth_transitions(
    map: &mut Grid,
    floors: &HashMap<usize, f32>,
    pool: &ParallelExecutor,
    scratch: &mut ScratchGrids,
) -> Result<(), ExecutorError> {
    let width = map.width();
    let height = map.height();

    let mut temp = scratch.acquire();

    for _ in 0..SMOOTHING_ROUNDS {
        temp.copy_from(map);

        {
            let source = &*map;
            let writer = temp.row_writer();
            pool.parallel_range(
                0,
                height,
                |y| {
                    for x in 0..width {
                        let dist_to_edge = boundary_distance(floors, width, height, x, y);
                        if dist_to_edge >= TRANSITION_ZONE as f32 {
                            continue;
                        }

                        let mut sum = 0.0f32;
                        let mut weight_sum = 0.0f32;
                        for dy in -SMOOTH_RADIUS..=SMOOTH_RADIUS {
                            for dx in -SMOOTH_RADIUS..=SMOOTH_RADIUS {
                                let dist = ((dx * dx + dy * dy) as f32).sqrt();
                                if dist > SMOOTH_RADIUS as f32 {
                                    continue;
                                }

                                let nx = (x as i32 + dx).clamp(0, width as i32 - 1) as usize;
                                let ny = (y as i32 + dy).clamp(0, height as i32 - 1) as usize;

                                let r = SMOOTH_RADIUS as f32;
                                let weight = (-(dist * dist) / (r * r * 0.5)).exp();
                                sum += source.get(nx, ny) * weight;
                                weight_sum += weight;
                            }
                        }

                        let smoothed = sum / weight_sum;
                        let blend = (1.0 - dist_to_edge / TRANSITION_ZONE as f32) * 0.95;
                        writer.set(x, y, source.get(x, y) * (1.0 - blend) + smoothed * blend);
                    }
                },
                4,
            )?;
        }

        map.copy_from(&temp);
    }

    scratch.release(temp);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> ParallelExecutor {
        ParallelExecutor::with_threads(4).unwrap()
    }

    fn basin_grid(n: usize) -> Grid {
        let mut map = Grid::new(n, n).unwrap();
        for y in 0..n {
            for x in 0..n {
                let cx = x as f32 / n as f32 - 0.5;
                let cy = y as f32 / n as f32 - 0.5;
                map.set(x, y, (cx * cx + cy * cy).sqrt() * 1.5 + 0.05);
            }
        }
        map
    }

    #[test]
    fn test_low_strength_is_noop() {
        let mut map = basin_grid(48);
        let before = map.clone();
        apply(&mut map, 0.005, &pool(), &mut ScratchGrids::new(48, 48)).unwrap();
        assert_eq!(before, map);
    }

    #[test]
    fn test_flattening_reduces_basin_relief() {
        let mut map = basin_grid(64);
        let threshold = threshold_for(&map, 0.8);
        let relief_before = basin_relief(&map, threshold);

        apply(&mut map, 0.8, &pool(), &mut ScratchGrids::new(64, 64)).unwrap();

        let relief_after = basin_relief(&map, threshold);
        assert!(relief_after < relief_before);
    }

    fn basin_relief(map: &Grid, threshold: f32) -> f32 {
        let mut lo = f32::INFINITY;
        let mut hi = f32::NEG_INFINITY;
        for &h in map.as_slice() {
            if h < threshold {
                lo = lo.min(h);
                hi = hi.max(h);
            }
        }
        hi - lo
    }

    #[test]
    fn test_threshold_tracks_strength() {
        let map = basin_grid(48);
        assert!(threshold_for(&map, 0.2) < threshold_for(&map, 0.9));
    }
}
