//! Thermal erosion (talus-angle material transfer).
//!
//! Slopes steeper than the angle of repose shed material onto their
//! neighbors, building scree below cliffs. Each pass reads a source
//! buffer and writes a destination buffer (double-buffered, ping-ponged
//! across passes) so a pass never observes its own writes.
//!
//! The per-cell update is expressed as a gather: every destination cell
//! computes its own outflow plus the inflow from its eight neighbors,
//! all from the source buffer, which makes the row-parallel pass
//! race-free.

use crate::executor::{ExecutorError, ParallelExecutor};
use crate::grid::{Grid, ScratchGrids};

/// Moore neighborhood offsets with center distances (diagonals sqrt 2).
const NEIGHBORS: [(i32, i32, f32); 8] = [
    (-1, -1, 1.414),
    (0, -1, 1.0),
    (1, -1, 1.414),
    (-1, 0, 1.0),
    (1, 0, 1.0),
    (-1, 1, 1.414),
    (0, 1, 1.0),
    (1, 1, 1.414),
];

#[derive(Clone, Debug)]
pub struct ThermalParams {
    /// Angle of repose in radians.
    pub talus_angle: f32,
    /// Material transfer rate (0.0-1.0).
    pub thermal_rate: f32,
    /// Number of erosion passes.
    pub iterations: u32,
}

impl Default for ThermalParams {
    fn default() -> Self {
        Self {
            talus_angle: 0.7,
            thermal_rate: 0.5,
            iterations: 30,
        }
    }
}

pub fn apply(
    map: &mut Grid,
    params: &ThermalParams,
    pool: &ParallelExecutor,
    scratch: &mut ScratchGrids,
) -> Result<(), ExecutorError> {
    if params.iterations == 0 || params.thermal_rate < 0.01 {
        return Ok(());
    }

    let mut work = scratch.acquire();

    for iter in 0..params.iterations {
        if iter % 2 == 0 {
            thermal_pass(map, &mut work, params, pool)?;
        } else {
            thermal_pass(&work, map, params, pool)?;
        }
    }

    // Odd pass counts leave the result in the work buffer.
    if params.iterations % 2 == 1 {
        map.copy_from(&work);
    }

    scratch.release(work);
    Ok(())
}

/// Material cell (x, y) sends to its neighbor at (dx, dy), computed from
/// the source buffer only. Border cells never shed material.
#[inline]
fn transfer_out(
    source: &Grid,
    x: usize,
    y: usize,
    dx: i32,
    dy: i32,
    distance: f32,
    params: &ThermalParams,
    talus_tan: f32,
) -> f32 {
    let width = source.width();
    let height = source.height();
    if x == 0 || x >= width - 1 || y == 0 || y >= height - 1 {
        return 0.0;
    }

    let nx = x as i32 + dx;
    let ny = y as i32 + dy;
    if nx < 0 || nx >= width as i32 || ny < 0 || ny >= height as i32 {
        return 0.0;
    }

    let current = source.get(x, y);
    let neighbor = source.get(nx as usize, ny as usize);
    let height_diff = current - neighbor;

    let slope_angle = (height_diff / distance).atan();
    if slope_angle <= params.talus_angle {
        return 0.0;
    }

    let excess = height_diff - talus_tan * distance;
    let transfer = excess * params.thermal_rate;
    transfer.min(height_diff * 0.5)
}

fn thermal_pass(
    source: &Grid,
    dest: &mut Grid,
    params: &ThermalParams,
    pool: &ParallelExecutor,
) -> Result<(), ExecutorError> {
    let width = source.width();
    let height = source.height();
    let talus_tan = params.talus_angle.tan();

    let writer = dest.row_writer();
    pool.parallel_range(
        0,
        height,
        |y| {
            for x in 0..width {
                let mut total_out = 0.0;
                let mut total_in = 0.0;

                for &(dx, dy, distance) in &NEIGHBORS {
                    total_out += transfer_out(source, x, y, dx, dy, distance, params, talus_tan);

                    // Inflow: what the neighbor sends back toward us.
                    let sx = x as i32 + dx;
                    let sy = y as i32 + dy;
                    if sx >= 0 && sx < width as i32 && sy >= 0 && sy < height as i32 {
                        total_in += transfer_out(
                            source, sx as usize, sy as usize, -dx, -dy, distance, params,
                            talus_tan,
                        );
                    }
                }

                writer.set(x, y, source.get(x, y) - total_out + total_in);
            }
        },
        4,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> ParallelExecutor {
        ParallelExecutor::with_threads(4).unwrap()
    }

    /// Maximum absolute height difference between 4-connected neighbors.
    fn max_neighbor_diff(map: &Grid) -> f32 {
        let mut worst = 0.0f32;
        for y in 0..map.height() {
            for x in 0..map.width() {
                let h = map.get(x, y);
                if x + 1 < map.width() {
                    worst = worst.max((h - map.get(x + 1, y)).abs());
                }
                if y + 1 < map.height() {
                    worst = worst.max((h - map.get(x, y + 1)).abs());
                }
            }
        }
        worst
    }

    fn bumpy_grid(n: usize) -> Grid {
        let mut map = Grid::new(n, n).unwrap();
        for y in 0..n {
            for x in 0..n {
                let h = ((x * 7 + y * 13) % 11) as f32 / 10.0 + if x == n / 2 { 2.0 } else { 0.0 };
                map.set(x, y, h);
            }
        }
        map
    }

    #[test]
    fn test_below_threshold_rate_is_noop() {
        let mut map = bumpy_grid(16);
        let before = map.clone();
        let params = ThermalParams {
            thermal_rate: 0.005,
            ..ThermalParams::default()
        };
        apply(&mut map, &params, &pool(), &mut ScratchGrids::new(16, 16)).unwrap();
        assert_eq!(before, map);
    }

    #[test]
    fn test_single_pass_does_not_steepen_a_cliff() {
        for rate in [0.1, 0.5, 1.0] {
            // Vertical cliff: high plateau on the left, floor on the right.
            let mut map = Grid::new(24, 24).unwrap();
            for y in 0..24 {
                for x in 0..12 {
                    map.set(x, y, 1.0);
                }
            }

            let before = max_neighbor_diff(&map);
            let params = ThermalParams {
                talus_angle: 0.7,
                thermal_rate: rate,
                iterations: 1,
            };
            apply(&mut map, &params, &pool(), &mut ScratchGrids::new(24, 24)).unwrap();
            let after = max_neighbor_diff(&map);
            assert!(
                after <= before + 1e-5,
                "rate {}: slope rose from {} to {}",
                rate,
                before,
                after
            );
        }
    }

    #[test]
    fn test_erodes_a_spike() {
        let mut map = Grid::new(9, 9).unwrap();
        map.set(4, 4, 5.0);
        let params = ThermalParams {
            iterations: 1,
            ..ThermalParams::default()
        };
        apply(&mut map, &params, &pool(), &mut ScratchGrids::new(9, 9)).unwrap();
        assert!(map.get(4, 4) < 5.0);
        // Shed material lands on the neighbors.
        assert!(map.get(3, 4) > 0.0);
        assert!(map.get(5, 5) > 0.0);
    }

    #[test]
    fn test_material_is_conserved() {
        let mut map = bumpy_grid(16);
        let sum_before: f32 = map.as_slice().iter().sum();
        let params = ThermalParams {
            iterations: 3,
            ..ThermalParams::default()
        };
        apply(&mut map, &params, &pool(), &mut ScratchGrids::new(16, 16)).unwrap();
        let sum_after: f32 = map.as_slice().iter().sum();
        assert!((sum_before - sum_after).abs() < 1e-2);
    }
}
