//! Terrain softening: Gaussian-blurs low terrain while leaving the
//! heights crisp, with a smooth transition band around the elevation
//! threshold.

use crate::executor::{ExecutorError, ParallelExecutor};
use crate::grid::{Grid, ScratchGrids};
use crate::stages::utils::percentile_threshold;

/// Half-width of the blend band around the elevation threshold.
const TRANSITION_WIDTH: f32 = 0.15;

pub fn apply(
    map: &mut Grid,
    strength: f32,
    threshold_quantile: f32,
    smooth_radius: i32,
    passes: u32,
    pool: &ParallelExecutor,
    scratch: &mut ScratchGrids,
) -> Result<(), ExecutorError> {
    if strength < 0.01 {
        return Ok(());
    }

    let elevation_threshold = percentile_threshold(map, threshold_quantile);

    for _ in 0..passes {
        smoothing_pass(map, elevation_threshold, strength, smooth_radius, pool, scratch)?;
    }
    Ok(())
}

fn smoothing_pass(
    map: &mut Grid,
    elevation_threshold: f32,
    strength: f32,
    smooth_radius: i32,
    pool: &ParallelExecutor,
    scratch: &mut ScratchGrids,
) -> Result<(), ExecutorError> {
    let width = map.width();
    let height = map.height();

    let mut smoothed = scratch.acquire();

    {
        let source = &*map;
        let writer = smoothed.row_writer();
        pool.parallel_range(
            0,
            height,
            |y| {
                for x in 0..width {
                    let mut sum = 0.0f32;
                    let mut weight_sum = 0.0f32;

                    for dy in -smooth_radius..=smooth_radius {
                        for dx in -smooth_radius..=smooth_radius {
                            let dist = ((dx * dx + dy * dy) as f32).sqrt();
                            if dist > smooth_radius as f32 {
                                continue;
                            }

                            let nx = (x as i32 + dx).clamp(0, width as i32 - 1) as usize;
                            let ny = (y as i32 + dy).clamp(0, height as i32 - 1) as usize;

                            let sigma = smooth_radius as f32 / 3.0;
                            let weight = (-(dist * dist) / (2.0 * sigma * sigma)).exp();
                            sum += source.get(nx, ny) * weight;
                            weight_sum += weight;
                        }
                    }

                    writer.set(x, y, sum / weight_sum);
                }
            },
            4,
        )?;
    }

    {
        let blurred = &smoothed;
        let writer = map.row_writer();
        pool.parallel_range(
            0,
            height,
            |y| {
                for x in 0..width {
                    let original = writer.get(x, y);
                    let smoothed_height = blurred.get(x, y);

                    let lower = elevation_threshold - TRANSITION_WIDTH;
                    let upper = elevation_threshold + TRANSITION_WIDTH;

                    // Full blur below the band, none above, linear in between.
                    let mut blend = if original < lower {
                        1.0
                    } else if original < upper {
                        1.0 - (original - lower) / (upper - lower)
                    } else {
                        0.0
                    };
                    blend *= strength;

                    writer.set(x, y, original * (1.0 - blend) + smoothed_height * blend);
                }
            },
            4,
        )?;
    }

    scratch.release(smoothed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> ParallelExecutor {
        ParallelExecutor::with_threads(4).unwrap()
    }

    fn noisy_grid(n: usize) -> Grid {
        let mut map = Grid::new(n, n).unwrap();
        for y in 0..n {
            for x in 0..n {
                let base = y as f32 / n as f32;
                let jitter = ((x * 31 + y * 17) % 7) as f32 / 70.0;
                map.set(x, y, base + jitter);
            }
        }
        map
    }

    #[test]
    fn test_low_strength_is_noop() {
        let mut map = noisy_grid(32);
        let before = map.clone();
        apply(&mut map, 0.005, 0.5, 8, 3, &pool(), &mut ScratchGrids::new(32, 32)).unwrap();
        assert_eq!(before, map);
    }

    #[test]
    fn test_lowlands_get_smoother() {
        let mut map = noisy_grid(48);

        let roughness = |m: &Grid| {
            let mut total = 0.0f32;
            for y in 0..m.height() {
                for x in 1..m.width() {
                    if m.get(x, y) < 0.3 {
                        total += (m.get(x, y) - m.get(x - 1, y)).abs();
                    }
                }
            }
            total
        };

        let before = roughness(&map);
        apply(&mut map, 1.0, 0.5, 8, 3, &pool(), &mut ScratchGrids::new(48, 48)).unwrap();
        assert!(roughness(&map) < before);
    }

    #[test]
    fn test_high_terrain_preserved() {
        let mut map = noisy_grid(48);
        let before = map.clone();
        apply(&mut map, 1.0, 0.5, 8, 3, &pool(), &mut ScratchGrids::new(48, 48)).unwrap();

        let threshold = percentile_threshold(&before, 0.5) + TRANSITION_WIDTH;
        for (i, (a, b)) in before.as_slice().iter().zip(map.as_slice()).enumerate() {
            if *a > threshold {
                assert!(
                    (a - b).abs() < 1e-6,
                    "cell {} above the band moved from {} to {}",
                    i,
                    a,
                    b
                );
            }
        }
    }
}
