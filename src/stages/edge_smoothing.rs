//! Edge smoothing: tapers terrain toward the map border so islands end
//! in coastline instead of a cliff at the map edge.
//!
//! A Minkowski distance map (shape parameter morphs diamond through
//! circle to rounded square) perturbed by a little noise drives three
//! rounds of aggressive blur in the border zone, followed by a triple
//! smoothstep fade to zero.

use crate::executor::{ExecutorError, ParallelExecutor};
use crate::grid::{Grid, ScratchGrids};
use crate::perlin::NoiseGenerator;
use crate::stages::utils::smoothstep;

const NOISE_SCALE: f32 = 15.0;
const SMOOTH_ROUNDS: u32 = 3;
const BLUR_RADIUS: i32 = 8;

pub fn apply(
    map: &mut Grid,
    edge_padding: f32,
    island_shape: f32,
    seed: u32,
    pool: &ParallelExecutor,
    scratch: &mut ScratchGrids,
) -> Result<(), ExecutorError> {
    if edge_padding < 0.01 {
        return Ok(());
    }

    let distance_map = calculate_distance_map(map, island_shape, seed);
    smooth_edges(map, &distance_map, edge_padding, pool, scratch)?;
    apply_taper(map, &distance_map, edge_padding, pool)
}

/// Noisy radial distance in [0, 1], 0 at the border and 1 at the center.
fn calculate_distance_map(map: &Grid, island_shape: f32, seed: u32) -> Vec<f32> {
    let width = map.width();
    let height = map.height();
    let mut dist_map = vec![0.0f32; width * height];

    let center_x = width as f32 * 0.5;
    let center_y = height as f32 * 0.5;
    let edge_noise = NoiseGenerator::new(seed);

    for y in 0..height {
        for x in 0..width {
            let nx = (x as f32 - center_x) / center_x;
            let ny = (y as f32 - center_y) / center_y;

            // p=1 diamond, p=2 circle, larger p squares off the corners.
            let p = 1.0 + (island_shape - 1.0) * 1.5;
            let minkowski = (nx.abs().powf(p) + ny.abs().powf(p)).powf(1.0 / p);

            let noise_value = edge_noise.octave_noise(
                x as f32 / NOISE_SCALE,
                y as f32 / NOISE_SCALE,
                3,
                0.5,
                2.0,
            );

            // Noise fades out toward the border so coastlines stay clean.
            let noise_strength = (minkowski * 2.0).min(1.0);
            let noisy = minkowski + noise_value * 0.03 * noise_strength;

            dist_map[y * width + x] = (1.0 - noisy).max(0.0);
        }
    }

    dist_map
}

fn smooth_edges(
    map: &mut Grid,
    distance_map: &[f32],
    edge_padding: f32,
    pool: &ParallelExecutor,
    scratch: &mut ScratchGrids,
) -> Result<(), ExecutorError> {
    let width = map.width();
    let height = map.height();
    let expanded = edge_padding * 3.5;

    let mut temp = scratch.acquire();

    for _ in 0..SMOOTH_ROUNDS {
        temp.copy_from(map);

        {
            let source = &*map;
            let writer = temp.row_writer();
            pool.parallel_range(
                0,
                height,
                |y| {
                    for x in 0..width {
                        let normalized = distance_map[y * width + x];
                        if normalized >= expanded * 0.7 {
                            continue;
                        }
                        let t = normalized / (expanded * 0.7);

                        let mut sum = 0.0f32;
                        let mut weight_sum = 0.0f32;
                        for dy in -BLUR_RADIUS..=BLUR_RADIUS {
                            for dx in -BLUR_RADIUS..=BLUR_RADIUS {
                                let dist = ((dx * dx + dy * dy) as f32).sqrt();
                                if dist > BLUR_RADIUS as f32 {
                                    continue;
                                }

                                let nx = (x as i32 + dx).clamp(0, width as i32 - 1) as usize;
                                let ny = (y as i32 + dy).clamp(0, height as i32 - 1) as usize;

                                let weight = 1.0 - dist / BLUR_RADIUS as f32;
                                sum += source.get(nx, ny) * weight;
                                weight_sum += weight;
                            }
                        }

                        let smoothed = sum / weight_sum;
                        // Up to 99% smoothed right at the border.
                        let blend = (1.0 - t) * 0.99;
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

fn apply_taper(
    map: &mut Grid,
    distance_map: &[f32],
    edge_padding: f32,
    pool: &ParallelExecutor,
) -> Result<(), ExecutorError> {
    let width = map.width();
    let height = map.height();
    let expanded = edge_padding * 3.5;

    let writer = map.row_writer();
    pool.parallel_range(
        0,
        height,
        |y| {
            for x in 0..width {
                let normalized = distance_map[y * width + x];
                if normalized < expanded {
                    let t = normalized / expanded;
                    // Triple smoothstep for an ultra gradual falloff.
                    let fade = smoothstep(smoothstep(smoothstep(t)));
                    writer.set(x, y, writer.get(x, y) * fade);
                }
            }
        },
        16,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> ParallelExecutor {
        ParallelExecutor::with_threads(4).unwrap()
    }

    #[test]
    fn test_low_padding_is_noop() {
        let mut map = Grid::new(64, 64).unwrap();
        map.fill(0.7);
        let before = map.clone();
        apply(&mut map, 0.005, 1.5, 1, &pool(), &mut ScratchGrids::new(64, 64)).unwrap();
        assert_eq!(before, map);
    }

    #[test]
    fn test_border_drops_to_zero() {
        let mut map = Grid::new(64, 64).unwrap();
        map.fill(1.0);
        apply(&mut map, 0.15, 1.5, 1, &pool(), &mut ScratchGrids::new(64, 64)).unwrap();
        assert!(map.get(0, 0).abs() < 1e-3);
        assert!(map.get(63, 0).abs() < 1e-3);
        assert!(map.get(0, 63).abs() < 1e-3);
    }

    #[test]
    fn test_center_survives() {
        let mut map = Grid::new(64, 64).unwrap();
        map.fill(1.0);
        apply(&mut map, 0.15, 1.5, 1, &pool(), &mut ScratchGrids::new(64, 64)).unwrap();
        assert!(map.get(32, 32) > 0.9);
    }

    #[test]
    fn test_distance_map_peaks_at_center() {
        let map = Grid::new(64, 64).unwrap();
        let dist = calculate_distance_map(&map, 1.5, 1);
        let center = dist[32 * 64 + 32];
        let corner = dist[0];
        assert!(center > 0.9);
        assert!(corner < 0.1);
    }
}
