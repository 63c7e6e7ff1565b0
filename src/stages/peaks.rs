//! Peaks: boosts high terrain with ridged noise so mountains grow sharp
//! crests instead of rounded domes.

use crate::executor::{ExecutorError, ParallelExecutor};
use crate::grid::Grid;
use crate::perlin::NoiseGenerator;

/// Mountain feature frequency. Larger values spread the ridges out.
const PEAK_SCALE: f32 = 200.0;

pub fn apply(
    map: &mut Grid,
    intensity: f32,
    seed: u32,
    pool: &ParallelExecutor,
) -> Result<(), ExecutorError> {
    if intensity < 0.01 {
        return Ok(());
    }

    let width = map.width();
    let height = map.height();
    let peak_noise = NoiseGenerator::new(seed);

    let writer = map.row_writer();
    pool.parallel_range(
        0,
        height,
        |y| {
            for x in 0..width {
                let current = writer.get(x, y);

                // Only existing high ground grows peaks.
                if current <= 0.3 {
                    continue;
                }

                let nx = x as f32 / PEAK_SCALE;
                let ny = y as f32 / PEAK_SCALE;

                let pattern = ridged_noise(&peak_noise, nx, ny);

                // 40% sharp ridges, 60% gradual slopes.
                let sharpness = pattern.powf(2.5);
                let gradual = pattern.powf(0.8);
                let shape = sharpness * 0.4 + gradual * 0.6;

                // Ramp in from mid elevation so there is no step at 0.3.
                let elevation_factor = (current - 0.3) / 0.7;
                let transition = elevation_factor.powf(0.6);

                let boost = shape * intensity * 0.35 * transition;
                writer.set(x, y, current + boost);
            }
        },
        8,
    )
}

/// Inverted-absolute-value fBm. Zero crossings of the underlying noise
/// become sharp ridgelines.
fn ridged_noise(noise: &NoiseGenerator, x: f32, y: f32) -> f32 {
    let value = noise.octave_noise(x, y, 5, 0.6, 2.5);
    1.0 - value.abs()
}
