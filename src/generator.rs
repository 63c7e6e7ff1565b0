//! Terrain pipeline orchestrator.
//!
//! Runs the fixed stage order over a working grid it owns exclusively,
//! then publishes the finished terrain as a cheap `Arc<Grid>` snapshot.
//! Readers never block generation: they clone the last published
//! snapshot while the next run mutates the private working buffer.
//! Overlapping `generate` calls are rejected rather than queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;

use crate::executor::{ExecutorError, ParallelExecutor};
use crate::grid::{Grid, GridError, ScratchGrids};
use crate::params::TerrainParams;
use crate::perlin::NoiseGenerator;
use crate::stages;
use crate::stages::river_enhancements::RiverParams;
use crate::stages::{HydraulicParams, ThermalParams};

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("a generation run is already in progress")]
    Busy,
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

struct WorkBuffers {
    working: Grid,
    scratch: ScratchGrids,
}

pub struct TerrainGenerator {
    width: usize,
    height: usize,
    executor: Arc<ParallelExecutor>,
    buffers: Mutex<WorkBuffers>,
    published: Mutex<Arc<Grid>>,
    generating: AtomicBool,
}

impl TerrainGenerator {
    pub fn new(
        width: usize,
        height: usize,
        executor: Arc<ParallelExecutor>,
    ) -> Result<Self, GridError> {
        let working = Grid::new(width, height)?;
        let published = Arc::new(working.clone());
        Ok(Self {
            width,
            height,
            executor,
            buffers: Mutex::new(WorkBuffers {
                working,
                scratch: ScratchGrids::new(width, height),
            }),
            published: Mutex::new(published),
            generating: AtomicBool::new(false),
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn is_generating(&self) -> bool {
        self.generating.load(Ordering::SeqCst)
    }

    /// The most recently published terrain. Cheap to call from any thread.
    pub fn snapshot(&self) -> Arc<Grid> {
        recover(self.published.lock()).clone()
    }

    /// Run the full pipeline and publish the result. Rejects overlapping
    /// calls with `GenerateError::Busy` instead of queuing them.
    pub fn generate(&self, params: &TerrainParams) -> Result<(), GenerateError> {
        self.enter_busy()?;
        let result = self.generate_inner(params);
        self.generating.store(false, Ordering::SeqCst);
        result
    }

    fn enter_busy(&self) -> Result<(), GenerateError> {
        self.generating
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| GenerateError::Busy)?;
        Ok(())
    }

    fn generate_inner(&self, params: &TerrainParams) -> Result<(), GenerateError> {
        info!(
            "generating {}x{} terrain, seed {}",
            self.width, self.height, params.seed
        );

        let noise = NoiseGenerator::new(params.seed);
        let mut buffers = recover(self.buffers.lock());
        let WorkBuffers { working, scratch } = &mut *buffers;

        working.clear();

        debug!("stage: base noise");
        self.base_noise(working, &noise, params)?;

        // Valley shaping happens in the flattening and connectivity
        // operations, driven separately from the main pipeline.

        if params.erosion > 0.01 {
            debug!("stage: erosion");
            self.erosion(working, scratch, params)?;
        }

        if params.peaks > 0.01 {
            debug!("stage: peaks");
            stages::peaks::apply(working, params.peaks, params.seed, &self.executor)?;
        }

        if params.island > 0.01 {
            debug!("stage: island mask");
            if params.archipelago_mode {
                self.archipelago_mask(working, params)?;
            } else {
                self.island_mask(working, params)?;
            }
        }

        if params.terracing > 0 {
            debug!("stage: terracing");
            terrace(working, params.terracing);
        }

        if params.edge_padding > 0.01 {
            debug!("stage: edge smoothing");
            stages::edge_smoothing::apply(
                working,
                params.edge_padding,
                params.island_shape,
                params.seed.wrapping_add(1),
                &self.executor,
                scratch,
            )?;
        }

        if params.terrain_smoothness > 0.01 {
            debug!("stage: softening");
            stages::softening::apply(
                working,
                params.terrain_smoothness,
                params.softening_threshold,
                8,
                3,
                &self.executor,
                scratch,
            )?;
        }

        if params.river_intensity > 0.01 {
            debug!("stage: rivers");
            if params.enable_river_enhancements {
                stages::river_enhancements::apply(
                    working,
                    &RiverParams {
                        intensity: params.river_intensity,
                        width: params.river_width,
                        flow_smoothing: params.flow_smoothing,
                        enable_tributaries: params.enable_tributaries,
                        tributaries_per_river: params.tributaries_per_river,
                        tributary_width: params.tributary_width,
                        enable_wetlands: params.enable_wetlands,
                        wetland_radius: params.wetland_radius,
                        wetland_strength: params.wetland_strength,
                    },
                    params.seed,
                );
            } else {
                stages::rivers::apply(working, params.river_intensity, params.river_width);
            }
        }

        working.normalize();

        self.publish(working);
        info!("generation complete");
        Ok(())
    }

    /// Pulls low-lying terrain toward its local valley floor. Operates on
    /// the current terrain and republishes, like an editor brush.
    pub fn flatten_low_areas(&self, params: &TerrainParams) -> Result<(), GenerateError> {
        self.enter_busy()?;
        let result = (|| {
            let mut buffers = recover(self.buffers.lock());
            let WorkBuffers { working, scratch } = &mut *buffers;
            stages::valley_flattening::apply(
                working,
                params.flatten_valleys,
                &self.executor,
                scratch,
            )?;
            self.publish(working);
            Ok(())
        })();
        self.generating.store(false, Ordering::SeqCst);
        result
    }

    /// Carves corridors between disconnected valley regions, using the
    /// same percentile threshold convention as flattening.
    pub fn connect_valleys(&self, params: &TerrainParams) -> Result<(), GenerateError> {
        self.enter_busy()?;
        let result = (|| {
            let mut buffers = recover(self.buffers.lock());
            let threshold =
                stages::valley_flattening::threshold_for(&buffers.working, params.flatten_valleys);
            stages::valley_connectivity::apply(
                &mut buffers.working,
                params.valley_connectivity,
                threshold,
            );
            self.publish(&buffers.working);
            Ok(())
        })();
        self.generating.store(false, Ordering::SeqCst);
        result
    }

    fn publish(&self, working: &Grid) {
        *recover(self.published.lock()) = Arc::new(working.clone());
    }

    fn base_noise(
        &self,
        working: &mut Grid,
        noise: &NoiseGenerator,
        params: &TerrainParams,
    ) -> Result<(), ExecutorError> {
        let width = self.width;
        let writer = working.row_writer();

        self.executor.parallel_range(
            0,
            self.height,
            |y| {
                for x in 0..width {
                    let nx = x as f32 / params.scale;
                    let ny = y as f32 / params.scale;

                    let h = noise.octave_noise(
                        nx,
                        ny,
                        params.octaves,
                        params.persistence,
                        params.lacunarity,
                    );

                    // Remap [-1, 1] to [0, 1], then curve for gradual lowlands.
                    let h = ((h + 1.0) * 0.5).powf(1.2);
                    writer.set(x, y, h);
                }
            },
            16,
        )
    }

    fn erosion(
        &self,
        working: &mut Grid,
        scratch: &mut ScratchGrids,
        params: &TerrainParams,
    ) -> Result<(), ExecutorError> {
        if params.thermal_erosion_enabled && params.thermal_iterations > 0 {
            stages::thermal::apply(
                working,
                &ThermalParams {
                    talus_angle: params.thermal_talus_angle,
                    // Master erosion strength scales the rate.
                    thermal_rate: params.thermal_rate * params.erosion,
                    iterations: params.thermal_iterations,
                },
                &self.executor,
                scratch,
            )?;
        }

        if params.hydraulic_erosion_enabled && params.hydraulic_iterations > 0 {
            stages::hydraulic::apply(
                working,
                &HydraulicParams {
                    num_droplets: params.hydraulic_droplets,
                    max_lifetime: params.hydraulic_lifetime,
                    inertia: params.hydraulic_inertia,
                    capacity_factor: params.hydraulic_capacity,
                    erosion_rate: params.hydraulic_erosion * params.erosion,
                    deposition_rate: params.hydraulic_deposition,
                    iterations: params.hydraulic_iterations,
                },
                params.seed,
            );
        }

        // Legacy single-pass smoothing when thermal is off.
        if !params.thermal_erosion_enabled {
            self.legacy_erosion(working, scratch, params)?;
        }

        Ok(())
    }

    fn legacy_erosion(
        &self,
        working: &mut Grid,
        scratch: &mut ScratchGrids,
        params: &TerrainParams,
    ) -> Result<(), ExecutorError> {
        let width = self.width;
        let mut temp = scratch.acquire();
        temp.copy_from(working);

        {
            let source = &*working;
            let writer = temp.row_writer();
            self.executor.parallel_range(
                1,
                self.height - 1,
                |y| {
                    for x in 1..width - 1 {
                        let current = source.get(x, y);
                        let avg = (source.get(x, y - 1)
                            + source.get(x, y + 1)
                            + source.get(x - 1, y)
                            + source.get(x + 1, y))
                            * 0.25;

                        // Shave peaks that stand above their neighborhood.
                        if current > avg {
                            let diff = (current - avg) * params.erosion * 0.3;
                            writer.set(x, y, current - diff);
                        }
                    }
                },
                8,
            )?;
        }

        working.copy_from(&temp);
        scratch.release(temp);
        Ok(())
    }

    fn island_mask(
        &self,
        working: &mut Grid,
        params: &TerrainParams,
    ) -> Result<(), ExecutorError> {
        let width = self.width;
        let center_x = width as f32 * 0.5;
        let center_y = self.height as f32 * 0.5;
        let max_dist = (center_x * center_x + center_y * center_y).sqrt();
        let island = params.island;

        let writer = working.row_writer();
        self.executor.parallel_range(
            0,
            self.height,
            |y| {
                for x in 0..width {
                    let dx = x as f32 - center_x;
                    let dy = y as f32 - center_y;
                    let normalized = (dx * dx + dy * dy).sqrt() / max_dist;

                    let falloff = (1.0 - normalized.powf(1.5)).max(0.0);
                    let mask = (1.0 - island) + falloff * island;
                    writer.set(x, y, writer.get(x, y) * mask);
                }
            },
            8,
        )
    }

    fn archipelago_mask(
        &self,
        working: &mut Grid,
        params: &TerrainParams,
    ) -> Result<(), ExecutorError> {
        // Island placement uses its own seed stream so reshuffling the
        // archipelago does not disturb the base terrain.
        let mut rng = ChaCha8Rng::seed_from_u64(params.seed.wrapping_add(999) as u64);

        let min_size = params.archipelago_min_size;
        let max_size = params.archipelago_max_size.max(min_size + 1e-6);

        let mut centers: Vec<(f32, f32)> = Vec::new();
        let mut radii: Vec<f32> = Vec::new();

        let mut attempts = 0;
        let max_attempts = params.archipelago_island_count * 50;
        while centers.len() < params.archipelago_island_count as usize
            && attempts < max_attempts
        {
            attempts += 1;

            let cx: f32 = rng.gen_range(0.1..0.9);
            let cy: f32 = rng.gen_range(0.1..0.9);

            let too_close = centers.iter().zip(&radii).any(|(&(ex, ey), &r)| {
                let dx = cx - ex;
                let dy = cy - ey;
                (dx * dx + dy * dy).sqrt() < params.archipelago_spacing + r * 0.5
            });

            if !too_close {
                centers.push((cx, cy));
                radii.push(rng.gen_range(min_size..max_size));
            }
        }

        let shape_noise = NoiseGenerator::new(params.seed.wrapping_add(1000));
        let width = self.width;
        let height = self.height;
        let island = params.island;

        let writer = working.row_writer();
        self.executor.parallel_range(
            0,
            height,
            |y| {
                let ny = y as f32 / height as f32;
                for x in 0..width {
                    let nx = x as f32 / width as f32;

                    let mut total_effect = 0.0f32;
                    for (&(cx, cy), &radius) in centers.iter().zip(&radii) {
                        let dx = nx - cx;
                        let dy = ny - cy;
                        let dist = (dx * dx + dy * dy).sqrt();

                        // Perturb the radius by angle so coastlines wobble.
                        let angle = dy.atan2(dx);
                        let noise_val = shape_noise.octave_noise(
                            cx * 10.0 + angle.cos() * 3.0,
                            cy * 10.0 + angle.sin() * 3.0,
                            3,
                            0.5,
                            2.0,
                        );
                        let noisy_radius =
                            radius * (1.0 + noise_val * params.archipelago_variation * 0.4);

                        if dist < noisy_radius {
                            let falloff =
                                (1.0 - (dist / noisy_radius).powf(params.island_shape)).max(0.0);
                            total_effect = total_effect.max(falloff);
                        }
                    }

                    let current = writer.get(x, y);
                    let mut masked = current * ((1.0 - island) + total_effect * island);
                    if total_effect < 0.1 {
                        // Ocean floor between islands.
                        masked *= 0.3;
                    }
                    writer.set(x, y, masked);
                }
            },
            8,
        )
    }
}

fn terrace(working: &mut Grid, steps: u32) {
    let steps = steps as f32;
    for h in working.as_mut_slice() {
        *h = (*h * steps).floor() / steps;
    }
}

/// Mutex poisoning only happens after a panic in a stage; the grid data
/// is still structurally valid, so recover the guard and carry on.
fn recover<'a, T>(result: Result<MutexGuard<'a, T>, std::sync::PoisonError<MutexGuard<'a, T>>>) -> MutexGuard<'a, T> {
    result.unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_params() -> TerrainParams {
        TerrainParams {
            seed: 42,
            erosion: 0.0,
            peaks: 0.0,
            island: 0.0,
            terracing: 0,
            edge_padding: 0.0,
            terrain_smoothness: 0.0,
            river_intensity: 0.0,
            ..TerrainParams::default()
        }
    }

    fn generator(n: usize) -> TerrainGenerator {
        let executor = Arc::new(ParallelExecutor::with_threads(4).unwrap());
        TerrainGenerator::new(n, n, executor).unwrap()
    }

    #[test]
    fn test_all_stages_disabled_yields_normalized_base_noise() {
        let gen = generator(64);
        let params = quiet_params();
        gen.generate(&params).unwrap();
        let result = gen.snapshot();

        let noise = NoiseGenerator::new(params.seed);
        let mut expected = Grid::new(64, 64).unwrap();
        for y in 0..64 {
            for x in 0..64 {
                let h = noise.octave_noise(
                    x as f32 / params.scale,
                    y as f32 / params.scale,
                    params.octaves,
                    params.persistence,
                    params.lacunarity,
                );
                expected.set(x, y, ((h + 1.0) * 0.5).powf(1.2));
            }
        }
        expected.normalize();

        assert_eq!(*result, expected);
    }

    #[test]
    fn test_same_seed_reproduces_terrain() {
        let a = generator(64);
        let b = generator(64);
        let params = TerrainParams {
            seed: 42,
            ..TerrainParams::default()
        };
        a.generate(&params).unwrap();
        b.generate(&params).unwrap();
        assert_eq!(*a.snapshot(), *b.snapshot());

        let c = generator(64);
        c.generate(&TerrainParams {
            seed: 43,
            ..TerrainParams::default()
        })
        .unwrap();
        assert_ne!(*a.snapshot(), *c.snapshot());
    }

    #[test]
    fn test_base_noise_reproducible_at_full_size() {
        let params = TerrainParams {
            seed: 42,
            ..quiet_params()
        };
        let a = generator(256);
        let b = generator(256);
        a.generate(&params).unwrap();
        b.generate(&params).unwrap();
        assert_eq!(*a.snapshot(), *b.snapshot());

        let c = generator(256);
        c.generate(&TerrainParams { seed: 43, ..params }).unwrap();
        assert_ne!(*a.snapshot(), *c.snapshot());
    }

    #[test]
    fn test_overlapping_generate_is_rejected() {
        let gen = generator(16);
        gen.generating.store(true, Ordering::SeqCst);
        assert!(matches!(
            gen.generate(&quiet_params()),
            Err(GenerateError::Busy)
        ));
        gen.generating.store(false, Ordering::SeqCst);
        assert!(gen.generate(&quiet_params()).is_ok());
    }

    #[test]
    fn test_output_is_normalized() {
        let gen = generator(64);
        gen.generate(&TerrainParams::default()).unwrap();
        let snapshot = gen.snapshot();
        let (min, max) = snapshot.min_max();
        assert!(min.abs() < 1e-6);
        assert!((max - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_terracing_quantizes_levels() {
        let gen = generator(64);
        let params = TerrainParams {
            terracing: 4,
            // Quantized levels survive because nothing runs after terracing.
            edge_padding: 0.0,
            terrain_smoothness: 0.0,
            river_intensity: 0.0,
            ..quiet_params()
        };
        gen.generate(&params).unwrap();

        let snapshot = gen.snapshot();
        let mut levels: Vec<f32> = snapshot.as_slice().to_vec();
        levels.sort_by(f32::total_cmp);
        levels.dedup();
        assert!(levels.len() <= 5, "found {} distinct levels", levels.len());
    }

    #[test]
    fn test_flatten_low_areas_republishes() {
        let gen = generator(64);
        gen.generate(&quiet_params()).unwrap();
        let before = gen.snapshot();

        let params = TerrainParams {
            flatten_valleys: 0.8,
            ..quiet_params()
        };
        gen.flatten_low_areas(&params).unwrap();
        assert_ne!(*before, *gen.snapshot());
    }

    #[test]
    fn test_archipelago_differs_from_single_island() {
        let params = TerrainParams {
            island: 0.9,
            archipelago_mode: true,
            ..quiet_params()
        };

        let a = generator(64);
        a.generate(&params).unwrap();

        // Same seed reproduces island placement exactly.
        let b = generator(64);
        b.generate(&params).unwrap();
        assert_eq!(*a.snapshot(), *b.snapshot());

        let single = generator(64);
        single
            .generate(&TerrainParams {
                archipelago_mode: false,
                ..params
            })
            .unwrap();
        assert_ne!(*a.snapshot(), *single.snapshot());
    }
}
