//! Hydraulic erosion: particle-based droplet simulation.
//!
//! Droplets spawn at random positions and flow downhill, picking up
//! sediment in proportion to their speed and dropping it where the flow
//! slows, carving gullies and building alluvial fans. After Mei et al.
//! 2007 style capacity-driven transport.
//!
//! Droplets run sequentially: each one scatter-writes through a brush,
//! and the sequential order is what makes a fixed seed reproducible.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::grid::Grid;
use crate::stages::utils::{falloff_brush, height_and_gradient};

#[derive(Clone, Debug)]
pub struct HydraulicParams {
    /// Droplets spawned per iteration.
    pub num_droplets: u32,
    /// Steps before a droplet is retired.
    pub max_lifetime: u32,
    /// Direction persistence (0.0-1.0).
    pub inertia: f32,
    /// Sediment capacity multiplier.
    pub capacity_factor: f32,
    /// Terrain erosion speed.
    pub erosion_rate: f32,
    /// Sediment deposition speed.
    pub deposition_rate: f32,
    /// Erosion passes.
    pub iterations: u32,
}

impl Default for HydraulicParams {
    fn default() -> Self {
        Self {
            num_droplets: 5000,
            max_lifetime: 50,
            inertia: 0.3,
            capacity_factor: 3.0,
            erosion_rate: 0.3,
            deposition_rate: 0.3,
            iterations: 1,
        }
    }
}

const MIN_CAPACITY: f32 = 0.01;
const EVAPORATION_RATE: f32 = 0.01;
const GRAVITY: f32 = 4.0;
const INITIAL_WATER: f32 = 1.0;
const INITIAL_SPEED: f32 = 1.0;
const EROSION_RADIUS: i32 = 3;

pub fn apply(map: &mut Grid, params: &HydraulicParams, seed: u32) {
    if params.num_droplets == 0 || params.iterations == 0 {
        return;
    }

    let width = map.width();
    let height = map.height();
    if width < 2 || height < 2 {
        return;
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed as u64);
    let brush = falloff_brush(EROSION_RADIUS);

    for _ in 0..params.iterations {
        for _ in 0..params.num_droplets {
            let start_x = rng.gen_range(0.0..(width - 1) as f32);
            let start_y = rng.gen_range(0.0..(height - 1) as f32);
            simulate_droplet(map, params, &brush, start_x, start_y);
        }
    }
}

fn simulate_droplet(
    map: &mut Grid,
    params: &HydraulicParams,
    brush: &[(i32, i32, f32)],
    start_x: f32,
    start_y: f32,
) {
    let width = map.width();
    let height = map.height();

    let mut x = start_x;
    let mut y = start_y;
    let mut dir_x = 0.0f32;
    let mut dir_y = 0.0f32;
    let mut speed = INITIAL_SPEED;
    let mut water = INITIAL_WATER;
    let mut sediment = 0.0f32;

    for _ in 0..params.max_lifetime {
        let cell_x = x as i32;
        let cell_y = y as i32;
        if cell_x < 0 || cell_x >= width as i32 - 1 || cell_y < 0 || cell_y >= height as i32 - 1 {
            break;
        }

        let (current_height, grad_x, grad_y) = height_and_gradient(map, x, y);

        // Blend the downhill gradient into the travel direction.
        dir_x = dir_x * params.inertia - grad_x * (1.0 - params.inertia);
        dir_y = dir_y * params.inertia - grad_y * (1.0 - params.inertia);

        let len = (dir_x * dir_x + dir_y * dir_y).sqrt();
        if len > 0.0 {
            dir_x /= len;
            dir_y /= len;
        }

        let new_x = x + dir_x;
        let new_y = y + dir_y;
        if new_x < 0.0
            || new_x >= (width - 1) as f32
            || new_y < 0.0
            || new_y >= (height - 1) as f32
        {
            break;
        }

        let (new_height, _, _) = height_and_gradient(map, new_x, new_y);
        let delta_height = new_height - current_height;

        let capacity =
            (-delta_height).max(MIN_CAPACITY) * speed * water * params.capacity_factor;

        if sediment > capacity || delta_height > 0.0 {
            // Moving uphill drops enough sediment to fill the pit behind us;
            // otherwise shed the excess over capacity.
            let amount = if delta_height > 0.0 {
                delta_height.min(sediment)
            } else {
                (sediment - capacity) * params.deposition_rate
            };
            sediment -= amount;
            splat(map, x, y, amount, brush);
        } else {
            let amount = ((capacity - sediment) * params.erosion_rate).min(-delta_height);
            splat(map, x, y, -amount, brush);
            sediment += amount;
        }

        speed = (speed * speed + delta_height * GRAVITY).sqrt();
        water *= 1.0 - EVAPORATION_RATE;

        x = new_x;
        y = new_y;
    }
}

/// Distributes `amount` (negative to erode) around (x, y) through the
/// falloff brush.
fn splat(map: &mut Grid, x: f32, y: f32, amount: f32, brush: &[(i32, i32, f32)]) {
    let width = map.width() as i32;
    let height = map.height() as i32;
    let cell_x = x as i32;
    let cell_y = y as i32;

    for &(dx, dy, weight) in brush {
        let nx = cell_x + dx;
        let ny = cell_y + dy;
        if nx >= 0 && nx < width && ny >= 0 && ny < height {
            let (ux, uy) = (nx as usize, ny as usize);
            map.set(ux, uy, map.get(ux, uy) + amount * weight);
        }
    }
}
