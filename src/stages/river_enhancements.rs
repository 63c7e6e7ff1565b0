//! Enhanced rivers: flow-field traced channels with tributaries and
//! wetland depressions.
//!
//! Main rivers flow from high well-spaced edge points toward low
//! interior valleys, steered by a blend of the downhill flow field and
//! the direction to the target. Tributaries branch off partway along
//! each main river, and wetlands lower the land around main channels.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::grid::Grid;

#[derive(Clone, Debug)]
pub struct RiverParams {
    pub intensity: f32,
    /// River width as a fraction of a reference 800 px map.
    pub width: f32,
    /// Direction inertia while tracing (0.0-1.0).
    pub flow_smoothing: f32,
    pub enable_tributaries: bool,
    pub tributaries_per_river: u32,
    /// Tributary width as a fraction of the main river width.
    pub tributary_width: f32,
    pub enable_wetlands: bool,
    pub wetland_radius: f32,
    pub wetland_strength: f32,
}

struct FlowField {
    width: usize,
    data: Vec<(f32, f32)>,
}

impl FlowField {
    #[inline]
    fn at(&self, x: usize, y: usize) -> (f32, f32) {
        self.data[y * self.width + x]
    }
}

#[derive(Clone, Copy)]
struct RiverPoint {
    pos: (f32, f32),
    width: f32,
    depth: f32,
}

struct RiverPath {
    points: Vec<RiverPoint>,
    is_main: bool,
}

const MAX_STEPS: usize = 2000;
const STEP_SIZE: f32 = 2.0;
const TARGET_RADIUS: f32 = 15.0;

pub fn apply(map: &mut Grid, params: &RiverParams, seed: u32) {
    if params.intensity < 0.01 {
        return;
    }

    // 2 to 8 main rivers.
    let num_rivers = (params.intensity * 6.0) as usize + 2;

    let flow_field = calculate_flow_field(map);
    let sources = find_sources(map, num_rivers);
    let destinations = find_destinations(map, num_rivers);
    let river_count = sources.len().min(destinations.len());

    let mut rng = ChaCha8Rng::seed_from_u64(seed as u64);
    let mut all_rivers = Vec::new();

    for i in 0..river_count {
        let main = trace_river(map, &flow_field, sources[i], destinations[i], params, true);

        let branch_count = if params.enable_tributaries && main.points.len() > 10 {
            params.tributaries_per_river.min(3) as usize
        } else {
            0
        };
        let branch_positions = [0.25f32, 0.5, 0.75];

        let mut tributaries = Vec::new();
        for &pos in branch_positions.iter().take(branch_count) {
            let idx = ((main.points.len() as f32 * pos) as usize).min(main.points.len() - 1);
            tributaries.push(trace_tributary(
                map,
                &flow_field,
                main.points[idx].pos,
                params,
                &mut rng,
            ));
        }

        all_rivers.push(main);
        all_rivers.extend(tributaries);
    }

    for river in &all_rivers {
        let intensity = if river.is_main {
            params.intensity
        } else {
            params.intensity * 0.5
        };
        carve_path(map, river, intensity);
    }

    if params.enable_wetlands {
        for river in all_rivers.iter().filter(|r| r.is_main) {
            apply_wetlands(map, river, params);
        }
    }
}

/// Normalized downhill direction at every interior cell.
fn calculate_flow_field(map: &Grid) -> FlowField {
    let width = map.width();
    let height = map.height();
    let mut data = vec![(0.0f32, 0.0f32); width * height];

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let grad_x = (map.get(x + 1, y) - map.get(x - 1, y)) * 0.5;
            let grad_y = (map.get(x, y + 1) - map.get(x, y - 1)) * 0.5;

            let mut fx = -grad_x;
            let mut fy = -grad_y;
            let len = (fx * fx + fy * fy).sqrt();
            if len > 0.0001 {
                fx /= len;
                fy /= len;
            }
            data[y * width + x] = (fx, fy);
        }
    }

    FlowField { width, data }
}

fn normalize(v: (f32, f32)) -> (f32, f32) {
    let len = (v.0 * v.0 + v.1 * v.1).sqrt();
    if len > 0.0 {
        (v.0 / len, v.1 / len)
    } else {
        v
    }
}

fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    (dx * dx + dy * dy).sqrt()
}

fn trace_river(
    map: &Grid,
    flow_field: &FlowField,
    start: (f32, f32),
    target: (f32, f32),
    params: &RiverParams,
    is_main: bool,
) -> RiverPath {
    let mut path = RiverPath {
        points: Vec::new(),
        is_main,
    };

    let mut pos = start;
    let mut dir = (0.0f32, 0.0f32);

    for step in 0..MAX_STEPS {
        path.points.push(RiverPoint {
            pos,
            width: params.width,
            depth: 0.5 + (step as f32 / MAX_STEPS as f32) * 0.5,
        });

        if distance(pos, target) < TARGET_RADIUS {
            break;
        }

        let x = pos.0 as usize;
        let y = pos.1 as usize;
        if x < 1 || x >= map.width() - 1 || y < 1 || y >= map.height() - 1 {
            break;
        }

        let flow = flow_field.at(x, y);
        let to_target = normalize((target.0 - pos.0, target.1 - pos.1));
        let desired = normalize((
            flow.0 * 0.3 + to_target.0 * 0.7,
            flow.1 * 0.3 + to_target.1 * 0.7,
        ));

        dir = normalize((
            dir.0 * params.flow_smoothing + desired.0 * (1.0 - params.flow_smoothing),
            dir.1 * params.flow_smoothing + desired.1 * (1.0 - params.flow_smoothing),
        ));

        pos.0 = (pos.0 + dir.0 * STEP_SIZE).clamp(1.0, (map.width() - 2) as f32);
        pos.1 = (pos.1 + dir.1 * STEP_SIZE).clamp(1.0, (map.height() - 2) as f32);
    }

    smooth_path(&mut path, 0.5);
    path
}

fn trace_tributary(
    map: &Grid,
    flow_field: &FlowField,
    branch_point: (f32, f32),
    params: &RiverParams,
    rng: &mut ChaCha8Rng,
) -> RiverPath {
    // Spawn roughly perpendicular to the main river.
    let angle: f32 = rng.gen_range(-1.57..1.57);
    let spawn_dist = 100.0;

    let start = (
        (branch_point.0 + angle.cos() * spawn_dist).clamp(1.0, (map.width() - 2) as f32),
        (branch_point.1 + angle.sin() * spawn_dist).clamp(1.0, (map.height() - 2) as f32),
    );

    let tributary_params = RiverParams {
        width: params.width * params.tributary_width,
        ..params.clone()
    };

    trace_river(map, flow_field, start, branch_point, &tributary_params, false)
}

/// High well-spaced edge points, candidates for mountain springs.
fn find_sources(map: &Grid, num_rivers: usize) -> Vec<(f32, f32)> {
    let width = map.width();
    let height = map.height();
    const STEP: usize = 20;

    let mut candidates = Vec::new();
    let mut x = 0;
    while x < width {
        candidates.push((x as f32, 0.0));
        candidates.push((x as f32, (height - 1) as f32));
        x += STEP;
    }
    let mut y = 0;
    while y < height {
        candidates.push((0.0, y as f32));
        candidates.push(((width - 1) as f32, y as f32));
        y += STEP;
    }

    candidates.sort_by(|a, b| {
        let ha = map.get(a.0 as usize, a.1 as usize);
        let hb = map.get(b.0 as usize, b.1 as usize);
        hb.total_cmp(&ha)
    });

    select_spaced(candidates, num_rivers, width as f32 * 0.25)
}

/// Low well-spaced interior valleys.
fn find_destinations(map: &Grid, num_rivers: usize) -> Vec<(f32, f32)> {
    let width = map.width();
    let height = map.height();
    let margin = (width as f32 * 0.15) as usize;
    const STEP: usize = 8;

    let mut valleys = Vec::new();
    let mut y = margin;
    while y < height.saturating_sub(margin) {
        let mut x = margin;
        while x < width.saturating_sub(margin) {
            if map.get(x, y) < 0.35 {
                valleys.push((x as f32, y as f32));
            }
            x += STEP;
        }
        y += STEP;
    }

    valleys.sort_by(|a, b| {
        let ha = map.get(a.0 as usize, a.1 as usize);
        let hb = map.get(b.0 as usize, b.1 as usize);
        ha.total_cmp(&hb)
    });

    select_spaced(valleys, num_rivers, width as f32 * 0.2)
}

fn select_spaced(
    candidates: Vec<(f32, f32)>,
    count: usize,
    min_spacing: f32,
) -> Vec<(f32, f32)> {
    let mut selected: Vec<(f32, f32)> = Vec::new();
    for candidate in candidates {
        if selected.len() >= count {
            break;
        }
        if selected.iter().all(|s| distance(candidate, *s) >= min_spacing) {
            selected.push(candidate);
        }
    }
    selected
}

fn carve_path(map: &mut Grid, path: &RiverPath, intensity: f32) {
    let map_width = map.width() as i32;
    let map_height = map.height() as i32;

    for point in &path.points {
        let cx = point.pos.0 as i32;
        let cy = point.pos.1 as i32;
        let radius = point.width * 800.0;
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
                let carving = intensity * 0.12 * falloff * point.depth;

                let (ux, uy) = (x as usize, y as usize);
                map.set(ux, uy, (map.get(ux, uy) - carving).max(0.0));
            }
        }
    }
}

/// Marshy depressions around the channel with squared falloff.
fn apply_wetlands(map: &mut Grid, path: &RiverPath, params: &RiverParams) {
    let map_width = map.width() as i32;
    let map_height = map.height() as i32;
    let radius = params.wetland_radius;
    let i_radius = radius as i32;

    for point in &path.points {
        let cx = point.pos.0 as i32;
        let cy = point.pos.1 as i32;

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

                let moisture = 1.0 - dist / radius;
                let moisture = moisture * moisture;
                let lowering = params.wetland_strength * 0.02 * moisture;

                let (ux, uy) = (x as usize, y as usize);
                map.set(ux, uy, (map.get(ux, uy) - lowering).max(0.0));
            }
        }
    }
}

fn smooth_path(path: &mut RiverPath, amount: f32) {
    if path.points.len() < 3 {
        return;
    }

    let mut smoothed = path.points.clone();
    for _ in 0..3 {
        for i in 1..path.points.len() - 1 {
            let prev = path.points[i - 1].pos;
            let cur = path.points[i].pos;
            let next = path.points[i + 1].pos;
            let avg = ((prev.0 + cur.0 + next.0) / 3.0, (prev.1 + cur.1 + next.1) / 3.0);
            smoothed[i].pos = (
                cur.0 + (avg.0 - cur.0) * amount,
                cur.1 + (avg.1 - cur.1) * amount,
            );
        }
        path.points.copy_from_slice(&smoothed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ridge_to_valley(n: usize) -> Grid {
        let mut map = Grid::new(n, n).unwrap();
        for y in 0..n {
            for x in 0..n {
                // High along the edges, low basin in the center.
                let cx = (x as f32 / n as f32 - 0.5).abs();
                let cy = (y as f32 / n as f32 - 0.5).abs();
                map.set(x, y, 0.2 + cx.max(cy) * 1.2);
            }
        }
        map
    }

    fn default_params() -> RiverParams {
        RiverParams {
            intensity: 0.5,
            width: 0.02,
            flow_smoothing: 0.3,
            enable_tributaries: true,
            tributaries_per_river: 2,
            tributary_width: 0.4,
            enable_wetlands: true,
            wetland_radius: 30.0,
            wetland_strength: 0.3,
        }
    }

    #[test]
    fn test_low_intensity_is_noop() {
        let mut map = ridge_to_valley(128);
        let before = map.clone();
        let params = RiverParams {
            intensity: 0.001,
            ..default_params()
        };
        apply(&mut map, &params, 5);
        assert_eq!(before, map);
    }

    #[test]
    fn test_rivers_only_lower_terrain() {
        let mut map = ridge_to_valley(128);
        let before = map.clone();
        apply(&mut map, &default_params(), 5);
        for (a, b) in before.as_slice().iter().zip(map.as_slice()) {
            assert!(*b <= *a + 1e-6);
        }
    }

    #[test]
    fn test_same_seed_is_deterministic() {
        let mut a = ridge_to_valley(128);
        let mut b = ridge_to_valley(128);
        apply(&mut a, &default_params(), 5);
        apply(&mut b, &default_params(), 5);
        assert_eq!(a, b);
    }

    #[test]
    fn test_flow_field_points_downhill() {
        let mut map = Grid::new(16, 16).unwrap();
        for y in 0..16 {
            for x in 0..16 {
                map.set(x, y, x as f32 / 16.0);
            }
        }
        let field = calculate_flow_field(&map);
        let (fx, fy) = field.at(8, 8);
        assert!(fx < -0.99);
        assert!(fy.abs() < 1e-3);
    }
}
