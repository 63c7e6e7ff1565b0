//! Terrain generation parameters and presets.

use serde::{Deserialize, Serialize};

/// Full parameter record for one generation run. Flat, value-comparable,
/// passed by value into the pipeline; no field is mutated mid-run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainParams {
    // =========================================================================
    // Base terrain
    // =========================================================================
    /// Noise seed; every seeded stage derives from this.
    pub seed: u32,
    /// Feature scale in pixels (larger = broader features).
    pub scale: f32,
    /// Number of noise octaves.
    pub octaves: u32,
    /// Amplitude decay per octave (0.0-1.0).
    pub persistence: f32,
    /// Frequency multiplier per octave.
    pub lacunarity: f32,

    // =========================================================================
    // Valleys
    // =========================================================================
    pub valley_strength: f32,
    pub valley_sharpness: f32,
    pub valley_width: f32,
    /// Valley flattening strength (0 disables the stage).
    pub flatten_valleys: f32,
    /// Valley corridor carving strength (0 disables the stage).
    pub valley_connectivity: f32,

    // =========================================================================
    // Rivers
    // =========================================================================
    pub river_intensity: f32,
    /// Base river width as a fraction of 800 px.
    pub river_width: f32,
    /// Switch to the flow-field river system.
    pub enable_river_enhancements: bool,
    pub use_gradient_flow: bool,
    /// Direction inertia while tracing (0-1).
    pub flow_smoothing: f32,
    pub enable_tributaries: bool,
    /// Tributaries branching from each main river (1-3 branch points exist).
    pub tributaries_per_river: u32,
    /// Tributary width relative to the main river.
    pub tributary_width: f32,
    pub enable_wetlands: bool,
    /// Wetland spread distance in pixels.
    pub wetland_radius: f32,
    pub wetland_strength: f32,

    // =========================================================================
    // Effects
    // =========================================================================
    /// Master erosion strength.
    pub erosion: f32,
    /// Terrace step count (0 disables terracing).
    pub terracing: u32,
    pub peaks: f32,
    /// Island mask blend (0 disables the mask).
    pub island: f32,
    pub edge_padding: f32,
    /// Minkowski exponent blend: 1 = diamond, 2 = circle, higher = square.
    pub island_shape: f32,

    // =========================================================================
    // Thermal erosion
    // =========================================================================
    pub thermal_erosion_enabled: bool,
    /// Angle of repose in radians (~40 degrees).
    pub thermal_talus_angle: f32,
    /// Material transfer rate (0.0-1.0).
    pub thermal_rate: f32,
    pub thermal_iterations: u32,

    // =========================================================================
    // Hydraulic erosion
    // =========================================================================
    pub hydraulic_erosion_enabled: bool,
    /// Droplets per iteration.
    pub hydraulic_droplets: u32,
    /// Max steps per droplet.
    pub hydraulic_lifetime: u32,
    /// Direction persistence (0-1).
    pub hydraulic_inertia: f32,
    /// Sediment capacity multiplier.
    pub hydraulic_capacity: f32,
    /// Erosion rate.
    pub hydraulic_erosion: f32,
    /// Deposition rate.
    pub hydraulic_deposition: f32,
    pub hydraulic_iterations: u32,

    // =========================================================================
    // Archipelago
    // =========================================================================
    pub archipelago_mode: bool,
    pub archipelago_island_count: u32,
    /// Island radius range in normalized map units.
    pub archipelago_min_size: f32,
    pub archipelago_max_size: f32,
    /// Minimum center spacing in normalized map units.
    pub archipelago_spacing: f32,
    /// Coastline irregularity (0-1).
    pub archipelago_variation: f32,

    // =========================================================================
    // Softening
    // =========================================================================
    /// Low-terrain smoothing strength (0 disables the stage).
    pub terrain_smoothness: f32,
    /// Percentile below which softening applies fully.
    pub softening_threshold: f32,

    /// Sea plane height for exporters and previews (0-1).
    pub sea_level: f32,
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            seed: 12345,
            scale: 100.0,
            octaves: 6,
            persistence: 0.5,
            lacunarity: 2.0,

            valley_strength: 0.3,
            valley_sharpness: 2.0,
            valley_width: 0.3,
            flatten_valleys: 0.0,
            valley_connectivity: 0.0,

            river_intensity: 0.4,
            river_width: 0.02,
            enable_river_enhancements: false,
            use_gradient_flow: true,
            flow_smoothing: 0.3,
            enable_tributaries: true,
            tributaries_per_river: 2,
            tributary_width: 0.4,
            enable_wetlands: true,
            wetland_radius: 30.0,
            wetland_strength: 0.3,

            erosion: 0.2,
            terracing: 0,
            peaks: 0.3,
            island: 0.0,
            edge_padding: 0.15,
            island_shape: 1.5,

            thermal_erosion_enabled: false,
            thermal_talus_angle: 0.7,
            thermal_rate: 0.5,
            thermal_iterations: 30,

            hydraulic_erosion_enabled: false,
            hydraulic_droplets: 5000,
            hydraulic_lifetime: 50,
            hydraulic_inertia: 0.3,
            hydraulic_capacity: 3.0,
            hydraulic_erosion: 0.3,
            hydraulic_deposition: 0.3,
            hydraulic_iterations: 1,

            archipelago_mode: false,
            archipelago_island_count: 5,
            archipelago_min_size: 0.1,
            archipelago_max_size: 0.25,
            archipelago_spacing: 0.2,
            archipelago_variation: 0.5,

            terrain_smoothness: 0.0,
            softening_threshold: 0.5,

            sea_level: 0.25,
        }
    }
}

impl TerrainParams {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Named parameter bundle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TerrainPreset {
    /// Rolling baseline terrain with light erosion.
    #[default]
    Default,
    /// Single island with soft edges.
    Island,
    /// Scattered irregular islands over ocean floor.
    Archipelago,
    /// Thermal + hydraulic erosion cut deep channels.
    Canyons,
    /// Low flattened valleys threaded with rivers and marshes.
    Wetlands,
    /// Ridged peaks with terraced slopes.
    Alpine,
}

impl TerrainPreset {
    pub fn all() -> &'static [Self] {
        &[
            Self::Default,
            Self::Island,
            Self::Archipelago,
            Self::Canyons,
            Self::Wetlands,
            Self::Alpine,
        ]
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Default => "Rolling terrain, light erosion",
            Self::Island => "Single island, soft coast",
            Self::Archipelago => "Scattered island chain",
            Self::Canyons => "Deep erosion channels",
            Self::Wetlands => "Flat valleys, rivers and marshes",
            Self::Alpine => "Sharp peaks and terraces",
        }
    }

    pub fn params(&self, seed: u32) -> TerrainParams {
        let base = TerrainParams {
            seed,
            ..TerrainParams::default()
        };
        match self {
            Self::Default => base,
            Self::Island => TerrainParams {
                island: 0.8,
                edge_padding: 0.25,
                ..base
            },
            Self::Archipelago => TerrainParams {
                island: 0.9,
                archipelago_mode: true,
                archipelago_island_count: 7,
                edge_padding: 0.2,
                ..base
            },
            Self::Canyons => TerrainParams {
                erosion: 0.8,
                thermal_erosion_enabled: true,
                hydraulic_erosion_enabled: true,
                hydraulic_droplets: 20000,
                peaks: 0.2,
                ..base
            },
            Self::Wetlands => TerrainParams {
                flatten_valleys: 0.6,
                valley_connectivity: 0.5,
                river_intensity: 0.7,
                enable_river_enhancements: true,
                terrain_smoothness: 0.4,
                peaks: 0.1,
                ..base
            },
            Self::Alpine => TerrainParams {
                peaks: 0.9,
                terracing: 12,
                erosion: 0.4,
                thermal_erosion_enabled: true,
                thermal_iterations: 40,
                ..base
            },
        }
    }
}

impl std::fmt::Display for TerrainPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Island => write!(f, "island"),
            Self::Archipelago => write!(f, "archipelago"),
            Self::Canyons => write!(f, "canyons"),
            Self::Wetlands => write!(f, "wetlands"),
            Self::Alpine => write!(f, "alpine"),
        }
    }
}

impl std::str::FromStr for TerrainPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "island" => Ok(Self::Island),
            "archipelago" => Ok(Self::Archipelago),
            "canyons" => Ok(Self::Canyons),
            "wetlands" => Ok(Self::Wetlands),
            "alpine" => Ok(Self::Alpine),
            other => Err(format!("unknown preset '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_json_round_trip() {
        let params = TerrainPreset::Wetlands.params(99);
        let json = params.to_json().unwrap();
        let back = TerrainParams::from_json(&json).unwrap();
        assert_eq!(params, back);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let params = TerrainParams::from_json(r#"{"seed": 7, "peaks": 0.5}"#).unwrap();
        assert_eq!(params.seed, 7);
        assert_eq!(params.peaks, 0.5);
        assert_eq!(params.octaves, TerrainParams::default().octaves);
    }

    #[test]
    fn test_preset_parse_round_trip() {
        for preset in TerrainPreset::all() {
            let parsed: TerrainPreset = preset.to_string().parse().unwrap();
            assert_eq!(*preset, parsed);
        }
    }
}
