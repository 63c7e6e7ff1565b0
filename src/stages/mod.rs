//! Terrain-shaping stages applied by the pipeline orchestrator.

pub mod edge_smoothing;
pub mod hydraulic;
pub mod peaks;
pub mod river_enhancements;
pub mod rivers;
pub mod softening;
pub mod thermal;
pub mod utils;
pub mod valley_connectivity;
pub mod valley_flattening;

pub use hydraulic::HydraulicParams;
pub use thermal::ThermalParams;
