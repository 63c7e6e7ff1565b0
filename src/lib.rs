//! Procedural terrain synthesis library.
//!
//! Re-exports modules for use by binaries and tools.

pub mod executor;
pub mod export;
pub mod generator;
pub mod grid;
pub mod params;
pub mod perlin;
pub mod stages;

pub use executor::{ExecutorError, ParallelExecutor};
pub use generator::{GenerateError, TerrainGenerator};
pub use grid::{Grid, GridError};
pub use params::{TerrainParams, TerrainPreset};
pub use perlin::NoiseGenerator;
