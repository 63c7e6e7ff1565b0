use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use terraforge::export;
use terraforge::{ParallelExecutor, TerrainGenerator, TerrainParams, TerrainPreset};

#[derive(Parser, Debug)]
#[command(name = "terraforge")]
#[command(about = "Generate procedural terrain heightmaps")]
struct Args {
    /// Width of the heightmap in pixels
    #[arg(short = 'W', long, default_value = "512")]
    width: usize,

    /// Height of the heightmap in pixels
    #[arg(short = 'H', long, default_value = "512")]
    height: usize,

    /// Random seed (uses a random seed if not specified)
    #[arg(short, long)]
    seed: Option<u32>,

    /// Named parameter preset (default, island, archipelago, canyons, wetlands, alpine)
    #[arg(short, long, default_value = "default")]
    preset: TerrainPreset,

    /// Worker thread count (0 = hardware parallelism)
    #[arg(short, long, default_value = "0")]
    threads: usize,

    /// Load parameters from a JSON file (overrides the preset)
    #[arg(long)]
    params_json: Option<PathBuf>,

    /// Write the effective parameters to a JSON file
    #[arg(long)]
    save_params: Option<PathBuf>,

    /// Override the master erosion strength (0.0-1.0)
    #[arg(long)]
    erosion: Option<f32>,

    /// Override the peak intensity (0.0-1.0)
    #[arg(long)]
    peaks: Option<f32>,

    /// Override the island mask strength (0.0-1.0)
    #[arg(long)]
    island: Option<f32>,

    /// Override the river intensity (0.0-1.0)
    #[arg(long)]
    rivers: Option<f32>,

    /// Override the terrain smoothness (0.0-1.0)
    #[arg(long)]
    smoothness: Option<f32>,

    /// Override the terrace step count (0 = off)
    #[arg(long)]
    terracing: Option<u32>,

    /// Flatten low-lying areas after generation with this strength
    #[arg(long)]
    flatten_valleys: Option<f32>,

    /// Carve corridors between valley regions with this strength
    #[arg(long)]
    connect_valleys: Option<f32>,

    /// Grayscale PNG output path
    #[arg(short, long, default_value = "terrain.png")]
    output: PathBuf,

    /// Also export a spectral colormap PNG to this path
    #[arg(long)]
    color: Option<PathBuf>,

    /// Also dump the raw little-endian f32 buffer to this path
    #[arg(long)]
    raw: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::init();
    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let seed = args.seed.unwrap_or_else(rand::random);

    let mut params = match &args.params_json {
        Some(path) => {
            let json = std::fs::read_to_string(path)?;
            let mut params = TerrainParams::from_json(&json)?;
            // An explicit --seed wins over the one stored in the file.
            if args.seed.is_some() {
                params.seed = seed;
            }
            params
        }
        None => args.preset.params(seed),
    };
    if let Some(v) = args.erosion {
        params.erosion = v;
    }
    if let Some(v) = args.peaks {
        params.peaks = v;
    }
    if let Some(v) = args.island {
        params.island = v;
    }
    if let Some(v) = args.rivers {
        params.river_intensity = v;
    }
    if let Some(v) = args.smoothness {
        params.terrain_smoothness = v;
    }
    if let Some(v) = args.terracing {
        params.terracing = v;
    }
    let seed = params.seed;

    if let Some(path) = &args.save_params {
        std::fs::write(path, params.to_json()?)?;
        println!("Saved parameters to {}", path.display());
    }

    let executor = Arc::new(ParallelExecutor::with_threads(args.threads)?);
    println!("Generating terrain with seed: {}", seed);
    println!("Map size: {}x{}", args.width, args.height);
    println!("Preset: {} ({})", args.preset, args.preset.description());
    println!("Workers: {}", executor.thread_count());

    let generator = TerrainGenerator::new(args.width, args.height, executor)?;
    generator.generate(&params)?;

    if let Some(strength) = args.flatten_valleys {
        println!("Flattening low areas...");
        let op_params = TerrainParams {
            flatten_valleys: strength,
            ..params.clone()
        };
        generator.flatten_low_areas(&op_params)?;
    }

    if let Some(strength) = args.connect_valleys {
        println!("Connecting valleys...");
        let op_params = TerrainParams {
            valley_connectivity: strength,
            ..params.clone()
        };
        generator.connect_valleys(&op_params)?;
    }

    let terrain = generator.snapshot();

    export::export_grayscale(&terrain, &args.output)?;
    println!("Wrote {}", args.output.display());

    if let Some(path) = &args.color {
        export::export_colormap(&terrain, path)?;
        println!("Wrote {}", path.display());
    }

    if let Some(path) = &args.raw {
        export::export_raw(&terrain, path)?;
        println!("Wrote {}", path.display());
    }

    Ok(())
}
