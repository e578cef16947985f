use std::path::PathBuf;

use anyhow::{Context, bail};
use cellspace_common::CellId;
use cellspace_kernel::Geometry;
use cellspace_persist::GeometryStore;
use cellspace_tools::GeometryInspector;
use clap::{Parser, Subcommand};
use glam::DVec3;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cellspace-cli", about = "CLI tool for cellspace geometries")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Load and finalize a definition, then print a summary
    Check {
        /// Geometry definition (.yaml, .yml or .json)
        definition: PathBuf,
    },
    /// Find the cell containing a point
    Locate {
        definition: PathBuf,
        /// Point as x,y,z
        #[arg(value_parser = parse_vec3, allow_hyphen_values = true)]
        point: DVec3,
        /// Direction of flight as x,y,z, used on surfaces
        #[arg(short, long, value_parser = parse_vec3, default_value = "1,0,0", allow_hyphen_values = true)]
        direction: DVec3,
    },
    /// Follow a ray and print every cell it crosses
    Trace {
        definition: PathBuf,
        #[arg(value_parser = parse_vec3, allow_hyphen_values = true)]
        origin: DVec3,
        #[arg(short, long, value_parser = parse_vec3, default_value = "1,0,0", allow_hyphen_values = true)]
        direction: DVec3,
        /// Stop after this many surface crossings
        #[arg(short, long, default_value = "1000")]
        max_crossings: usize,
    },
    /// Show one cell in detail
    Inspect {
        definition: PathBuf,
        /// Cell id
        cell: i32,
    },
    /// Write the geometry's persisted state as the next dump of a store
    Dump {
        definition: PathBuf,
        /// Store directory
        #[arg(short, long, default_value = "geometry_data")]
        store: PathBuf,
    },
    /// Verify the integrity chain of a store
    Verify {
        #[arg(default_value = "geometry_data")]
        store: PathBuf,
    },
}

fn parse_vec3(s: &str) -> Result<DVec3, String> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid number in '{s}': {e}"))?;
    match parts.as_slice() {
        [x, y, z] => Ok(DVec3::new(*x, *y, *z)),
        _ => Err(format!("expected x,y,z, got '{s}'")),
    }
}

fn load_geometry(path: &PathBuf) -> anyhow::Result<Geometry> {
    let definition = cellspace_loader::load(path)
        .with_context(|| format!("loading {}", path.display()))?;
    definition
        .build()
        .with_context(|| format!("building geometry from {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match cli.command {
        Commands::Info => {
            println!("cellspace-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", cellspace_common::crate_info());
            println!("surface: {}", cellspace_surface::crate_info());
            println!("kernel: {}", cellspace_kernel::crate_info());
            println!("loader: {}", cellspace_loader::crate_info());
            println!("persist: {}", cellspace_persist::crate_info());
            println!("tools: {}", cellspace_tools::crate_info());
        }
        Commands::Check { definition } => {
            let geometry = load_geometry(&definition)?;
            println!("{}", GeometryInspector::summary(&geometry));
        }
        Commands::Locate {
            definition,
            point,
            direction,
        } => {
            if direction.length_squared() == 0.0 {
                bail!("direction must be non-zero");
            }
            let geometry = load_geometry(&definition)?;
            let Some(location) = geometry.find_cell(point, direction.normalize()) else {
                println!("({}, {}, {}) is outside the geometry", point.x, point.y, point.z);
                return Ok(());
            };
            for (depth, level) in location.levels().iter().enumerate() {
                let cell = geometry.cell(level.cell);
                println!(
                    "level {depth}: universe {} cell {} local ({:.6}, {:.6}, {:.6})",
                    geometry.universe(level.universe).id(),
                    cell.id(),
                    level.r.x,
                    level.r.y,
                    level.r.z,
                );
            }
            let material = geometry
                .material_at(&location)
                .map_or_else(|| "void".to_owned(), |m| m.to_string());
            print!("instance {} material {material}", location.instance(&geometry));
            match geometry.temperature_at(&location) {
                Some(t) => println!(" temperature {t:.2} K"),
                None => println!(),
            }
        }
        Commands::Trace {
            definition,
            origin,
            direction,
            max_crossings,
        } => {
            if direction.length_squared() == 0.0 {
                bail!("direction must be non-zero");
            }
            let geometry = load_geometry(&definition)?;
            let segments = GeometryInspector::trace_ray(&geometry, origin, direction, max_crossings);
            if segments.is_empty() {
                println!("ray starts outside the geometry");
            }
            for segment in &segments {
                println!("{segment}");
            }
            let total: f64 = segments
                .iter()
                .map(|s| s.distance)
                .filter(|d| d.is_finite())
                .sum();
            println!("{} segments, {total:.6} total length", segments.len());
        }
        Commands::Inspect { definition, cell } => {
            let geometry = load_geometry(&definition)?;
            match GeometryInspector::inspect_cell(&geometry, CellId(cell)) {
                Some(info) => println!("{info}"),
                None => bail!("no cell with id {cell}"),
            }
        }
        Commands::Dump { definition, store } => {
            let geometry = load_geometry(&definition)?;
            let mut store = GeometryStore::open(&store)
                .with_context(|| format!("opening store {}", store.display()))?;
            let number = store.dump(&geometry)?;
            println!("wrote dump {number} to {}", store.root().display());
        }
        Commands::Verify { store } => {
            let store = GeometryStore::open(&store)
                .with_context(|| format!("opening store {}", store.display()))?;
            store.verify_integrity()?;
            println!(
                "{} dumps verified in {}",
                store.meta().dump_count,
                store.root().display()
            );
        }
    }

    Ok(())
}
