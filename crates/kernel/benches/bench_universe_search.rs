use std::hint::black_box;
use std::time::Instant;

use cellspace_kernel::{CellSpec, Geometry, GeometryBuilder, GeometryConfig};
use cellspace_surface::Surface;
use glam::DVec3;

/// A row of `slabs` slabs along x, each holding a pin and its moderator.
fn make_geometry(slabs: usize, partition_min_planes: usize) -> Geometry {
    let config = GeometryConfig {
        partition_min_planes,
        ..GeometryConfig::default()
    };
    let mut b = GeometryBuilder::with_config(config);
    let n = slabs as i32;
    for i in 0..=n {
        b.surface(i + 1, Surface::XPlane { x0: f64::from(i) })
            .expect("plane");
    }
    for i in 0..n {
        let pin = 1000 + i;
        b.surface(pin, Surface::ZCylinder { x0: f64::from(i) + 0.5, y0: 0.0, r: 0.4 })
            .expect("cylinder");
        let (lo, hi) = (i + 1, i + 2);
        b.cell(CellSpec::new(2 * i + 1, &format!("{lo} -{hi} -{pin}")).material(1))
            .cell(CellSpec::new(2 * i + 2, &format!("{lo} -{hi} {pin}")).material(2));
    }
    b.build().expect("geometry")
}

fn points(slabs: usize, count: usize) -> Vec<DVec3> {
    (0..count)
        .map(|i| {
            let x = (i * 7919 % (slabs * 100)) as f64 / 100.0 + 0.005;
            let y = ((i * 104_729) % 100) as f64 / 100.0 - 0.5;
            DVec3::new(x, y, 0.0)
        })
        .collect()
}

fn bench_find_cell(slabs: usize, partition_min_planes: usize, iterations: usize) {
    let geometry = make_geometry(slabs, partition_min_planes);
    let label = if geometry.root().partitioner().is_some() {
        "partitioned"
    } else {
        "linear"
    };
    let pts = points(slabs, 1000);

    let start = Instant::now();
    for _ in 0..iterations {
        for r in &pts {
            let _ = black_box(geometry.find_cell(black_box(*r), DVec3::X));
        }
    }
    let elapsed = start.elapsed();
    let per_query = elapsed / (iterations * pts.len()) as u32;
    println!(
        "  find_cell {label} ({} cells, {iterations} iters): {per_query:?}/query, total {elapsed:?}",
        geometry.cells().len()
    );
}

fn bench_track(slabs: usize, iterations: usize) {
    let geometry = make_geometry(slabs, 5);

    let start = Instant::now();
    let mut crossings = 0usize;
    for _ in 0..iterations {
        let Some(mut location) = geometry.find_cell(DVec3::new(0.01, 0.0, 0.0), DVec3::X) else {
            continue;
        };
        loop {
            let boundary = geometry.distance_to_boundary(&location);
            geometry.advance(&mut location, boundary.boundary.distance);
            match geometry.cross_surface(&location, &boundary) {
                Some(next) => location = next,
                None => break,
            }
            crossings += 1;
        }
    }
    let elapsed = start.elapsed();
    let per_crossing = elapsed / crossings.max(1) as u32;
    println!(
        "  track ({} cells, {crossings} crossings): {per_crossing:?}/crossing, total {elapsed:?}",
        geometry.cells().len()
    );
}

fn main() {
    println!("=== Universe Search Benchmarks ===\n");

    println!("Cell search, linear scan:");
    bench_find_cell(10, usize::MAX, 100);
    bench_find_cell(100, usize::MAX, 10);
    bench_find_cell(1000, usize::MAX, 1);

    println!("\nCell search, partitioned:");
    bench_find_cell(10, 5, 100);
    bench_find_cell(100, 5, 10);
    bench_find_cell(1000, 5, 1);

    println!("\nTracking with neighbor lists:");
    bench_track(100, 100);
    bench_track(1000, 10);

    println!("\n=== Done ===");
}
