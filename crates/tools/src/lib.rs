//! Developer tooling: read-only geometry inspection and ray tracing.
//!
//! # Invariants
//! - Tools never change geometry topology; tracing only fills neighbor caches.

mod inspector;

pub use inspector::{CellInfo, GeometryInspector, GeometrySummary, TraceSegment};

pub fn crate_info() -> &'static str {
    "cellspace-tools v0.1.0"
}
