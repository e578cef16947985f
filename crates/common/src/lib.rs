//! Shared types for the cellspace geometry core: external ids, dense arena
//! indices, signed surface handles, coordinates and rigid transforms.
//!
//! # Invariants
//! - A `SurfaceHandle` is never zero; its magnitude minus one is a dense index.
//! - Dense indices are assigned once at load time and never reused.

mod types;

pub use types::{
    CellId, CellIndex, Direction, HandleError, LatticeId, MaterialId, Position, SurfaceHandle,
    SurfaceId, SurfaceIndex, Transform, UniverseId, UniverseIndex,
};

/// Distance below which a point is considered to lie on a surface.
pub const FP_COINCIDENT: f64 = 1e-12;

/// Relative tolerance used when comparing boundary distances.
pub const FP_PRECISION: f64 = 1e-14;

/// Boltzmann constant in eV/K.
pub const K_BOLTZMANN: f64 = 8.617_333_262e-5;

pub fn crate_info() -> &'static str {
    "cellspace-common v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("common"));
    }
}
