//! Cell geometry kernel: region expressions, cells, universes, partitioning,
//! neighbor caches and the assembled [`Geometry`].
//!
//! # Invariants
//! - A region's RPN is a valid postfix expression yielding exactly one value.
//! - Finalized material cells hold exactly `n_instances` materials and
//!   temperatures; cells filled with a universe or lattice hold neither.
//! - Topology is immutable after [`GeometryBuilder::build`]; only temperatures
//!   (through `&mut`) and neighbor lists (through atomics) change later.
//! - Neighbor lists are caches: a missing or stale entry costs a universe
//!   search, never a wrong answer.

mod builder;
pub mod cell;
pub mod config;
mod error;
pub mod geometry;
pub mod group;
pub mod neighbor;
pub mod partitioner;
pub mod region;
pub mod universe;

pub use builder::{CellSpec, GeometryBuilder, LatticeSpec};
pub use cell::{Cell, CellKind, Fill, MeshCell, MeshQuery};
pub use config::GeometryConfig;
pub use error::GeometryError;
pub use geometry::{Geometry, LevelBoundary, LevelCoord, Location};
pub use group::{Dataset, Group};
pub use neighbor::{NeighborList, NeighborTable};
pub use partitioner::UniversePartitioner;
pub use region::{Boundary, Region, RegionError, Token};
pub use universe::Universe;

pub fn crate_info() -> &'static str {
    "cellspace-kernel v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("kernel"));
    }
}
