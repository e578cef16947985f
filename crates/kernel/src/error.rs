use cellspace_common::{CellId, LatticeId, UniverseId};
use cellspace_surface::SurfaceError;

use crate::RegionError;

/// Errors from geometry construction and setup-phase accessors.
///
/// Everything except the accessor errors is a load-time configuration error
/// and names the offending cell or universe.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    #[error("cell {cell}: invalid region: {source}")]
    Region {
        cell: CellId,
        #[source]
        source: RegionError,
    },
    #[error("duplicate cell id {0}")]
    DuplicateCell(CellId),
    #[error("duplicate lattice id {0}")]
    DuplicateLattice(LatticeId),
    #[error("cell {cell}: fill {target} is neither a universe nor a lattice")]
    UnknownFill { cell: CellId, target: i32 },
    #[error("cell {cell}: fill {target} names both a universe and a lattice")]
    AmbiguousFill { cell: CellId, target: i32 },
    #[error("cell {cell}: specifies both a material and a fill")]
    ConflictingFill { cell: CellId },
    #[error("cell {cell}: needs a material or a fill")]
    MissingFill { cell: CellId },
    #[error("cell {cell}: needs a region or a mesh region, not both")]
    ConflictingShape { cell: CellId },
    #[error("cell {cell}: translation or rotation is only allowed on universe fills")]
    TransformWithoutUniverse { cell: CellId },
    #[error("cell {cell}: cannot fill its own universe")]
    SelfFill { cell: CellId },
    #[error("lattice {lattice}: unknown universe {universe}")]
    UnknownLatticeUniverse {
        lattice: LatticeId,
        universe: UniverseId,
    },
    #[error("universe {0} is part of a fill cycle")]
    FillCycle(UniverseId),
    #[error("no root universe: every universe is used as a fill")]
    NoRootUniverse,
    #[error("unknown root universe {0}")]
    UnknownRootUniverse(UniverseId),
    #[error("multiple candidate root universes: {0:?}")]
    MultipleRootUniverses(Vec<UniverseId>),
    #[error("cell {cell}: {given} materials for {instances} instances")]
    MaterialCountMismatch {
        cell: CellId,
        given: usize,
        instances: usize,
    },
    #[error("cell {cell}: {given} temperatures for {instances} instances")]
    TemperatureCountMismatch {
        cell: CellId,
        given: usize,
        instances: usize,
    },
    #[error("cell {cell}: {given} temperatures for {materials} materials")]
    TemperatureMaterialMismatch {
        cell: CellId,
        given: usize,
        materials: usize,
    },
    #[error("cell {cell}: temperatures are only allowed on material cells")]
    TemperatureOnFilledCell { cell: CellId },
    #[error("cell {cell}: invalid temperature {value} K")]
    InvalidTemperature { cell: CellId, value: f64 },
    #[error("cell {cell}: instance {instance} out of range (0..{count})")]
    InstanceOutOfRange {
        cell: CellId,
        instance: usize,
        count: usize,
    },
    #[error("cell {cell}: has no temperature (not a material cell)")]
    NoTemperature { cell: CellId },
    #[error("cell {cell}: mesh region given but no mesh backend is attached")]
    MissingMeshBackend { cell: CellId },
    #[error("unknown cell id {0}")]
    UnknownCell(CellId),
    #[error("geometry has no cells")]
    Empty,
}
