use cellspace_common::{CellIndex, Direction, Position, SurfaceHandle, UniverseId, UniverseIndex};
use cellspace_surface::SurfaceSet;

use crate::geometry::Geometry;
use crate::group::Group;
use crate::partitioner::UniversePartitioner;

/// All of space at one nesting level, as an ordered set of cells.
#[derive(Debug, Clone)]
pub struct Universe {
    pub(crate) id: UniverseId,
    pub(crate) index: UniverseIndex,
    /// Declaration order, which is also the scan order.
    pub(crate) cells: Vec<CellIndex>,
    pub(crate) partitioner: Option<UniversePartitioner>,
}

impl Universe {
    pub fn id(&self) -> UniverseId {
        self.id
    }

    pub fn index(&self) -> UniverseIndex {
        self.index
    }

    pub fn cells(&self) -> &[CellIndex] {
        &self.cells
    }

    pub fn partitioner(&self) -> Option<&UniversePartitioner> {
        self.partitioner.as_ref()
    }

    /// Cells that could contain `r`: one partition if the universe is
    /// partitioned, otherwise every member.
    pub fn candidates(
        &self,
        surfaces: &SurfaceSet,
        r: Position,
        u: Direction,
        on_surface: Option<SurfaceHandle>,
    ) -> &[CellIndex] {
        match &self.partitioner {
            Some(p) => p.get_cells_on(surfaces, r, u, on_surface),
            None => &self.cells,
        }
    }

    /// Write `universe <id>` with the ids of its cells.
    pub fn to_group(&self, geometry: &Geometry, parent: &mut Group) {
        let cells: Vec<i64> = self
            .cells
            .iter()
            .map(|&c| i64::from(geometry.cell(c).id().0))
            .collect();
        parent
            .create_group(format!("universe {}", self.id))
            .write("cells", cells);
    }
}
