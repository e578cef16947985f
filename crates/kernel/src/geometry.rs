use std::collections::BTreeMap;

use cellspace_common::{
    CellId, CellIndex, Direction, FP_PRECISION, LatticeId, MaterialId, Position, SurfaceHandle,
    UniverseId, UniverseIndex,
};
use cellspace_surface::SurfaceSet;

use crate::cell::{Cell, Fill};
use crate::config::GeometryConfig;
use crate::group::Group;
use crate::region::Boundary;
use crate::universe::Universe;
use crate::GeometryError;

/// A finalized cell hierarchy: surfaces, cells and universes in arenas,
/// cross-referenced by dense index.
///
/// Read-only after [`GeometryBuilder::build`](crate::GeometryBuilder::build)
/// apart from temperatures (through `&mut`) and neighbor caches (atomics).
#[derive(Debug, Clone)]
pub struct Geometry {
    pub(crate) config: GeometryConfig,
    pub(crate) surfaces: SurfaceSet,
    pub(crate) cells: Vec<Cell>,
    pub(crate) universes: Vec<Universe>,
    pub(crate) cell_map: BTreeMap<CellId, CellIndex>,
    pub(crate) universe_map: BTreeMap<UniverseId, UniverseIndex>,
    pub(crate) lattices: BTreeMap<LatticeId, Vec<UniverseId>>,
    pub(crate) root: UniverseIndex,
    pub(crate) n_distribcells: usize,
}

// Tracking threads share one geometry.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Geometry>();
};

/// Position of a particle at one nesting level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelCoord {
    pub universe: UniverseIndex,
    pub cell: CellIndex,
    /// Coordinates local to `universe`.
    pub r: Position,
    pub u: Direction,
    /// Surface the point is known to lie on, in this level's frame.
    pub on_surface: Option<SurfaceHandle>,
}

/// Where a point sits in the hierarchy, outermost level first.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    levels: Vec<LevelCoord>,
}

impl Location {
    pub fn levels(&self) -> &[LevelCoord] {
        &self.levels
    }

    /// Innermost level.
    pub fn last(&self) -> &LevelCoord {
        // A location always holds at least the root level.
        &self.levels[self.levels.len() - 1]
    }

    /// Innermost cell.
    pub fn cell(&self) -> CellIndex {
        self.last().cell
    }

    /// Position in root coordinates.
    pub fn position(&self) -> Position {
        self.levels[0].r
    }

    pub fn direction(&self) -> Direction {
        self.levels[0].u
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Instance of the innermost cell: the sum of the offsets recorded on the
    /// universe-filled cells along the path. Zero for cells that occur once.
    pub fn instance(&self, geometry: &Geometry) -> usize {
        let Some(d) = geometry.cell(self.cell()).distribcell_index else {
            return 0;
        };
        self.levels[..self.levels.len() - 1]
            .iter()
            .filter_map(|level| geometry.cell(level.cell).offsets.get(d))
            .sum()
    }
}

/// Nearest crossing over all levels of a location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelBoundary {
    pub boundary: Boundary,
    /// Level whose cell the crossing leaves.
    pub level: usize,
}

impl Geometry {
    pub fn config(&self) -> &GeometryConfig {
        &self.config
    }

    pub fn surfaces(&self) -> &SurfaceSet {
        &self.surfaces
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cell(&self, index: CellIndex) -> &Cell {
        &self.cells[index.get()]
    }

    /// Mutable access for setup and restart, e.g. temperature updates.
    pub fn cell_mut(&mut self, index: CellIndex) -> &mut Cell {
        &mut self.cells[index.get()]
    }

    pub fn cell_index(&self, id: CellId) -> Option<CellIndex> {
        self.cell_map.get(&id).copied()
    }

    pub fn cell_by_id(&self, id: CellId) -> Option<&Cell> {
        self.cell_index(id).map(|i| self.cell(i))
    }

    pub fn universes(&self) -> &[Universe] {
        &self.universes
    }

    pub fn universe(&self, index: UniverseIndex) -> &Universe {
        &self.universes[index.get()]
    }

    pub fn universe_index(&self, id: UniverseId) -> Option<UniverseIndex> {
        self.universe_map.get(&id).copied()
    }

    pub fn root(&self) -> &Universe {
        self.universe(self.root)
    }

    /// Universes placed in a lattice's elements, one entry per element.
    pub fn lattice(&self, id: LatticeId) -> Option<&[UniverseId]> {
        self.lattices.get(&id).map(Vec::as_slice)
    }

    pub fn lattices(&self) -> impl Iterator<Item = (LatticeId, &[UniverseId])> {
        self.lattices.iter().map(|(id, u)| (*id, u.as_slice()))
    }

    pub fn n_distribcells(&self) -> usize {
        self.n_distribcells
    }

    /// Set a cell's temperature (K) for one instance or, with `None`, all.
    pub fn set_temperature(
        &mut self,
        id: CellId,
        kelvin: f64,
        instance: Option<usize>,
    ) -> Result<(), GeometryError> {
        let index = self.cell_index(id).ok_or(GeometryError::UnknownCell(id))?;
        self.cell_mut(index).set_temperature(kelvin, instance)
    }

    /// First cell of `universe` containing `r`.
    pub fn search_universe(
        &self,
        universe: UniverseIndex,
        r: Position,
        u: Direction,
        on_surface: Option<SurfaceHandle>,
    ) -> Option<CellIndex> {
        self.universe(universe)
            .candidates(&self.surfaces, r, u, on_surface)
            .iter()
            .copied()
            .find(|&c| self.cell(c).contains(&self.surfaces, r, u, on_surface))
    }

    /// Locate `r` from the root universe down to a cell that is not filled
    /// with a universe. `None` if `r` is outside the geometry or falls in a
    /// gap of some filled universe.
    ///
    /// # Panics
    ///
    /// Panics if `u` has zero length.
    pub fn find_cell(&self, r: Position, u: Direction) -> Option<Location> {
        assert!(u.length_squared() > 0.0, "find_cell: zero-length direction");
        let cell = self.search_universe(self.root, r, u, None)?;
        let mut levels = vec![LevelCoord {
            universe: self.root,
            cell,
            r,
            u,
            on_surface: None,
        }];
        self.descend(&mut levels).then_some(Location { levels })
    }

    /// Extend `levels` through universe fills until a material or lattice
    /// cell is reached.
    fn descend(&self, levels: &mut Vec<LevelCoord>) -> bool {
        loop {
            let outer = levels[levels.len() - 1];
            let cell = self.cell(outer.cell);
            let Fill::Universe(universe) = cell.fill else {
                return true;
            };
            let (r, u, on_surface) = match &cell.transform {
                Some(t) if !t.is_identity() => {
                    (t.to_local_point(outer.r), t.to_local_direction(outer.u), None)
                }
                _ => (outer.r, outer.u, outer.on_surface),
            };
            let Some(inner) = self.search_universe(universe, r, u, on_surface) else {
                tracing::trace!(cell = %cell.id, "no cell found inside fill");
                return false;
            };
            levels.push(LevelCoord {
                universe,
                cell: inner,
                r,
                u,
                on_surface,
            });
        }
    }

    /// Nearest boundary of any level's cell. Ties within `FP_PRECISION` go to
    /// the outermost level.
    ///
    /// # Panics
    ///
    /// Panics if the direction has zero length.
    pub fn distance_to_boundary(&self, location: &Location) -> LevelBoundary {
        let mut best = LevelBoundary {
            boundary: Boundary::NONE,
            level: 0,
        };
        for (level, coord) in location.levels.iter().enumerate() {
            let b = self
                .cell(coord.cell)
                .distance(&self.surfaces, coord.r, coord.u, coord.on_surface);
            if b.distance < best.boundary.distance * (1.0 - FP_PRECISION) {
                best = LevelBoundary { boundary: b, level };
            }
        }
        best
    }

    /// Move every level `distance` along its direction.
    pub fn advance(&self, location: &mut Location, distance: f64) {
        for coord in &mut location.levels {
            coord.r += distance * coord.u;
            coord.on_surface = None;
        }
    }

    /// Find the cell entered after moving onto `crossing`. Cells recorded in
    /// the exited cell's neighbor list are tried first; otherwise the
    /// crossing level's universe is searched and the result recorded.
    ///
    /// `location` must already be advanced to the crossing point. `None`
    /// means the particle left the geometry (or was lost in a gap).
    pub fn cross_surface(&self, location: &Location, crossing: &LevelBoundary) -> Option<Location> {
        let k = crossing.level;
        let coord = location.levels[k];
        let exit = crossing.boundary.surface;
        let enter = crossing.boundary.entering();
        let exited = self.cell(coord.cell);

        let found = exited
            .neighbors
            .candidates(exit)
            .find(|&c| self.cell(c).contains(&self.surfaces, coord.r, coord.u, enter));
        let entered = match found {
            Some(c) => c,
            None => {
                tracing::trace!(cell = %exited.id, ?exit, "neighbor miss");
                let c = self.search_universe(coord.universe, coord.r, coord.u, enter)?;
                exited.neighbors.record(exit, c);
                c
            }
        };

        let mut levels = location.levels[..k].to_vec();
        levels.push(LevelCoord {
            universe: coord.universe,
            cell: entered,
            r: coord.r,
            u: coord.u,
            on_surface: enter,
        });
        self.descend(&mut levels).then_some(Location { levels })
    }

    /// Material at a location; `None` for void, lattice and unfilled cells.
    pub fn material_at(&self, location: &Location) -> Option<MaterialId> {
        let cell = self.cell(location.cell());
        match cell.fill {
            Fill::Material => cell.material(location.instance(self)),
            _ => None,
        }
    }

    /// Temperature (K) at a location, for material cells.
    pub fn temperature_at(&self, location: &Location) -> Option<f64> {
        let cell = self.cell(location.cell());
        cell.temperature(Some(location.instance(self))).ok()
    }

    /// Write the whole geometry under a `geometry` group of `parent`.
    pub fn to_group(&self, parent: &mut Group) {
        let group = parent.create_group("geometry");
        group.write("n_cells", self.cells.len() as i64);
        group.write("n_surfaces", self.surfaces.len() as i64);
        group.write("n_universes", self.universes.len() as i64);
        group.write("root_universe", self.root().id().0);

        let surfaces = group.create_group("surfaces");
        for entry in self.surfaces.entries() {
            let s = surfaces.create_group(format!("surface {}", entry.id));
            s.write("type", entry.surface.kind());
            s.write("coefficients", entry.surface.coefficients());
        }

        let cells = group.create_group("cells");
        for cell in &self.cells {
            cell.to_group(self, cells);
        }

        let universes = group.create_group("universes");
        for universe in &self.universes {
            universe.to_group(self, universes);
        }
    }
}
