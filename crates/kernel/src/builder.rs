//! Load-time assembly of a [`Geometry`].
//!
//! The builder collects surfaces, cells and lattice declarations in any
//! order, then [`GeometryBuilder::build`] resolves every cross reference and
//! derives the per-instance bookkeeping. After that the topology is fixed.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use cellspace_common::{
    CellId, CellIndex, LatticeId, MaterialId, SurfaceId, SurfaceIndex, Transform, UniverseId,
    UniverseIndex,
};
use cellspace_surface::{Surface, SurfaceSet};
use glam::DVec3;

use crate::cell::{sqrt_kt, Cell, CellKind, Fill, MeshCell, MeshQuery};
use crate::config::GeometryConfig;
use crate::geometry::Geometry;
use crate::neighbor::NeighborTable;
use crate::partitioner::UniversePartitioner;
use crate::region::Region;
use crate::universe::Universe;
use crate::GeometryError;

/// Declaration of one cell, as read from a geometry definition.
#[derive(Debug, Clone, PartialEq)]
pub struct CellSpec {
    pub id: CellId,
    pub name: String,
    pub universe: UniverseId,
    /// Region text; `None` (or empty text) is all of space.
    pub region: Option<String>,
    pub mesh_region: Option<i32>,
    /// One entry per instance, or a single shared entry. `None` is void.
    pub materials: Vec<Option<MaterialId>>,
    /// Id of a universe or lattice filling the cell.
    pub fill: Option<i32>,
    /// Temperatures in K: none, one shared value, or one per instance.
    pub temperatures: Vec<f64>,
    pub translation: Option<DVec3>,
    /// Rotation angles about x, y and z in degrees.
    pub rotation: Option<[f64; 3]>,
}

impl CellSpec {
    /// A cell of universe 0 bounded by `region`, with no fill yet.
    pub fn new(id: i32, region: &str) -> Self {
        Self {
            id: CellId(id),
            name: String::new(),
            universe: UniverseId(0),
            region: Some(region.to_owned()),
            mesh_region: None,
            materials: Vec::new(),
            fill: None,
            temperatures: Vec::new(),
            translation: None,
            rotation: None,
        }
    }

    /// A cell whose shape is a region of the attached mesh backend.
    pub fn mesh(id: i32, mesh_region: i32) -> Self {
        Self {
            region: None,
            mesh_region: Some(mesh_region),
            ..Self::new(id, "")
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn universe(mut self, universe: i32) -> Self {
        self.universe = UniverseId(universe);
        self
    }

    pub fn material(self, material: i32) -> Self {
        self.materials([Some(material)])
    }

    pub fn void(self) -> Self {
        self.materials([None])
    }

    pub fn materials(mut self, materials: impl IntoIterator<Item = Option<i32>>) -> Self {
        self.materials = materials.into_iter().map(|m| m.map(MaterialId)).collect();
        self
    }

    pub fn fill(mut self, target: i32) -> Self {
        self.fill = Some(target);
        self
    }

    pub fn temperatures(mut self, kelvin: impl IntoIterator<Item = f64>) -> Self {
        self.temperatures = kelvin.into_iter().collect();
        self
    }

    pub fn translation(mut self, translation: [f64; 3]) -> Self {
        self.translation = Some(DVec3::from_array(translation));
        self
    }

    pub fn rotation(mut self, degrees: [f64; 3]) -> Self {
        self.rotation = Some(degrees);
        self
    }
}

/// A lattice declaration. Lattices are owned elsewhere; the geometry only
/// needs the universes placed in their elements, one entry per element.
#[derive(Debug, Clone, PartialEq)]
pub struct LatticeSpec {
    pub id: LatticeId,
    pub universes: Vec<UniverseId>,
}

impl LatticeSpec {
    pub fn new(id: i32, universes: impl IntoIterator<Item = i32>) -> Self {
        Self {
            id: LatticeId(id),
            universes: universes.into_iter().map(UniverseId).collect(),
        }
    }
}

#[derive(Debug, Default)]
pub struct GeometryBuilder {
    config: GeometryConfig,
    surfaces: SurfaceSet,
    cells: Vec<CellSpec>,
    lattices: Vec<LatticeSpec>,
    mesh: Option<Arc<dyn MeshQuery>>,
}

impl GeometryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: GeometryConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &GeometryConfig {
        &self.config
    }

    pub fn surface(&mut self, id: i32, surface: Surface) -> Result<SurfaceIndex, GeometryError> {
        Ok(self.surfaces.insert(SurfaceId(id), surface)?)
    }

    pub fn cell(&mut self, spec: CellSpec) -> &mut Self {
        self.cells.push(spec);
        self
    }

    pub fn lattice(&mut self, spec: LatticeSpec) -> &mut Self {
        self.lattices.push(spec);
        self
    }

    /// Engine answering queries for mesh cells.
    pub fn mesh_backend(&mut self, backend: Arc<dyn MeshQuery>) -> &mut Self {
        self.mesh = Some(backend);
        self
    }

    /// Resolve and validate everything, producing an immutable geometry.
    pub fn build(self) -> Result<Geometry, GeometryError> {
        let _span = tracing::info_span!(
            "finalize",
            surfaces = self.surfaces.len(),
            cells = self.cells.len()
        )
        .entered();

        if self.cells.is_empty() {
            return Err(GeometryError::Empty);
        }

        // Universes, in order of first appearance.
        let mut universe_map: BTreeMap<UniverseId, UniverseIndex> = BTreeMap::new();
        let mut universes: Vec<Universe> = Vec::new();
        let mut cell_map: BTreeMap<CellId, CellIndex> = BTreeMap::new();
        for (i, spec) in self.cells.iter().enumerate() {
            if cell_map.insert(spec.id, CellIndex::new(i)).is_some() {
                return Err(GeometryError::DuplicateCell(spec.id));
            }
            let u = *universe_map.entry(spec.universe).or_insert_with(|| {
                let index = UniverseIndex::new(universes.len());
                universes.push(Universe {
                    id: spec.universe,
                    index,
                    cells: Vec::new(),
                    partitioner: None,
                });
                index
            });
            universes[u.get()].cells.push(CellIndex::new(i));
        }

        let mut lattices: BTreeMap<LatticeId, Vec<UniverseId>> = BTreeMap::new();
        for lattice in &self.lattices {
            if let Some(missing) = lattice
                .universes
                .iter()
                .find(|u| !universe_map.contains_key(u))
            {
                return Err(GeometryError::UnknownLatticeUniverse {
                    lattice: lattice.id,
                    universe: *missing,
                });
            }
            if lattices.insert(lattice.id, lattice.universes.clone()).is_some() {
                return Err(GeometryError::DuplicateLattice(lattice.id));
            }
        }

        let mut cells = Vec::with_capacity(self.cells.len());
        for (i, spec) in self.cells.iter().enumerate() {
            cells.push(self.resolve_cell(CellIndex::new(i), spec, &universe_map, &lattices)?);
        }

        let graph = FillGraph::new(&cells, &universes, &lattices, &universe_map);
        graph.check_acyclic(&universes)?;
        let root = self.root_universe(&graph, &universes, &universe_map)?;

        let universe_instances = graph.instance_counts(root);
        for (cell, spec) in cells.iter_mut().zip(&self.cells) {
            let count = universe_instances[cell.universe.get()];
            self.assign_instances(cell, spec, count)?;
        }

        // Cells occurring more than once carry per-instance data.
        let mut distribcells = Vec::new();
        for cell in cells.iter_mut() {
            if cell.fill == Fill::Material && cell.n_instances > 1 {
                cell.distribcell_index = Some(distribcells.len());
                distribcells.push(cell.index);
            }
        }
        if !distribcells.is_empty() {
            let within = graph.distribcell_counts(&cells, &universes, &distribcells);
            for universe in &universes {
                let mut running = vec![0usize; distribcells.len()];
                for &c in &universe.cells {
                    let counts = match cells[c.get()].fill {
                        Fill::Universe(u) => within[u.get()].clone(),
                        Fill::Lattice(l) => graph.lattice_counts(l, &within, distribcells.len()),
                        Fill::Material => continue,
                    };
                    if matches!(cells[c.get()].fill, Fill::Universe(_)) {
                        cells[c.get()].offsets = running.clone();
                    }
                    for (total, n) in running.iter_mut().zip(counts) {
                        *total += n;
                    }
                }
            }
        }

        for universe in universes.iter_mut() {
            universe.partitioner = UniversePartitioner::build(
                &universe.cells,
                &cells,
                &self.surfaces,
                self.config.partition_min_planes,
            );
        }

        tracing::info!(
            cells = cells.len(),
            universes = universes.len(),
            root = %universes[root.get()].id,
            distribcells = distribcells.len(),
            partitioned = universes.iter().filter(|u| u.partitioner.is_some()).count(),
            "geometry finalized"
        );

        Ok(Geometry {
            config: self.config,
            surfaces: self.surfaces,
            cells,
            universes,
            cell_map,
            universe_map,
            lattices,
            root,
            n_distribcells: distribcells.len(),
        })
    }

    fn resolve_cell(
        &self,
        index: CellIndex,
        spec: &CellSpec,
        universe_map: &BTreeMap<UniverseId, UniverseIndex>,
        lattices: &BTreeMap<LatticeId, Vec<UniverseId>>,
    ) -> Result<Cell, GeometryError> {
        let cell = spec.id;
        let region_text = spec.region.as_deref().map(str::trim).filter(|t| !t.is_empty());
        let kind = match (region_text, spec.mesh_region) {
            (Some(_), Some(_)) => return Err(GeometryError::ConflictingShape { cell }),
            (_, Some(mesh_region)) => {
                let backend = self
                    .mesh
                    .clone()
                    .ok_or(GeometryError::MissingMeshBackend { cell })?;
                CellKind::Mesh(MeshCell {
                    mesh_region,
                    backend,
                })
            }
            (Some(text), None) => CellKind::Csg(
                Region::parse(text, &self.surfaces)
                    .map_err(|source| GeometryError::Region { cell, source })?,
            ),
            (None, None) => CellKind::Csg(Region::everywhere()),
        };

        let fill = match (spec.fill, spec.materials.is_empty()) {
            (Some(_), false) => return Err(GeometryError::ConflictingFill { cell }),
            (None, true) => return Err(GeometryError::MissingFill { cell }),
            (None, false) => Fill::Material,
            (Some(target), true) => {
                let universe = universe_map.get(&UniverseId(target)).copied();
                let lattice = lattices.contains_key(&LatticeId(target));
                match (universe, lattice) {
                    (Some(_), true) => return Err(GeometryError::AmbiguousFill { cell, target }),
                    (Some(_), false) if UniverseId(target) == spec.universe => {
                        return Err(GeometryError::SelfFill { cell });
                    }
                    (Some(u), false) => Fill::Universe(u),
                    (None, true) => Fill::Lattice(LatticeId(target)),
                    (None, false) => return Err(GeometryError::UnknownFill { cell, target }),
                }
            }
        };

        let has_transform = spec.translation.is_some() || spec.rotation.is_some();
        if has_transform && !matches!(fill, Fill::Universe(_)) {
            return Err(GeometryError::TransformWithoutUniverse { cell });
        }
        if !spec.temperatures.is_empty() && fill != Fill::Material {
            return Err(GeometryError::TemperatureOnFilledCell { cell });
        }
        if let Some(&value) = spec
            .temperatures
            .iter()
            .find(|t| !t.is_finite() || **t < 0.0)
        {
            return Err(GeometryError::InvalidTemperature { cell, value });
        }

        let transform = has_transform.then(|| {
            let t = Transform::translation(spec.translation.unwrap_or(DVec3::ZERO));
            match spec.rotation {
                Some(angles) => t.with_rotation_degrees(angles),
                None => t,
            }
        });

        let neighbors = match &kind {
            CellKind::Csg(region) => {
                NeighborTable::new(region.halfspaces(), self.config.neighbor_capacity)
            }
            CellKind::Mesh(_) => NeighborTable::new([], self.config.neighbor_capacity),
        };

        Ok(Cell {
            id: spec.id,
            index,
            name: spec.name.clone(),
            universe: universe_map[&spec.universe],
            kind,
            fill,
            materials: spec.materials.clone(),
            sqrt_kt: Vec::new(),
            n_instances: 0,
            distribcell_index: None,
            transform,
            offsets: Vec::new(),
            neighbors,
        })
    }

    fn root_universe(
        &self,
        graph: &FillGraph,
        universes: &[Universe],
        universe_map: &BTreeMap<UniverseId, UniverseIndex>,
    ) -> Result<UniverseIndex, GeometryError> {
        if let Some(id) = self.config.root_universe {
            return universe_map
                .get(&id)
                .copied()
                .ok_or(GeometryError::UnknownRootUniverse(id));
        }
        let unfilled: Vec<UniverseIndex> = universes
            .iter()
            .map(|u| u.index)
            .filter(|u| !graph.filled.contains(u))
            .collect();
        match unfilled.as_slice() {
            [] => Err(GeometryError::NoRootUniverse),
            [root] => Ok(*root),
            many => Err(GeometryError::MultipleRootUniverses(
                many.iter().map(|u| universes[u.get()].id).collect(),
            )),
        }
    }

    /// Size the material and temperature arrays to the instance count.
    fn assign_instances(
        &self,
        cell: &mut Cell,
        spec: &CellSpec,
        reachable: usize,
    ) -> Result<(), GeometryError> {
        let id = cell.id;
        let given_materials = spec.materials.len();
        let given_temperatures = spec.temperatures.len();
        // Cells outside the root's hierarchy keep whatever they were given.
        let n = if reachable > 0 {
            reachable
        } else {
            given_materials.max(given_temperatures).max(1)
        };
        cell.n_instances = n;
        if cell.fill != Fill::Material {
            return Ok(());
        }

        if given_materials > 1 && given_temperatures > 1 && given_materials != given_temperatures {
            return Err(GeometryError::TemperatureMaterialMismatch {
                cell: id,
                given: given_temperatures,
                materials: given_materials,
            });
        }
        if given_materials != 1 && given_materials != n {
            return Err(GeometryError::MaterialCountMismatch {
                cell: id,
                given: given_materials,
                instances: n,
            });
        }
        if given_temperatures > 1 && given_temperatures != n {
            return Err(GeometryError::TemperatureCountMismatch {
                cell: id,
                given: given_temperatures,
                instances: n,
            });
        }

        if given_materials == 1 {
            cell.materials = vec![spec.materials[0]; n];
        }
        cell.sqrt_kt = match spec.temperatures.as_slice() {
            [] => vec![sqrt_kt(self.config.default_temperature); n],
            [t] => vec![sqrt_kt(*t); n],
            many => many.iter().copied().map(sqrt_kt).collect(),
        };
        Ok(())
    }
}

/// Which universes each universe places inside itself, with multiplicity.
struct FillGraph {
    /// `children[u]`: universes placed directly in `u` (through a cell or a
    /// lattice element), repeated once per placement.
    children: Vec<Vec<UniverseIndex>>,
    filled: BTreeSet<UniverseIndex>,
    lattices: BTreeMap<LatticeId, Vec<UniverseIndex>>,
}

impl FillGraph {
    fn new(
        cells: &[Cell],
        universes: &[Universe],
        lattices: &BTreeMap<LatticeId, Vec<UniverseId>>,
        universe_map: &BTreeMap<UniverseId, UniverseIndex>,
    ) -> Self {
        let lattices: BTreeMap<LatticeId, Vec<UniverseIndex>> = lattices
            .iter()
            .map(|(id, members)| (*id, members.iter().map(|u| universe_map[u]).collect()))
            .collect();
        let mut children = vec![Vec::new(); universes.len()];
        let mut filled = BTreeSet::new();
        for cell in cells {
            let placed: &[UniverseIndex] = match &cell.fill {
                Fill::Universe(u) => std::slice::from_ref(u),
                Fill::Lattice(l) => lattices[l].as_slice(),
                Fill::Material => &[],
            };
            children[cell.universe.get()].extend_from_slice(placed);
        }
        for members in lattices.values() {
            filled.extend(members.iter().copied());
        }
        filled.extend(children.iter().flatten().copied());
        Self {
            children,
            filled,
            lattices,
        }
    }

    fn check_acyclic(&self, universes: &[Universe]) -> Result<(), GeometryError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Open,
            Done,
        }
        let mut marks = vec![Mark::New; universes.len()];
        for start in 0..universes.len() {
            if marks[start] != Mark::New {
                continue;
            }
            // Iterative depth-first search; each frame is (universe, next child).
            let mut stack = vec![(start, 0usize)];
            marks[start] = Mark::Open;
            while let Some((u, next)) = stack.last_mut() {
                let u = *u;
                match self.children[u].get(*next) {
                    Some(child) => {
                        *next += 1;
                        let child = child.get();
                        match marks[child] {
                            Mark::Open => return Err(GeometryError::FillCycle(universes[child].id)),
                            Mark::New => {
                                marks[child] = Mark::Open;
                                stack.push((child, 0));
                            }
                            Mark::Done => {}
                        }
                    }
                    None => {
                        marks[u] = Mark::Done;
                        stack.pop();
                    }
                }
            }
        }
        Ok(())
    }

    /// Number of times each universe occurs below `root` (the root once).
    fn instance_counts(&self, root: UniverseIndex) -> Vec<usize> {
        let mut counts = vec![0usize; self.children.len()];
        for u in self.topological_from(root) {
            let here = if u == root { 1 } else { counts[u.get()] };
            counts[u.get()] = here;
            for child in &self.children[u.get()] {
                counts[child.get()] += here;
            }
        }
        counts
    }

    /// Universes reachable from `root`, parents before children.
    fn topological_from(&self, root: UniverseIndex) -> Vec<UniverseIndex> {
        let mut order = Vec::new();
        let mut seen = vec![false; self.children.len()];
        let mut stack = vec![(root, 0usize)];
        seen[root.get()] = true;
        while let Some((u, next)) = stack.last_mut() {
            let u = *u;
            match self.children[u.get()].get(*next) {
                Some(child) => {
                    *next += 1;
                    if !seen[child.get()] {
                        seen[child.get()] = true;
                        stack.push((*child, 0));
                    }
                }
                None => {
                    order.push(u);
                    stack.pop();
                }
            }
        }
        order.reverse();
        order
    }

    /// `within[u][d]`: instances of distributed cell `d` inside universe `u`.
    fn distribcell_counts(
        &self,
        cells: &[Cell],
        universes: &[Universe],
        distribcells: &[CellIndex],
    ) -> Vec<Vec<usize>> {
        let n = universes.len();
        let mut within = vec![vec![0usize; distribcells.len()]; n];
        for (d, c) in distribcells.iter().enumerate() {
            within[cells[c.get()].universe.get()][d] = 1;
        }
        // Children are always finished first in post-order.
        let mut done = vec![false; n];
        for start in 0..n {
            if done[start] {
                continue;
            }
            for u in self.topological_from(UniverseIndex::new(start)).into_iter().rev() {
                if done[u.get()] {
                    continue;
                }
                for child in &self.children[u.get()] {
                    let add = within[child.get()].clone();
                    for (total, x) in within[u.get()].iter_mut().zip(add) {
                        *total += x;
                    }
                }
                done[u.get()] = true;
            }
        }
        within
    }

    fn lattice_counts(&self, lattice: LatticeId, within: &[Vec<usize>], n: usize) -> Vec<usize> {
        let mut counts = vec![0usize; n];
        for u in &self.lattices[&lattice] {
            for (total, x) in counts.iter_mut().zip(&within[u.get()]) {
                *total += x;
            }
        }
        counts
    }
}
