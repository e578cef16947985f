use std::fmt;
use std::sync::Arc;

use cellspace_common::{
    CellId, CellIndex, Direction, K_BOLTZMANN, LatticeId, MaterialId, Position, SurfaceHandle,
    Transform, UniverseIndex,
};
use cellspace_surface::SurfaceSet;

use crate::geometry::Geometry;
use crate::group::Group;
use crate::neighbor::NeighborTable;
use crate::region::{Boundary, Region};
use crate::GeometryError;

/// What occupies a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// One material (or void) per instance, see [`Cell::materials`].
    Material,
    /// Another universe, seen through the cell's transform.
    Universe(UniverseIndex),
    /// An externally managed lattice.
    Lattice(LatticeId),
}

impl Fill {
    pub fn type_name(&self) -> &'static str {
        match self {
            Fill::Material => "material",
            Fill::Universe(_) => "universe",
            Fill::Lattice(_) => "lattice",
        }
    }
}

/// External engine answering containment and distance queries for cells
/// described by a triangulated mesh instead of a region expression.
pub trait MeshQuery: Send + Sync + fmt::Debug {
    fn contains(
        &self,
        mesh_region: i32,
        r: Position,
        u: Direction,
        on_surface: Option<SurfaceHandle>,
    ) -> bool;

    fn distance(
        &self,
        mesh_region: i32,
        r: Position,
        u: Direction,
        on_surface: Option<SurfaceHandle>,
    ) -> Boundary;
}

/// A cell whose shape lives in an external mesh engine.
#[derive(Debug, Clone)]
pub struct MeshCell {
    pub mesh_region: i32,
    pub(crate) backend: Arc<dyn MeshQuery>,
}

/// How a cell's extent is represented.
#[derive(Debug, Clone)]
pub enum CellKind {
    /// Boolean expression of surface half-spaces.
    Csg(Region),
    Mesh(MeshCell),
}

/// A region of space with a fill.
///
/// Topology is fixed at load time; only temperatures change afterwards, and
/// only during setup/restart (through `&mut`).
#[derive(Debug, Clone)]
pub struct Cell {
    pub(crate) id: CellId,
    pub(crate) index: CellIndex,
    pub(crate) name: String,
    pub(crate) universe: UniverseIndex,
    pub(crate) kind: CellKind,
    pub(crate) fill: Fill,
    /// Per-instance materials; `None` is void.
    pub(crate) materials: Vec<Option<MaterialId>>,
    /// Per-instance `sqrt(k_B * T)` in sqrt(eV).
    pub(crate) sqrt_kt: Vec<f64>,
    pub(crate) n_instances: usize,
    pub(crate) distribcell_index: Option<usize>,
    pub(crate) transform: Option<Transform>,
    /// For universe fills: instances of each distributed cell found in the
    /// universes filling earlier cells of the same parent universe.
    pub(crate) offsets: Vec<usize>,
    pub(crate) neighbors: NeighborTable,
}

impl Cell {
    pub fn id(&self) -> CellId {
        self.id
    }

    pub fn index(&self) -> CellIndex {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Universe this cell belongs to.
    pub fn universe(&self) -> UniverseIndex {
        self.universe
    }

    pub fn kind(&self) -> &CellKind {
        &self.kind
    }

    pub fn region(&self) -> Option<&Region> {
        match &self.kind {
            CellKind::Csg(region) => Some(region),
            CellKind::Mesh(_) => None,
        }
    }

    /// True for a CSG cell whose region is a pure intersection.
    pub fn is_simple(&self) -> bool {
        self.region().is_some_and(Region::is_simple)
    }

    pub fn fill(&self) -> Fill {
        self.fill
    }

    pub fn materials(&self) -> &[Option<MaterialId>] {
        &self.materials
    }

    pub fn sqrt_kt(&self) -> &[f64] {
        &self.sqrt_kt
    }

    /// Number of times the cell occurs in the geometry hierarchy.
    pub fn n_instances(&self) -> usize {
        self.n_instances
    }

    /// Index among distributed cells, if the cell has per-instance data.
    pub fn distribcell_index(&self) -> Option<usize> {
        self.distribcell_index
    }

    pub fn transform(&self) -> Option<&Transform> {
        self.transform.as_ref()
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn neighbors(&self) -> &NeighborTable {
        &self.neighbors
    }

    /// Whether `r` is inside the cell. See [`Region::contains`].
    pub fn contains(
        &self,
        surfaces: &SurfaceSet,
        r: Position,
        u: Direction,
        on_surface: Option<SurfaceHandle>,
    ) -> bool {
        match &self.kind {
            CellKind::Csg(region) => region.contains(surfaces, r, u, on_surface),
            CellKind::Mesh(mesh) => mesh.backend.contains(mesh.mesh_region, r, u, on_surface),
        }
    }

    /// Nearest boundary crossing along `u`.
    ///
    /// # Panics
    ///
    /// Panics if `u` has zero length.
    pub fn distance(
        &self,
        surfaces: &SurfaceSet,
        r: Position,
        u: Direction,
        on_surface: Option<SurfaceHandle>,
    ) -> Boundary {
        assert!(u.length_squared() > 0.0, "cell {}: zero-length direction", self.id);
        match &self.kind {
            CellKind::Csg(region) => region.distance(surfaces, r, u, on_surface),
            CellKind::Mesh(mesh) => mesh.backend.distance(mesh.mesh_region, r, u, on_surface),
        }
    }

    /// Material of an instance (`None` is void). Non-distributed cells share
    /// one entry between all instances.
    pub fn material(&self, instance: usize) -> Option<MaterialId> {
        match self.materials.len() {
            0 => None,
            1 => self.materials[0],
            _ => self.materials.get(instance).copied().flatten(),
        }
    }

    /// Temperature in K of an instance, or of the first instance if `None`.
    pub fn temperature(&self, instance: Option<usize>) -> Result<f64, GeometryError> {
        if self.sqrt_kt.is_empty() {
            return Err(GeometryError::NoTemperature { cell: self.id });
        }
        let i = instance.unwrap_or(0);
        let sqrt_kt = self
            .sqrt_kt
            .get(i)
            .ok_or(GeometryError::InstanceOutOfRange {
                cell: self.id,
                instance: i,
                count: self.sqrt_kt.len(),
            })?;
        Ok(sqrt_kt * sqrt_kt / K_BOLTZMANN)
    }

    /// Set the temperature (K) of one instance, or of all instances if `None`.
    pub fn set_temperature(&mut self, kelvin: f64, instance: Option<usize>) -> Result<(), GeometryError> {
        if !kelvin.is_finite() || kelvin < 0.0 {
            return Err(GeometryError::InvalidTemperature {
                cell: self.id,
                value: kelvin,
            });
        }
        if self.sqrt_kt.is_empty() {
            return Err(GeometryError::NoTemperature { cell: self.id });
        }
        let value = sqrt_kt(kelvin);
        match instance {
            None => self.sqrt_kt.iter_mut().for_each(|v| *v = value),
            Some(i) => {
                let count = self.sqrt_kt.len();
                let slot = self.sqrt_kt.get_mut(i).ok_or(GeometryError::InstanceOutOfRange {
                    cell: self.id,
                    instance: i,
                    count,
                })?;
                *slot = value;
            }
        }
        tracing::debug!(cell = %self.id, kelvin, ?instance, "temperature set");
        Ok(())
    }

    /// Write the cell's structure into `parent` as group `cell <id>`.
    pub fn to_group(&self, geometry: &Geometry, parent: &mut Group) {
        let group = parent.create_group(format!("cell {}", self.id));
        if !self.name.is_empty() {
            group.write("name", self.name.as_str());
        }
        group.write("universe", geometry.universe(self.universe).id().0);
        match &self.kind {
            CellKind::Csg(region) => group.write("region", region.to_infix(geometry.surfaces())),
            CellKind::Mesh(mesh) => group.write("mesh_region", mesh.mesh_region),
        }
        group.write("fill_type", self.fill.type_name());
        match self.fill {
            Fill::Material => {
                let materials = self
                    .materials
                    .iter()
                    .map(|m| m.map_or(-1, |id| i64::from(id.0)))
                    .collect::<Vec<i64>>();
                group.write("material", materials);
                let temperatures = self
                    .sqrt_kt
                    .iter()
                    .map(|s| s * s / K_BOLTZMANN)
                    .collect::<Vec<f64>>();
                group.write("temperature", temperatures);
            }
            Fill::Universe(u) => {
                group.write("fill", geometry.universe(u).id().0);
                if let Some(t) = &self.transform {
                    group.write("translation", t.translation.to_array());
                    if let Some(rows) = t.rotation_row_major() {
                        group.write("rotation", rows.to_vec());
                    }
                }
                if !self.offsets.is_empty() {
                    group.write(
                        "offset",
                        self.offsets.iter().map(|&o| o as i64).collect::<Vec<i64>>(),
                    );
                }
            }
            Fill::Lattice(lattice) => group.write("lattice", lattice.0),
        }
        if let Some(d) = self.distribcell_index {
            group.write("distribcell_index", d as i64);
        }
    }
}

pub(crate) fn sqrt_kt(kelvin: f64) -> f64 {
    (K_BOLTZMANN * kelvin).sqrt()
}
