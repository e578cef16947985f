use std::fmt;

use cellspace_common::{CellId, Direction, MaterialId, Position, UniverseId};
use cellspace_kernel::{CellKind, Fill, Geometry};

/// Geometry inspector for developer tooling.
///
/// Read-only queries against a finalized geometry for debugging and the
/// command line.
pub struct GeometryInspector;

impl GeometryInspector {
    pub fn summary(geometry: &Geometry) -> GeometrySummary {
        let cells = geometry.cells();
        GeometrySummary {
            surfaces: geometry.surfaces().len(),
            cells: cells.len(),
            universes: geometry.universes().len(),
            lattices: geometry.lattices().count(),
            root: geometry.root().id(),
            simple_cells: cells.iter().filter(|c| c.is_simple()).count(),
            mesh_cells: cells
                .iter()
                .filter(|c| matches!(c.kind(), CellKind::Mesh(_)))
                .count(),
            distribcells: geometry.n_distribcells(),
            instances: cells.iter().map(|c| c.n_instances()).sum(),
            partitioned_universes: geometry
                .universes()
                .iter()
                .filter(|u| u.partitioner().is_some())
                .count(),
        }
    }

    pub fn inspect_cell(geometry: &Geometry, id: CellId) -> Option<CellInfo> {
        let cell = geometry.cell_by_id(id)?;
        let region = match cell.kind() {
            CellKind::Csg(region) => region.to_infix(geometry.surfaces()),
            CellKind::Mesh(mesh) => format!("mesh region {}", mesh.mesh_region),
        };
        let fill = match cell.fill() {
            Fill::Material => "material".to_owned(),
            Fill::Universe(u) => format!("universe {}", geometry.universe(u).id()),
            Fill::Lattice(l) => format!("lattice {l}"),
        };
        let temperatures = (0..cell.sqrt_kt().len())
            .filter_map(|i| cell.temperature(Some(i)).ok())
            .collect();
        let neighbors = cell
            .neighbors()
            .keys()
            .iter()
            .map(|&exit| cell.neighbors().list(Some(exit)).len())
            .sum();
        Some(CellInfo {
            id,
            name: cell.name().to_owned(),
            universe: geometry.universe(cell.universe()).id(),
            region,
            simple: cell.is_simple(),
            fill,
            materials: cell.materials().to_vec(),
            temperatures,
            instances: cell.n_instances(),
            distribcell_index: cell.distribcell_index(),
            neighbors,
        })
    }

    /// All cell ids in declaration order.
    pub fn list_cells(geometry: &Geometry) -> Vec<CellId> {
        geometry.cells().iter().map(|c| c.id()).collect()
    }

    /// Follow a ray through the geometry, one segment per cell visited,
    /// stopping after `max_crossings` crossings, on leaving the geometry, or
    /// when no boundary lies ahead.
    pub fn trace_ray(
        geometry: &Geometry,
        r: Position,
        u: Direction,
        max_crossings: usize,
    ) -> Vec<TraceSegment> {
        let u = u.normalize();
        let mut segments = Vec::new();
        let Some(mut location) = geometry.find_cell(r, u) else {
            tracing::debug!(?r, "ray starts outside the geometry");
            return segments;
        };
        loop {
            let crossing = geometry.distance_to_boundary(&location);
            let cell = geometry.cell(location.cell());
            segments.push(TraceSegment {
                cell: cell.id(),
                depth: location.depth(),
                instance: location.instance(geometry),
                material: geometry.material_at(&location),
                start: location.position(),
                distance: crossing.boundary.distance,
                exit_surface: crossing
                    .boundary
                    .surface
                    .map(|h| geometry.surfaces().signed_id(h)),
            });
            if !crossing.boundary.distance.is_finite() || segments.len() > max_crossings {
                break;
            }
            geometry.advance(&mut location, crossing.boundary.distance);
            match geometry.cross_surface(&location, &crossing) {
                Some(next) => location = next,
                None => break,
            }
        }
        segments
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeometrySummary {
    pub surfaces: usize,
    pub cells: usize,
    pub universes: usize,
    pub lattices: usize,
    pub root: UniverseId,
    pub simple_cells: usize,
    pub mesh_cells: usize,
    pub distribcells: usize,
    /// Cell instances summed over all cells.
    pub instances: usize,
    pub partitioned_universes: usize,
}

impl fmt::Display for GeometrySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Geometry: surfaces={} cells={} (simple={} mesh={}) universes={} (root={} partitioned={}) lattices={} instances={} distribcells={}",
            self.surfaces,
            self.cells,
            self.simple_cells,
            self.mesh_cells,
            self.universes,
            self.root,
            self.partitioned_universes,
            self.lattices,
            self.instances,
            self.distribcells,
        )
    }
}

/// Detailed info about a single cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CellInfo {
    pub id: CellId,
    pub name: String,
    pub universe: UniverseId,
    pub region: String,
    pub simple: bool,
    pub fill: String,
    pub materials: Vec<Option<MaterialId>>,
    /// Per-instance temperatures in K.
    pub temperatures: Vec<f64>,
    pub instances: usize,
    pub distribcell_index: Option<usize>,
    /// Entries currently cached across the cell's neighbor lists.
    pub neighbors: usize,
}

impl fmt::Display for CellInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cell {}", self.id)?;
        if !self.name.is_empty() {
            write!(f, " \"{}\"", self.name)?;
        }
        write!(
            f,
            " universe={} region=[{}] fill={} instances={}",
            self.universe, self.region, self.fill, self.instances
        )?;
        if !self.materials.is_empty() {
            let materials: Vec<String> = self
                .materials
                .iter()
                .map(|m| m.map_or_else(|| "void".to_owned(), |id| id.to_string()))
                .collect();
            write!(f, " materials=[{}]", materials.join(" "))?;
        }
        if let Some(t) = self.temperatures.first() {
            write!(f, " T={t:.1}K")?;
        }
        Ok(())
    }
}

/// One cell traversed by a traced ray.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceSegment {
    pub cell: CellId,
    /// Nesting depth of `cell` (1 for the root universe).
    pub depth: usize,
    pub instance: usize,
    pub material: Option<MaterialId>,
    /// Entry point in root coordinates.
    pub start: Position,
    /// Path length inside the cell; infinite when no boundary lies ahead.
    pub distance: f64,
    /// Signed id of the half-space exited, if any.
    pub exit_surface: Option<i32>,
}

impl fmt::Display for TraceSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let material = self
            .material
            .map_or_else(|| "void".to_owned(), |m| m.to_string());
        write!(
            f,
            "cell {:>6} depth {} instance {:>4} material {:>6} from ({:.4}, {:.4}, {:.4}) length {:.6}",
            self.cell,
            self.depth,
            self.instance,
            material,
            self.start.x,
            self.start.y,
            self.start.z,
            self.distance,
        )?;
        if let Some(s) = self.exit_surface {
            write!(f, " exit {s:+}")?;
        }
        Ok(())
    }
}
