//! Slab partitioning of a universe along one axis.
//!
//! The axis-aligned planes referenced by a universe's cells cut space into
//! slabs. Each slab keeps the cells that could overlap it, so a search only
//! tests the cells of the slab containing the point.
//!
//! # Invariants
//! - `partitions.len() == surfaces.len() + 1`.
//! - Every cell of the universe appears in at least one partition.
//! - Partitions are supersets: a cell is left out of a slab only when one of
//!   its own bounding planes on the axis excludes it.

use std::collections::{BTreeMap, BTreeSet};

use cellspace_common::{CellIndex, Direction, Position, SurfaceHandle, SurfaceIndex};
use cellspace_surface::{Axis, SurfaceSet};

use crate::cell::{Cell, CellKind};

#[derive(Debug, Clone)]
pub struct UniversePartitioner {
    axis: Axis,
    /// Partitioning planes sorted by offset along `axis`.
    surfaces: Vec<SurfaceIndex>,
    /// `partitions[0]` is below `surfaces[0]`, `partitions[n]` above
    /// `surfaces[n - 1]`, and `partitions[i]` lies between `surfaces[i - 1]`
    /// and `surfaces[i]`.
    partitions: Vec<Vec<CellIndex>>,
}

impl UniversePartitioner {
    /// Build a partitioner for the cells `members`, or `None` when no axis
    /// has at least `min_planes` distinct planes.
    pub fn build(
        members: &[CellIndex],
        cells: &[Cell],
        surfaces: &SurfaceSet,
        min_planes: usize,
    ) -> Option<Self> {
        let mut by_axis: BTreeMap<Axis, BTreeSet<SurfaceIndex>> = BTreeMap::new();
        for &c in members {
            if let CellKind::Csg(region) = &cells[c.get()].kind {
                for h in region.halfspaces() {
                    if let Some((axis, _)) = surfaces.get(h.index()).axis_plane() {
                        by_axis.entry(axis).or_default().insert(h.index());
                    }
                }
            }
        }

        // Most planes wins; ties go to the first axis in x, y, z order.
        let (axis, planes) = Axis::ALL
            .iter()
            .filter_map(|a| by_axis.remove(a).map(|set| (*a, set)))
            .fold(None::<(Axis, BTreeSet<SurfaceIndex>)>, |best, candidate| match best {
                Some(b) if b.1.len() >= candidate.1.len() => Some(b),
                _ => Some(candidate),
            })?;
        if planes.len() < min_planes.max(1) {
            return None;
        }

        let offset = |s: SurfaceIndex| {
            surfaces
                .get(s)
                .axis_plane()
                .map_or(0.0, |(_, offset)| offset)
        };
        let mut sorted: Vec<SurfaceIndex> = planes.into_iter().collect();
        sorted.sort_by(|a, b| offset(*a).total_cmp(&offset(*b)).then(a.cmp(b)));
        let position: BTreeMap<SurfaceIndex, usize> =
            sorted.iter().enumerate().map(|(i, s)| (*s, i)).collect();

        let n = sorted.len();
        let mut partitions = vec![Vec::new(); n + 1];
        for &c in members {
            let (mut lo, mut hi) = (0, n);
            let bounding = match &cells[c.get()].kind {
                CellKind::Csg(region) if region.is_simple() => Some(region),
                _ => None,
            };
            for h in bounding.into_iter().flat_map(|region| region.halfspaces()) {
                match position.get(&h.index()) {
                    Some(&p) if h.is_positive() => lo = lo.max(p + 1),
                    Some(&p) => hi = hi.min(p),
                    None => {}
                }
            }
            // A contradictory pair of bounds describes an empty cell; keep it
            // somewhere so every cell stays reachable.
            if lo > hi {
                std::mem::swap(&mut lo, &mut hi);
            }
            for partition in &mut partitions[lo..=hi] {
                partition.push(c);
            }
        }

        tracing::debug!(
            ?axis,
            planes = n,
            cells = members.len(),
            largest = partitions.iter().map(Vec::len).max().unwrap_or(0),
            "universe partitioner built"
        );

        Some(Self {
            axis,
            surfaces: sorted,
            partitions,
        })
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn surfaces(&self) -> &[SurfaceIndex] {
        &self.surfaces
    }

    pub fn partitions(&self) -> &[Vec<CellIndex>] {
        &self.partitions
    }

    /// Cells that could contain `r`.
    pub fn get_cells(&self, surfaces: &SurfaceSet, r: Position, u: Direction) -> &[CellIndex] {
        self.get_cells_on(surfaces, r, u, None)
    }

    /// As [`get_cells`](Self::get_cells), with the sense of a surface the
    /// point is known to lie on pinned to `on_surface`.
    pub fn get_cells_on(
        &self,
        surfaces: &SurfaceSet,
        r: Position,
        u: Direction,
        on_surface: Option<SurfaceHandle>,
    ) -> &[CellIndex] {
        // Senses are monotone along the sorted planes: positive below the
        // point, negative above it.
        let slab = self.surfaces.partition_point(|&s| match on_surface {
            Some(h) if h.index() == s => h.is_positive(),
            _ => surfaces.get(s).sense(r, u),
        });
        &self.partitions[slab]
    }
}
