use std::collections::BTreeMap;

use cellspace_common::{Direction, Position, SurfaceHandle, SurfaceId, SurfaceIndex};
use serde::{Deserialize, Serialize};

use crate::{Surface, SurfaceError};

/// A surface together with its user-facing id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceEntry {
    pub id: SurfaceId,
    #[serde(flatten)]
    pub surface: Surface,
}

/// Arena of surfaces addressed by dense index.
///
/// Built once during geometry setup; read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct SurfaceSet {
    entries: Vec<SurfaceEntry>,
    index_of: BTreeMap<SurfaceId, SurfaceIndex>,
}

impl SurfaceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a surface, returning its dense index.
    pub fn insert(&mut self, id: SurfaceId, surface: Surface) -> Result<SurfaceIndex, SurfaceError> {
        if id.0 <= 0 {
            return Err(SurfaceError::InvalidId(id));
        }
        if self.index_of.contains_key(&id) {
            return Err(SurfaceError::DuplicateId(id));
        }
        surface.validate()?;
        let index = SurfaceIndex::new(self.entries.len());
        self.entries.push(SurfaceEntry { id, surface });
        self.index_of.insert(id, index);
        tracing::trace!(%id, kind = surface.kind(), "surface registered");
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: SurfaceIndex) -> &Surface {
        &self.entries[index.get()].surface
    }

    pub fn id(&self, index: SurfaceIndex) -> SurfaceId {
        self.entries[index.get()].id
    }

    pub fn index_of(&self, id: SurfaceId) -> Option<SurfaceIndex> {
        self.index_of.get(&id).copied()
    }

    /// All entries in index order.
    pub fn entries(&self) -> &[SurfaceEntry] {
        &self.entries
    }

    /// Resolve a signed surface id (as written in region text) to a handle.
    pub fn resolve(&self, signed_id: i32) -> Result<SurfaceHandle, SurfaceError> {
        if signed_id == 0 {
            return Err(SurfaceError::ZeroToken);
        }
        let id = signed_id
            .checked_abs()
            .map(SurfaceId)
            .ok_or(SurfaceError::UnknownId(SurfaceId(signed_id)))?;
        let index = self.index_of(id).ok_or(SurfaceError::UnknownId(id))?;
        Ok(SurfaceHandle::new(index, signed_id > 0))
    }

    /// Signed user-facing id for a handle; the inverse of [`resolve`](Self::resolve).
    pub fn signed_id(&self, handle: SurfaceHandle) -> i32 {
        let id = self.id(handle.index()).0;
        if handle.is_positive() { id } else { -id }
    }

    /// Sense of `r` relative to the surface behind `handle`.
    pub fn sense(&self, handle: SurfaceHandle, r: Position, u: Direction) -> bool {
        self.get(handle.index()).sense(r, u)
    }

    /// Distance along `u` to the surface behind `handle`.
    pub fn distance(&self, handle: SurfaceHandle, r: Position, u: Direction, coincident: bool) -> f64 {
        self.get(handle.index()).distance(r, u, coincident)
    }
}
