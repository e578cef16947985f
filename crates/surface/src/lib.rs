//! Surface capability: implicit surfaces queried by signed handle.
//!
//! The geometry kernel treats surfaces as an opaque capability: for a handle
//! it asks which side a point is on and how far a ray travels before
//! crossing. Everything else about a surface stays in this crate.
//!
//! # Invariants
//! - `sense` is deterministic for a point on the surface: the direction of
//!   travel decides.
//! - `distance` never returns a negative or NaN value.

mod set;
mod surface;

use cellspace_common::SurfaceId;

pub use set::{SurfaceEntry, SurfaceSet};
pub use surface::{Axis, Surface};

/// Errors from surface registration and lookup.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SurfaceError {
    #[error("surface id {0} must be positive")]
    InvalidId(SurfaceId),
    #[error("duplicate surface id {0}")]
    DuplicateId(SurfaceId),
    #[error("unknown surface id {0}")]
    UnknownId(SurfaceId),
    #[error("surface token 0 is not a valid half-space")]
    ZeroToken,
    #[error("{kind} has a non-finite coefficient")]
    NonFinite { kind: &'static str },
    #[error("{kind} radius must be positive, got {radius}")]
    NonPositiveRadius { kind: &'static str, radius: f64 },
    #[error("plane normal must be non-zero")]
    DegeneratePlane,
}

pub fn crate_info() -> &'static str {
    "cellspace-surface v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert_eq!(crate_info(), "cellspace-surface v0.1.0");
    }
}
