use std::fmt;
use std::num::NonZeroI32;
use std::ops::Neg;

use glam::{DMat3, DVec3};
use serde::{Deserialize, Serialize};

/// A point in 3D Cartesian space.
pub type Position = DVec3;

/// A unit direction of flight.
pub type Direction = DVec3;

macro_rules! external_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

external_id!(
    /// User-facing cell id from the geometry definition.
    CellId
);
external_id!(
    /// User-facing universe id. Cells without an explicit universe live in universe 0.
    UniverseId
);
external_id!(
    /// User-facing surface id. Signed ids in region text select a half-space.
    SurfaceId
);
external_id!(
    /// Id of a material owned by the (external) materials subsystem.
    MaterialId
);
external_id!(
    /// Id of a lattice owned by the (external) lattice subsystem.
    LatticeId
);

macro_rules! dense_index {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            pub fn new(index: usize) -> Self {
                Self(u32::try_from(index).expect(concat!(stringify!($name), " overflow")))
            }

            /// Position in the owning arena.
            pub fn get(self) -> usize {
                self.0 as usize
            }
        }
    };
}

dense_index!(
    /// Dense position of a cell in the geometry's cell arena.
    CellIndex
);
dense_index!(
    /// Dense position of a universe in the geometry's universe arena.
    UniverseIndex
);
dense_index!(
    /// Dense position of a surface in the surface arena.
    SurfaceIndex
);

/// Errors produced while decoding raw surface handles.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandleError {
    #[error("zero is not a valid surface handle")]
    Zero,
}

/// A signed reference to one half-space of a surface.
///
/// The magnitude minus one is the surface's dense storage index; the sign
/// selects the positive or negative side. Zero is unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct SurfaceHandle(NonZeroI32);

impl SurfaceHandle {
    pub fn new(index: SurfaceIndex, positive: bool) -> Self {
        let magnitude = i32::try_from(index.0 + 1).expect("surface index overflow");
        let raw = if positive { magnitude } else { -magnitude };
        match NonZeroI32::new(raw) {
            Some(v) => Self(v),
            None => unreachable!("magnitude is at least one"),
        }
    }

    pub fn from_raw(raw: i32) -> Result<Self, HandleError> {
        NonZeroI32::new(raw).map(Self).ok_or(HandleError::Zero)
    }

    pub fn raw(self) -> i32 {
        self.0.get()
    }

    pub fn index(self) -> SurfaceIndex {
        SurfaceIndex(self.0.unsigned_abs().get() - 1)
    }

    /// True for the positive half-space.
    pub fn is_positive(self) -> bool {
        self.0.get() > 0
    }

    /// The opposite half-space of the same surface.
    pub fn flipped(self) -> Self {
        -self
    }
}

impl Neg for SurfaceHandle {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl TryFrom<i32> for SurfaceHandle {
    type Error = HandleError;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        Self::from_raw(raw)
    }
}

impl From<SurfaceHandle> for i32 {
    fn from(h: SurfaceHandle) -> Self {
        h.raw()
    }
}

impl fmt::Display for SurfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+}", self.raw())
    }
}

/// Rigid transform applied to coordinates entering a filled universe.
///
/// Local coordinates are obtained by subtracting the translation and then
/// applying the rotation matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translation: DVec3,
    /// Rotation angles about x, y and z in degrees, if any.
    pub angles: Option<[f64; 3]>,
    /// Rotation matrix derived from `angles`.
    pub rotation: Option<DMat3>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: DVec3::ZERO,
            angles: None,
            rotation: None,
        }
    }
}

impl Transform {
    pub fn translation(translation: DVec3) -> Self {
        Self {
            translation,
            ..Self::default()
        }
    }

    /// Build the rotation from angles (degrees) about the x, y and z axes.
    ///
    /// The matrix is `Rz(-psi) * Ry(-theta) * Rx(-phi)`, i.e. it rotates the
    /// coordinates of the parent frame into the filled universe's frame.
    pub fn with_rotation_degrees(mut self, angles: [f64; 3]) -> Self {
        let [phi, theta, psi] = angles.map(|a| -a.to_radians());
        self.rotation = Some(
            DMat3::from_rotation_z(psi) * DMat3::from_rotation_y(theta) * DMat3::from_rotation_x(phi),
        );
        self.angles = Some(angles);
        self
    }

    pub fn is_identity(&self) -> bool {
        self.translation == DVec3::ZERO && self.rotation.is_none()
    }

    pub fn to_local_point(&self, r: Position) -> Position {
        let shifted = r - self.translation;
        match &self.rotation {
            Some(m) => *m * shifted,
            None => shifted,
        }
    }

    pub fn to_local_direction(&self, u: Direction) -> Direction {
        match &self.rotation {
            Some(m) => *m * u,
            None => u,
        }
    }

    /// Row-major rotation matrix, as written to persisted output.
    pub fn rotation_row_major(&self) -> Option<[f64; 9]> {
        self.rotation.map(|m| m.transpose().to_cols_array())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_encodes_index_and_sense() {
        let h = SurfaceHandle::new(SurfaceIndex(4), false);
        assert_eq!(h.raw(), -5);
        assert_eq!(h.index(), SurfaceIndex(4));
        assert!(!h.is_positive());
        assert_eq!(h.flipped().raw(), 5);
        assert_eq!(-h, h.flipped());
    }

    #[test]
    fn zero_handle_rejected() {
        assert_eq!(SurfaceHandle::from_raw(0), Err(HandleError::Zero));
        assert!(SurfaceHandle::from_raw(-3).is_ok());
    }

    #[test]
    fn transform_default_is_identity() {
        let t = Transform::default();
        assert!(t.is_identity());
        let r = DVec3::new(1.0, -2.0, 3.0);
        assert_eq!(t.to_local_point(r), r);
        assert_eq!(t.to_local_direction(r), r);
    }

    #[test]
    fn translation_shifts_into_local_frame() {
        let t = Transform::translation(DVec3::new(10.0, 0.0, 0.0));
        assert_eq!(
            t.to_local_point(DVec3::new(12.0, 1.0, 0.0)),
            DVec3::new(2.0, 1.0, 0.0)
        );
    }

    #[test]
    fn rotation_about_z_by_ninety_degrees() {
        let t = Transform::default().with_rotation_degrees([0.0, 0.0, 90.0]);
        let local = t.to_local_direction(DVec3::X);
        assert!((local - DVec3::new(0.0, -1.0, 0.0)).length() < 1e-12);
        let rows = t.rotation_row_major().unwrap();
        assert!((rows[1] - 1.0).abs() < 1e-12);
    }
}
