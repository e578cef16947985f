use cellspace_common::{Direction, FP_COINCIDENT, Position};
use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::SurfaceError;

/// Coordinate axis, used for axis-aligned surfaces and universe partitioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Component of `v` along this axis.
    pub fn component(self, v: DVec3) -> f64 {
        match self {
            Axis::X => v.x,
            Axis::Y => v.y,
            Axis::Z => v.z,
        }
    }
}

/// An implicit surface `f(r) = 0`. The positive half-space is `f(r) > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Surface {
    /// Plane `x = x0`.
    XPlane { x0: f64 },
    /// Plane `y = y0`.
    YPlane { y0: f64 },
    /// Plane `z = z0`.
    ZPlane { z0: f64 },
    /// General plane `a*x + b*y + c*z = d`.
    Plane { a: f64, b: f64, c: f64, d: f64 },
    /// Infinite cylinder parallel to the x axis.
    XCylinder { y0: f64, z0: f64, r: f64 },
    /// Infinite cylinder parallel to the y axis.
    YCylinder { x0: f64, z0: f64, r: f64 },
    /// Infinite cylinder parallel to the z axis.
    ZCylinder { x0: f64, y0: f64, r: f64 },
    Sphere { x0: f64, y0: f64, z0: f64, r: f64 },
}

impl Surface {
    /// Short type name, matching the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Surface::XPlane { .. } => "x-plane",
            Surface::YPlane { .. } => "y-plane",
            Surface::ZPlane { .. } => "z-plane",
            Surface::Plane { .. } => "plane",
            Surface::XCylinder { .. } => "x-cylinder",
            Surface::YCylinder { .. } => "y-cylinder",
            Surface::ZCylinder { .. } => "z-cylinder",
            Surface::Sphere { .. } => "sphere",
        }
    }

    /// Coefficients in declaration order.
    pub fn coefficients(&self) -> Vec<f64> {
        match *self {
            Surface::XPlane { x0 } => vec![x0],
            Surface::YPlane { y0 } => vec![y0],
            Surface::ZPlane { z0 } => vec![z0],
            Surface::Plane { a, b, c, d } => vec![a, b, c, d],
            Surface::XCylinder { y0, z0, r } => vec![y0, z0, r],
            Surface::YCylinder { x0, z0, r } => vec![x0, z0, r],
            Surface::ZCylinder { x0, y0, r } => vec![x0, y0, r],
            Surface::Sphere { x0, y0, z0, r } => vec![x0, y0, z0, r],
        }
    }

    /// Reject non-finite coefficients, non-positive radii and degenerate planes.
    pub fn validate(&self) -> Result<(), SurfaceError> {
        if self.coefficients().iter().any(|c| !c.is_finite()) {
            return Err(SurfaceError::NonFinite { kind: self.kind() });
        }
        match *self {
            Surface::Plane { a, b, c, .. } if a == 0.0 && b == 0.0 && c == 0.0 => {
                Err(SurfaceError::DegeneratePlane)
            }
            Surface::XCylinder { r, .. }
            | Surface::YCylinder { r, .. }
            | Surface::ZCylinder { r, .. }
            | Surface::Sphere { r, .. }
                if r <= 0.0 =>
            {
                Err(SurfaceError::NonPositiveRadius {
                    kind: self.kind(),
                    radius: r,
                })
            }
            _ => Ok(()),
        }
    }

    /// Axis and offset if this surface is an axis-aligned plane.
    pub fn axis_plane(&self) -> Option<(Axis, f64)> {
        match *self {
            Surface::XPlane { x0 } => Some((Axis::X, x0)),
            Surface::YPlane { y0 } => Some((Axis::Y, y0)),
            Surface::ZPlane { z0 } => Some((Axis::Z, z0)),
            _ => None,
        }
    }

    /// Value of the implicit function at `r`.
    pub fn evaluate(&self, r: Position) -> f64 {
        match *self {
            Surface::XPlane { x0 } => r.x - x0,
            Surface::YPlane { y0 } => r.y - y0,
            Surface::ZPlane { z0 } => r.z - z0,
            Surface::Plane { a, b, c, d } => a * r.x + b * r.y + c * r.z - d,
            Surface::XCylinder { y0, z0, r: radius } => {
                let (y, z) = (r.y - y0, r.z - z0);
                y * y + z * z - radius * radius
            }
            Surface::YCylinder { x0, z0, r: radius } => {
                let (x, z) = (r.x - x0, r.z - z0);
                x * x + z * z - radius * radius
            }
            Surface::ZCylinder { x0, y0, r: radius } => {
                let (x, y) = (r.x - x0, r.y - y0);
                x * x + y * y - radius * radius
            }
            Surface::Sphere { x0, y0, z0, r: radius } => {
                (r - DVec3::new(x0, y0, z0)).length_squared() - radius * radius
            }
        }
    }

    /// Gradient of the implicit function at `r` (not normalized).
    pub fn normal(&self, r: Position) -> DVec3 {
        match *self {
            Surface::XPlane { .. } => DVec3::X,
            Surface::YPlane { .. } => DVec3::Y,
            Surface::ZPlane { .. } => DVec3::Z,
            Surface::Plane { a, b, c, .. } => DVec3::new(a, b, c),
            Surface::XCylinder { y0, z0, .. } => DVec3::new(0.0, 2.0 * (r.y - y0), 2.0 * (r.z - z0)),
            Surface::YCylinder { x0, z0, .. } => DVec3::new(2.0 * (r.x - x0), 0.0, 2.0 * (r.z - z0)),
            Surface::ZCylinder { x0, y0, .. } => DVec3::new(2.0 * (r.x - x0), 2.0 * (r.y - y0), 0.0),
            Surface::Sphere { x0, y0, z0, .. } => 2.0 * (r - DVec3::new(x0, y0, z0)),
        }
    }

    /// Which half-space `r` lies in; `true` is the positive side.
    ///
    /// A point within `FP_COINCIDENT` of the surface takes the side it is
    /// heading towards, so a point sitting on a boundary always resolves the
    /// same way for the same direction of travel.
    pub fn sense(&self, r: Position, u: Direction) -> bool {
        let f = self.evaluate(r);
        if f.abs() < FP_COINCIDENT {
            u.dot(self.normal(r)) > 0.0
        } else {
            f > 0.0
        }
    }

    /// Distance along `u` from `r` to the next crossing, or `f64::INFINITY`.
    ///
    /// `coincident` asserts that `r` is on the surface, so the root at zero
    /// distance is discarded. The result is never negative or NaN for a
    /// finite, non-zero `u`.
    pub fn distance(&self, r: Position, u: Direction, coincident: bool) -> f64 {
        match *self {
            Surface::XPlane { x0 } => axis_plane_distance(x0 - r.x, u.x, coincident),
            Surface::YPlane { y0 } => axis_plane_distance(y0 - r.y, u.y, coincident),
            Surface::ZPlane { z0 } => axis_plane_distance(z0 - r.z, u.z, coincident),
            Surface::Plane { a, b, c, d } => {
                let f = a * r.x + b * r.y + c * r.z - d;
                let projection = a * u.x + b * u.y + c * u.z;
                if coincident || f.abs() < FP_COINCIDENT || projection == 0.0 {
                    return f64::INFINITY;
                }
                positive_or_infinite(-f / projection)
            }
            Surface::XCylinder { y0, z0, r: radius } => cylinder_distance(
                (r.y - y0, r.z - z0),
                (u.y, u.z),
                radius,
                coincident,
            ),
            Surface::YCylinder { x0, z0, r: radius } => cylinder_distance(
                (r.x - x0, r.z - z0),
                (u.x, u.z),
                radius,
                coincident,
            ),
            Surface::ZCylinder { x0, y0, r: radius } => cylinder_distance(
                (r.x - x0, r.y - y0),
                (u.x, u.y),
                radius,
                coincident,
            ),
            Surface::Sphere { x0, y0, z0, r: radius } => {
                let x = r - DVec3::new(x0, y0, z0);
                let k = x.dot(u);
                let c = x.length_squared() - radius * radius;
                quadratic_distance(1.0, k, c, coincident)
            }
        }
    }
}

fn positive_or_infinite(d: f64) -> f64 {
    if d < 0.0 || d.is_nan() { f64::INFINITY } else { d }
}

fn axis_plane_distance(f: f64, u_axis: f64, coincident: bool) -> f64 {
    if coincident || f.abs() < FP_COINCIDENT || u_axis == 0.0 {
        return f64::INFINITY;
    }
    positive_or_infinite(f / u_axis)
}

/// Cylinder of radius `radius` in the plane spanned by two axes; `x` and `u`
/// are the offset from the axis and the direction projected onto that plane.
fn cylinder_distance(x: (f64, f64), u: (f64, f64), radius: f64, coincident: bool) -> f64 {
    let a = u.0 * u.0 + u.1 * u.1;
    if a == 0.0 {
        return f64::INFINITY;
    }
    let k = x.0 * u.0 + x.1 * u.1;
    let c = x.0 * x.0 + x.1 * x.1 - radius * radius;
    quadratic_distance(a, k, c, coincident)
}

/// Smallest positive root of `a*d^2 + 2*k*d + c = 0`.
fn quadratic_distance(a: f64, k: f64, c: f64, coincident: bool) -> f64 {
    let quad = k * k - a * c;
    if quad < 0.0 {
        // Ray misses the surface entirely.
        f64::INFINITY
    } else if coincident || c.abs() < FP_COINCIDENT {
        // On the surface: only the far root counts, and only when heading inward.
        if k >= 0.0 {
            f64::INFINITY
        } else {
            (-k + quad.sqrt()) / a
        }
    } else if c < 0.0 {
        // Inside: one positive root.
        (-k + quad.sqrt()) / a
    } else {
        positive_or_infinite((-k - quad.sqrt()) / a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EPS: f64 = 1e-10;

    #[test]
    fn x_plane_sense_and_distance() {
        let s = Surface::XPlane { x0: 5.0 };
        let r = DVec3::new(2.0, 0.0, 0.0);
        assert!(!s.sense(r, DVec3::X));
        assert!((s.distance(r, DVec3::X, false) - 3.0).abs() < EPS);
        assert_eq!(s.distance(r, -DVec3::X, false), f64::INFINITY);
        assert_eq!(s.distance(r, DVec3::Y, false), f64::INFINITY);
    }

    #[test]
    fn on_surface_sense_follows_direction() {
        let s = Surface::ZPlane { z0: 1.0 };
        let r = DVec3::new(0.0, 0.0, 1.0);
        assert!(s.sense(r, DVec3::Z));
        assert!(!s.sense(r, -DVec3::Z));
        // Idempotent for the same direction.
        assert_eq!(s.sense(r, DVec3::Z), s.sense(r, DVec3::Z));
    }

    #[test]
    fn coincident_plane_has_no_crossing() {
        let s = Surface::XPlane { x0: 0.0 };
        let r = DVec3::ZERO;
        assert_eq!(s.distance(r, DVec3::X, true), f64::INFINITY);
    }

    #[test]
    fn general_plane_distance() {
        // x + y = 2
        let s = Surface::Plane {
            a: 1.0,
            b: 1.0,
            c: 0.0,
            d: 2.0,
        };
        let d = s.distance(DVec3::ZERO, DVec3::X, false);
        assert!((d - 2.0).abs() < EPS);
        assert!(!s.sense(DVec3::ZERO, DVec3::X));
    }

    #[test]
    fn sphere_from_inside_and_outside() {
        let s = Surface::Sphere {
            x0: 0.0,
            y0: 0.0,
            z0: 0.0,
            r: 2.0,
        };
        assert!((s.distance(DVec3::ZERO, DVec3::X, false) - 2.0).abs() < EPS);
        let outside = DVec3::new(-5.0, 0.0, 0.0);
        assert!((s.distance(outside, DVec3::X, false) - 3.0).abs() < EPS);
        assert_eq!(s.distance(outside, -DVec3::X, false), f64::INFINITY);
        // Tangent miss.
        assert_eq!(
            s.distance(DVec3::new(-5.0, 3.0, 0.0), DVec3::X, false),
            f64::INFINITY
        );
    }

    #[test]
    fn sphere_on_surface_heading_inward_crosses_far_side() {
        let s = Surface::Sphere {
            x0: 0.0,
            y0: 0.0,
            z0: 0.0,
            r: 1.0,
        };
        let r = DVec3::new(-1.0, 0.0, 0.0);
        assert!((s.distance(r, DVec3::X, true) - 2.0).abs() < EPS);
        assert_eq!(s.distance(r, -DVec3::X, true), f64::INFINITY);
    }

    #[test]
    fn z_cylinder_ignores_axial_motion() {
        let s = Surface::ZCylinder {
            x0: 0.0,
            y0: 0.0,
            r: 1.0,
        };
        assert_eq!(s.distance(DVec3::ZERO, DVec3::Z, false), f64::INFINITY);
        let u = DVec3::new(1.0, 0.0, 1.0).normalize();
        let d = s.distance(DVec3::ZERO, u, false);
        assert!((d - 2f64.sqrt()).abs() < EPS);
    }

    #[test]
    fn validate_rejects_bad_coefficients() {
        assert!(Surface::Sphere { x0: 0.0, y0: 0.0, z0: 0.0, r: 0.0 }.validate().is_err());
        assert!(Surface::Plane { a: 0.0, b: 0.0, c: 0.0, d: 1.0 }.validate().is_err());
        assert!(Surface::XPlane { x0: f64::NAN }.validate().is_err());
        assert!(Surface::YCylinder { x0: 0.0, z0: 0.0, r: 1.0 }.validate().is_ok());
    }

    #[test]
    fn serde_uses_kebab_type_tag() {
        let s: Surface = serde_json::from_str(r#"{"type":"z-cylinder","x0":1.0,"y0":2.0,"r":3.0}"#)
            .unwrap();
        assert_eq!(s, Surface::ZCylinder { x0: 1.0, y0: 2.0, r: 3.0 });
        assert_eq!(s.kind(), "z-cylinder");
        assert_eq!(s.axis_plane(), None);
        assert_eq!(Surface::YPlane { y0: 4.0 }.axis_plane(), Some((Axis::Y, 4.0)));
    }

    proptest! {
        #[test]
        fn distance_is_never_negative_or_nan(
            px in -10.0f64..10.0, py in -10.0f64..10.0, pz in -10.0f64..10.0,
            ux in -1.0f64..1.0, uy in -1.0f64..1.0, uz in -1.0f64..1.0,
            coincident in any::<bool>(),
        ) {
            let u = DVec3::new(ux, uy, uz);
            prop_assume!(u.length() > 1e-3);
            let u = u.normalize();
            let r = DVec3::new(px, py, pz);
            let surfaces = [
                Surface::XPlane { x0: 1.0 },
                Surface::Plane { a: 1.0, b: -2.0, c: 0.5, d: 0.3 },
                Surface::XCylinder { y0: 0.5, z0: -1.0, r: 3.0 },
                Surface::ZCylinder { x0: 0.0, y0: 0.0, r: 4.0 },
                Surface::Sphere { x0: 1.0, y0: 1.0, z0: 1.0, r: 5.0 },
            ];
            for s in surfaces {
                let d = s.distance(r, u, coincident);
                prop_assert!(!d.is_nan());
                prop_assert!(d >= 0.0);
            }
        }

        #[test]
        fn crossing_flips_sense(
            px in -3.0f64..3.0, py in -3.0f64..3.0, pz in -3.0f64..3.0,
            ux in -1.0f64..1.0, uy in -1.0f64..1.0, uz in -1.0f64..1.0,
        ) {
            let u = DVec3::new(ux, uy, uz);
            prop_assume!(u.length() > 1e-2);
            let u = u.normalize();
            let r = DVec3::new(px, py, pz);
            prop_assume!(r.length() < 3.9);
            let s = Surface::Sphere { x0: 0.0, y0: 0.0, z0: 0.0, r: 4.0 };
            let d = s.distance(r, u, false);
            prop_assume!(d.is_finite() && d > 1e-6);
            let before = s.sense(r + (d - 1e-7) * u, u);
            let after = s.sense(r + (d + 1e-7) * u, u);
            prop_assert_ne!(before, after);
        }
    }
}
