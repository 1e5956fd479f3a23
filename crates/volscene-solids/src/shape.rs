//! Primitive shape parameters.
//!
//! Lengths are in mm, angles in radians. Tube, cone and trapezoid
//! half-lengths along Z (`dz`) follow the usual particle-transport solid
//! conventions; boxes use full edge lengths.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use volscene_math::{Aabb, Point3, Vec3};

use crate::error::SolidError;
use crate::mesh::TriangleMesh;

const ANGLE_SLACK: f64 = 1e-9;

/// A primitive shape: only the parameters needed to build its solid.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Axis-aligned box centered at origin.
    Box {
        /// Full edge lengths along X, Y, Z.
        size: Vec3,
    },
    /// Tube section along Z, centered at origin.
    Tube {
        /// Inner radius (0 for a solid cylinder).
        rmin: f64,
        /// Outer radius.
        rmax: f64,
        /// Half length along Z.
        dz: f64,
        /// Start angle of the section.
        sphi: f64,
        /// Angular span of the section.
        dphi: f64,
    },
    /// Cone section along Z; radii given at `-dz` (1) and `+dz` (2).
    Cone {
        /// Inner radius at `-dz`.
        rmin1: f64,
        /// Outer radius at `-dz`.
        rmax1: f64,
        /// Inner radius at `+dz`.
        rmin2: f64,
        /// Outer radius at `+dz`.
        rmax2: f64,
        /// Half length along Z.
        dz: f64,
        /// Start angle of the section.
        sphi: f64,
        /// Angular span of the section.
        dphi: f64,
    },
    /// Spherical shell section centered at origin.
    Sphere {
        /// Inner radius.
        rmin: f64,
        /// Outer radius.
        rmax: f64,
        /// Start azimuth.
        sphi: f64,
        /// Azimuthal span.
        dphi: f64,
        /// Start polar angle.
        stheta: f64,
        /// Polar span.
        dtheta: f64,
    },
    /// Polygonal prism section with Z planes, like a faceted cone stack.
    Polyhedron {
        /// Start angle.
        phi_start: f64,
        /// Total angular span.
        phi_total: f64,
        /// Number of sides over `phi_total`.
        num_side: u32,
        /// Z position of each plane, non-decreasing.
        z_planes: Vec<f64>,
        /// Inner (tangent) radius at each plane.
        radius_inner: Vec<f64>,
        /// Outer (tangent) radius at each plane.
        radius_outer: Vec<f64>,
    },
    /// General trapezoid with two trapezoidal faces at `-dz` and `+dz`.
    Trapezoid {
        /// Half length along Z.
        dz: f64,
        /// Polar angle of the line joining the face centers.
        theta: f64,
        /// Azimuth of the line joining the face centers.
        phi: f64,
        /// Half Y length of the `-dz` face.
        dy1: f64,
        /// Half X length at `-dy1` of the `-dz` face.
        dx1: f64,
        /// Half X length at `+dy1` of the `-dz` face.
        dx2: f64,
        /// Tilt of the `-dz` face.
        alpha1: f64,
        /// Half Y length of the `+dz` face.
        dy2: f64,
        /// Half X length at `-dy2` of the `+dz` face.
        dx3: f64,
        /// Half X length at `+dy2` of the `+dz` face.
        dx4: f64,
        /// Tilt of the `+dz` face.
        alpha2: f64,
    },
    /// Closed triangle mesh.
    TessellatedMesh(TriangleMesh),
    /// Regular voxel grid centered at origin.
    VoxelGrid {
        /// Number of voxels along X, Y, Z.
        dims: [usize; 3],
        /// Voxel edge lengths.
        spacing: Vec3,
    },
}

impl Shape {
    /// Full 360° tube with no inner bore.
    pub fn cylinder(radius: f64, dz: f64) -> Self {
        Shape::Tube {
            rmin: 0.0,
            rmax: radius,
            dz,
            sphi: 0.0,
            dphi: TAU,
        }
    }

    /// Full solid sphere.
    pub fn ball(radius: f64) -> Self {
        Shape::Sphere {
            rmin: 0.0,
            rmax: radius,
            sphi: 0.0,
            dphi: TAU,
            stheta: 0.0,
            dtheta: PI,
        }
    }

    /// Box from full edge lengths.
    pub fn cuboid(x: f64, y: f64, z: f64) -> Self {
        Shape::Box {
            size: Vec3::new(x, y, z),
        }
    }

    /// Name of the shape kind, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Shape::Box { .. } => "Box",
            Shape::Tube { .. } => "Tube",
            Shape::Cone { .. } => "Cone",
            Shape::Sphere { .. } => "Sphere",
            Shape::Polyhedron { .. } => "Polyhedron",
            Shape::Trapezoid { .. } => "Trapezoid",
            Shape::TessellatedMesh(_) => "TessellatedMesh",
            Shape::VoxelGrid { .. } => "VoxelGrid",
        }
    }

    /// Check every parameter against its admissible range.
    pub fn validate(&self) -> Result<(), SolidError> {
        let v = Check(self.kind_name());
        match self {
            Shape::Box { size } => {
                v.positive("size.x", size.x)?;
                v.positive("size.y", size.y)?;
                v.positive("size.z", size.z)
            }
            Shape::Tube {
                rmin,
                rmax,
                dz,
                sphi,
                dphi,
            } => {
                v.non_negative("rmin", *rmin)?;
                v.greater("rmax", *rmax, "rmin", *rmin)?;
                v.positive("dz", *dz)?;
                v.finite("sphi", *sphi)?;
                v.span("dphi", *dphi, TAU)
            }
            Shape::Cone {
                rmin1,
                rmax1,
                rmin2,
                rmax2,
                dz,
                sphi,
                dphi,
            } => {
                v.non_negative("rmin1", *rmin1)?;
                v.non_negative("rmin2", *rmin2)?;
                v.at_least("rmax1", *rmax1, "rmin1", *rmin1)?;
                v.at_least("rmax2", *rmax2, "rmin2", *rmin2)?;
                if rmax1 - rmin1 <= 0.0 && rmax2 - rmin2 <= 0.0 {
                    return Err(v.fail("rmax1", "both ends of the cone have zero wall thickness"));
                }
                v.positive("dz", *dz)?;
                v.finite("sphi", *sphi)?;
                v.span("dphi", *dphi, TAU)
            }
            Shape::Sphere {
                rmin,
                rmax,
                sphi,
                dphi,
                stheta,
                dtheta,
            } => {
                v.non_negative("rmin", *rmin)?;
                v.greater("rmax", *rmax, "rmin", *rmin)?;
                v.finite("sphi", *sphi)?;
                v.span("dphi", *dphi, TAU)?;
                v.finite("stheta", *stheta)?;
                if *stheta < 0.0 || *stheta > PI + ANGLE_SLACK {
                    return Err(v.fail("stheta", format!("{stheta} is outside [0, pi]")));
                }
                v.span("dtheta", *dtheta, PI)?;
                if stheta + dtheta > PI + ANGLE_SLACK {
                    return Err(v.fail(
                        "dtheta",
                        format!("stheta + dtheta = {} exceeds pi", stheta + dtheta),
                    ));
                }
                Ok(())
            }
            Shape::Polyhedron {
                phi_start,
                phi_total,
                num_side,
                z_planes,
                radius_inner,
                radius_outer,
            } => {
                v.finite("phi_start", *phi_start)?;
                v.span("phi_total", *phi_total, TAU)?;
                if *num_side == 0 {
                    return Err(v.fail("num_side", "must be at least 1"));
                }
                if phi_total / (2.0 * f64::from(*num_side)) >= FRAC_PI_2 {
                    return Err(v.fail(
                        "num_side",
                        format!("{num_side} sides over {phi_total} rad leaves a side spanning 180 degrees or more"),
                    ));
                }
                if z_planes.len() < 2 {
                    return Err(v.fail("z_planes", format!("need at least 2 planes, got {}", z_planes.len())));
                }
                if radius_inner.len() != z_planes.len() || radius_outer.len() != z_planes.len() {
                    return Err(v.fail(
                        "radius_outer",
                        format!(
                            "z_planes has {} entries but radius_inner has {} and radius_outer has {}",
                            z_planes.len(),
                            radius_inner.len(),
                            radius_outer.len()
                        ),
                    ));
                }
                for w in z_planes.windows(2) {
                    v.finite("z_planes", w[0])?;
                    v.finite("z_planes", w[1])?;
                    if w[1] < w[0] {
                        return Err(v.fail("z_planes", format!("decreasing plane {} after {}", w[1], w[0])));
                    }
                }
                for (rin, rout) in radius_inner.iter().zip(radius_outer) {
                    v.non_negative("radius_inner", *rin)?;
                    v.at_least("radius_outer", *rout, "radius_inner", *rin)?;
                }
                Ok(())
            }
            Shape::Trapezoid {
                dz,
                theta,
                phi,
                dy1,
                dx1,
                dx2,
                alpha1,
                dy2,
                dx3,
                dx4,
                alpha2,
            } => {
                v.positive("dz", *dz)?;
                v.positive("dy1", *dy1)?;
                v.positive("dx1", *dx1)?;
                v.positive("dx2", *dx2)?;
                v.positive("dy2", *dy2)?;
                v.positive("dx3", *dx3)?;
                v.positive("dx4", *dx4)?;
                for (name, angle) in [("theta", theta), ("alpha1", alpha1), ("alpha2", alpha2)] {
                    v.finite(name, *angle)?;
                    if angle.abs() >= FRAC_PI_2 {
                        return Err(v.fail(name, format!("|{angle}| must be below pi/2")));
                    }
                }
                v.finite("phi", *phi)
            }
            Shape::TessellatedMesh(mesh) => mesh.validate(),
            Shape::VoxelGrid { dims, spacing } => {
                if dims.iter().any(|&n| n == 0) {
                    return Err(v.fail("dims", format!("{dims:?} has an empty axis")));
                }
                v.positive("spacing.x", spacing.x)?;
                v.positive("spacing.y", spacing.y)?;
                v.positive("spacing.z", spacing.z)
            }
        }
    }

    /// Conservative local bounding box.
    pub fn bounds(&self) -> Aabb {
        match self {
            Shape::Box { size } => Aabb::from_half_extents(size * 0.5),
            Shape::Tube { rmax, dz, .. } => Aabb::from_half_extents(Vec3::new(*rmax, *rmax, *dz)),
            Shape::Cone {
                rmax1, rmax2, dz, ..
            } => {
                let r = rmax1.max(*rmax2);
                Aabb::from_half_extents(Vec3::new(r, r, *dz))
            }
            Shape::Sphere { rmax, .. } => Aabb::from_half_extents(Vec3::repeat(*rmax)),
            Shape::Polyhedron {
                phi_total,
                num_side,
                z_planes,
                radius_outer,
                ..
            } => {
                let tangent = radius_outer.iter().copied().fold(0.0, f64::max);
                let half_side = phi_total / (2.0 * f64::from((*num_side).max(1)));
                let corner = tangent / half_side.cos();
                let zmin = z_planes.iter().copied().fold(f64::INFINITY, f64::min);
                let zmax = z_planes.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                Aabb::new(
                    Point3::new(-corner, -corner, zmin),
                    Point3::new(corner, corner, zmax),
                )
            }
            Shape::Trapezoid {
                dz,
                theta,
                phi,
                dy1,
                dx1,
                dx2,
                alpha1,
                dy2,
                dx3,
                dx4,
                alpha2,
            } => {
                let shift = dz * theta.tan();
                let dy = dy1.max(*dy2);
                let dx = dx1.max(*dx2).max(*dx3).max(*dx4)
                    + dy * alpha1.tan().abs().max(alpha2.tan().abs());
                Aabb::from_half_extents(Vec3::new(
                    dx + (shift * phi.cos()).abs(),
                    dy + (shift * phi.sin()).abs(),
                    *dz,
                ))
            }
            Shape::TessellatedMesh(mesh) => mesh.bounds(),
            Shape::VoxelGrid { dims, spacing } => Aabb::from_half_extents(Vec3::new(
                dims[0] as f64 * spacing.x * 0.5,
                dims[1] as f64 * spacing.y * 0.5,
                dims[2] as f64 * spacing.z * 0.5,
            )),
        }
    }

    /// Enclosed volume in mm³ where a closed form exists.
    pub fn cubic_volume(&self) -> Option<f64> {
        match self {
            Shape::Box { size } => Some(size.x * size.y * size.z),
            Shape::Tube {
                rmin,
                rmax,
                dz,
                dphi,
                ..
            } => Some(dphi * (rmax * rmax - rmin * rmin) * dz),
            Shape::Cone {
                rmin1,
                rmax1,
                rmin2,
                rmax2,
                dz,
                dphi,
                ..
            } => {
                let outer = rmax1 * rmax1 + rmax1 * rmax2 + rmax2 * rmax2;
                let inner = rmin1 * rmin1 + rmin1 * rmin2 + rmin2 * rmin2;
                Some(dphi * dz / 3.0 * (outer - inner))
            }
            Shape::Sphere {
                rmin,
                rmax,
                dphi,
                stheta,
                dtheta,
                ..
            } => Some(
                dphi / 3.0
                    * (rmax.powi(3) - rmin.powi(3))
                    * (stheta.cos() - (stheta + dtheta).cos()),
            ),
            Shape::Polyhedron {
                phi_total,
                num_side,
                z_planes,
                radius_inner,
                radius_outer,
                ..
            } => {
                // each side contributes a triangle of area r^2 * tan(half_side)
                let n = f64::from(*num_side);
                let factor = n * (phi_total / (2.0 * n)).tan();
                let frustum = |r: &[f64], i: usize| r[i] * r[i] + r[i] * r[i + 1] + r[i + 1] * r[i + 1];
                let total = (0..z_planes.len().saturating_sub(1))
                    .map(|i| {
                        let h = z_planes[i + 1] - z_planes[i];
                        h / 3.0 * (frustum(radius_outer, i) - frustum(radius_inner, i))
                    })
                    .sum::<f64>();
                Some(factor * total)
            }
            Shape::Trapezoid {
                dz,
                dy1,
                dx1,
                dx2,
                dy2,
                dx3,
                dx4,
                ..
            } => {
                // area(t) = 2 y(t) (xa(t) + xb(t)), all linear in t over [0, 1]
                let (y0, s0) = (*dy1, dx1 + dx2);
                let (dy, ds) = (dy2 - dy1, (dx3 + dx4) - s0);
                Some(4.0 * dz * (y0 * s0 + (y0 * ds + s0 * dy) / 2.0 + dy * ds / 3.0))
            }
            Shape::TessellatedMesh(mesh) => Some(mesh.signed_volume().abs()),
            Shape::VoxelGrid { dims, spacing } => {
                Some(dims.iter().product::<usize>() as f64 * spacing.x * spacing.y * spacing.z)
            }
        }
    }
}

struct Check(&'static str);

impl Check {
    fn fail(&self, parameter: &'static str, reason: impl Into<String>) -> SolidError {
        SolidError::InvalidParameter {
            shape: self.0,
            parameter,
            reason: reason.into(),
        }
    }

    fn finite(&self, parameter: &'static str, value: f64) -> Result<(), SolidError> {
        if value.is_finite() {
            Ok(())
        } else {
            Err(self.fail(parameter, format!("{value} is not finite")))
        }
    }

    fn positive(&self, parameter: &'static str, value: f64) -> Result<(), SolidError> {
        self.finite(parameter, value)?;
        if value > 0.0 {
            Ok(())
        } else {
            Err(self.fail(parameter, format!("{value} must be positive")))
        }
    }

    fn non_negative(&self, parameter: &'static str, value: f64) -> Result<(), SolidError> {
        self.finite(parameter, value)?;
        if value >= 0.0 {
            Ok(())
        } else {
            Err(self.fail(parameter, format!("{value} must not be negative")))
        }
    }

    fn greater(
        &self,
        parameter: &'static str,
        value: f64,
        other_name: &str,
        other: f64,
    ) -> Result<(), SolidError> {
        self.finite(parameter, value)?;
        if value > other {
            Ok(())
        } else {
            Err(self.fail(parameter, format!("{value} must exceed {other_name} = {other}")))
        }
    }

    fn at_least(
        &self,
        parameter: &'static str,
        value: f64,
        other_name: &str,
        other: f64,
    ) -> Result<(), SolidError> {
        self.finite(parameter, value)?;
        if value >= other {
            Ok(())
        } else {
            Err(self.fail(parameter, format!("{value} is below {other_name} = {other}")))
        }
    }

    fn span(&self, parameter: &'static str, value: f64, max: f64) -> Result<(), SolidError> {
        self.finite(parameter, value)?;
        if value > 0.0 && value <= max + ANGLE_SLACK {
            Ok(())
        } else {
            Err(self.fail(parameter, format!("{value} rad is outside (0, {max}]")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::unit_tetrahedron;
    use approx::assert_relative_eq;

    #[test]
    fn box_volume_and_bounds() {
        let s = Shape::cuboid(2.0, 4.0, 6.0);
        assert!(s.validate().is_ok());
        assert_relative_eq!(s.cubic_volume().unwrap(), 48.0);
        let b = s.bounds();
        assert_eq!(b.min, Point3::new(-1.0, -2.0, -3.0));
        assert_eq!(b.max, Point3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn negative_box_edge_is_rejected() {
        let err = Shape::cuboid(1.0, -1.0, 1.0).validate().unwrap_err();
        match err {
            SolidError::InvalidParameter { shape, parameter, .. } => {
                assert_eq!(shape, "Box");
                assert_eq!(parameter, "size.y");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn cylinder_volume() {
        let s = Shape::cylinder(2.0, 5.0);
        assert!(s.validate().is_ok());
        assert_relative_eq!(s.cubic_volume().unwrap(), PI * 4.0 * 10.0, epsilon = 1e-9);
    }

    #[test]
    fn half_tube_volume() {
        let s = Shape::Tube {
            rmin: 1.0,
            rmax: 2.0,
            dz: 1.0,
            sphi: 0.0,
            dphi: PI,
        };
        assert_relative_eq!(s.cubic_volume().unwrap(), PI * 3.0, epsilon = 1e-9);
    }

    #[test]
    fn tube_with_inverted_radii_is_rejected() {
        let s = Shape::Tube {
            rmin: 3.0,
            rmax: 2.0,
            dz: 1.0,
            sphi: 0.0,
            dphi: TAU,
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn cone_volume_matches_frustum() {
        let s = Shape::Cone {
            rmin1: 0.0,
            rmax1: 2.0,
            rmin2: 0.0,
            rmax2: 0.0,
            dz: 1.5,
            sphi: 0.0,
            dphi: TAU,
        };
        assert!(s.validate().is_ok());
        // full cone of height 3 and base radius 2
        assert_relative_eq!(s.cubic_volume().unwrap(), PI * 4.0 * 3.0 / 3.0, epsilon = 1e-9);
    }

    #[test]
    fn sphere_volume() {
        let s = Shape::ball(3.0);
        assert!(s.validate().is_ok());
        assert_relative_eq!(s.cubic_volume().unwrap(), 4.0 / 3.0 * PI * 27.0, epsilon = 1e-9);

        let hemisphere = Shape::Sphere {
            rmin: 0.0,
            rmax: 3.0,
            sphi: 0.0,
            dphi: TAU,
            stheta: 0.0,
            dtheta: FRAC_PI_2,
        };
        assert_relative_eq!(
            hemisphere.cubic_volume().unwrap(),
            2.0 / 3.0 * PI * 27.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn sphere_polar_overflow_is_rejected() {
        let s = Shape::Sphere {
            rmin: 0.0,
            rmax: 1.0,
            sphi: 0.0,
            dphi: TAU,
            stheta: 2.0,
            dtheta: 2.0,
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn square_polyhedron_is_a_box() {
        // 4 sides with tangent radius 1 over a full turn is a 2x2 square prism
        let s = Shape::Polyhedron {
            phi_start: 0.0,
            phi_total: TAU,
            num_side: 4,
            z_planes: vec![-1.0, 1.0],
            radius_inner: vec![0.0, 0.0],
            radius_outer: vec![1.0, 1.0],
        };
        assert!(s.validate().is_ok());
        assert_relative_eq!(s.cubic_volume().unwrap(), 8.0, epsilon = 1e-9);
        assert_relative_eq!(s.bounds().max.x, 2.0_f64.sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn polyhedron_with_mismatched_planes_is_rejected() {
        let s = Shape::Polyhedron {
            phi_start: 0.0,
            phi_total: TAU,
            num_side: 6,
            z_planes: vec![-1.0, 0.0, 1.0],
            radius_inner: vec![0.0, 0.0],
            radius_outer: vec![1.0, 1.0, 1.0],
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn polyhedron_with_two_sides_is_rejected() {
        let s = Shape::Polyhedron {
            phi_start: 0.0,
            phi_total: TAU,
            num_side: 2,
            z_planes: vec![-1.0, 1.0],
            radius_inner: vec![0.0, 0.0],
            radius_outer: vec![1.0, 1.0],
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn right_trapezoid_volume() {
        let s = Shape::Trapezoid {
            dz: 1.0,
            theta: 0.0,
            phi: 0.0,
            dy1: 1.0,
            dx1: 1.0,
            dx2: 1.0,
            alpha1: 0.0,
            dy2: 1.0,
            dx3: 1.0,
            dx4: 1.0,
            alpha2: 0.0,
        };
        assert!(s.validate().is_ok());
        assert_relative_eq!(s.cubic_volume().unwrap(), 8.0, epsilon = 1e-12);
        assert_relative_eq!(s.bounds().max.x, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn pyramid_frustum_trapezoid_volume() {
        // square 2x2 at -dz shrinking to 1x1 at +dz, height 2
        let s = Shape::Trapezoid {
            dz: 1.0,
            theta: 0.0,
            phi: 0.0,
            dy1: 1.0,
            dx1: 1.0,
            dx2: 1.0,
            alpha1: 0.0,
            dy2: 0.5,
            dx3: 0.5,
            dx4: 0.5,
            alpha2: 0.0,
        };
        let expected = 2.0 / 3.0 * (4.0 + 2.0 + 1.0);
        assert_relative_eq!(s.cubic_volume().unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn mesh_and_voxels() {
        let s = Shape::TessellatedMesh(unit_tetrahedron());
        assert!(s.validate().is_ok());
        assert_relative_eq!(s.cubic_volume().unwrap(), 1.0 / 6.0, epsilon = 1e-12);

        let g = Shape::VoxelGrid {
            dims: [10, 20, 5],
            spacing: Vec3::new(1.0, 0.5, 2.0),
        };
        assert!(g.validate().is_ok());
        assert_relative_eq!(g.cubic_volume().unwrap(), 1000.0);
        assert_relative_eq!(g.bounds().max.y, 5.0);

        let empty = Shape::VoxelGrid {
            dims: [10, 0, 5],
            spacing: Vec3::new(1.0, 1.0, 1.0),
        };
        assert!(empty.validate().is_err());
    }
}
