#![warn(missing_docs)]

//! Transform algebra for the volscene geometry core.
//!
//! Thin wrappers around nalgebra providing the rigid transforms used to
//! place volumes inside their mothers: a proper rotation plus a
//! translation, validity checks on rotation matrices, composition across a
//! hierarchy, and tolerance constants.

mod bounds;

pub use bounds::Aabb;

use nalgebra::{Matrix3, Unit, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A point in 3D space.
pub type Point3 = nalgebra::Point3<f64>;

/// A vector in 3D space.
pub type Vec3 = Vector3<f64>;

/// A unit (normalized) direction vector in 3D space.
pub type Dir3 = Unit<Vector3<f64>>;

/// A 3x3 rotation matrix.
pub type Rotation = Matrix3<f64>;

/// Errors raised by the transform algebra.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    /// The matrix is not a proper rotation.
    #[error(
        "invalid rotation matrix: |R*R^T - I| = {orthogonality:.3e}, det(R) = {determinant:.6} (tolerance {tolerance:.1e})"
    )]
    InvalidRotation {
        /// Frobenius norm of `R*R^T - I`.
        orthogonality: f64,
        /// Determinant of the matrix.
        determinant: f64,
        /// Tolerance the matrix was checked against.
        tolerance: f64,
    },

    /// A rotation axis of (near) zero length was supplied.
    #[error("rotation axis has zero length: ({0}, {1}, {2})")]
    ZeroAxis(f64, f64, f64),

    /// A value that must be finite was NaN or infinite.
    #[error("non-finite value in {0}")]
    NonFinite(&'static str),
}

/// Result type for transform operations.
pub type Result<T> = std::result::Result<T, MathError>;

/// Tolerance constants for geometric comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    /// Linear distance tolerance in mm.
    pub linear: f64,
    /// Angular tolerance in radians.
    pub angular: f64,
    /// Tolerance on `|R*R^T - I|` and `|det(R) - 1|` for rotation matrices.
    pub rotation: f64,
}

impl Tolerance {
    /// Default tolerances (1e-6 mm linear, 1e-9 rad angular, 1e-6 rotation).
    pub const DEFAULT: Self = Self {
        linear: 1e-6,
        angular: 1e-9,
        rotation: 1e-6,
    };

    /// Check if two points are coincident within tolerance.
    pub fn points_equal(&self, a: &Point3, b: &Point3) -> bool {
        (a - b).norm() < self.linear
    }

    /// Check if a scalar distance is effectively zero.
    pub fn is_zero(&self, d: f64) -> bool {
        d.abs() < self.linear
    }

    /// Check if two angles are effectively equal (in radians).
    pub fn angles_equal(&self, a: f64, b: f64) -> bool {
        (a - b).abs() < self.angular
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Measure how far `r` is from a proper rotation.
///
/// Returns `(|R*R^T - I|, det(R))`, using the Frobenius norm.
pub fn rotation_defect(r: &Rotation) -> (f64, f64) {
    let orthogonality = (r * r.transpose() - Rotation::identity()).norm();
    (orthogonality, r.determinant())
}

/// Returns true iff `|R*R^T - I| < eps` and `|det(R) - 1| < eps`.
pub fn is_valid_rotation(r: &Rotation, eps: f64) -> bool {
    let (orthogonality, determinant) = rotation_defect(r);
    orthogonality < eps && (determinant - 1.0).abs() < eps
}

/// Like [`is_valid_rotation`] but reports the defect as an error.
pub fn check_rotation(r: &Rotation, eps: f64) -> Result<()> {
    if r.iter().any(|v| !v.is_finite()) {
        return Err(MathError::NonFinite("rotation"));
    }
    let (orthogonality, determinant) = rotation_defect(r);
    if orthogonality < eps && (determinant - 1.0).abs() < eps {
        Ok(())
    } else {
        Err(MathError::InvalidRotation {
            orthogonality,
            determinant,
            tolerance: eps,
        })
    }
}

/// Apply `(r2, t2)` in the frame produced by `(r1, t1)`.
///
/// The result maps a point `p` to `r1 * (r2 * p + t2) + t1`.
pub fn compose(r1: &Rotation, t1: &Vec3, r2: &Rotation, t2: &Vec3) -> (Rotation, Vec3) {
    (r1 * r2, r1 * t2 + t1)
}

/// Translation that keeps `center` fixed when `r` is applied about the origin.
pub fn rotate_about_center(r: &Rotation, center: &Vec3) -> Vec3 {
    center - r * center
}

/// Normalize `v` into a rotation axis.
pub fn axis_direction(v: &Vec3) -> Result<Dir3> {
    if v.iter().any(|c| !c.is_finite()) {
        return Err(MathError::NonFinite("axis"));
    }
    Dir3::try_new(*v, 1e-12).ok_or(MathError::ZeroAxis(v.x, v.y, v.z))
}

/// A rigid transform: proper rotation followed by translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Rotation part; always a proper rotation.
    pub rotation: Rotation,
    /// Translation part in mm.
    pub translation: Vec3,
}

impl Transform {
    /// Identity transform.
    pub fn identity() -> Self {
        Self {
            rotation: Rotation::identity(),
            translation: Vec3::zeros(),
        }
    }

    /// Build a transform, validating the rotation against the default tolerance.
    pub fn new(rotation: Rotation, translation: Vec3) -> Result<Self> {
        Self::new_with_tolerance(rotation, translation, Tolerance::DEFAULT.rotation)
    }

    /// Build a transform, validating the rotation against `eps`.
    pub fn new_with_tolerance(rotation: Rotation, translation: Vec3, eps: f64) -> Result<Self> {
        check_rotation(&rotation, eps)?;
        if translation.iter().any(|v| !v.is_finite()) {
            return Err(MathError::NonFinite("translation"));
        }
        Ok(Self {
            rotation,
            translation,
        })
    }

    /// Pure translation by `(dx, dy, dz)`.
    pub fn translation(dx: f64, dy: f64, dz: f64) -> Self {
        Self::from_translation(Vec3::new(dx, dy, dz))
    }

    /// Pure translation by `t`.
    pub fn from_translation(t: Vec3) -> Self {
        Self {
            rotation: Rotation::identity(),
            translation: t,
        }
    }

    /// Pure rotation, validated against the default tolerance.
    pub fn from_rotation(rotation: Rotation) -> Result<Self> {
        Self::new(rotation, Vec3::zeros())
    }

    /// Rotation about the X axis by `angle` radians.
    pub fn rotation_x(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self::rotation_only(Rotation::new(1.0, 0.0, 0.0, 0.0, c, -s, 0.0, s, c))
    }

    /// Rotation about the Y axis by `angle` radians.
    pub fn rotation_y(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self::rotation_only(Rotation::new(c, 0.0, s, 0.0, 1.0, 0.0, -s, 0.0, c))
    }

    /// Rotation about the Z axis by `angle` radians.
    pub fn rotation_z(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self::rotation_only(Rotation::new(c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0))
    }

    /// Rotation about an arbitrary axis through the origin by `angle` radians.
    ///
    /// Uses Rodrigues' rotation formula.
    pub fn rotation_about_axis(axis: &Dir3, angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        let t = 1.0 - c;
        let (x, y, z) = (axis.as_ref().x, axis.as_ref().y, axis.as_ref().z);
        Self::rotation_only(Rotation::new(
            t * x * x + c,
            t * x * y - s * z,
            t * x * z + s * y,
            t * x * y + s * z,
            t * y * y + c,
            t * y * z - s * x,
            t * x * z - s * y,
            t * y * z + s * x,
            t * z * z + c,
        ))
    }

    /// Extrinsic X, then Y, then Z rotation, angles in degrees.
    pub fn from_euler_xyz_deg(x_deg: f64, y_deg: f64, z_deg: f64) -> Self {
        let rx = Self::rotation_x(x_deg.to_radians());
        let ry = Self::rotation_y(y_deg.to_radians());
        let rz = Self::rotation_z(z_deg.to_radians());
        rz.compose(&ry).compose(&rx)
    }

    /// Transform that carries an object sitting at `position` around `axis`
    /// (through the origin) by `angle` radians, the object turning with the orbit.
    pub fn orbiting(position: &Vec3, axis: &Dir3, angle: f64) -> Self {
        let r = Self::rotation_about_axis(axis, angle).rotation;
        Self {
            rotation: r,
            translation: r * position,
        }
    }

    /// Rotation by `angle` radians about an axis passing through `center`.
    pub fn spin_in_place(center: &Vec3, axis: &Dir3, angle: f64) -> Self {
        let r = Self::rotation_about_axis(axis, angle).rotation;
        Self {
            rotation: r,
            translation: rotate_about_center(&r, center),
        }
    }

    /// Apply `inner` in the frame produced by `self`.
    pub fn compose(&self, inner: &Transform) -> Self {
        let (rotation, translation) = compose(
            &self.rotation,
            &self.translation,
            &inner.rotation,
            &inner.translation,
        );
        Self {
            rotation,
            translation,
        }
    }

    /// Apply `self` first, then `outer`.
    pub fn then(&self, outer: &Transform) -> Self {
        outer.compose(self)
    }

    /// Inverse transform (rotations are orthonormal, so this always exists).
    pub fn inverse(&self) -> Self {
        let rt = self.rotation.transpose();
        Self {
            rotation: rt,
            translation: -(rt * self.translation),
        }
    }

    /// Transform a point.
    pub fn apply_point(&self, p: &Point3) -> Point3 {
        Point3::from(self.rotation * p.coords + self.translation)
    }

    /// Transform a direction vector (rotation only).
    pub fn apply_vec(&self, v: &Vec3) -> Vec3 {
        self.rotation * v
    }

    /// Same rotation, different translation.
    pub fn with_translation(&self, translation: Vec3) -> Self {
        Self {
            rotation: self.rotation,
            translation,
        }
    }

    /// Re-check the rotation against `eps`.
    pub fn validate(&self, eps: f64) -> Result<()> {
        check_rotation(&self.rotation, eps)
    }

    /// Component-wise comparison within `tol`.
    pub fn approx_eq(&self, other: &Transform, tol: f64) -> bool {
        (self.rotation - other.rotation).amax() < tol
            && (self.translation - other.translation).amax() < tol
    }

    fn rotation_only(rotation: Rotation) -> Self {
        Self {
            rotation,
            translation: Vec3::zeros(),
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}
