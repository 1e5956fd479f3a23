//! Built solids, boolean operators and the factory seam.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use volscene_math::{Aabb, Tolerance, Transform};

use crate::error::SolidError;
use crate::shape::Shape;

/// CSG boolean operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BooleanOp {
    /// Union: combine both solids.
    Union,
    /// Subtract: remove the right operand from the left.
    Subtract,
    /// Intersect: keep only the overlapping region.
    Intersect,
}

impl fmt::Display for BooleanOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            BooleanOp::Union => "union",
            BooleanOp::Subtract => "subtract",
            BooleanOp::Intersect => "intersect",
        };
        f.write_str(tag)
    }
}

impl FromStr for BooleanOp {
    type Err = SolidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "union" => Ok(BooleanOp::Union),
            "subtract" | "subtraction" => Ok(BooleanOp::Subtract),
            "intersect" | "intersection" => Ok(BooleanOp::Intersect),
            _ => Err(SolidError::UnknownBooleanOp(s.to_string())),
        }
    }
}

/// Shared, immutable handle to a built solid.
///
/// Identity matters: a cached solid is handed out as clones of the same
/// `Arc`, so consumers can compare with [`Arc::ptr_eq`].
pub type SolidHandle = Arc<Solid>;

/// What a solid was built from.
#[derive(Debug, Clone)]
pub enum SolidKind {
    /// A primitive shape.
    Primitive(Shape),
    /// Boolean of two solids; `transform` places the right operand in the
    /// frame of the left one.
    Boolean {
        /// Combinator.
        op: BooleanOp,
        /// Left operand.
        left: SolidHandle,
        /// Right operand.
        right: SolidHandle,
        /// Placement of `right` relative to `left`.
        transform: Transform,
    },
}

/// A built solid, as handed to the transport engine.
#[derive(Debug, Clone)]
pub struct Solid {
    name: String,
    kind: SolidKind,
    bounds: Aabb,
    cubic_volume: Option<f64>,
}

impl Solid {
    /// Validate `shape` and build a primitive solid from it.
    pub fn primitive(name: impl Into<String>, shape: Shape) -> Result<Self, SolidError> {
        shape.validate()?;
        Ok(Self {
            name: name.into(),
            bounds: shape.bounds(),
            cubic_volume: shape.cubic_volume(),
            kind: SolidKind::Primitive(shape),
        })
    }

    /// Combine two solids.
    pub fn boolean(
        name: impl Into<String>,
        op: BooleanOp,
        left: SolidHandle,
        right: SolidHandle,
        transform: Transform,
    ) -> Result<Self, SolidError> {
        Self::boolean_with_tolerance(name, op, left, right, transform, Tolerance::DEFAULT.rotation)
    }

    /// Combine two solids, checking the relative rotation against `eps`.
    pub fn boolean_with_tolerance(
        name: impl Into<String>,
        op: BooleanOp,
        left: SolidHandle,
        right: SolidHandle,
        transform: Transform,
        eps: f64,
    ) -> Result<Self, SolidError> {
        let name = name.into();
        if let Err(source) = transform.validate(eps) {
            return Err(SolidError::InvalidTransform { name, source });
        }
        let placed_right = right.bounds.transformed(&transform);
        let bounds = match op {
            BooleanOp::Union => left.bounds.union(&placed_right),
            BooleanOp::Subtract => left.bounds,
            BooleanOp::Intersect => left
                .bounds
                .intersection(&placed_right)
                .unwrap_or_else(Aabb::empty),
        };
        Ok(Self {
            name,
            kind: SolidKind::Boolean {
                op,
                left,
                right,
                transform,
            },
            bounds,
            cubic_volume: None,
        })
    }

    /// Solid name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// How the solid was built.
    pub fn kind(&self) -> &SolidKind {
        &self.kind
    }

    /// Conservative bounds in the solid's own frame.
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Enclosed volume, when known in closed form.
    pub fn cubic_volume(&self) -> Option<f64> {
        self.cubic_volume
    }

    /// Number of primitive leaves below this solid.
    pub fn leaf_count(&self) -> usize {
        match &self.kind {
            SolidKind::Primitive(_) => 1,
            SolidKind::Boolean { left, right, .. } => left.leaf_count() + right.leaf_count(),
        }
    }
}

/// Builds solids on behalf of the scene.
///
/// This is the seam to the transport engine: an engine implements it to
/// turn shape parameters into its own solid objects. Implementations are
/// called at most once per volume between releases.
pub trait SolidFactory {
    /// Build a primitive solid.
    fn primitive(&mut self, name: &str, shape: &Shape) -> Result<SolidHandle, SolidError>;

    /// Build a boolean of two already-built solids.
    fn boolean(
        &mut self,
        name: &str,
        op: BooleanOp,
        left: &SolidHandle,
        right: &SolidHandle,
        transform: &Transform,
    ) -> Result<SolidHandle, SolidError>;
}

/// Factory that builds plain [`Solid`] descriptors.
#[derive(Debug)]
pub struct DescriptorFactory {
    built: usize,
    rotation_tolerance: f64,
}

impl Default for DescriptorFactory {
    fn default() -> Self {
        Self {
            built: 0,
            rotation_tolerance: Tolerance::DEFAULT.rotation,
        }
    }
}

impl DescriptorFactory {
    /// Create a new factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory that accepts boolean rotations within `eps` of proper.
    pub fn with_rotation_tolerance(eps: f64) -> Self {
        Self {
            built: 0,
            rotation_tolerance: eps,
        }
    }

    /// Number of solids built so far.
    pub fn built(&self) -> usize {
        self.built
    }
}

impl SolidFactory for DescriptorFactory {
    fn primitive(&mut self, name: &str, shape: &Shape) -> Result<SolidHandle, SolidError> {
        let solid = Solid::primitive(name, shape.clone())?;
        self.built += 1;
        Ok(Arc::new(solid))
    }

    fn boolean(
        &mut self,
        name: &str,
        op: BooleanOp,
        left: &SolidHandle,
        right: &SolidHandle,
        transform: &Transform,
    ) -> Result<SolidHandle, SolidError> {
        let solid = Solid::boolean_with_tolerance(
            name,
            op,
            Arc::clone(left),
            Arc::clone(right),
            *transform,
            self.rotation_tolerance,
        )?;
        self.built += 1;
        Ok(Arc::new(solid))
    }
}
