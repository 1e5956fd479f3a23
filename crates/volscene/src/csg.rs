//! Boolean composition of two volumes.

use volscene_math::Transform;
use volscene_solids::BooleanOp;

use crate::error::{Result, SceneError};

/// Boolean combination of two operand volumes.
///
/// Operands are referenced by name and are not owned: they may be placed
/// on their own or serve only as building blocks. `transform` places the
/// right operand in the frame of the left one.
#[derive(Debug, Clone, PartialEq)]
pub struct CsgNode {
    /// Combinator.
    pub op: BooleanOp,
    /// Left operand volume.
    pub left: String,
    /// Right operand volume.
    pub right: String,
    /// Placement of the right operand relative to the left.
    pub transform: Transform,
}

impl CsgNode {
    /// Combine `left` and `right` with the right operand left in place.
    pub fn new(op: BooleanOp, left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            op,
            left: left.into(),
            right: right.into(),
            transform: Transform::identity(),
        }
    }

    /// `left ∪ right`.
    pub fn union(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self::new(BooleanOp::Union, left, right)
    }

    /// `left \ right`.
    pub fn subtract(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self::new(BooleanOp::Subtract, left, right)
    }

    /// `left ∩ right`.
    pub fn intersect(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self::new(BooleanOp::Intersect, left, right)
    }

    /// Parse the combinator from its textual tag.
    ///
    /// `volume` is only used for error context.
    pub fn parse(
        volume: &str,
        tag: &str,
        left: impl Into<String>,
        right: impl Into<String>,
    ) -> Result<Self> {
        let op = tag
            .parse::<BooleanOp>()
            .map_err(|_| SceneError::UnknownBooleanOp {
                volume: volume.to_string(),
                tag: tag.to_string(),
            })?;
        Ok(Self::new(op, left, right))
    }

    /// Place the right operand with `transform`.
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Both operand names, left first.
    pub fn operands(&self) -> [&str; 2] {
        [self.left.as_str(), self.right.as_str()]
    }
}
