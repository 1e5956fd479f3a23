//! Error types for shape construction.

use thiserror::Error;

/// Errors raised while validating shapes or building solids.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolidError {
    /// A shape parameter is out of its admissible range.
    #[error("invalid {shape} parameter `{parameter}`: {reason}")]
    InvalidParameter {
        /// Shape kind name.
        shape: &'static str,
        /// Offending parameter.
        parameter: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// Boolean combinator tag that is not union, subtract or intersect.
    #[error("unknown boolean operator `{0}` (expected union, subtract or intersect)")]
    UnknownBooleanOp(String),

    /// The relative transform of a boolean is not a proper rigid transform.
    #[error("boolean `{name}`: {source}")]
    InvalidTransform {
        /// Name of the boolean solid.
        name: String,
        /// Underlying math error.
        #[source]
        source: volscene_math::MathError,
    },

    /// Backend-specific failure reported by an external solid factory.
    #[error("solid factory failed for `{name}`: {reason}")]
    Backend {
        /// Name of the solid being built.
        name: String,
        /// Backend message.
        reason: String,
    },
}
