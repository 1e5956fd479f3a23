#![warn(missing_docs)]

//! Shape factory for the volscene geometry core.
//!
//! Provides the primitive [`Shape`] parameter sets (box, tube, cone,
//! sphere, polyhedron, trapezoid, tessellated mesh, voxel grid), their
//! validation, and the [`SolidFactory`] seam through which the scene asks a
//! transport engine to turn shapes and boolean combinations into solids.
//!
//! # Example
//!
//! ```
//! use volscene_solids::{BooleanOp, DescriptorFactory, Shape, SolidFactory};
//! use volscene_math::Transform;
//!
//! let mut factory = DescriptorFactory::new();
//! let block = factory.primitive("block", &Shape::cuboid(20.0, 10.0, 5.0)).unwrap();
//! let hole = factory.primitive("hole", &Shape::cylinder(3.0, 5.0)).unwrap();
//! let part = factory
//!     .boolean("block_with_hole", BooleanOp::Subtract, &block, &hole, &Transform::identity())
//!     .unwrap();
//! assert_eq!(part.leaf_count(), 2);
//! ```

mod error;
mod mesh;
mod shape;
mod solid;

pub use error::SolidError;
pub use mesh::TriangleMesh;
pub use shape::Shape;
pub use solid::{BooleanOp, DescriptorFactory, Solid, SolidFactory, SolidHandle, SolidKind};
