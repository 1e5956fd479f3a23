#![warn(missing_docs)]

//! Scene tree for particle-transport geometry.
//!
//! A [`SceneTree`] holds named [`VolumeNode`]s under a single world volume.
//! Volumes carry a shape (a primitive, a boolean of two other volumes, or a
//! voxelized image), a material, a mother and one transform per
//! repetition. The tree links mothers, orders boolean dependencies, builds
//! each solid once and hands placements to a [`GeometryEngine`]. Dynamic
//! schedules move repetitions or swap voxel fields between runs.
//!
//! # Example
//!
//! ```
//! use volscene::{RecordingEngine, SceneSettings, SceneTree, VolumeNode};
//! use volscene::volscene_math::Transform;
//! use volscene::volscene_solids::Shape;
//!
//! let mut tree = SceneTree::new(SceneSettings::default()).unwrap();
//! tree.add(
//!     VolumeNode::new("tank", Shape::cuboid(100.0, 100.0, 100.0), "G4_WATER")
//!         .with_transform(Transform::translation(0.0, 0.0, 50.0)),
//! )
//! .unwrap();
//!
//! let mut engine = RecordingEngine::new();
//! let report = tree.construct_all(&mut engine).unwrap();
//! assert_eq!(report.placements, 2);
//! assert!(engine.placement("tank").is_some());
//! ```

pub use volscene_ir;
pub use volscene_math;
pub use volscene_solids;

mod build;
mod config;
mod csg;
mod dynamic;
mod engine;
mod error;
mod loader;
mod repeat;
mod runs;
mod tree;
mod volume;
mod voxel;

pub use build::{ConstructionReport, PersistenceFailure};
pub use config::{BroadcastPolicy, SceneSettings, WorldSettings, DEFAULT_WORLD_NAME};
pub use csg::CsgNode;
pub use dynamic::{DynamicSchedule, ScheduleAction, ScheduleTarget};
pub use engine::{GeometryEngine, Placement, PlacementMove, RecordingEngine};
pub use error::{PersistError, Result, SceneError};
pub use repeat::{parse_repetition_name, repetition_index, repetition_name, Repeater};
pub use tree::SceneTree;
pub use volume::{ShapeKind, SolidState, VolumeId, VolumeNode};
pub use voxel::{compute_labels, write_label_outputs, LabelField, MaterialInterval, ScalarField, VoxelizedVolume};
