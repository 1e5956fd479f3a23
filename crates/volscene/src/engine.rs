//! Boundary to the transport engine.
//!
//! The engine consumes built solids and placements. It is also the party
//! that opens and closes geometry around run-boundary updates.

use std::collections::HashMap;

use volscene_math::Transform;
use volscene_solids::{BooleanOp, DescriptorFactory, Shape, SolidError, SolidFactory, SolidHandle};

use crate::error::{Result, SceneError};
use crate::voxel::LabelField;

/// One physical placement of a volume's solid.
#[derive(Debug, Clone)]
pub struct Placement {
    /// Volume being placed.
    pub volume: String,
    /// Placement name; see [`VolumeNode::placement_name`](crate::VolumeNode::placement_name).
    pub name: String,
    /// Mother volume; `None` for the world.
    pub mother: Option<String>,
    /// Zero-based copy index, matching the repetition index.
    pub copy_index: usize,
    /// Transform relative to the mother.
    pub transform: Transform,
    /// Material name, passed through.
    pub material: String,
    /// Solid to place.
    pub solid: SolidHandle,
}

/// Operations the scene asks of the transport engine.
///
/// Solid construction comes from the [`SolidFactory`] supertrait.
pub trait GeometryEngine: SolidFactory {
    /// Create one physical placement.
    fn place(&mut self, placement: &Placement) -> Result<()>;

    /// Hand the labels of a voxelized volume to the engine.
    fn fill_voxels(&mut self, volume: &str, labels: &LabelField) -> Result<()>;

    /// Unlock geometry for modification between runs.
    fn open_geometry(&mut self) -> Result<()>;

    /// Lock geometry again before transport resumes.
    fn close_geometry(&mut self) -> Result<()>;

    /// Move an existing placement; only allowed while geometry is open.
    fn move_placement(&mut self, name: &str, transform: &Transform) -> Result<()>;
}

/// Record of a placement move.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementMove {
    /// Placement name.
    pub name: String,
    /// New transform.
    pub transform: Transform,
}

/// In-memory engine that records every call.
///
/// Solids are plain descriptors from [`DescriptorFactory`].
#[derive(Debug, Default)]
pub struct RecordingEngine {
    factory: DescriptorFactory,
    solid_builds: HashMap<String, usize>,
    placements: Vec<Placement>,
    index: HashMap<String, usize>,
    voxel_fills: Vec<(String, usize)>,
    moves: Vec<PlacementMove>,
    geometry_open: bool,
    geometry_updates: usize,
}

impl RecordingEngine {
    /// Empty engine with geometry closed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty engine whose solids accept rotations within `eps` of proper.
    pub fn with_rotation_tolerance(eps: f64) -> Self {
        Self {
            factory: DescriptorFactory::with_rotation_tolerance(eps),
            ..Self::default()
        }
    }

    /// Placements in creation order.
    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }

    /// Placement by name.
    pub fn placement(&self, name: &str) -> Option<&Placement> {
        self.index.get(name).map(|&i| &self.placements[i])
    }

    /// How many times a solid named `name` was built.
    pub fn solid_builds(&self, name: &str) -> usize {
        self.solid_builds.get(name).copied().unwrap_or(0)
    }

    /// Total number of solids built.
    pub fn total_solids(&self) -> usize {
        self.factory.built()
    }

    /// `(volume, voxel count)` per voxel fill, in order.
    pub fn voxel_fills(&self) -> &[(String, usize)] {
        &self.voxel_fills
    }

    /// Every move, in order.
    pub fn moves(&self) -> &[PlacementMove] {
        &self.moves
    }

    /// True between `open_geometry` and `close_geometry`.
    pub fn is_geometry_open(&self) -> bool {
        self.geometry_open
    }

    /// Number of completed open/close cycles.
    pub fn geometry_updates(&self) -> usize {
        self.geometry_updates
    }

    fn refuse(name: &str, reason: impl Into<String>) -> SceneError {
        SceneError::Engine {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

impl SolidFactory for RecordingEngine {
    fn primitive(&mut self, name: &str, shape: &Shape) -> std::result::Result<SolidHandle, SolidError> {
        let solid = self.factory.primitive(name, shape)?;
        *self.solid_builds.entry(name.to_string()).or_default() += 1;
        Ok(solid)
    }

    fn boolean(
        &mut self,
        name: &str,
        op: BooleanOp,
        left: &SolidHandle,
        right: &SolidHandle,
        transform: &Transform,
    ) -> std::result::Result<SolidHandle, SolidError> {
        let solid = self.factory.boolean(name, op, left, right, transform)?;
        *self.solid_builds.entry(name.to_string()).or_default() += 1;
        Ok(solid)
    }
}

impl GeometryEngine for RecordingEngine {
    fn place(&mut self, placement: &Placement) -> Result<()> {
        if self.index.contains_key(&placement.name) {
            return Err(Self::refuse(&placement.name, "placement already exists"));
        }
        if let Some(mother) = &placement.mother {
            if !self.placements.iter().any(|p| &p.volume == mother) {
                return Err(Self::refuse(
                    &placement.name,
                    format!("mother `{mother}` has not been placed"),
                ));
            }
        }
        self.index.insert(placement.name.clone(), self.placements.len());
        self.placements.push(placement.clone());
        Ok(())
    }

    fn fill_voxels(&mut self, volume: &str, labels: &LabelField) -> Result<()> {
        self.voxel_fills.push((volume.to_string(), labels.labels.len()));
        Ok(())
    }

    fn open_geometry(&mut self) -> Result<()> {
        if self.geometry_open {
            return Err(Self::refuse("geometry", "already open"));
        }
        self.geometry_open = true;
        Ok(())
    }

    fn close_geometry(&mut self) -> Result<()> {
        if !self.geometry_open {
            return Err(Self::refuse("geometry", "not open"));
        }
        self.geometry_open = false;
        self.geometry_updates += 1;
        Ok(())
    }

    fn move_placement(&mut self, name: &str, transform: &Transform) -> Result<()> {
        if !self.geometry_open {
            return Err(Self::refuse(name, "geometry is closed"));
        }
        let i = *self
            .index
            .get(name)
            .ok_or_else(|| Self::refuse(name, "no such placement"))?;
        self.placements[i].transform = *transform;
        self.moves.push(PlacementMove {
            name: name.to_string(),
            transform: *transform,
        });
        Ok(())
    }
}
