//! Volume nodes: named placements of a shape under a mother volume.

use tracing::warn;
use volscene_math::{Rotation, Transform, Vec3};
use volscene_solids::{Shape, SolidHandle};

use crate::config::{BroadcastPolicy, WorldSettings};
use crate::csg::CsgNode;
use crate::dynamic::DynamicSchedule;
use crate::error::{Result, SceneError};
use crate::repeat::{self, Repeater};
use crate::voxel::VoxelizedVolume;

slotmap::new_key_type! {
    /// Arena key of a volume inside a [`SceneTree`](crate::SceneTree).
    pub struct VolumeId;
}

/// What a volume is made of.
#[derive(Debug, Clone)]
pub enum ShapeKind {
    /// A primitive solid.
    Primitive(Shape),
    /// Boolean combination of two other volumes.
    Boolean(CsgNode),
    /// Voxel grid labeled from a scalar field.
    Voxelized(VoxelizedVolume),
}

impl ShapeKind {
    /// Boolean operands, if any.
    pub fn operands(&self) -> Option<[&str; 2]> {
        match self {
            ShapeKind::Boolean(csg) => Some(csg.operands()),
            _ => None,
        }
    }

    /// Short name for logs and the rendered tree.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ShapeKind::Primitive(shape) => shape.kind_name(),
            ShapeKind::Boolean(_) => "Boolean",
            ShapeKind::Voxelized(_) => "Voxelized",
        }
    }
}

impl From<Shape> for ShapeKind {
    fn from(shape: Shape) -> Self {
        ShapeKind::Primitive(shape)
    }
}

impl From<CsgNode> for ShapeKind {
    fn from(csg: CsgNode) -> Self {
        ShapeKind::Boolean(csg)
    }
}

impl From<VoxelizedVolume> for ShapeKind {
    fn from(voxels: VoxelizedVolume) -> Self {
        ShapeKind::Voxelized(voxels)
    }
}

/// Construction state of a volume's solid.
#[derive(Debug, Clone, Default)]
pub enum SolidState {
    /// Not built yet, or released.
    #[default]
    Unbuilt,
    /// Build in progress; seeing this again means a cycle.
    Building,
    /// Built and cached.
    Built(SolidHandle),
}

impl SolidState {
    /// Cached solid, if built.
    pub fn handle(&self) -> Option<&SolidHandle> {
        match self {
            SolidState::Built(handle) => Some(handle),
            _ => None,
        }
    }
}

/// A named volume: shape, material, mother and one transform per repetition.
#[derive(Debug, Clone)]
pub struct VolumeNode {
    name: String,
    shape: ShapeKind,
    material: String,
    mother: Option<String>,
    transforms: Vec<Transform>,
    color: [f64; 4],
    visible: bool,
    build_physical_volume: bool,
    pub(crate) schedules: Vec<DynamicSchedule>,
    pub(crate) state: SolidState,
    pub(crate) constructed: bool,
    pub(crate) parent: Option<VolumeId>,
}

impl VolumeNode {
    /// New volume placed once, at the origin of the world.
    pub fn new(name: impl Into<String>, shape: impl Into<ShapeKind>, material: impl Into<String>) -> Self {
        let material = material.into();
        let mut shape = shape.into();
        if let ShapeKind::Voxelized(voxels) = &mut shape {
            voxels.set_default_material(material.clone());
        }
        Self {
            name: name.into(),
            shape,
            material,
            mother: None,
            transforms: vec![Transform::identity()],
            color: [1.0, 1.0, 1.0, 1.0],
            visible: true,
            build_physical_volume: true,
            schedules: Vec::new(),
            state: SolidState::Unbuilt,
            constructed: false,
            parent: None,
        }
    }

    pub(crate) fn world(settings: &WorldSettings) -> Self {
        let [x, y, z] = settings.size;
        let mut node = Self::new(
            settings.name.clone(),
            Shape::cuboid(x, y, z),
            settings.material.clone(),
        );
        node.visible = false;
        node
    }

    /// Place inside `mother` instead of the world.
    pub fn with_mother(mut self, mother: impl Into<String>) -> Self {
        self.mother = Some(mother.into());
        self
    }

    /// Single placement at `transform`.
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transforms = vec![transform];
        self
    }

    /// RGBA display color.
    pub fn with_color(mut self, color: [f64; 4]) -> Self {
        self.color = color;
        self
    }

    /// Display visibility.
    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    /// Use the volume only as a boolean operand: its solid is built but it
    /// gets no physical placement.
    pub fn building_block(mut self) -> Self {
        self.build_physical_volume = false;
        self
    }

    /// Unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shape description.
    pub fn shape(&self) -> &ShapeKind {
        &self.shape
    }

    /// Replace the shape; the cached solid is dropped.
    pub fn set_shape(&mut self, shape: impl Into<ShapeKind>) {
        self.shape = shape.into();
        if let ShapeKind::Voxelized(voxels) = &mut self.shape {
            voxels.set_default_material(self.material.clone());
        }
        self.state = SolidState::Unbuilt;
        self.constructed = false;
    }

    /// Voxel data, for voxelized volumes.
    pub fn voxels(&self) -> Option<&VoxelizedVolume> {
        match &self.shape {
            ShapeKind::Voxelized(voxels) => Some(voxels),
            _ => None,
        }
    }

    /// Mutable voxel data, for voxelized volumes.
    pub fn voxels_mut(&mut self) -> Option<&mut VoxelizedVolume> {
        match &mut self.shape {
            ShapeKind::Voxelized(voxels) => Some(voxels),
            _ => None,
        }
    }

    /// Opaque material name.
    pub fn material(&self) -> &str {
        &self.material
    }

    /// Change the material; voxelized volumes use it as their label 0.
    pub fn set_material(&mut self, material: impl Into<String>) {
        self.material = material.into();
        if let ShapeKind::Voxelized(voxels) = &mut self.shape {
            voxels.set_default_material(self.material.clone());
        }
    }

    /// Requested mother; `None` places the volume in the world.
    pub fn mother(&self) -> Option<&str> {
        self.mother.as_deref()
    }

    pub(crate) fn set_mother(&mut self, mother: Option<String>) {
        self.mother = mother;
    }

    /// One transform per repetition, relative to the mother.
    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    pub(crate) fn transforms_mut(&mut self) -> &mut [Transform] {
        &mut self.transforms
    }

    /// Number of repetitions.
    pub fn repetition_count(&self) -> usize {
        self.transforms.len()
    }

    /// Set one placement per transform.
    ///
    /// The list must be non-empty. Rotations are checked by
    /// [`SceneTree::build_tree`](crate::SceneTree::build_tree) against the
    /// scene's rotation tolerance.
    pub fn set_transforms(&mut self, transforms: Vec<Transform>) -> Result<()> {
        if transforms.is_empty() {
            return Err(SceneError::EmptyTransforms(self.name.clone()));
        }
        self.transforms = transforms;
        Ok(())
    }

    /// Pair separate rotation and translation lists into transforms.
    ///
    /// An empty list means identity rotations or zero translations. Lists of
    /// different lengths are an error, except that under
    /// [`BroadcastPolicy::Allow`] a length-1 list is repeated to match its
    /// partner.
    pub fn set_rotations_translations(
        &mut self,
        rotations: &[Rotation],
        translations: &[Vec3],
        policy: BroadcastPolicy,
    ) -> Result<()> {
        let mismatch = || SceneError::TransformLengthMismatch {
            volume: self.name.clone(),
            rotations: rotations.len(),
            translations: translations.len(),
        };
        let count = match (rotations.len(), translations.len()) {
            (0, 0) => 1,
            (0, n) | (n, 0) => n,
            (a, b) if a == b => a,
            (1, n) | (n, 1) => {
                if policy == BroadcastPolicy::Deny {
                    return Err(mismatch());
                }
                warn!(
                    volume = %self.name,
                    rotations = rotations.len(),
                    translations = translations.len(),
                    "broadcasting single-entry list to {n} repetitions"
                );
                n
            }
            _ => return Err(mismatch()),
        };
        let pick = |len: usize, i: usize| if len == 1 { 0 } else { i };
        let transforms = (0..count)
            .map(|i| Transform {
                rotation: rotations
                    .get(pick(rotations.len(), i))
                    .copied()
                    .unwrap_or_else(Rotation::identity),
                translation: translations
                    .get(pick(translations.len(), i))
                    .copied()
                    .unwrap_or_else(Vec3::zeros),
            })
            .collect();
        self.set_transforms(transforms)
    }

    /// Replace the transform list with the expansion of `repeater`.
    pub fn set_repeater(&mut self, repeater: &Repeater) -> Result<()> {
        let transforms = repeater.expand()?;
        self.set_transforms(transforms)
    }

    /// Name of repetition `index`.
    pub fn repetition_name(&self, index: usize) -> Result<String> {
        self.check_repetition(index)?;
        Ok(repeat::repetition_name(&self.name, index))
    }

    /// Names of every repetition, in copy-index order.
    pub fn repetition_names(&self) -> Vec<String> {
        (0..self.transforms.len())
            .map(|i| repeat::repetition_name(&self.name, i))
            .collect()
    }

    /// Name of the physical placement of repetition `index`: the volume name
    /// when it is placed once, the repetition name otherwise.
    pub fn placement_name(&self, index: usize) -> String {
        if self.transforms.len() == 1 {
            self.name.clone()
        } else {
            repeat::repetition_name(&self.name, index)
        }
    }

    /// Index of the repetition called `name`, which must belong to this volume.
    pub fn repetition_index(&self, name: &str) -> Result<usize> {
        let (volume, index) = repeat::parse_repetition_name(name)?;
        if volume != self.name {
            return Err(SceneError::ForeignRepetition {
                name: name.to_string(),
                volume: self.name.clone(),
            });
        }
        self.check_repetition(index)?;
        Ok(index)
    }

    pub(crate) fn check_repetition(&self, index: usize) -> Result<()> {
        if index >= self.transforms.len() {
            return Err(SceneError::RepetitionOutOfRange {
                volume: self.name.clone(),
                index,
                count: self.transforms.len(),
            });
        }
        Ok(())
    }

    /// RGBA display color.
    pub fn color(&self) -> [f64; 4] {
        self.color
    }

    /// Display visibility.
    pub fn visible(&self) -> bool {
        self.visible
    }

    /// Whether construction creates physical placements.
    pub fn build_physical_volume(&self) -> bool {
        self.build_physical_volume
    }

    /// Toggle physical placement.
    pub fn set_build_physical_volume(&mut self, build: bool) {
        self.build_physical_volume = build;
    }

    /// Attached dynamic schedules.
    pub fn schedules(&self) -> &[DynamicSchedule] {
        &self.schedules
    }

    /// Attach a schedule; it is checked by
    /// [`SceneTree::validate_dynamics`](crate::SceneTree::validate_dynamics).
    pub fn add_schedule(&mut self, schedule: DynamicSchedule) {
        self.schedules.push(schedule);
    }

    /// Drop every schedule.
    pub fn clear_schedules(&mut self) {
        self.schedules.clear();
    }

    /// Construction state of the solid.
    pub fn state(&self) -> &SolidState {
        &self.state
    }

    /// Cached solid, if built.
    pub fn solid(&self) -> Option<&SolidHandle> {
        self.state.handle()
    }

    /// True once placements were handed to the engine.
    pub fn is_constructed(&self) -> bool {
        self.constructed
    }

    pub(crate) fn release(&mut self) {
        self.state = SolidState::Unbuilt;
        self.constructed = false;
    }
}
