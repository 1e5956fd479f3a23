//! Per-run schedules for time-varying geometry.

use volscene_math::{Rotation, Transform, Vec3};

use crate::voxel::ScalarField;

/// Which placement a schedule moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleTarget {
    /// The volume as a whole; only valid for single-instance volumes.
    Volume,
    /// One repetition of the volume.
    Repetition(usize),
}

/// What changes at each run boundary, one entry per run.
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleAction {
    /// Replace the whole transform.
    Transforms(Vec<Transform>),
    /// Replace the translation, keep the rotation.
    Translations(Vec<Vec3>),
    /// Replace the rotation, keep the translation.
    Rotations(Vec<Rotation>),
    /// Swap the scalar field of a voxelized volume.
    VoxelFields(Vec<ScalarField>),
}

impl ScheduleAction {
    /// Number of entries.
    pub fn len(&self) -> usize {
        match self {
            ScheduleAction::Transforms(v) => v.len(),
            ScheduleAction::Translations(v) => v.len(),
            ScheduleAction::Rotations(v) => v.len(),
            ScheduleAction::VoxelFields(v) => v.len(),
        }
    }

    /// True if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short name for logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ScheduleAction::Transforms(_) => "transforms",
            ScheduleAction::Translations(_) => "translations",
            ScheduleAction::Rotations(_) => "rotations",
            ScheduleAction::VoxelFields(_) => "voxel_fields",
        }
    }

    /// True if the action moves a placement.
    pub fn is_motion(&self) -> bool {
        !matches!(self, ScheduleAction::VoxelFields(_))
    }
}

/// Ordered per-run changes applied to a volume or one of its repetitions.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicSchedule {
    /// Placement being changed.
    pub target: ScheduleTarget,
    /// Change per run.
    pub action: ScheduleAction,
}

impl DynamicSchedule {
    /// Schedule for the whole volume.
    pub fn whole_volume(action: ScheduleAction) -> Self {
        Self {
            target: ScheduleTarget::Volume,
            action,
        }
    }

    /// Schedule for repetition `index`.
    pub fn for_repetition(index: usize, action: ScheduleAction) -> Self {
        Self {
            target: ScheduleTarget::Repetition(index),
            action,
        }
    }

    /// Number of runs covered.
    pub fn len(&self) -> usize {
        self.action.len()
    }

    /// True if the schedule has no entries.
    pub fn is_empty(&self) -> bool {
        self.action.is_empty()
    }

    /// Repetition index moved by this schedule; whole-volume schedules move
    /// instance 0.
    pub fn repetition(&self) -> usize {
        match self.target {
            ScheduleTarget::Volume => 0,
            ScheduleTarget::Repetition(i) => i,
        }
    }

    /// Placement for `run`, given the instance's `current` transform.
    ///
    /// `None` for voxel field schedules or a run past the end.
    pub fn transform_at(&self, run: usize, current: &Transform) -> Option<Transform> {
        match &self.action {
            ScheduleAction::Transforms(list) => list.get(run).copied(),
            ScheduleAction::Translations(list) => list.get(run).map(|t| current.with_translation(*t)),
            ScheduleAction::Rotations(list) => list.get(run).map(|r| Transform {
                rotation: *r,
                translation: current.translation,
            }),
            ScheduleAction::VoxelFields(_) => None,
        }
    }

    /// Field for `run`, for voxel field schedules.
    pub fn field_at(&self, run: usize) -> Option<&ScalarField> {
        match &self.action {
            ScheduleAction::VoxelFields(list) => list.get(run),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translations_keep_rotation() {
        let current = Transform::rotation_z(0.5).with_translation(Vec3::new(1.0, 1.0, 1.0));
        let s = DynamicSchedule::whole_volume(ScheduleAction::Translations(vec![
            Vec3::zeros(),
            Vec3::new(0.0, 0.0, 9.0),
        ]));
        let t = s.transform_at(1, &current).unwrap();
        assert_eq!(t.rotation, current.rotation);
        assert_eq!(t.translation, Vec3::new(0.0, 0.0, 9.0));
        assert!(s.transform_at(2, &current).is_none());
    }

    #[test]
    fn rotations_keep_translation() {
        let current = Transform::translation(4.0, 0.0, 0.0);
        let r = Transform::rotation_x(1.0).rotation;
        let s = DynamicSchedule::for_repetition(3, ScheduleAction::Rotations(vec![r]));
        let t = s.transform_at(0, &current).unwrap();
        assert_eq!(t.rotation, r);
        assert_eq!(t.translation, current.translation);
        assert_eq!(s.repetition(), 3);
    }

    #[test]
    fn field_schedules_do_not_move() {
        let field = ScalarField::new([1, 1, 1], [1.0; 3], [0.0; 3], vec![1.0]).unwrap();
        let s = DynamicSchedule::whole_volume(ScheduleAction::VoxelFields(vec![field.clone()]));
        assert!(!s.action.is_motion());
        assert!(s.transform_at(0, &Transform::identity()).is_none());
        assert_eq!(s.field_at(0), Some(&field));
        assert_eq!(s.action.kind_name(), "voxel_fields");
    }
}
