//! Dynamic schedules: validation and application at run boundaries.

use tracing::{debug, info, instrument};

use crate::dynamic::{ScheduleAction, ScheduleTarget};
use crate::engine::GeometryEngine;
use crate::error::{Result, SceneError};
use crate::tree::SceneTree;
use crate::volume::VolumeId;

impl SceneTree {
    /// Check every dynamic schedule against the configured run intervals.
    ///
    /// Must succeed before [`SceneTree::apply_run`] is used. Any edit through
    /// [`SceneTree::node_mut`] requires validating again.
    #[instrument(skip(self))]
    pub fn validate_dynamics(&mut self) -> Result<()> {
        self.ensure_built()?;
        let runs = self.settings.run_count();
        let eps = self.settings.rotation_tolerance;
        let mut scheduled = 0;
        for &id in &self.construction_order {
            let node = &self.nodes[id];
            for schedule in node.schedules() {
                scheduled += 1;
                if schedule.len() != runs {
                    return Err(SceneError::ScheduleLengthMismatch {
                        volume: node.name().to_string(),
                        expected: runs,
                        actual: schedule.len(),
                    });
                }
                match schedule.target {
                    ScheduleTarget::Volume => {
                        if schedule.action.is_motion() && node.repetition_count() > 1 {
                            return Err(SceneError::AmbiguousSchedule {
                                volume: node.name().to_string(),
                                repetitions: node.repetition_count(),
                            });
                        }
                    }
                    ScheduleTarget::Repetition(index) => node.check_repetition(index)?,
                }
                match &schedule.action {
                    ScheduleAction::Transforms(list) => {
                        for (run, t) in list.iter().enumerate() {
                            t.validate(eps).map_err(|source| SceneError::InvalidRotation {
                                volume: node.name().to_string(),
                                index: run,
                                source,
                            })?;
                            if t.translation.iter().any(|v| !v.is_finite()) {
                                return Err(SceneError::NonFiniteTranslation {
                                    volume: node.name().to_string(),
                                    run,
                                });
                            }
                        }
                    }
                    ScheduleAction::Rotations(list) => {
                        for (run, r) in list.iter().enumerate() {
                            volscene_math::check_rotation(r, eps).map_err(|source| {
                                SceneError::InvalidRotation {
                                    volume: node.name().to_string(),
                                    index: run,
                                    source,
                                }
                            })?;
                        }
                    }
                    ScheduleAction::Translations(list) => {
                        if let Some(run) = list.iter().position(|t| t.iter().any(|v| !v.is_finite())) {
                            return Err(SceneError::NonFiniteTranslation {
                                volume: node.name().to_string(),
                                run,
                            });
                        }
                    }
                    ScheduleAction::VoxelFields(fields) => {
                        let voxels = node
                            .voxels()
                            .ok_or_else(|| SceneError::NotVoxelized(node.name().to_string()))?;
                        if let Some(run) = fields.iter().position(|f| !f.same_grid(voxels.field())) {
                            return Err(SceneError::InvalidField(format!(
                                "volume `{}`: field for run {run} is not on the volume's grid",
                                node.name()
                            )));
                        }
                    }
                }
            }
        }
        self.dynamics_validated = true;
        info!(runs, schedules = scheduled, "dynamic schedules validated");
        Ok(())
    }

    /// Validate schedules if any are attached and no check has passed since
    /// the last edit.
    pub(crate) fn ensure_dynamics_validated(&mut self) -> Result<()> {
        if self.dynamics_validated() || self.nodes.values().all(|n| n.schedules().is_empty()) {
            return Ok(());
        }
        self.validate_dynamics()
    }

    /// True once [`SceneTree::validate_dynamics`] succeeded and nothing changed since.
    pub fn dynamics_validated(&self) -> bool {
        self.dynamics_validated && !self.is_dirty()
    }

    /// Last run applied, if any.
    pub fn current_run(&self) -> Option<usize> {
        self.current_run
    }

    /// Apply every schedule's entry for `run`.
    ///
    /// Geometry is opened, every scheduled placement is moved (or its voxel
    /// field swapped) and geometry is closed again. Volumes not yet
    /// constructed only have their transforms updated. Applying the same
    /// run twice in a row does nothing the second time.
    ///
    /// Returns the names of the placements and voxel volumes that changed.
    #[instrument(skip(self, engine))]
    pub fn apply_run<E>(&mut self, run: usize, engine: &mut E) -> Result<Vec<String>>
    where
        E: GeometryEngine + ?Sized,
    {
        if !self.dynamics_validated() {
            return Err(SceneError::DynamicsNotValidated);
        }
        let runs = self.settings.run_count();
        if run >= runs {
            return Err(SceneError::RunOutOfRange { run, runs });
        }
        if self.current_run == Some(run) {
            debug!(run, "run already applied");
            return Ok(Vec::new());
        }

        engine.open_geometry()?;
        let changed = self.dispatch_run(run, engine);
        let closed = engine.close_geometry();
        let changed = changed?;
        closed?;

        self.current_run = Some(run);
        let [start, end] = self.settings.run_intervals[run];
        info!(run, start, end, changed = changed.len(), "run boundary applied");
        Ok(changed)
    }

    fn dispatch_run<E>(&mut self, run: usize, engine: &mut E) -> Result<Vec<String>>
    where
        E: GeometryEngine + ?Sized,
    {
        let mut changed = Vec::new();
        let ids: Vec<VolumeId> = self
            .construction_order
            .iter()
            .copied()
            .filter(|&id| !self.nodes[id].schedules.is_empty())
            .collect();
        for id in ids {
            for k in 0..self.nodes[id].schedules.len() {
                let node = &mut self.nodes[id];
                let live = node.constructed && node.build_physical_volume();
                let schedule = &node.schedules[k];
                if schedule.action.is_motion() {
                    let rep = schedule.repetition();
                    let current = node.transforms()[rep];
                    let Some(next) = schedule.transform_at(run, &current) else {
                        continue;
                    };
                    node.transforms_mut()[rep] = next;
                    let name = node.placement_name(rep);
                    if live {
                        engine.move_placement(&name, &next)?;
                    }
                    debug!(placement = %name, run, "moved");
                    changed.push(name);
                } else {
                    let Some(field) = schedule.field_at(run).cloned() else {
                        continue;
                    };
                    let name = node.name().to_string();
                    let voxels = node
                        .voxels_mut()
                        .ok_or_else(|| SceneError::NotVoxelized(name.clone()))?;
                    voxels.set_field(field);
                    if live {
                        engine.fill_voxels(&name, voxels.labels()?)?;
                    }
                    debug!(volume = %name, run, "voxel field swapped");
                    changed.push(name);
                }
            }
        }
        Ok(changed)
    }
}
