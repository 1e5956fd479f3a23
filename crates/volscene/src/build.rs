//! Lazy solid construction and placement.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use volscene_solids::{SolidError, SolidFactory, SolidHandle, SolidKind};

use crate::engine::{GeometryEngine, Placement};
use crate::error::{Result, SceneError};
use crate::tree::SceneTree;
use crate::volume::{ShapeKind, SolidState, VolumeId};
use crate::voxel::write_label_outputs;

/// A label output that could not be written. Never fatal.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistenceFailure {
    /// Voxelized volume.
    pub volume: String,
    /// Error message.
    pub error: String,
}

/// What a construction pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstructionReport {
    /// Solids built during this pass.
    pub solids_built: usize,
    /// Physical placements created.
    pub placements: usize,
    /// Voxelized volumes filled.
    pub voxel_volumes: usize,
    /// Label outputs that failed to persist.
    pub persistence_failures: Vec<PersistenceFailure>,
}

impl SceneTree {
    /// Solid of `name`, built on first request and cached afterwards.
    ///
    /// Boolean operands are built first, recursively. A second request
    /// returns the same handle without calling `factory`, unless an operand
    /// was rebuilt since (at any depth), in which case the boolean is rebuilt
    /// on top of the current operands. Reaching a volume whose build is
    /// still in progress means the boolean operands loop, which is fatal.
    pub fn build_solid<F>(&mut self, name: &str, factory: &mut F) -> Result<SolidHandle>
    where
        F: SolidFactory + ?Sized,
    {
        let id = self.id(name)?;
        let mut path = Vec::new();
        self.build_solid_at(id, factory, &mut path)
    }

    fn build_solid_at<F>(&mut self, id: VolumeId, factory: &mut F, path: &mut Vec<String>) -> Result<SolidHandle>
    where
        F: SolidFactory + ?Sized,
    {
        let name = self.nodes[id].name().to_string();
        match &self.nodes[id].state {
            SolidState::Built(handle) => {
                let handle = handle.clone();
                if self.operands_current(id, &handle, factory, path)? {
                    return Ok(handle);
                }
                debug!(volume = %name, "boolean operand changed since build");
                self.nodes[id].state = SolidState::Unbuilt;
            }
            SolidState::Building => {
                let from = path.iter().position(|p| *p == name).unwrap_or(0);
                let mut cycle = path[from..].to_vec();
                cycle.push(name);
                return Err(SceneError::CsgCycle { path: cycle });
            }
            SolidState::Unbuilt => {}
        }

        self.nodes[id].state = SolidState::Building;
        path.push(name.clone());
        let built = self.make_solid(id, &name, factory, path);
        path.pop();

        match built {
            Ok(handle) => {
                debug!(volume = %name, kind = self.nodes[id].shape().kind_name(), "solid built");
                self.nodes[id].state = SolidState::Built(handle.clone());
                Ok(handle)
            }
            Err(err) => {
                self.nodes[id].state = SolidState::Unbuilt;
                Err(err)
            }
        }
    }

    fn make_solid<F>(&mut self, id: VolumeId, name: &str, factory: &mut F, path: &mut Vec<String>) -> Result<SolidHandle>
    where
        F: SolidFactory + ?Sized,
    {
        let solid_error = |source: SolidError| SceneError::Solid {
            volume: name.to_string(),
            source,
        };
        match self.nodes[id].shape() {
            ShapeKind::Primitive(shape) => factory.primitive(name, shape).map_err(solid_error),
            ShapeKind::Voxelized(voxels) => factory
                .primitive(name, &voxels.container_shape())
                .map_err(solid_error),
            ShapeKind::Boolean(csg) => {
                let csg = csg.clone();
                let left = self.operand_solid(name, &csg.left, factory, path)?;
                let right = self.operand_solid(name, &csg.right, factory, path)?;
                factory
                    .boolean(name, csg.op, &left, &right, &csg.transform)
                    .map_err(solid_error)
            }
        }
    }

    fn operand_solid<F>(&mut self, volume: &str, operand: &str, factory: &mut F, path: &mut Vec<String>) -> Result<SolidHandle>
    where
        F: SolidFactory + ?Sized,
    {
        let operand_id = self.id(operand).map_err(|_| SceneError::UnknownOperand {
            volume: volume.to_string(),
            operand: operand.to_string(),
        })?;
        self.build_solid_at(operand_id, factory, path)
    }

    /// Whether a cached boolean still sits on the operands' current solids.
    ///
    /// Refreshes the operands first, so a change deep in the operand graph
    /// surfaces here as a new handle.
    fn operands_current<F>(&mut self, id: VolumeId, cached: &SolidHandle, factory: &mut F, path: &mut Vec<String>) -> Result<bool>
    where
        F: SolidFactory + ?Sized,
    {
        let (SolidKind::Boolean { left, right, .. }, ShapeKind::Boolean(csg)) =
            (cached.kind(), self.nodes[id].shape())
        else {
            return Ok(true);
        };
        let csg = csg.clone();
        let name = self.nodes[id].name().to_string();
        path.push(name.clone());
        let current = self
            .operand_solid(&name, &csg.left, factory, path)
            .and_then(|l| Ok((l, self.operand_solid(&name, &csg.right, factory, path)?)));
        path.pop();
        let (current_left, current_right) = current?;
        Ok(Arc::ptr_eq(left, &current_left) && Arc::ptr_eq(right, &current_right))
    }

    /// Build and place `name`, constructing its mother chain first.
    ///
    /// Idempotent: a constructed volume is left alone. Attached dynamic
    /// schedules are validated first, so a bad schedule places nothing.
    pub fn construct<E>(&mut self, name: &str, engine: &mut E) -> Result<ConstructionReport>
    where
        E: GeometryEngine + ?Sized,
    {
        self.ensure_built()?;
        self.ensure_dynamics_validated()?;
        let id = self.id(name)?;
        let mut report = ConstructionReport::default();
        let built_before = self.built_count();
        self.construct_with_mothers(id, engine, &mut report)?;
        report.solids_built = self.built_count() - built_before;
        Ok(report)
    }

    /// Construct every volume in dependency order.
    ///
    /// Attached dynamic schedules are validated before the first placement.
    #[instrument(skip_all)]
    pub fn construct_all<E>(&mut self, engine: &mut E) -> Result<ConstructionReport>
    where
        E: GeometryEngine + ?Sized,
    {
        self.ensure_built()?;
        self.ensure_dynamics_validated()?;
        let mut report = ConstructionReport::default();
        let built_before = self.built_count();
        for id in self.construction_order.clone() {
            self.construct_with_mothers(id, engine, &mut report)?;
        }
        report.solids_built = self.built_count() - built_before;
        info!(
            solids = report.solids_built,
            placements = report.placements,
            voxel_volumes = report.voxel_volumes,
            persistence_failures = report.persistence_failures.len(),
            "scene constructed"
        );
        Ok(report)
    }

    /// Drop every cached solid and placement flag.
    ///
    /// The next construction starts from scratch; dynamic runs restart too.
    pub fn release_solids(&mut self) {
        for node in self.nodes.values_mut() {
            node.release();
        }
        self.current_run = None;
        debug!("solids released");
    }

    fn built_count(&self) -> usize {
        self.nodes
            .values()
            .filter(|node| matches!(node.state, SolidState::Built(_)))
            .count()
    }

    fn construct_with_mothers<E>(&mut self, id: VolumeId, engine: &mut E, report: &mut ConstructionReport) -> Result<()>
    where
        E: GeometryEngine + ?Sized,
    {
        let mut chain: Vec<VolumeId> = std::iter::once(id)
            .chain(self.ancestor_ids(id))
            .take_while(|&a| !self.nodes[a].constructed)
            .collect();
        chain.reverse();
        for link in chain {
            self.construct_one(link, engine, report)?;
        }
        Ok(())
    }

    fn construct_one<E>(&mut self, id: VolumeId, engine: &mut E, report: &mut ConstructionReport) -> Result<()>
    where
        E: GeometryEngine + ?Sized,
    {
        if self.nodes[id].constructed {
            return Ok(());
        }
        let name = self.nodes[id].name().to_string();
        let solid = self.build_solid_at(id, engine, &mut Vec::new())?;

        if self.nodes[id].build_physical_volume() {
            let mother = self.nodes[id].parent.map(|p| self.nodes[p].name().to_string());
            if let Some(parent) = self.nodes[id].parent {
                if !self.nodes[parent].build_physical_volume() {
                    return Err(SceneError::MotherNotPlaced {
                        volume: name,
                        mother: self.nodes[parent].name().to_string(),
                    });
                }
            }
            let node = &self.nodes[id];
            for (copy_index, transform) in node.transforms().iter().enumerate() {
                let placement = Placement {
                    volume: name.clone(),
                    name: node.placement_name(copy_index),
                    mother: mother.clone(),
                    copy_index,
                    transform: *transform,
                    material: node.material().to_string(),
                    solid: solid.clone(),
                };
                engine.place(&placement)?;
                report.placements += 1;
            }
            debug!(volume = %name, copies = node.repetition_count(), "placed");
            self.fill_voxels(id, engine, report)?;
        }

        self.nodes[id].constructed = true;
        Ok(())
    }

    fn fill_voxels<E>(&mut self, id: VolumeId, engine: &mut E, report: &mut ConstructionReport) -> Result<()>
    where
        E: GeometryEngine + ?Sized,
    {
        let output_dir = self.settings.label_output_dir.clone();
        let node = &mut self.nodes[id];
        let name = node.name().to_string();
        let Some(voxels) = node.voxels_mut() else {
            return Ok(());
        };
        let labels = voxels.labels()?;
        engine.fill_voxels(&name, labels)?;
        report.voxel_volumes += 1;
        if let Some(dir) = output_dir {
            match write_label_outputs(labels, &dir, &name) {
                Ok(paths) => debug!(volume = %name, files = paths.len(), "label outputs written"),
                Err(err) => {
                    warn!(volume = %name, error = %err, "could not persist label outputs");
                    report.persistence_failures.push(PersistenceFailure {
                        volume: name.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SceneSettings;
    use crate::csg::CsgNode;
    use crate::engine::RecordingEngine;
    use crate::voxel::{MaterialInterval, ScalarField, VoxelizedVolume};
    use crate::VolumeNode;
    use approx::assert_abs_diff_eq;
    use std::sync::Arc;
    use volscene_math::{Transform, Vec3};
    use volscene_solids::{DescriptorFactory, Shape, SolidKind};

    fn tree() -> SceneTree {
        SceneTree::new(SceneSettings::default()).unwrap()
    }

    fn csg_scene() -> SceneTree {
        let mut t = tree();
        t.add(VolumeNode::new("outer", Shape::cylinder(50.0, 20.0), "G4_Pb").building_block())
            .unwrap();
        t.add(VolumeNode::new("inner", Shape::cylinder(40.0, 25.0), "G4_Pb").building_block())
            .unwrap();
        t.add(VolumeNode::new(
            "shell",
            CsgNode::subtract("outer", "inner").with_transform(Transform::translation(0.0, 0.0, 1.0)),
            "G4_Pb",
        ))
        .unwrap();
        t.add(VolumeNode::new("cap", Shape::ball(5.0), "G4_Pb").building_block())
            .unwrap();
        t.add(VolumeNode::new("capped", CsgNode::union("shell", "cap"), "G4_Pb"))
            .unwrap();
        t.build_tree().unwrap();
        t
    }

    #[test]
    fn boolean_build_is_memoized() {
        let mut t = csg_scene();
        let mut engine = RecordingEngine::new();
        let first = t.build_solid("capped", &mut engine).unwrap();
        let second = t.build_solid("capped", &mut engine).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        for name in ["outer", "inner", "shell", "cap", "capped"] {
            assert_eq!(engine.solid_builds(name), 1, "{name}");
        }
        match first.kind() {
            SolidKind::Boolean { left, .. } => {
                assert!(Arc::ptr_eq(left, t.node("shell").unwrap().solid().unwrap()));
            }
            other => panic!("expected boolean, got {other:?}"),
        }
    }

    #[test]
    fn reshaped_operand_rebuilds_dependent_booleans() {
        let mut t = csg_scene();
        let mut engine = RecordingEngine::new();
        let old_shell = t.build_solid("shell", &mut engine).unwrap();
        let old_capped = t.build_solid("capped", &mut engine).unwrap();
        assert_abs_diff_eq!(old_shell.bounds().max.z, 20.0);

        t.node_mut("outer").unwrap().set_shape(Shape::cuboid(100.0, 100.0, 100.0));

        let shell = t.build_solid("shell", &mut engine).unwrap();
        assert!(!Arc::ptr_eq(&shell, &old_shell));
        assert_abs_diff_eq!(shell.bounds().max.z, 50.0);
        match shell.kind() {
            SolidKind::Boolean { left, .. } => {
                assert!(Arc::ptr_eq(left, t.node("outer").unwrap().solid().unwrap()));
            }
            other => panic!("expected boolean, got {other:?}"),
        }

        let capped = t.build_solid("capped", &mut engine).unwrap();
        assert!(!Arc::ptr_eq(&capped, &old_capped));
        assert_abs_diff_eq!(capped.bounds().max.z, 50.0);
        assert_eq!(engine.solid_builds("outer"), 2);
        assert_eq!(engine.solid_builds("shell"), 2);
        assert_eq!(engine.solid_builds("capped"), 2);
        assert_eq!(engine.solid_builds("inner"), 1);
        assert_eq!(engine.solid_builds("cap"), 1);

        let again = t.build_solid("capped", &mut engine).unwrap();
        assert!(Arc::ptr_eq(&again, &capped));
        assert_eq!(engine.solid_builds("capped"), 2);
    }

    #[test]
    fn shared_operand_built_once() {
        let mut t = tree();
        t.add(VolumeNode::new("brick", Shape::cuboid(1.0, 1.0, 1.0), "G4_Fe").building_block())
            .unwrap();
        t.add(VolumeNode::new("pair", CsgNode::union("brick", "brick"), "G4_Fe"))
            .unwrap();
        let mut factory = DescriptorFactory::new();
        t.build_solid("pair", &mut factory).unwrap();
        assert_eq!(factory.built(), 2);
    }

    #[test]
    fn reentrant_build_is_a_cycle() {
        let mut t = tree();
        t.add(VolumeNode::new("loop", CsgNode::union("loop", "loop"), "G4_AIR"))
            .unwrap();
        // bypass build_tree so the solid builder meets the loop itself
        let mut factory = DescriptorFactory::new();
        match t.build_solid("loop", &mut factory) {
            Err(SceneError::CsgCycle { path }) => assert_eq!(path, vec!["loop", "loop"]),
            other => panic!("expected CsgCycle, got {other:?}"),
        }
        assert!(matches!(t.node("loop").unwrap().state(), SolidState::Unbuilt));
    }

    #[test]
    fn failed_build_resets_state() {
        let mut t = tree();
        t.add(VolumeNode::new("bad", Shape::cuboid(-1.0, 1.0, 1.0), "G4_AIR").building_block())
            .unwrap();
        t.add(VolumeNode::new("u", CsgNode::union("bad", "bad"), "G4_AIR")).unwrap();
        let mut factory = DescriptorFactory::new();
        assert!(matches!(
            t.build_solid("u", &mut factory),
            Err(SceneError::Solid { volume, .. }) if volume == "bad"
        ));
        assert!(matches!(t.node("u").unwrap().state(), SolidState::Unbuilt));
        assert!(matches!(t.node("bad").unwrap().state(), SolidState::Unbuilt));
    }

    #[test]
    fn construct_places_every_repetition() {
        let mut t = tree();
        t.add(VolumeNode::new("module", Shape::cuboid(100.0, 100.0, 10.0), "G4_AIR"))
            .unwrap();
        t.add(VolumeNode::new("crystal", Shape::cuboid(4.0, 4.0, 10.0), "LYSO").with_mother("module"))
            .unwrap();
        t.node_mut("crystal")
            .unwrap()
            .set_repeater(&crate::Repeater::grid([2, 2, 1], Vec3::new(5.0, 5.0, 0.0)))
            .unwrap();

        let mut engine = RecordingEngine::new();
        let report = t.construct("crystal", &mut engine).unwrap();
        // world and module are placed first
        assert_eq!(report.placements, 1 + 1 + 4);
        assert_eq!(report.solids_built, 3);
        let names: Vec<&str> = engine.placements().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["world", "module", "crystal_rep_0", "crystal_rep_1", "crystal_rep_2", "crystal_rep_3"]);
        let third = engine.placement("crystal_rep_2").unwrap();
        assert_eq!(third.copy_index, 2);
        assert_eq!(third.mother.as_deref(), Some("module"));

        let again = t.construct("crystal", &mut engine).unwrap();
        assert_eq!(again, ConstructionReport::default());
        assert_eq!(engine.placements().len(), 6);
    }

    #[test]
    fn building_blocks_are_not_placed() {
        let mut t = csg_scene();
        let mut engine = RecordingEngine::new();
        let report = t.construct_all(&mut engine).unwrap();
        let placed: Vec<&str> = engine.placements().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(placed, vec!["world", "shell", "capped"]);
        assert_eq!(report.solids_built, 6);
        assert!(t.node("outer").unwrap().is_constructed());
    }

    #[test]
    fn daughter_of_unplaced_mother_fails() {
        let mut t = tree();
        t.add(VolumeNode::new("block", Shape::cuboid(1.0, 1.0, 1.0), "G4_AIR").building_block())
            .unwrap();
        t.add(VolumeNode::new("inside", Shape::cuboid(0.5, 0.5, 0.5), "G4_AIR").with_mother("block"))
            .unwrap();
        let mut engine = RecordingEngine::new();
        assert!(matches!(
            t.construct_all(&mut engine),
            Err(SceneError::MotherNotPlaced { .. })
        ));
    }

    #[test]
    fn release_allows_rebuild() {
        let mut t = csg_scene();
        let mut factory = DescriptorFactory::new();
        let first = t.build_solid("shell", &mut factory).unwrap();
        t.release_solids();
        assert!(t.node("shell").unwrap().solid().is_none());
        let second = t.build_solid("shell", &mut factory).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(factory.built(), 6);
    }

    fn phantom(dir: Option<std::path::PathBuf>) -> SceneTree {
        let settings = SceneSettings {
            label_output_dir: dir,
            ..SceneSettings::default()
        };
        let mut t = SceneTree::new(settings).unwrap();
        let field = ScalarField::new([2, 1, 1], [1.0; 3], [0.0; 3], vec![5.0, 15.0]).unwrap();
        let voxels = VoxelizedVolume::new(
            field,
            vec![
                MaterialInterval::new(0.0, 10.0, "A"),
                MaterialInterval::new(10.0, 20.0, "B"),
            ],
            "ignored",
        );
        t.add(VolumeNode::new("phantom", voxels, "G4_WATER")).unwrap();
        t
    }

    #[test]
    fn voxel_volumes_are_filled_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = phantom(Some(dir.path().to_path_buf()));
        let mut engine = RecordingEngine::new();
        let report = t.construct_all(&mut engine).unwrap();
        assert_eq!(report.voxel_volumes, 1);
        assert!(report.persistence_failures.is_empty());
        assert_eq!(engine.voxel_fills(), &[("phantom".to_string(), 2)]);
        assert!(dir.path().join("phantom_labels.json").exists());
        assert!(dir.path().join("phantom_label_field.json").exists());
        let labels = t.node("phantom").unwrap().voxels().unwrap().cached_labels().unwrap();
        assert_eq!(labels.materials[0], "G4_WATER");
    }

    #[test]
    fn persistence_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "x").unwrap();
        let mut t = phantom(Some(blocker.join("labels")));
        let mut engine = RecordingEngine::new();
        let report = t.construct_all(&mut engine).unwrap();
        assert_eq!(report.persistence_failures.len(), 1);
        assert_eq!(report.persistence_failures[0].volume, "phantom");
        assert!(engine.placement("phantom").is_some());
    }
}
