//! Building a scene tree from a scene document.

use tracing::debug;
use volscene_ir as ir;
use volscene_math::{Rotation, Transform, Vec3};
use volscene_solids::{Shape, TriangleMesh};

use crate::config::{BroadcastPolicy, SceneSettings, WorldSettings};
use crate::csg::CsgNode;
use crate::dynamic::{DynamicSchedule, ScheduleAction, ScheduleTarget};
use crate::error::{Result, SceneError};
use crate::repeat::Repeater;
use crate::tree::SceneTree;
use crate::volume::{ShapeKind, VolumeNode};
use crate::voxel::{MaterialInterval, ScalarField, VoxelizedVolume};

impl SceneTree {
    /// Build and link a tree from `doc`.
    ///
    /// The document's world replaces the one in `settings`, and its run
    /// intervals do too when it lists any. Angles are converted from degrees.
    pub fn from_document(doc: &ir::Document, mut settings: SceneSettings) -> Result<Self> {
        settings.world = WorldSettings {
            name: doc.world.name.clone(),
            size: doc.world.size.to_array(),
            material: doc.world.material.clone(),
        };
        if !doc.run_intervals.is_empty() {
            settings.run_intervals = doc.run_intervals.clone();
        }
        let broadcast = settings.broadcast;
        let mut tree = SceneTree::new(settings)?;
        for def in &doc.volumes {
            tree.add(volume_from_def(def, broadcast)?)?;
        }
        tree.build_tree()?;
        debug!(version = %doc.version, volumes = doc.volumes.len(), "document loaded");
        Ok(tree)
    }

    /// Parse a JSON scene document and build the tree.
    pub fn from_json(json: &str, settings: SceneSettings) -> Result<Self> {
        let doc = ir::Document::from_json(json).map_err(|e| SceneError::InvalidDocument(e.to_string()))?;
        Self::from_document(&doc, settings)
    }
}

fn vec3(v: &ir::Vec3) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

fn rotation_deg(r: &ir::Vec3) -> Rotation {
    Transform::from_euler_xyz_deg(r.x, r.y, r.z).rotation
}

fn placed(translation: &ir::Vec3, rotation: &ir::Vec3) -> Transform {
    Transform {
        rotation: rotation_deg(rotation),
        translation: vec3(translation),
    }
}

fn volume_from_def(def: &ir::VolumeDef, broadcast: BroadcastPolicy) -> Result<VolumeNode> {
    let shape = shape_from_def(def)?;
    let mut node = VolumeNode::new(def.name.clone(), shape, def.material.clone())
        .with_mother(def.mother.clone())
        .with_visible(def.visible);
    if let Some(color) = def.color {
        node = node.with_color(color);
    }
    if !def.build_physical_volume {
        node = node.building_block();
    }

    match &def.placement {
        ir::PlacementDef::Single {
            translation,
            rotation,
        } => node.set_transforms(vec![placed(translation, rotation)])?,
        ir::PlacementDef::List {
            translations,
            rotations,
        } => {
            let rotations: Vec<Rotation> = rotations.iter().map(rotation_deg).collect();
            let translations: Vec<Vec3> = translations.iter().map(vec3).collect();
            node.set_rotations_translations(&rotations, &translations, broadcast)?;
        }
        ir::PlacementDef::Grid {
            counts,
            spacing,
            start,
            rotation,
        } => node.set_repeater(&Repeater::Grid {
            counts: *counts,
            spacing: vec3(spacing),
            start: start.as_ref().map(vec3),
            rotation: rotation_deg(rotation),
        })?,
        ir::PlacementDef::Ring {
            count,
            base,
            axis,
            start_angle,
            angle_step,
        } => node.set_repeater(&Repeater::Ring {
            count: *count,
            base: vec3(base),
            axis: vec3(axis),
            start_angle: start_angle.to_radians(),
            angle_step: angle_step.map(f64::to_radians),
        })?,
        ir::PlacementDef::Linear {
            count,
            offset,
            start,
        } => node.set_repeater(&Repeater::Linear {
            count: *count,
            offset: vec3(offset),
            start: vec3(start),
        })?,
    }

    for dynamic in &def.dynamics {
        for schedule in schedules_from_def(def, dynamic)? {
            node.add_schedule(schedule);
        }
    }
    Ok(node)
}

fn shape_from_def(def: &ir::VolumeDef) -> Result<ShapeKind> {
    let shape = match &def.shape {
        ir::ShapeDef::Box { size } => Shape::Box { size: vec3(size) },
        ir::ShapeDef::Tube {
            rmin,
            rmax,
            dz,
            sphi,
            dphi,
        } => Shape::Tube {
            rmin: *rmin,
            rmax: *rmax,
            dz: *dz,
            sphi: sphi.to_radians(),
            dphi: dphi.to_radians(),
        },
        ir::ShapeDef::Cone {
            rmin1,
            rmax1,
            rmin2,
            rmax2,
            dz,
            sphi,
            dphi,
        } => Shape::Cone {
            rmin1: *rmin1,
            rmax1: *rmax1,
            rmin2: *rmin2,
            rmax2: *rmax2,
            dz: *dz,
            sphi: sphi.to_radians(),
            dphi: dphi.to_radians(),
        },
        ir::ShapeDef::Sphere {
            rmin,
            rmax,
            sphi,
            dphi,
            stheta,
            dtheta,
        } => Shape::Sphere {
            rmin: *rmin,
            rmax: *rmax,
            sphi: sphi.to_radians(),
            dphi: dphi.to_radians(),
            stheta: stheta.to_radians(),
            dtheta: dtheta.to_radians(),
        },
        ir::ShapeDef::Polyhedron {
            phi_start,
            phi_total,
            num_side,
            z_planes,
            radius_inner,
            radius_outer,
        } => Shape::Polyhedron {
            phi_start: phi_start.to_radians(),
            phi_total: phi_total.to_radians(),
            num_side: *num_side,
            z_planes: z_planes.clone(),
            radius_inner: radius_inner.clone(),
            radius_outer: radius_outer.clone(),
        },
        ir::ShapeDef::Trapezoid {
            dz,
            theta,
            phi,
            dy1,
            dx1,
            dx2,
            alpha1,
            dy2,
            dx3,
            dx4,
            alpha2,
        } => Shape::Trapezoid {
            dz: *dz,
            theta: theta.to_radians(),
            phi: phi.to_radians(),
            dy1: *dy1,
            dx1: *dx1,
            dx2: *dx2,
            alpha1: alpha1.to_radians(),
            dy2: *dy2,
            dx3: *dx3,
            dx4: *dx4,
            alpha2: alpha2.to_radians(),
        },
        ir::ShapeDef::Tessellated {
            vertices,
            triangles,
        } => Shape::TessellatedMesh(TriangleMesh::from_parts(
            vertices.iter().flatten().copied().collect(),
            triangles.iter().flatten().copied().collect(),
        )),
        ir::ShapeDef::Image {
            values,
            voxel_materials,
            ..
        } => {
            let field = image_field(def, values.clone())?;
            let intervals = voxel_materials
                .iter()
                .map(|i| MaterialInterval::new(i.lower, i.upper, i.material.clone()))
                .collect();
            return Ok(VoxelizedVolume::new(field, intervals, def.material.clone()).into());
        }
        ir::ShapeDef::Boolean {
            op,
            left,
            right,
            translation,
            rotation,
        } => {
            let csg = CsgNode::parse(&def.name, op, left.clone(), right.clone())?
                .with_transform(placed(translation, rotation));
            return Ok(csg.into());
        }
    };
    Ok(shape.into())
}

/// Field on the grid of an image volume, holding `values`.
fn image_field(def: &ir::VolumeDef, values: Vec<f64>) -> Result<ScalarField> {
    match &def.shape {
        ir::ShapeDef::Image {
            dims,
            spacing,
            origin,
            ..
        } => ScalarField::new(*dims, spacing.to_array(), origin.to_array(), values).map_err(|err| match err {
            SceneError::InvalidField(reason) => {
                SceneError::InvalidField(format!("volume `{}`: {reason}", def.name))
            }
            other => other,
        }),
        _ => Err(SceneError::NotVoxelized(def.name.clone())),
    }
}

fn schedules_from_def(def: &ir::VolumeDef, dynamic: &ir::DynamicDef) -> Result<Vec<DynamicSchedule>> {
    let target = dynamic
        .repetition_index
        .map_or(ScheduleTarget::Volume, ScheduleTarget::Repetition);
    let mut out = Vec::new();

    let motion = match (&dynamic.translations, &dynamic.rotations) {
        (Some(translations), Some(rotations)) => {
            if translations.len() != rotations.len() {
                return Err(SceneError::InvalidDocument(format!(
                    "volume `{}`: dynamic schedule has {} translations but {} rotations",
                    def.name,
                    translations.len(),
                    rotations.len()
                )));
            }
            Some(ScheduleAction::Transforms(
                translations
                    .iter()
                    .zip(rotations)
                    .map(|(t, r)| placed(t, r))
                    .collect(),
            ))
        }
        (Some(translations), None) => Some(ScheduleAction::Translations(
            translations.iter().map(vec3).collect(),
        )),
        (None, Some(rotations)) => Some(ScheduleAction::Rotations(
            rotations.iter().map(rotation_deg).collect(),
        )),
        (None, None) => None,
    };
    if let Some(action) = motion {
        out.push(DynamicSchedule { target, action });
    }

    if let Some(fields) = &dynamic.fields {
        let fields = fields
            .iter()
            .map(|values| image_field(def, values.clone()))
            .collect::<Result<Vec<_>>>()?;
        out.push(DynamicSchedule {
            target,
            action: ScheduleAction::VoxelFields(fields),
        });
    }

    if out.is_empty() {
        return Err(SceneError::InvalidDocument(format!(
            "volume `{}`: dynamic entry has no translations, rotations or fields",
            def.name
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use volscene_ir::{Document, PlacementDef, ShapeDef, VolumeDef};

    fn box_def(name: &str) -> VolumeDef {
        VolumeDef::new(
            name,
            "world",
            "G4_WATER",
            ShapeDef::Box {
                size: ir::Vec3::new(10.0, 10.0, 10.0),
            },
        )
    }

    #[test]
    fn world_and_runs_come_from_document() {
        let mut doc = Document::new();
        doc.world.name = "lab".to_string();
        doc.run_intervals = vec![[0.0, 1.0], [1.0, 2.0]];
        let mut a = box_def("a");
        a.mother = "lab".to_string();
        doc.volumes.push(a);
        let mut tree = SceneTree::from_document(&doc, SceneSettings::default()).unwrap();
        assert_eq!(tree.world_name(), "lab");
        assert_eq!(tree.settings().run_count(), 2);
        assert_eq!(tree.ancestors("a").unwrap(), vec!["lab"]);
    }

    #[test]
    fn degrees_become_radians() {
        let mut doc = Document::new();
        let mut tube = VolumeDef::new(
            "tube",
            "world",
            "G4_Al",
            ShapeDef::Tube {
                rmin: 1.0,
                rmax: 2.0,
                dz: 3.0,
                sphi: 0.0,
                dphi: 90.0,
            },
        );
        tube.placement = PlacementDef::Single {
            translation: ir::Vec3::new(0.0, 0.0, 5.0),
            rotation: ir::Vec3::new(0.0, 0.0, 90.0),
        };
        doc.volumes.push(tube);
        let mut tree = SceneTree::from_document(&doc, SceneSettings::default()).unwrap();
        match tree.node("tube").unwrap().shape() {
            ShapeKind::Primitive(Shape::Tube { dphi, .. }) => {
                assert_abs_diff_eq!(*dphi, std::f64::consts::FRAC_PI_2, epsilon = 1e-12)
            }
            other => panic!("expected tube, got {other:?}"),
        }
        let frame = tree.world_to_local("tube").unwrap();
        let x = frame.apply_vec(&Vec3::x());
        assert_abs_diff_eq!(x.y, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(frame.translation.z, 5.0, epsilon = 1e-12);
    }

    #[test]
    fn unknown_boolean_tag() {
        let mut doc = Document::new();
        doc.volumes.push(box_def("a"));
        doc.volumes.push(VolumeDef::new(
            "b",
            "world",
            "G4_AIR",
            ShapeDef::Boolean {
                op: "merge".to_string(),
                left: "a".to_string(),
                right: "a".to_string(),
                translation: ir::Vec3::default(),
                rotation: ir::Vec3::default(),
            },
        ));
        assert!(matches!(
            SceneTree::from_document(&doc, SceneSettings::default()),
            Err(SceneError::UnknownBooleanOp { tag, .. }) if tag == "merge"
        ));
    }

    #[test]
    fn list_placement_respects_broadcast_policy() {
        let mut doc = Document::new();
        let mut a = box_def("a");
        a.placement = PlacementDef::List {
            translations: vec![ir::Vec3::new(1.0, 0.0, 0.0), ir::Vec3::new(2.0, 0.0, 0.0)],
            rotations: vec![ir::Vec3::new(0.0, 0.0, 45.0)],
        };
        doc.volumes.push(a);

        let mut tree = SceneTree::from_document(&doc, SceneSettings::default()).unwrap();
        assert_eq!(tree.node("a").unwrap().repetition_count(), 2);
        assert_eq!(tree.children("world").unwrap(), vec!["a"]);

        let strict = SceneSettings {
            broadcast: BroadcastPolicy::Deny,
            ..SceneSettings::default()
        };
        assert!(matches!(
            SceneTree::from_document(&doc, strict),
            Err(SceneError::TransformLengthMismatch { .. })
        ));
    }

    #[test]
    fn dynamics_become_schedules() {
        let mut doc = Document::new();
        doc.run_intervals = vec![[0.0, 1.0], [1.0, 2.0]];
        let mut a = box_def("a");
        a.dynamics.push(ir::DynamicDef {
            translations: Some(vec![ir::Vec3::default(), ir::Vec3::new(0.0, 0.0, 1.0)]),
            rotations: Some(vec![ir::Vec3::default(), ir::Vec3::new(0.0, 0.0, 90.0)]),
            ..Default::default()
        });
        doc.volumes.push(a);
        let tree = SceneTree::from_document(&doc, SceneSettings::default()).unwrap();
        let schedules = tree.node("a").unwrap().schedules();
        assert_eq!(schedules.len(), 1);
        assert!(matches!(schedules[0].action, ScheduleAction::Transforms(ref t) if t.len() == 2));
    }

    #[test]
    fn empty_dynamic_entry_is_rejected() {
        let mut doc = Document::new();
        let mut a = box_def("a");
        a.dynamics.push(ir::DynamicDef::default());
        doc.volumes.push(a);
        assert!(matches!(
            SceneTree::from_document(&doc, SceneSettings::default()),
            Err(SceneError::InvalidDocument(_))
        ));
    }

    #[test]
    fn fields_need_an_image() {
        let mut doc = Document::new();
        let mut a = box_def("a");
        a.dynamics.push(ir::DynamicDef {
            fields: Some(vec![vec![1.0]]),
            ..Default::default()
        });
        doc.volumes.push(a);
        assert!(matches!(
            SceneTree::from_document(&doc, SceneSettings::default()),
            Err(SceneError::NotVoxelized(_))
        ));
    }

    #[test]
    fn bad_json_is_invalid_document() {
        assert!(matches!(
            SceneTree::from_json("{", SceneSettings::default()),
            Err(SceneError::InvalidDocument(_))
        ));
    }
}
