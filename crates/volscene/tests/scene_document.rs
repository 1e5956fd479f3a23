//! End-to-end behavior of scenes loaded from JSON documents.

use approx::assert_abs_diff_eq;
use volscene::volscene_math::Transform;
use volscene::{
    parse_repetition_name, repetition_name, RecordingEngine, SceneError, SceneSettings, SceneTree,
};

fn load(json: &str) -> SceneTree {
    SceneTree::from_json(json, SceneSettings::default()).unwrap()
}

const DETECTOR: &str = r#"{
    "version": "0.1",
    "world": { "size": { "x": 2000, "y": 2000, "z": 2000 }, "material": "G4_AIR" },
    "volumes": [
        {
            "name": "crystal",
            "mother": "module",
            "material": "LYSO",
            "shape": { "type": "Box", "size": { "x": 4, "y": 4, "z": 20 } },
            "placement": {
                "type": "Grid",
                "counts": [2, 3, 1],
                "spacing": { "x": 5, "y": 5, "z": 0 }
            }
        },
        {
            "name": "module",
            "material": "G4_AIR",
            "shape": { "type": "Box", "size": { "x": 50, "y": 50, "z": 30 } },
            "placement": {
                "type": "Ring",
                "count": 4,
                "base": { "x": 100, "y": 0, "z": 0 }
            }
        },
        {
            "name": "phantom",
            "material": "G4_WATER",
            "shape": { "type": "Tube", "rmax": 40, "dz": 60 }
        }
    ]
}"#;

#[test]
fn every_volume_hangs_off_one_world() {
    let mut tree = load(DETECTOR);
    assert_eq!(tree.len(), 4);
    for name in ["crystal", "module", "phantom"] {
        let chain = tree.ancestors(name).unwrap();
        assert_eq!(chain.last().map(String::as_str), Some("world"));
    }
    assert_eq!(tree.depth("crystal").unwrap(), 2);

    let order = tree.construction_order().unwrap();
    let pos = |n: &str| order.iter().position(|o| o == n).unwrap();
    assert_eq!(pos("world"), 0);
    assert!(pos("module") < pos("crystal"));
}

#[test]
fn grid_of_two_by_three() {
    let mut tree = load(DETECTOR);
    let crystal = tree.node("crystal").unwrap();
    assert_eq!(crystal.repetition_count(), 6);

    let xs: Vec<f64> = crystal.transforms().iter().map(|t| t.translation.x).collect();
    let ys: Vec<f64> = crystal.transforms().iter().map(|t| t.translation.y).collect();
    assert_abs_diff_eq!(xs.iter().sum::<f64>(), 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(ys.iter().sum::<f64>(), 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(xs[0], -2.5, epsilon = 1e-12);
    assert_abs_diff_eq!(ys[0], -5.0, epsilon = 1e-12);
    assert_abs_diff_eq!(ys[1], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(xs[3], 2.5, epsilon = 1e-12);
    assert!(crystal.transforms().iter().all(|t| t.rotation == Transform::identity().rotation));

    // first module repetition sits on +x
    let frame = tree.world_transform("crystal", 5).unwrap();
    assert_abs_diff_eq!(frame.translation.x, 102.5, epsilon = 1e-9);
    assert_abs_diff_eq!(frame.translation.y, 5.0, epsilon = 1e-9);
}

#[test]
fn ring_of_four() {
    let tree = load(DETECTOR);
    let module = tree.node("module").unwrap();
    let expected = [(100.0, 0.0), (0.0, 100.0), (-100.0, 0.0), (0.0, -100.0)];
    for (t, (x, y)) in module.transforms().iter().zip(expected) {
        assert_abs_diff_eq!(t.translation.x, x, epsilon = 1e-9);
        assert_abs_diff_eq!(t.translation.y, y, epsilon = 1e-9);
        assert_abs_diff_eq!(t.translation.z, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(t.rotation.determinant(), 1.0, epsilon = 1e-9);
    }
    // copies face outward
    let quarter = module.transforms()[1].rotation;
    assert_abs_diff_eq!(quarter[(1, 0)], 1.0, epsilon = 1e-9);
}

#[test]
fn construction_places_every_repetition_once() {
    let mut tree = load(DETECTOR);
    let mut engine = RecordingEngine::new();
    let report = tree.construct_all(&mut engine).unwrap();
    assert_eq!(report.placements, 1 + 4 + 6 + 1);
    assert_eq!(report.solids_built, 4);
    assert!(engine.placement("module_rep_3").is_some());
    assert!(engine.placement("crystal_rep_0").is_some());
    assert_eq!(engine.placement("phantom").unwrap().mother.as_deref(), Some("world"));

    let again = tree.construct_all(&mut engine).unwrap();
    assert_eq!(again.placements, 0);
    assert_eq!(again.solids_built, 0);
}

#[test]
fn mother_cycle_is_fatal() {
    let json = r#"{
        "version": "0.1",
        "volumes": [
            { "name": "a", "mother": "b", "material": "G4_AIR",
              "shape": { "type": "Box", "size": { "x": 1, "y": 1, "z": 1 } } },
            { "name": "b", "mother": "a", "material": "G4_AIR",
              "shape": { "type": "Box", "size": { "x": 1, "y": 1, "z": 1 } } }
        ]
    }"#;
    match SceneTree::from_json(json, SceneSettings::default()) {
        Err(SceneError::MotherCycle { path }) => {
            assert_eq!(path.first(), path.last());
            assert!(path.contains(&"a".to_string()) && path.contains(&"b".to_string()));
        }
        other => panic!("expected a mother cycle, got {other:?}"),
    }
}

#[test]
fn unknown_mother_is_fatal() {
    let json = r#"{
        "version": "0.1",
        "volumes": [
            { "name": "a", "mother": "nowhere", "material": "G4_AIR",
              "shape": { "type": "Box", "size": { "x": 1, "y": 1, "z": 1 } } }
        ]
    }"#;
    assert!(matches!(
        SceneTree::from_json(json, SceneSettings::default()),
        Err(SceneError::UnknownMother { .. })
    ));
}

const HOLLOW: &str = r#"{
    "version": "0.1",
    "volumes": [
        { "name": "shell", "material": "G4_Al",
          "shape": { "type": "Box", "size": { "x": 30, "y": 30, "z": 30 } },
          "build_physical_volume": false },
        { "name": "cavity", "material": "G4_AIR",
          "shape": { "type": "Sphere", "rmax": 10 },
          "build_physical_volume": false },
        { "name": "housing", "material": "G4_Al",
          "shape": { "type": "Boolean", "op": "subtract", "left": "shell", "right": "cavity",
                     "translation": { "x": 0, "y": 0, "z": 5 } } },
        { "name": "cap", "material": "G4_Al",
          "shape": { "type": "Boolean", "op": "intersect", "left": "shell", "right": "cavity" },
          "placement": { "type": "Single", "translation": { "x": 0, "y": 0, "z": 100 } } }
    ]
}"#;

#[test]
fn boolean_solids_are_built_once() {
    let mut tree = load(HOLLOW);
    let mut engine = RecordingEngine::new();
    let first = tree.build_solid("housing", &mut engine).unwrap();
    let second = tree.build_solid("housing", &mut engine).unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));

    tree.construct_all(&mut engine).unwrap();
    assert_eq!(engine.solid_builds("shell"), 1);
    assert_eq!(engine.solid_builds("cavity"), 1);
    assert_eq!(engine.solid_builds("housing"), 1);
    assert_eq!(engine.solid_builds("cap"), 1);
    assert!(engine.placement("shell").is_none());
    assert!(engine.placement("housing").is_some());

    let order = tree.construction_order().unwrap();
    let pos = |n: &str| order.iter().position(|o| o == n).unwrap();
    assert!(pos("shell") < pos("housing"));
    assert!(pos("cavity") < pos("cap"));
}

#[test]
fn boolean_cycle_is_fatal() {
    let json = r#"{
        "version": "0.1",
        "volumes": [
            { "name": "a", "material": "G4_AIR",
              "shape": { "type": "Boolean", "op": "union", "left": "b", "right": "b" } },
            { "name": "b", "material": "G4_AIR",
              "shape": { "type": "Boolean", "op": "union", "left": "a", "right": "a" } }
        ]
    }"#;
    assert!(matches!(
        SceneTree::from_json(json, SceneSettings::default()),
        Err(SceneError::CsgCycle { .. })
    ));
}

const PHANTOM: &str = r#"{
    "version": "0.1",
    "run_intervals": [[0, 1], [1, 2]],
    "volumes": [
        { "name": "ct", "material": "G4_WATER",
          "shape": { "type": "Image", "dims": [4, 1, 1], "spacing": { "x": 1, "y": 1, "z": 1 },
                     "values": [0.5, 1.5, 2.5, 3.5],
                     "voxel_materials": [
                        { "lower": 3, "upper": 4, "material": "B" },
                        { "lower": 1, "upper": 2, "material": "A" }
                     ] },
          "dynamics": [ { "fields": [[1.5, 1.5, 1.5, 1.5], [3.5, 0.0, 0.0, 0.0]] } ] }
    ]
}"#;

#[test]
fn voxel_values_map_to_interval_materials() {
    let mut tree = load(PHANTOM);
    let mut engine = RecordingEngine::new();
    let report = tree.construct_all(&mut engine).unwrap();
    assert_eq!(report.voxel_volumes, 1);
    assert_eq!(engine.voxel_fills(), &[("ct".to_string(), 4)]);

    let labels = tree.node("ct").unwrap().voxels().unwrap().cached_labels().unwrap();
    assert_eq!(labels.materials, vec!["G4_WATER", "A", "B"]);
    assert_eq!(labels.labels, vec![0, 1, 0, 2]);
    assert_eq!(labels.material(labels.label_at(3, 0, 0).unwrap()), Some("B"));
}

#[test]
fn voxel_fields_swap_between_runs() {
    let mut tree = load(PHANTOM);
    let mut engine = RecordingEngine::new();
    tree.construct_all(&mut engine).unwrap();
    tree.validate_dynamics().unwrap();

    tree.apply_run(1, &mut engine).unwrap();
    assert!(!engine.is_geometry_open());
    assert_eq!(engine.geometry_updates(), 1);
    let labels = tree.node("ct").unwrap().voxels().unwrap().cached_labels().unwrap();
    assert_eq!(labels.labels, vec![2, 0, 0, 0]);
    assert_eq!(engine.voxel_fills().len(), 2);
}

#[test]
fn schedule_must_cover_every_run() {
    let json = r#"{
        "version": "0.1",
        "run_intervals": [[0, 1], [1, 2], [2, 3]],
        "volumes": [
            { "name": "arm", "material": "G4_Fe",
              "shape": { "type": "Box", "size": { "x": 1, "y": 1, "z": 10 } },
              "dynamics": [ { "translations": [ { "x": 0, "y": 0, "z": 0 }, { "x": 0, "y": 0, "z": 5 } ] } ] }
        ]
    }"#;
    let mut tree = load(json);
    assert!(matches!(
        tree.validate_dynamics(),
        Err(SceneError::ScheduleLengthMismatch { .. })
    ));
    let mut engine = RecordingEngine::new();
    assert!(matches!(
        tree.apply_run(0, &mut engine),
        Err(SceneError::DynamicsNotValidated)
    ));
}

#[test]
fn short_schedule_stops_construction_before_any_placement() {
    let json = r#"{
        "version": "0.1",
        "run_intervals": [[0, 1], [1, 2], [2, 3]],
        "volumes": [
            { "name": "base", "material": "G4_Fe",
              "shape": { "type": "Box", "size": { "x": 50, "y": 50, "z": 5 } } },
            { "name": "arm", "material": "G4_Fe",
              "shape": { "type": "Box", "size": { "x": 1, "y": 1, "z": 10 } },
              "dynamics": [ { "translations": [ { "x": 0, "y": 0, "z": 0 }, { "x": 0, "y": 0, "z": 5 } ] } ] }
        ]
    }"#;
    let mut tree = load(json);
    let mut engine = RecordingEngine::new();
    match tree.construct_all(&mut engine) {
        Err(SceneError::ScheduleLengthMismatch { volume, expected, actual }) => {
            assert_eq!((volume.as_str(), expected, actual), ("arm", 3, 2));
        }
        other => panic!("expected ScheduleLengthMismatch, got {other:?}"),
    }
    assert!(engine.placements().is_empty());
    assert!(matches!(
        tree.construct("base", &mut engine),
        Err(SceneError::ScheduleLengthMismatch { .. })
    ));
    assert!(engine.placements().is_empty());
    assert!(!tree.dynamics_validated());
}

#[test]
fn moving_one_repetition() {
    let json = r#"{
        "version": "0.1",
        "run_intervals": [[0, 1], [1, 2]],
        "volumes": [
            { "name": "head", "material": "LYSO",
              "shape": { "type": "Box", "size": { "x": 10, "y": 10, "z": 10 } },
              "placement": { "type": "Linear", "count": 3, "offset": { "x": 20, "y": 0, "z": 0 } },
              "dynamics": [ { "repetition_index": 1,
                              "rotations": [ { "x": 0, "y": 0, "z": 0 }, { "x": 0, "y": 0, "z": 90 } ] } ] }
        ]
    }"#;
    let mut tree = load(json);
    let mut engine = RecordingEngine::new();
    tree.construct_all(&mut engine).unwrap();
    tree.validate_dynamics().unwrap();

    let moved = tree.apply_run(1, &mut engine).unwrap();
    assert_eq!(moved, vec!["head_rep_1"]);
    let placed = engine.placement("head_rep_1").unwrap();
    assert_abs_diff_eq!(placed.transform.translation.x, 20.0, epsilon = 1e-12);
    assert_abs_diff_eq!(placed.transform.rotation[(1, 0)], 1.0, epsilon = 1e-12);
    assert_eq!(engine.placement("head_rep_2").unwrap().transform, tree.node("head").unwrap().transforms()[2]);

    assert!(tree.apply_run(1, &mut engine).unwrap().is_empty());
    assert!(matches!(
        tree.apply_run(2, &mut engine),
        Err(SceneError::RunOutOfRange { .. })
    ));
    assert!(!engine.is_geometry_open());
}

#[test]
fn repetition_names_round_trip() {
    let tree = load(DETECTOR);
    let module = tree.node("module").unwrap();
    for (i, name) in module.repetition_names().iter().enumerate() {
        assert_eq!(name, &repetition_name("module", i));
        assert_eq!(parse_repetition_name(name).unwrap(), ("module", i));
        assert_eq!(module.repetition_index(name).unwrap(), i);
    }
    assert!(matches!(
        module.repetition_index("crystal_rep_0"),
        Err(SceneError::ForeignRepetition { .. })
    ));
    assert!(parse_repetition_name("module_rep_x").is_err());
}
