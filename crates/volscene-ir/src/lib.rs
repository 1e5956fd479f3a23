//! Scene description documents for volscene.
//!
//! A document lists the world volume, every daughter volume with its shape,
//! material, mother and placement, and the run timing intervals used by
//! dynamic schedules. It is purely declarative; building and validating
//! the scene tree is done by the `volscene` crate.
//!
//! Lengths are millimeters, angles in documents are degrees.

use serde::{Deserialize, Serialize};

/// 3D vector with f64 components.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
    /// Z component.
    pub z: f64,
}

impl Vec3 {
    /// Create a new Vec3.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Components as an array.
    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

fn default_world_name() -> String {
    "world".to_string()
}

fn yes() -> bool {
    true
}

fn full_turn() -> f64 {
    360.0
}

fn half_turn() -> f64 {
    180.0
}

fn z_axis() -> Vec3 {
    Vec3::new(0.0, 0.0, 1.0)
}

/// The root volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldDef {
    /// World name; daughters refer to it as their mother.
    #[serde(default = "default_world_name")]
    pub name: String,
    /// Full edge lengths of the world box.
    pub size: Vec3,
    /// Material filling the world.
    pub material: String,
}

impl Default for WorldDef {
    fn default() -> Self {
        Self {
            name: default_world_name(),
            size: Vec3::new(3000.0, 3000.0, 3000.0),
            material: "G4_AIR".to_string(),
        }
    }
}

/// A voxel value interval `[lower, upper)` assigned to a material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalDef {
    /// Inclusive lower bound.
    pub lower: f64,
    /// Exclusive upper bound.
    pub upper: f64,
    /// Material name.
    pub material: String,
}

/// Shape of a volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ShapeDef {
    /// Box centered at origin.
    Box {
        /// Full edge lengths.
        size: Vec3,
    },
    /// Tube section along Z.
    Tube {
        /// Inner radius.
        #[serde(default)]
        rmin: f64,
        /// Outer radius.
        rmax: f64,
        /// Half length.
        dz: f64,
        /// Start angle (degrees).
        #[serde(default)]
        sphi: f64,
        /// Angular span (degrees).
        #[serde(default = "full_turn")]
        dphi: f64,
    },
    /// Cone section along Z.
    Cone {
        /// Inner radius at `-dz`.
        #[serde(default)]
        rmin1: f64,
        /// Outer radius at `-dz`.
        rmax1: f64,
        /// Inner radius at `+dz`.
        #[serde(default)]
        rmin2: f64,
        /// Outer radius at `+dz`.
        rmax2: f64,
        /// Half length.
        dz: f64,
        /// Start angle (degrees).
        #[serde(default)]
        sphi: f64,
        /// Angular span (degrees).
        #[serde(default = "full_turn")]
        dphi: f64,
    },
    /// Spherical shell section.
    Sphere {
        /// Inner radius.
        #[serde(default)]
        rmin: f64,
        /// Outer radius.
        rmax: f64,
        /// Start azimuth (degrees).
        #[serde(default)]
        sphi: f64,
        /// Azimuthal span (degrees).
        #[serde(default = "full_turn")]
        dphi: f64,
        /// Start polar angle (degrees).
        #[serde(default)]
        stheta: f64,
        /// Polar span (degrees).
        #[serde(default = "half_turn")]
        dtheta: f64,
    },
    /// Polygonal prism section.
    Polyhedron {
        /// Start angle (degrees).
        #[serde(default)]
        phi_start: f64,
        /// Total span (degrees).
        #[serde(default = "full_turn")]
        phi_total: f64,
        /// Number of sides.
        num_side: u32,
        /// Z planes.
        z_planes: Vec<f64>,
        /// Inner radii per plane.
        radius_inner: Vec<f64>,
        /// Outer radii per plane.
        radius_outer: Vec<f64>,
    },
    /// General trapezoid. Angles in degrees.
    Trapezoid {
        /// Half length along Z.
        dz: f64,
        /// Polar angle of the face-center line.
        #[serde(default)]
        theta: f64,
        /// Azimuth of the face-center line.
        #[serde(default)]
        phi: f64,
        /// Half Y length at `-dz`.
        dy1: f64,
        /// Half X length at `-dy1`, `-dz`.
        dx1: f64,
        /// Half X length at `+dy1`, `-dz`.
        dx2: f64,
        /// Tilt at `-dz`.
        #[serde(default)]
        alpha1: f64,
        /// Half Y length at `+dz`.
        dy2: f64,
        /// Half X length at `-dy2`, `+dz`.
        dx3: f64,
        /// Half X length at `+dy2`, `+dz`.
        dx4: f64,
        /// Tilt at `+dz`.
        #[serde(default)]
        alpha2: f64,
    },
    /// Closed triangle mesh, already loaded by the caller.
    Tessellated {
        /// Vertex positions.
        vertices: Vec<[f64; 3]>,
        /// Triangles as vertex index triples.
        triangles: Vec<[u32; 3]>,
    },
    /// Voxelized volume filled from a dense scalar field.
    ///
    /// The volume's own material is the default (label 0) material.
    Image {
        /// Voxel counts along X, Y, Z.
        dims: [usize; 3],
        /// Voxel edge lengths.
        spacing: Vec3,
        /// Physical position of the first voxel corner in the image frame.
        #[serde(default)]
        origin: Vec3,
        /// Field values, X fastest then Y then Z.
        values: Vec<f64>,
        /// Value intervals mapped to materials.
        voxel_materials: Vec<IntervalDef>,
    },
    /// Boolean combination of two other volumes.
    Boolean {
        /// `union`, `subtract` or `intersect`.
        op: String,
        /// Left operand volume name.
        left: String,
        /// Right operand volume name.
        right: String,
        /// Translation of the right operand relative to the left.
        #[serde(default)]
        translation: Vec3,
        /// Extrinsic XYZ rotation of the right operand (degrees).
        #[serde(default)]
        rotation: Vec3,
    },
}

/// How many copies of a volume are placed, and where.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlacementDef {
    /// One placement.
    Single {
        /// Translation inside the mother.
        #[serde(default)]
        translation: Vec3,
        /// Extrinsic XYZ rotation (degrees).
        #[serde(default)]
        rotation: Vec3,
    },
    /// Explicit lists; a single entry in one list is broadcast to the
    /// length of the other.
    List {
        /// Translations.
        #[serde(default)]
        translations: Vec<Vec3>,
        /// Extrinsic XYZ rotations (degrees).
        #[serde(default)]
        rotations: Vec<Vec3>,
    },
    /// Regular grid centered on the origin.
    Grid {
        /// Counts along X, Y, Z.
        counts: [usize; 3],
        /// Spacing along X, Y, Z.
        spacing: Vec3,
        /// Explicit first-instance position instead of centering.
        #[serde(default)]
        start: Option<Vec3>,
        /// Shared rotation (degrees).
        #[serde(default)]
        rotation: Vec3,
    },
    /// Copies evenly spread on a ring.
    Ring {
        /// Number of copies.
        count: usize,
        /// Translation of the first copy before rotation.
        base: Vec3,
        /// Rotation axis.
        #[serde(default = "z_axis")]
        axis: Vec3,
        /// Angle of the first copy (degrees).
        #[serde(default)]
        start_angle: f64,
        /// Step between copies (degrees); defaults to 360 / count.
        #[serde(default)]
        angle_step: Option<f64>,
    },
    /// Copies spaced by a constant offset.
    Linear {
        /// Number of copies.
        count: usize,
        /// Offset between consecutive copies.
        offset: Vec3,
        /// Position of the first copy.
        #[serde(default)]
        start: Vec3,
    },
}

impl Default for PlacementDef {
    fn default() -> Self {
        PlacementDef::Single {
            translation: Vec3::default(),
            rotation: Vec3::default(),
        }
    }
}

/// Per-run schedule attached to a volume.
///
/// Each present list must have one entry per run interval.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DynamicDef {
    /// Repetition to move; the whole volume when absent.
    #[serde(default)]
    pub repetition_index: Option<usize>,
    /// Translations per run.
    #[serde(default)]
    pub translations: Option<Vec<Vec3>>,
    /// Extrinsic XYZ rotations per run (degrees).
    #[serde(default)]
    pub rotations: Option<Vec<Vec3>>,
    /// Replacement voxel fields per run (image volumes only).
    #[serde(default)]
    pub fields: Option<Vec<Vec<f64>>>,
}

/// A placed volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeDef {
    /// Unique name.
    pub name: String,
    /// Mother volume name.
    #[serde(default = "default_world_name")]
    pub mother: String,
    /// Material name, passed through to the engine.
    pub material: String,
    /// Shape.
    pub shape: ShapeDef,
    /// Placement(s) inside the mother.
    #[serde(default)]
    pub placement: PlacementDef,
    /// RGBA display color.
    #[serde(default)]
    pub color: Option<[f64; 4]>,
    /// Display visibility.
    #[serde(default = "yes")]
    pub visible: bool,
    /// When false the volume only serves as a boolean operand.
    #[serde(default = "yes")]
    pub build_physical_volume: bool,
    /// Dynamic schedules.
    #[serde(default)]
    pub dynamics: Vec<DynamicDef>,
}

impl VolumeDef {
    /// Volume with default placement and metadata.
    pub fn new(
        name: impl Into<String>,
        mother: impl Into<String>,
        material: impl Into<String>,
        shape: ShapeDef,
    ) -> Self {
        Self {
            name: name.into(),
            mother: mother.into(),
            material: material.into(),
            shape,
            placement: PlacementDef::default(),
            color: None,
            visible: true,
            build_physical_volume: true,
            dynamics: Vec::new(),
        }
    }
}

/// A scene document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Format version string (e.g. "0.1").
    pub version: String,
    /// The root volume.
    #[serde(default)]
    pub world: WorldDef,
    /// Volumes in any order; mothers are resolved by name.
    #[serde(default)]
    pub volumes: Vec<VolumeDef>,
    /// Run timing intervals `[start, end]` in seconds.
    #[serde(default)]
    pub run_intervals: Vec<[f64; 2]>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            version: "0.1".to_string(),
            world: WorldDef::default(),
            volumes: Vec::new(),
            run_intervals: Vec::new(),
        }
    }
}

impl Document {
    /// Create a new empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Look up a volume definition by name.
    pub fn volume(&self, name: &str) -> Option<&VolumeDef> {
        self.volumes.iter().find(|v| v.name == name)
    }
}
