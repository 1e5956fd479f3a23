//! Error types for scene construction.
//!
//! Every variant except the persistence ones is fatal: it stops scene
//! construction so no partially consistent tree reaches the engine.

use std::path::PathBuf;

use thiserror::Error;
use volscene_math::MathError;
use volscene_solids::SolidError;

fn join_path(path: &[String]) -> String {
    path.join(" -> ")
}

/// Errors raised while building, validating or mutating a scene.
#[derive(Error, Debug)]
pub enum SceneError {
    /// Two volumes registered under the same name.
    #[error("a volume named `{0}` already exists")]
    DuplicateName(String),

    /// A volume name that reads as a repetition placement name.
    #[error("volume name `{name}` is reserved for repetition {index} of volume `{base}`")]
    ReservedName {
        /// Rejected name.
        name: String,
        /// Volume whose placement it would shadow.
        base: String,
        /// Repetition index encoded in the name.
        index: usize,
    },

    /// No volume with this name.
    #[error("no volume named `{0}`")]
    UnknownVolume(String),

    /// A volume's mother does not resolve to a registered volume.
    #[error("volume `{volume}` requests mother `{mother}`, which does not exist")]
    UnknownMother {
        /// Volume being linked.
        volume: String,
        /// Requested mother.
        mother: String,
    },

    /// Mother chain loops back on itself.
    #[error("cycle in mother chain: {}", join_path(.path))]
    MotherCycle {
        /// Volumes on the cycle, first repeated at the end.
        path: Vec<String>,
    },

    /// Boolean operands reference each other in a loop.
    #[error("cycle through boolean operands: {}", join_path(.path))]
    CsgCycle {
        /// Volumes on the cycle, first repeated at the end.
        path: Vec<String>,
    },

    /// A boolean operand does not resolve to a registered volume.
    #[error("boolean volume `{volume}` uses operand `{operand}`, which does not exist")]
    UnknownOperand {
        /// Boolean volume.
        volume: String,
        /// Missing operand.
        operand: String,
    },

    /// Boolean combinator tag not recognized.
    #[error("boolean volume `{volume}`: unknown operator `{tag}` (expected union, subtract or intersect)")]
    UnknownBooleanOp {
        /// Boolean volume.
        volume: String,
        /// Offending tag.
        tag: String,
    },

    /// A volume ended up without any placement.
    #[error("volume `{0}` has an empty transform list")]
    EmptyTransforms(String),

    /// Paired rotation and translation lists cannot be matched.
    #[error("volume `{volume}`: {rotations} rotations and {translations} translations cannot be paired")]
    TransformLengthMismatch {
        /// Volume name.
        volume: String,
        /// Rotation count.
        rotations: usize,
        /// Translation count.
        translations: usize,
    },

    /// A placement or schedule rotation is not a proper rotation.
    #[error("volume `{volume}`, entry {index}: {source}")]
    InvalidRotation {
        /// Volume name.
        volume: String,
        /// Index of the offending transform.
        index: usize,
        /// Defect details.
        #[source]
        source: MathError,
    },

    /// Repeater parameters that produce no usable instance.
    #[error("invalid repeater: {0}")]
    InvalidRepeater(String),

    /// Repetition index past the configured count.
    #[error("volume `{volume}` has {count} repetition(s); index {index} is out of range")]
    RepetitionOutOfRange {
        /// Volume name.
        volume: String,
        /// Requested index.
        index: usize,
        /// Number of configured transforms.
        count: usize,
    },

    /// A repetition name that does not follow `<volume>_rep_<index>`.
    #[error("malformed repetition name `{0}` (expected `<volume>_rep_<index>`)")]
    MalformedRepetitionName(String),

    /// Repetition name belongs to another volume.
    #[error("repetition `{name}` does not belong to volume `{volume}`")]
    ForeignRepetition {
        /// Repetition name.
        name: String,
        /// Volume that was asked.
        volume: String,
    },

    /// Voxel material intervals overlap after sorting.
    #[error("voxel material intervals [{lower_a}, {upper_a}) and [{lower_b}, {upper_b}) overlap")]
    OverlappingIntervals {
        /// Lower bound of the first interval.
        lower_a: f64,
        /// Upper bound of the first interval.
        upper_a: f64,
        /// Lower bound of the second interval.
        lower_b: f64,
        /// Upper bound of the second interval.
        upper_b: f64,
    },

    /// A voxel material interval with `lower >= upper` or non-finite bounds.
    #[error("voxel material interval [{lower}, {upper}) for `{material}` is empty or not finite")]
    EmptyInterval {
        /// Lower bound.
        lower: f64,
        /// Upper bound.
        upper: f64,
        /// Material name.
        material: String,
    },

    /// Scalar field whose value count or geometry is inconsistent.
    #[error("invalid scalar field: {0}")]
    InvalidField(String),

    /// A dynamic schedule does not have one entry per run.
    #[error("volume `{volume}`: dynamic schedule has {actual} entries but {expected} runs are configured")]
    ScheduleLengthMismatch {
        /// Volume name.
        volume: String,
        /// Configured run count.
        expected: usize,
        /// Entries supplied.
        actual: usize,
    },

    /// A dynamic schedule moves a placement to a non-finite position.
    #[error("volume `{volume}`: translation for run {run} is not finite")]
    NonFiniteTranslation {
        /// Volume name.
        volume: String,
        /// Run whose entry is not finite.
        run: usize,
    },

    /// Whole-volume schedule on a volume with several repetitions.
    #[error("volume `{volume}` has {repetitions} repetitions; its dynamic schedule needs an explicit repetition index")]
    AmbiguousSchedule {
        /// Volume name.
        volume: String,
        /// Number of repetitions.
        repetitions: usize,
    },

    /// Voxel field schedule attached to a volume that is not voxelized.
    #[error("volume `{0}` is not voxelized and cannot swap voxel fields")]
    NotVoxelized(String),

    /// Runs were requested before dynamic schedules were validated.
    #[error("dynamic schedules must be validated before the first run")]
    DynamicsNotValidated,

    /// Run index past the configured run intervals.
    #[error("run {run} requested but only {runs} run interval(s) are configured")]
    RunOutOfRange {
        /// Requested run.
        run: usize,
        /// Configured run count.
        runs: usize,
    },

    /// The world volume cannot be removed or re-parented.
    #[error("the world volume `{0}` cannot be removed or given a mother")]
    WorldIsFixed(String),

    /// Removing a volume that still has daughters.
    #[error("volume `{volume}` still has daughters: {}", .children.join(", "))]
    HasChildren {
        /// Volume name.
        volume: String,
        /// Daughter names.
        children: Vec<String>,
    },

    /// Removing a volume still used as a boolean operand.
    #[error("volume `{volume}` is an operand of boolean volume `{used_by}`")]
    OperandInUse {
        /// Operand volume.
        volume: String,
        /// Boolean volume using it.
        used_by: String,
    },

    /// Daughter placed inside a volume that is never placed itself.
    #[error("volume `{volume}` is placed in `{mother}`, which has no physical placement")]
    MotherNotPlaced {
        /// Daughter name.
        volume: String,
        /// Mother name.
        mother: String,
    },

    /// A shape failed validation or the solid factory failed.
    #[error("volume `{volume}`: {source}")]
    Solid {
        /// Volume name.
        volume: String,
        /// Underlying error.
        #[source]
        source: SolidError,
    },

    /// The geometry engine refused an operation.
    #[error("engine error for `{name}`: {reason}")]
    Engine {
        /// Placement or volume name.
        name: String,
        /// Engine message.
        reason: String,
    },

    /// Settings failed validation.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// Settings file could not be parsed.
    #[error("failed to parse settings: {0}")]
    SettingsParse(#[from] toml::de::Error),

    /// Settings file could not be read.
    #[error("failed to read {path}: {source}")]
    SettingsIo {
        /// File path.
        path: PathBuf,
        /// I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Scene document that cannot be turned into a tree.
    #[error("invalid scene document: {0}")]
    InvalidDocument(String),

    /// Transform algebra failure outside a specific volume entry.
    #[error(transparent)]
    Math(#[from] MathError),
}

/// Failure to write a debug side artifact; never fatal.
#[derive(Error, Debug)]
pub enum PersistError {
    /// File system error.
    #[error("failed to write {path}: {source}")]
    Io {
        /// Target path.
        path: PathBuf,
        /// I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Serialization error.
    #[error("failed to encode {path}: {source}")]
    Json {
        /// Target path.
        path: PathBuf,
        /// JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for scene operations.
pub type Result<T> = std::result::Result<T, SceneError>;
