//! Voxelized volumes: a scalar field binned into named materials.
//!
//! A dense regular 3D field (already read by an image reader) is mapped to
//! integer labels through sorted half-open intervals `[lower, upper)`.
//! Label 0 always stands for the volume's default material; values that fall
//! outside every interval, or are not finite, get label 0.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;
use volscene_math::Vec3;
use volscene_solids::Shape;

use crate::error::{PersistError, Result, SceneError};

/// Dense scalar field on a regular grid, X fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarField {
    dims: [usize; 3],
    spacing: [f64; 3],
    origin: [f64; 3],
    values: Vec<f64>,
}

impl ScalarField {
    /// Build a field, checking that the value count matches `dims`.
    pub fn new(dims: [usize; 3], spacing: [f64; 3], origin: [f64; 3], values: Vec<f64>) -> Result<Self> {
        if dims.iter().any(|&n| n == 0) {
            return Err(SceneError::InvalidField(format!("dims {dims:?} has an empty axis")));
        }
        let expected = dims.iter().try_fold(1usize, |acc, &n| acc.checked_mul(n));
        if expected != Some(values.len()) {
            return Err(SceneError::InvalidField(format!(
                "dims {dims:?} need {} values, got {}",
                expected.map_or_else(|| "too many".to_string(), |n| n.to_string()),
                values.len()
            )));
        }
        if spacing.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(SceneError::InvalidField(format!("spacing {spacing:?} must be positive")));
        }
        if origin.iter().any(|o| !o.is_finite()) {
            return Err(SceneError::InvalidField(format!("origin {origin:?} is not finite")));
        }
        Ok(Self {
            dims,
            spacing,
            origin,
            values,
        })
    }

    /// Voxel counts along X, Y, Z.
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Voxel edge lengths.
    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    /// Position of the first voxel corner.
    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    /// Raw values, X fastest.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of voxels.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the field holds no voxel.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Full physical extent of the grid.
    pub fn extent(&self) -> [f64; 3] {
        [
            self.dims[0] as f64 * self.spacing[0],
            self.dims[1] as f64 * self.spacing[1],
            self.dims[2] as f64 * self.spacing[2],
        ]
    }

    /// True if `other` lies on the same grid.
    pub fn same_grid(&self, other: &ScalarField) -> bool {
        self.dims == other.dims && self.spacing == other.spacing
    }
}

/// Half-open value interval `[lower, upper)` mapped to a material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialInterval {
    /// Inclusive lower bound.
    pub lower: f64,
    /// Exclusive upper bound.
    pub upper: f64,
    /// Material assigned to values in range.
    pub material: String,
}

impl MaterialInterval {
    /// Interval `[lower, upper) -> material`.
    pub fn new(lower: f64, upper: f64, material: impl Into<String>) -> Self {
        Self {
            lower,
            upper,
            material: material.into(),
        }
    }
}

/// Integer labels on the same grid as the source field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelField {
    /// Voxel counts along X, Y, Z.
    pub dims: [usize; 3],
    /// Voxel edge lengths.
    pub spacing: [f64; 3],
    /// Position of the first voxel corner.
    pub origin: [f64; 3],
    /// Material of each label, indexed by label; entry 0 is the default.
    pub materials: Vec<String>,
    /// One label per voxel, X fastest.
    pub labels: Vec<u32>,
}

impl LabelField {
    /// `{material: label}` table.
    pub fn material_table(&self) -> BTreeMap<String, u32> {
        self.materials
            .iter()
            .enumerate()
            .map(|(label, material)| (material.clone(), label as u32))
            .collect()
    }

    /// Material behind `label`.
    pub fn material(&self, label: u32) -> Option<&str> {
        self.materials.get(label as usize).map(String::as_str)
    }

    /// Label of voxel `(i, j, k)`.
    pub fn label_at(&self, i: usize, j: usize, k: usize) -> Option<u32> {
        if i >= self.dims[0] || j >= self.dims[1] || k >= self.dims[2] {
            return None;
        }
        let index = i + self.dims[0] * (j + self.dims[1] * k);
        self.labels.get(index).copied()
    }

    /// Voxel count per label.
    pub fn histogram(&self) -> Vec<usize> {
        let mut counts = vec![0; self.materials.len()];
        for &label in &self.labels {
            if let Some(count) = counts.get_mut(label as usize) {
                *count += 1;
            }
        }
        counts
    }
}

/// Bin `field` into labels.
///
/// Intervals are sorted by lower bound and rejected if any two overlap,
/// before a single voxel is labeled. Materials get labels in first-seen
/// order after sorting; an interval naming `default_material` maps to 0.
pub fn compute_labels(
    field: &ScalarField,
    intervals: &[MaterialInterval],
    default_material: &str,
) -> Result<LabelField> {
    let sorted = sorted_intervals(intervals)?;

    let mut materials = vec![default_material.to_string()];
    let mut edges = Vec::with_capacity(sorted.len() * 2);
    let mut edge_labels = Vec::with_capacity(sorted.len() * 2);
    for (i, interval) in sorted.iter().enumerate() {
        let label = match materials.iter().position(|m| *m == interval.material) {
            Some(label) => label as u32,
            None => {
                materials.push(interval.material.clone());
                (materials.len() - 1) as u32
            }
        };
        edges.push(interval.lower);
        edge_labels.push(label);
        // gap (or end of table) after this interval
        if sorted.get(i + 1).map_or(true, |next| next.lower != interval.upper) {
            edges.push(interval.upper);
            edge_labels.push(0);
        }
    }

    let labels: Vec<u32> = field
        .values
        .par_iter()
        .map(|&value| digitize(value, &edges, &edge_labels))
        .collect();

    debug!(
        voxels = labels.len(),
        materials = materials.len(),
        edges = edges.len(),
        "computed label field"
    );

    Ok(LabelField {
        dims: field.dims,
        spacing: field.spacing,
        origin: field.origin,
        materials,
        labels,
    })
}

/// Sort intervals by lower bound, rejecting empty or overlapping ones.
fn sorted_intervals(intervals: &[MaterialInterval]) -> Result<Vec<&MaterialInterval>> {
    for interval in intervals {
        if !(interval.lower.is_finite() && interval.upper.is_finite() && interval.lower < interval.upper) {
            return Err(SceneError::EmptyInterval {
                lower: interval.lower,
                upper: interval.upper,
                material: interval.material.clone(),
            });
        }
    }

    let mut sorted: Vec<&MaterialInterval> = intervals.iter().collect();
    sorted.sort_by(|a, b| a.lower.total_cmp(&b.lower));
    for pair in sorted.windows(2) {
        if pair[1].lower < pair[0].upper {
            return Err(SceneError::OverlappingIntervals {
                lower_a: pair[0].lower,
                upper_a: pair[0].upper,
                lower_b: pair[1].lower,
                upper_b: pair[1].upper,
            });
        }
    }
    Ok(sorted)
}

fn digitize(value: f64, edges: &[f64], edge_labels: &[u32]) -> u32 {
    if !value.is_finite() {
        return 0;
    }
    match edges.partition_point(|edge| *edge <= value) {
        0 => 0,
        bin => edge_labels[bin - 1],
    }
}

/// Field plus material intervals, with the label field computed on demand.
///
/// Changing the field, the intervals or the default material drops the
/// cached labels; they are recomputed on the next request.
#[derive(Debug, Clone)]
pub struct VoxelizedVolume {
    field: ScalarField,
    intervals: Vec<MaterialInterval>,
    default_material: String,
    cache: Option<LabelField>,
}

impl VoxelizedVolume {
    /// Voxelized volume with `default_material` as label 0.
    pub fn new(
        field: ScalarField,
        intervals: Vec<MaterialInterval>,
        default_material: impl Into<String>,
    ) -> Self {
        Self {
            field,
            intervals,
            default_material: default_material.into(),
            cache: None,
        }
    }

    /// Source field.
    pub fn field(&self) -> &ScalarField {
        &self.field
    }

    /// Material intervals as given.
    pub fn intervals(&self) -> &[MaterialInterval] {
        &self.intervals
    }

    /// Material of label 0.
    pub fn default_material(&self) -> &str {
        &self.default_material
    }

    /// Replace the field.
    pub fn set_field(&mut self, field: ScalarField) {
        self.field = field;
        self.cache = None;
    }

    /// Replace the intervals.
    pub fn set_intervals(&mut self, intervals: Vec<MaterialInterval>) {
        self.intervals = intervals;
        self.cache = None;
    }

    /// Replace the default material.
    pub fn set_default_material(&mut self, material: impl Into<String>) {
        self.default_material = material.into();
        self.cache = None;
    }

    /// Reject empty or overlapping intervals without labeling any voxel.
    pub fn check_intervals(&self) -> Result<()> {
        sorted_intervals(&self.intervals).map(|_| ())
    }

    /// Labels for the current inputs, computed if stale.
    pub fn labels(&mut self) -> Result<&LabelField> {
        let labels = match self.cache.take() {
            Some(labels) => labels,
            None => compute_labels(&self.field, &self.intervals, &self.default_material)?,
        };
        Ok(self.cache.insert(labels))
    }

    /// Cached labels, if they are up to date.
    pub fn cached_labels(&self) -> Option<&LabelField> {
        self.cache.as_ref()
    }

    /// Box-shaped grid container for the solid factory.
    pub fn container_shape(&self) -> Shape {
        let [sx, sy, sz] = self.field.spacing;
        Shape::VoxelGrid {
            dims: self.field.dims,
            spacing: Vec3::new(sx, sy, sz),
        }
    }
}

/// Write `<stem>_labels.json` (`{material: label}`) and
/// `<stem>_label_field.json` into `dir`.
pub fn write_label_outputs(
    labels: &LabelField,
    dir: &Path,
    stem: &str,
) -> std::result::Result<Vec<PathBuf>, PersistError> {
    std::fs::create_dir_all(dir).map_err(|source| PersistError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let table_path = dir.join(format!("{stem}_labels.json"));
    write_json(&table_path, &labels.material_table())?;
    let field_path = dir.join(format!("{stem}_label_field.json"));
    write_json(&field_path, labels)?;
    Ok(vec![table_path, field_path])
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> std::result::Result<(), PersistError> {
    let text = serde_json::to_string_pretty(value).map_err(|source| PersistError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, text).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })
}
