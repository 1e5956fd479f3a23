//! Repetition naming and closed-form transform generators.

use std::f64::consts::TAU;

use volscene_math::{axis_direction, Rotation, Transform, Vec3};

use crate::error::{Result, SceneError};

const REP_SEPARATOR: &str = "_rep_";

/// Canonical name of instance `index` of `volume`: `<volume>_rep_<index>`.
pub fn repetition_name(volume: &str, index: usize) -> String {
    format!("{volume}{REP_SEPARATOR}{index}")
}

/// Split a repetition name back into `(volume, index)`.
pub fn parse_repetition_name(name: &str) -> Result<(&str, usize)> {
    let malformed = || SceneError::MalformedRepetitionName(name.to_string());
    let (volume, digits) = name.rsplit_once(REP_SEPARATOR).ok_or_else(malformed)?;
    if volume.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    let index = digits.parse::<usize>().map_err(|_| malformed())?;
    Ok((volume, index))
}

/// Index encoded in a repetition name.
pub fn repetition_index(name: &str) -> Result<usize> {
    parse_repetition_name(name).map(|(_, index)| index)
}

/// Closed-form description of a family of placements.
#[derive(Debug, Clone, PartialEq)]
pub enum Repeater {
    /// Transforms given one by one.
    Explicit(Vec<Transform>),
    /// `nx * ny * nz` copies on a regular grid, centered on the origin
    /// unless `start` is given.
    Grid {
        /// Counts along X, Y, Z.
        counts: [usize; 3],
        /// Spacing along X, Y, Z.
        spacing: Vec3,
        /// Position of the first copy; centered when `None`.
        start: Option<Vec3>,
        /// Rotation shared by every copy.
        rotation: Rotation,
    },
    /// Copies on a ring about `axis` through the origin.
    Ring {
        /// Number of copies.
        count: usize,
        /// Translation of the copy at angle zero.
        base: Vec3,
        /// Rotation axis (normalized internally).
        axis: Vec3,
        /// Angle of the first copy, radians.
        start_angle: f64,
        /// Angular step, radians; `2π / count` when `None`.
        angle_step: Option<f64>,
    },
    /// Copies along a line.
    Linear {
        /// Number of copies.
        count: usize,
        /// Offset between consecutive copies.
        offset: Vec3,
        /// Position of the first copy.
        start: Vec3,
    },
}

impl Repeater {
    /// Centered grid with identity rotations.
    pub fn grid(counts: [usize; 3], spacing: Vec3) -> Self {
        Repeater::Grid {
            counts,
            spacing,
            start: None,
            rotation: Rotation::identity(),
        }
    }

    /// Full ring of `count` copies about `axis`, starting at angle zero.
    pub fn ring(count: usize, base: Vec3, axis: Vec3) -> Self {
        Repeater::Ring {
            count,
            base,
            axis,
            start_angle: 0.0,
            angle_step: None,
        }
    }

    /// Number of transforms [`Repeater::expand`] produces.
    pub fn len(&self) -> usize {
        match self {
            Repeater::Explicit(list) => list.len(),
            Repeater::Grid { counts, .. } => counts.iter().product(),
            Repeater::Ring { count, .. } | Repeater::Linear { count, .. } => *count,
        }
    }

    /// True if the repeater produces no transform.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Materialize the transform list.
    pub fn expand(&self) -> Result<Vec<Transform>> {
        if self.is_empty() {
            return Err(SceneError::InvalidRepeater(format!(
                "{self:?} produces no placement"
            )));
        }
        match self {
            Repeater::Explicit(list) => Ok(list.clone()),
            Repeater::Grid {
                counts,
                spacing,
                start,
                rotation,
            } => {
                if spacing.iter().any(|s| !s.is_finite()) {
                    return Err(SceneError::InvalidRepeater(format!(
                        "grid spacing {spacing:?} is not finite"
                    )));
                }
                if start.is_some_and(|s| s.iter().any(|v| !v.is_finite())) {
                    return Err(SceneError::InvalidRepeater(format!(
                        "grid start {start:?} is not finite"
                    )));
                }
                let first = start.unwrap_or_else(|| {
                    Vec3::new(
                        -((counts[0] - 1) as f64) * spacing.x / 2.0,
                        -((counts[1] - 1) as f64) * spacing.y / 2.0,
                        -((counts[2] - 1) as f64) * spacing.z / 2.0,
                    )
                });
                let mut out = Vec::with_capacity(self.len());
                for i in 0..counts[0] {
                    for j in 0..counts[1] {
                        for k in 0..counts[2] {
                            let offset = Vec3::new(
                                i as f64 * spacing.x,
                                j as f64 * spacing.y,
                                k as f64 * spacing.z,
                            );
                            out.push(Transform {
                                rotation: *rotation,
                                translation: first + offset,
                            });
                        }
                    }
                }
                Ok(out)
            }
            Repeater::Ring {
                count,
                base,
                axis,
                start_angle,
                angle_step,
            } => {
                let axis = axis_direction(axis)?;
                let step = angle_step.unwrap_or(TAU / *count as f64);
                if !step.is_finite() || !start_angle.is_finite() {
                    return Err(SceneError::InvalidRepeater(format!(
                        "ring angles start={start_angle} step={step} are not finite"
                    )));
                }
                Ok((0..*count)
                    .map(|i| Transform::orbiting(base, &axis, start_angle + i as f64 * step))
                    .collect())
            }
            Repeater::Linear {
                count,
                offset,
                start,
            } => Ok((0..*count)
                .map(|i| Transform::from_translation(start + offset * i as f64))
                .collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn repetition_name_roundtrip() {
        for name in ["crystal", "a_rep_b", "x", "module_rep_"] {
            for i in [0, 1, 17, 12345] {
                let rep = repetition_name(name, i);
                assert_eq!(repetition_index(&rep).unwrap(), i);
                assert_eq!(parse_repetition_name(&rep).unwrap().0, name);
            }
        }
    }

    #[test]
    fn malformed_repetition_names() {
        for bad in ["crystal", "crystal_rep_", "_rep_3", "crystal_rep_-1", "crystal_rep_x2", "crystal_rep_ 3"] {
            assert!(
                matches!(repetition_index(bad), Err(SceneError::MalformedRepetitionName(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn grid_2x3x1() {
        let transforms = Repeater::grid([2, 3, 1], Vec3::new(10.0, 10.0, 10.0))
            .expand()
            .unwrap();
        assert_eq!(transforms.len(), 6);
        let mut xs: Vec<f64> = transforms.iter().map(|t| t.translation.x).collect();
        let mut ys: Vec<f64> = transforms.iter().map(|t| t.translation.y).collect();
        xs.dedup();
        ys.sort_by(f64::total_cmp);
        ys.dedup();
        assert_eq!(xs, vec![-5.0, 5.0]);
        assert_eq!(ys, vec![-10.0, 0.0, 10.0]);
        for t in &transforms {
            assert_eq!(t.translation.z, 0.0);
            assert_eq!(t.rotation, Rotation::identity());
        }
        let sum: Vec3 = transforms.iter().map(|t| t.translation).sum();
        assert_abs_diff_eq!(sum.norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn grid_with_explicit_start() {
        let transforms = Repeater::Grid {
            counts: [3, 1, 1],
            spacing: Vec3::new(2.0, 0.0, 0.0),
            start: Some(Vec3::new(1.0, 1.0, 1.0)),
            rotation: Rotation::identity(),
        }
        .expand()
        .unwrap();
        assert_eq!(transforms[2].translation, Vec3::new(5.0, 1.0, 1.0));
    }

    #[test]
    fn grid_carries_rotation_unchecked() {
        let reflection = Rotation::identity() * -1.0;
        let transforms = Repeater::Grid {
            counts: [2, 1, 1],
            spacing: Vec3::new(1.0, 1.0, 1.0),
            start: None,
            rotation: reflection,
        }
        .expand()
        .unwrap();
        assert!(transforms.iter().all(|t| t.rotation == reflection));
    }

    #[test]
    fn ring_of_four() {
        let transforms = Repeater::ring(4, Vec3::new(1.0, 0.0, 0.0), Vec3::z())
            .expand()
            .unwrap();
        assert_eq!(transforms.len(), 4);
        let expected = [(1.0, 0.0), (0.0, 1.0), (-1.0, 0.0), (0.0, -1.0)];
        for (i, (t, (x, y))) in transforms.iter().zip(expected).enumerate() {
            assert_abs_diff_eq!(t.translation.x, x, epsilon = 1e-12);
            assert_abs_diff_eq!(t.translation.y, y, epsilon = 1e-12);
            assert_abs_diff_eq!(t.translation.z, 0.0, epsilon = 1e-12);
            let angle = i as f64 * FRAC_PI_2;
            let expected_rot = Transform::rotation_z(angle).rotation;
            assert_abs_diff_eq!((t.rotation - expected_rot).amax(), 0.0, epsilon = 1e-12);
            // translation is the base vector rotated by the same rotation
            let rotated = t.rotation * Vec3::new(1.0, 0.0, 0.0);
            assert_abs_diff_eq!((rotated - t.translation).norm(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn ring_with_start_and_step() {
        let transforms = Repeater::Ring {
            count: 3,
            base: Vec3::new(0.0, 2.0, 0.0),
            axis: Vec3::x(),
            start_angle: FRAC_PI_2,
            angle_step: Some(FRAC_PI_2),
        }
        .expand()
        .unwrap();
        // 90° about X sends +Y to +Z
        assert_abs_diff_eq!(transforms[0].translation.z, 2.0, epsilon = 1e-12);
        // 180° sends it to -Y
        assert_abs_diff_eq!(transforms[1].translation.y, -2.0, epsilon = 1e-12);
    }

    #[test]
    fn ring_with_zero_axis_fails() {
        let r = Repeater::ring(3, Vec3::x(), Vec3::zeros());
        assert!(matches!(r.expand(), Err(SceneError::Math(_))));
    }

    #[test]
    fn linear_copies() {
        let transforms = Repeater::Linear {
            count: 3,
            offset: Vec3::new(0.0, 0.0, 5.0),
            start: Vec3::new(1.0, 0.0, 0.0),
        }
        .expand()
        .unwrap();
        assert_eq!(transforms[2].translation, Vec3::new(1.0, 0.0, 10.0));
    }

    #[test]
    fn empty_repeaters_fail() {
        assert!(Repeater::grid([2, 0, 1], Vec3::new(1.0, 1.0, 1.0)).expand().is_err());
        assert!(Repeater::ring(0, Vec3::x(), Vec3::z()).expand().is_err());
        assert!(Repeater::Explicit(Vec::new()).expand().is_err());
    }
}
