//! Scene settings, loaded from TOML or defaulted.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use volscene_math::Tolerance;

use crate::error::{Result, SceneError};

/// Name of the root volume when none is configured.
pub const DEFAULT_WORLD_NAME: &str = "world";

/// Root volume settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldSettings {
    /// Name daughters use to refer to the root.
    pub name: String,
    /// Full edge lengths of the world box in mm.
    pub size: [f64; 3],
    /// Material filling the world.
    pub material: String,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_WORLD_NAME.to_string(),
            size: [3000.0, 3000.0, 3000.0],
            material: "G4_AIR".to_string(),
        }
    }
}

/// Whether a single rotation or translation may be paired with a longer list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastPolicy {
    /// Repeat a length-1 list to the length of its partner.
    Allow,
    /// Require both lists to have the same length.
    Deny,
}

/// Settings governing scene construction.
///
/// ```toml
/// rotation_tolerance = 1e-6
/// run_intervals = [[0.0, 1.0], [1.0, 2.0]]
/// broadcast = "deny"
///
/// [world]
/// name = "world"
/// size = [2000.0, 2000.0, 2000.0]
/// material = "G4_AIR"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneSettings {
    /// Root volume.
    pub world: WorldSettings,
    /// Tolerance for rotation validity checks.
    pub rotation_tolerance: f64,
    /// Run timing intervals `[start, end]` in seconds; one dynamic
    /// schedule entry is expected per interval.
    pub run_intervals: Vec<[f64; 2]>,
    /// Pairing rule for rotation/translation lists of different lengths.
    pub broadcast: BroadcastPolicy,
    /// Where label fields of voxelized volumes are written, if anywhere.
    pub label_output_dir: Option<PathBuf>,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            world: WorldSettings::default(),
            rotation_tolerance: Tolerance::DEFAULT.rotation,
            run_intervals: vec![[0.0, 1.0]],
            broadcast: BroadcastPolicy::Allow,
            label_output_dir: None,
        }
    }
}

impl SceneSettings {
    /// Parse and validate settings from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings: SceneSettings = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read, parse and validate a settings file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| SceneError::SettingsIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Number of configured run intervals.
    pub fn run_count(&self) -> usize {
        self.run_intervals.len()
    }

    /// Check settings for consistency.
    pub fn validate(&self) -> Result<()> {
        if self.world.name.trim().is_empty() {
            return Err(SceneError::InvalidSettings("world name is empty".to_string()));
        }
        if self.world.name.contains("_rep_") {
            return Err(SceneError::InvalidSettings(format!(
                "world name `{}` must not contain `_rep_`",
                self.world.name
            )));
        }
        if self.world.size.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(SceneError::InvalidSettings(format!(
                "world size {:?} must be positive",
                self.world.size
            )));
        }
        if !self.rotation_tolerance.is_finite() || self.rotation_tolerance <= 0.0 {
            return Err(SceneError::InvalidSettings(format!(
                "rotation tolerance {} must be positive",
                self.rotation_tolerance
            )));
        }
        if self.run_intervals.is_empty() {
            return Err(SceneError::InvalidSettings(
                "at least one run interval is required".to_string(),
            ));
        }
        for (i, [start, end]) in self.run_intervals.iter().enumerate() {
            if !(start.is_finite() && end.is_finite() && start < end) {
                return Err(SceneError::InvalidSettings(format!(
                    "run interval {i} [{start}, {end}] is empty"
                )));
            }
        }
        for (i, pair) in self.run_intervals.windows(2).enumerate() {
            if pair[1][0] < pair[0][1] {
                return Err(SceneError::InvalidSettings(format!(
                    "run interval {} starts at {} before interval {} ends at {}",
                    i + 1,
                    pair[1][0],
                    i,
                    pair[0][1]
                )));
            }
        }
        Ok(())
    }
}
