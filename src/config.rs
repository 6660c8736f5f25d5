use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_derive::{Deserialize, Serialize};

use crate::error::Error;
use crate::{TeamId, TrackId};

/// Axis-aligned pixel rectangle, right/bottom exclusive, clipped to the frame when applied.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct PixelRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl PixelRect {
    /// Full-height strip covering columns `left..right`.
    pub fn columns(left: u32, right: u32) -> Self {
        Self {
            left,
            top: 0,
            right,
            bottom: u32::MAX,
        }
    }
}

/// How the per-frame drift is picked from the tracked feature displacements.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriftSelection {
    /// The single most displaced feature.
    MaxDisplacement,
    /// The median (by magnitude) of the `k` most displaced features.
    MedianOfTopK { k: usize },
}

/// How recorded drift is applied to positions.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentMode {
    /// Subtract the drift recorded for the frame itself.
    PerFrame,
    /// Subtract the running sum of drift from frame 0 up to the frame.
    Cumulative,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CameraMotionConfig {
    /// Displacement in pixels a frame needs before it counts as camera motion.
    pub min_distance: f32,
    /// Regions where background features are searched.
    pub mask_regions: Vec<PixelRect>,
    pub max_corners: usize,
    pub quality_level: f32,
    pub min_feature_distance: f32,
    pub block_size: usize,
    /// Full optical flow window width in pixels.
    pub win_size: usize,
    pub max_level: usize,
    pub max_iterations: usize,
    pub epsilon: f32,
    pub drift_selection: DriftSelection,
    pub adjustment: AdjustmentMode,
}

impl Default for CameraMotionConfig {
    fn default() -> Self {
        Self {
            min_distance: 5.0,
            mask_regions: vec![PixelRect::columns(0, 20), PixelRect::columns(900, 1050)],
            max_corners: 100,
            quality_level: 0.3,
            min_feature_distance: 3.0,
            block_size: 7,
            win_size: 15,
            max_level: 2,
            max_iterations: 10,
            epsilon: 0.03,
            drift_selection: DriftSelection::MaxDisplacement,
            adjustment: AdjustmentMode::PerFrame,
        }
    }
}

/// Four pixel points and the field-plane points (meters) they correspond to, in the same order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct FieldCalibration {
    pub pixel_vertices: [[f32; 2]; 4],
    pub field_vertices: [[f32; 2]; 4],
}

impl Default for FieldCalibration {
    fn default() -> Self {
        let width = 68.0;
        let length = 23.32;

        Self {
            pixel_vertices: [[110.0, 1035.0], [265.0, 275.0], [910.0, 260.0], [1640.0, 915.0]],
            field_vertices: [[0.0, width], [0.0, 0.0], [length, 0.0], [length, width]],
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct KinematicsConfig {
    pub frame_rate: f32,
    /// Frames per speed measurement window.
    pub window: usize,
    pub include_referees: bool,
}

impl Default for KinematicsConfig {
    fn default() -> Self {
        Self {
            frame_rate: 24.0,
            window: 5,
            include_referees: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TeamConfig {
    /// Identities forced onto a team regardless of jersey color.
    pub overrides: BTreeMap<TrackId, TeamId>,
    pub seed: u64,
    /// Restarts when clustering jersey colors into teams.
    pub n_init: usize,
    /// Restarts when separating a jersey from its background.
    pub jersey_n_init: usize,
    pub max_iterations: usize,
}

impl Default for TeamConfig {
    fn default() -> Self {
        let mut overrides = BTreeMap::new();
        overrides.insert(91, 1);

        Self {
            overrides,
            seed: 0,
            n_init: 10,
            jersey_n_init: 1,
            max_iterations: 300,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PossessionConfig {
    pub max_player_ball_distance: f32,
}

impl Default for PossessionConfig {
    fn default() -> Self {
        Self {
            max_player_ball_distance: 70.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Stub directory; caching is off when unset.
    pub dir: Option<PathBuf>,
    pub read: bool,
    pub write: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            read: true,
            write: true,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub camera: CameraMotionConfig,
    pub field: FieldCalibration,
    pub kinematics: KinematicsConfig,
    pub team: TeamConfig,
    pub possession: PossessionConfig,
    pub cache: CacheConfig,
}

impl Config {
    pub fn from_json_str(raw: &str) -> Result<Self, Error> {
        let config: Config = serde_json::from_str(raw)?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |msg: &str| Err(Error::InvalidConfig(msg.to_string()));

        let cam = &self.camera;
        if cam.mask_regions.is_empty() {
            return invalid("camera.mask_regions must not be empty");
        }
        if cam
            .mask_regions
            .iter()
            .any(|r| r.right <= r.left || r.bottom <= r.top)
        {
            return invalid("camera.mask_regions entries must have positive area");
        }
        if cam.block_size < 3 || cam.win_size < 3 {
            return invalid("camera.block_size and camera.win_size must be at least 3");
        }
        if cam.max_corners == 0 {
            return invalid("camera.max_corners must be positive");
        }
        if !(cam.quality_level > 0.0 && cam.quality_level <= 1.0) {
            return invalid("camera.quality_level must be in (0, 1]");
        }
        if cam.max_iterations == 0 || cam.epsilon <= 0.0 {
            return invalid("camera.max_iterations and camera.epsilon must be positive");
        }
        if let DriftSelection::MedianOfTopK { k: 0 } = cam.drift_selection {
            return invalid("camera.drift_selection k must be positive");
        }

        if !(self.kinematics.frame_rate > 0.0) {
            return invalid("kinematics.frame_rate must be positive");
        }
        if self.kinematics.window == 0 {
            return invalid("kinematics.window must be positive");
        }

        if self.team.overrides.values().any(|&t| t != 1 && t != 2) {
            return invalid("team.overrides must map to team 1 or 2");
        }
        if self.team.n_init == 0 || self.team.jersey_n_init == 0 || self.team.max_iterations == 0 {
            return invalid("team clustering restarts and iterations must be positive");
        }

        if !(self.possession.max_player_ball_distance > 0.0) {
            return invalid("possession.max_player_ball_distance must be positive");
        }

        Ok(())
    }
}
