//! Runtime configuration for calibration and the real-time loop.
//!
//! Every section deserializes with defaults, so a JSON file only has to name
//! the values it changes.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::render_setup::BowlConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurroundViewConfig {
    pub camera_count: usize,
    pub cam_width: u32,
    pub cam_height: u32,
    /// Folder holding one calibration record per camera.
    pub calib_folder: PathBuf,
    pub calibration: CalibrationConfig,
    pub pipeline: PipelineConfig,
    pub render: RenderConfig,
}

impl Default for SurroundViewConfig {
    fn default() -> Self {
        Self {
            camera_count: 4,
            cam_width: 1280,
            cam_height: 720,
            calib_folder: PathBuf::from("calibparams"),
            calibration: CalibrationConfig::default(),
            pipeline: PipelineConfig::default(),
            render: RenderConfig::default(),
        }
    }
}

impl SurroundViewConfig {
    pub fn from_json_file(path: &str) -> Result<Self, crate::error::CalibrationError> {
        crate::io::object_from_json(path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub gamma_exponent: f32,
    pub clahe_clip_limit: f32,
    /// Number of CLAHE tiles along each image axis.
    pub contrast_tile_size: u32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            gamma_exponent: 0.45,
            clahe_clip_limit: 2.0,
            contrast_tile_size: 8,
        }
    }
}

/// Dense keypoint detector tuned for weak-texture road scenes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeypointConfig {
    pub max_features: usize,
    pub octave_layers: usize,
    pub contrast_threshold: f32,
    pub edge_threshold: f32,
    pub sigma: f32,
}

impl Default for KeypointConfig {
    fn default() -> Self {
        Self {
            max_features: 5000,
            octave_layers: 3,
            contrast_threshold: 0.03,
            edge_threshold: 10.0,
            sigma: 1.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Nearest neighbour is accepted when `d1 < (1 - match_conf) * d2`.
    pub match_conf: f32,
    /// RANSAC inlier threshold in pixels.
    pub ransac_threshold: f64,
    pub ransac_iterations: usize,
    pub min_inliers: usize,
    pub seed: u64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            match_conf: 0.3,
            ransac_threshold: 3.0,
            ransac_iterations: 500,
            min_inliers: 6,
            seed: 1_234_567,
        }
    }
}

/// What to do when fewer than `min_confident_pairs` camera pairs are confident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Log a warning and calibrate with degraded accuracy.
    Warn,
    /// Fail the attempt with an overlap error.
    Strict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleConfig {
    pub enabled: bool,
    pub max_iterations: usize,
    /// Huber loss scale on the ray residual, zero disables the robust loss.
    pub huber_scale: f64,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_iterations: 100,
            huber_scale: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub preprocess: PreprocessConfig,
    pub keypoints: KeypointConfig,
    pub matcher: MatcherConfig,
    /// Pairs below this confidence are ignored by refinement.
    pub confidence_threshold: f64,
    pub overlap_policy: OverlapPolicy,
    pub min_confident_pairs: usize,
    pub bundle: BundleConfig,
    pub wave_correction: bool,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            preprocess: PreprocessConfig::default(),
            keypoints: KeypointConfig::default(),
            matcher: MatcherConfig::default(),
            confidence_threshold: 1.0,
            overlap_policy: OverlapPolicy::Warn,
            min_confident_pairs: 4,
            bundle: BundleConfig::default(),
            wave_correction: true,
        }
    }
}

/// Queueing behaviour of the maintenance worker pool once `capacity` jobs
/// are in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum OverflowPolicy {
    Unbounded,
    Block { capacity: usize },
    Drop { capacity: usize },
}

/// How Initializing obtains camera geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitMode {
    /// The stitcher loads persisted calibration records.
    FromFile,
    /// Run the feature-based estimator on captured frames.
    Calibrate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub worker_threads: usize,
    pub overflow: OverflowPolicy,
    pub gain_interval_ms: u64,
    pub luminance_interval_ms: u64,
    pub capture_backoff_ms: u64,
    pub max_consecutive_capture_failures: usize,
    /// Negative: unlimited, zero: skip initialization, positive: attempt budget.
    pub init_iterations: i64,
    pub init_mode: InitMode,
    /// Persist the records produced by `InitMode::Calibrate`.
    pub persist_calibration: bool,
    pub object_detection: bool,
    pub render_pause_ms: u64,
    pub job_cooldown_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            overflow: OverflowPolicy::Unbounded,
            gain_interval_ms: 2000,
            luminance_interval_ms: 1000,
            capture_backoff_ms: 1,
            max_consecutive_capture_failures: 100,
            init_iterations: -1,
            init_mode: InitMode::FromFile,
            persist_calibration: false,
            object_detection: false,
            render_pause_ms: 3,
            job_cooldown_ms: 1,
        }
    }
}

impl PipelineConfig {
    pub fn gain_interval(&self) -> Duration {
        Duration::from_millis(self.gain_interval_ms)
    }
    pub fn luminance_interval(&self) -> Duration {
        Duration::from_millis(self.luminance_interval_ms)
    }
    pub fn capture_backoff(&self) -> Duration {
        Duration::from_millis(self.capture_backoff_ms)
    }
    pub fn render_pause(&self) -> Duration {
        Duration::from_millis(self.render_pause_ms)
    }
    pub fn job_cooldown(&self) -> Duration {
        Duration::from_millis(self.job_cooldown_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderAssets {
    pub car_model: PathBuf,
    pub car_vert_shader: PathBuf,
    pub car_frag_shader: PathBuf,
    pub surround_vert_shader: PathBuf,
    pub surround_frag_shader: PathBuf,
    pub screen_vert_shader: PathBuf,
    pub screen_frag_shader: PathBuf,
    pub black_rect_vert_shader: PathBuf,
    pub black_rect_frag_shader: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub assets: RenderAssets,
    pub bowl: BowlConfig,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            assets: RenderAssets::default(),
            bowl: BowlConfig::default(),
        }
    }
}
