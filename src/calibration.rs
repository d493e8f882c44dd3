//! Feature-based calibration of a rotation-only camera rig.
//!
//! A calibration attempt runs preprocessing, keypoint extraction, pairwise
//! matching, closed-form initialisation, bundle adjustment, wave correction
//! and scale selection. The result is committed only when every stage
//! succeeded; afterwards the estimator refuses to recalibrate and hands out
//! the committed result.

use std::ops::Deref;
use std::path::{Path, PathBuf};

use image::RgbImage;
use log::{info, warn};
use nalgebra as na;

use crate::config::{CalibrationConfig, OverlapPolicy};
use crate::detected_points::FeatureSet;
use crate::error::{CalibrationError, CalibrationResult};
use crate::features::{extract_features, match_pairs};
use crate::io::save_rig_calibration;
use crate::optimization::{initial_cameras, refine_cameras, wave_correct_horizontal};
use crate::types::{CameraParameters, RigCalibration};

pub use crate::optimization::median_scale;

pub struct CalibrationEstimator {
    camera_count: usize,
    config: CalibrationConfig,
    calib_folder: PathBuf,
    calibration: Option<RigCalibration>,
}

impl CalibrationEstimator {
    pub fn new<P: Into<PathBuf>>(
        camera_count: usize,
        config: CalibrationConfig,
        calib_folder: P,
    ) -> CalibrationEstimator {
        CalibrationEstimator {
            camera_count,
            config,
            calib_folder: calib_folder.into(),
            calibration: None,
        }
    }

    pub fn camera_count(&self) -> usize {
        self.camera_count
    }

    pub fn calib_folder(&self) -> &Path {
        &self.calib_folder
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_some()
    }

    pub fn calibration(&self) -> Option<&RigCalibration> {
        self.calibration.as_ref()
    }

    /// Calibrates the rig from one image per camera and optionally persists
    /// the records to the calibration folder.
    pub fn calibrate<I>(&mut self, images: &[I], persist: bool) -> CalibrationResult<RigCalibration>
    where
        I: Deref<Target = RgbImage> + Sync,
    {
        if let Some(prior) = &self.calibration {
            info!("rig already calibrated, keeping committed parameters");
            return Ok(prior.clone());
        }
        self.check_count(images.len())?;
        let features = extract_features(images, &self.config)?;
        self.calibrate_from_features(features, persist)
    }

    /// Same as [`CalibrationEstimator::calibrate`] for already extracted
    /// features.
    pub fn calibrate_from_features(
        &mut self,
        features: Vec<FeatureSet>,
        persist: bool,
    ) -> CalibrationResult<RigCalibration> {
        if let Some(prior) = &self.calibration {
            return Ok(prior.clone());
        }
        self.check_count(features.len())?;
        let rig = self.solve(&features)?;
        if persist {
            save_rig_calibration(&self.calib_folder, &rig)?;
        }
        log_calibration(&rig);
        self.calibration = Some(rig.clone());
        Ok(rig)
    }

    fn check_count(&self, got: usize) -> CalibrationResult<()> {
        if got > self.camera_count {
            return Err(CalibrationError::InputCount {
                got,
                expected: self.camera_count,
            });
        }
        Ok(())
    }

    fn solve(&self, features: &[FeatureSet]) -> CalibrationResult<RigCalibration> {
        let n = self.camera_count;
        let table = match_pairs(features, &self.config.matcher);
        if !table.is_complete(n) {
            return Err(CalibrationError::InsufficientOverlap(format!(
                "pairwise table holds {} of {} ordered camera pairs",
                table.pairs.len(),
                n * n
            )));
        }

        let confident = table.confident_pairs(self.config.confidence_threshold);
        if confident < self.config.min_confident_pairs {
            let msg = format!(
                "{} camera pairs above confidence {}, {} wanted",
                confident, self.config.confidence_threshold, self.config.min_confident_pairs
            );
            match self.config.overlap_policy {
                OverlapPolicy::Warn => warn!("{}, calibration accuracy may degrade", msg),
                OverlapPolicy::Strict => return Err(CalibrationError::InsufficientOverlap(msg)),
            }
        }

        let img_sizes: Vec<(u32, u32)> = features.iter().map(|f| f.img_w_h).collect();
        let (mut cameras, tree) = initial_cameras(&table, &img_sizes)?;
        info!("spanning tree centre is camera {}", tree.centre);

        if self.config.bundle.enabled {
            refine_cameras(
                &mut cameras,
                features,
                &table,
                tree.centre,
                self.config.confidence_threshold,
                &self.config.bundle,
            )?;
        }

        let mut rotations: Vec<na::Matrix3<f64>> = cameras
            .iter()
            .map(|c| na::Rotation3::from_matrix(&c.rotation).into_inner())
            .collect();
        if self.config.wave_correction {
            wave_correct_horizontal(&mut rotations);
        }

        let mut focals: Vec<f64> = cameras.iter().map(|c| c.focal).collect();
        let warped_scale = median_scale(&mut focals)
            .ok_or_else(|| CalibrationError::Convergence("no focal estimates".to_string()))?;

        let params: Vec<CameraParameters> = cameras
            .iter()
            .zip(rotations)
            .zip(&img_sizes)
            .map(|((c, r), (w, h))| CameraParameters::new(c.focal, *w as f64 * 0.5, *h as f64 * 0.5, r))
            .collect();
        if !warped_scale.is_finite()
            || params
                .iter()
                .any(|p| !p.intrinsic.iter().chain(p.rotation.iter()).all(|v| v.is_finite()))
        {
            return Err(CalibrationError::Convergence(
                "non-finite camera parameters".to_string(),
            ));
        }
        Ok(RigCalibration::new(warped_scale, params))
    }
}

fn log_calibration(rig: &RigCalibration) {
    info!("warped image scale {:.4}", rig.warped_scale());
    for (i, camera) in rig.cameras().iter().enumerate() {
        info!(
            "camera {}:\nK: {}R: {}t: {}",
            i, camera.intrinsic, camera.rotation, camera.translation
        );
    }
}
