use std::collections::HashMap;

use log::{debug, info, warn};
use nalgebra as na;
use tiny_solver::LevenbergMarquardtOptimizer;
use tiny_solver::loss_functions::{HuberLoss, Loss};
use tiny_solver::optimizer::{Optimizer, OptimizerOptions};
use tiny_solver::problem::Problem;

use super::CameraEstimate;
use super::factors::RayFactor;
use crate::config::BundleConfig;
use crate::detected_points::{FeatureSet, MatchTable};
use crate::error::{CalibrationError, CalibrationResult};

fn camera_name(i: usize) -> String {
    format!("cam{}", i)
}

/// Joint Levenberg-Marquardt refinement of focal and rotation of every camera
/// over the inliers of pairs with `confidence > confidence_threshold`.
///
/// The rotation of `reference` stays fixed. Rotations are re-expressed
/// relative to `reference` afterwards.
pub fn refine_cameras(
    cameras: &mut [CameraEstimate],
    features: &[FeatureSet],
    table: &MatchTable,
    reference: usize,
    confidence_threshold: f64,
    config: &BundleConfig,
) -> CalibrationResult<()> {
    let n = cameras.len();
    let mut problem = Problem::new();
    let names: Vec<String> = (0..n).map(camera_name).collect();
    let mut active = vec![false; n];
    let mut total_matches = 0;

    for i in 0..n {
        for j in i + 1..n {
            let pair = table.get(i, j);
            if pair.homography.is_none() || pair.confidence <= confidence_threshold {
                continue;
            }
            let correspondences: Vec<_> = pair
                .inlier_pairs()
                .map(|(a, b)| (features[i].centred(a), features[j].centred(b)))
                .collect();
            if correspondences.is_empty() {
                continue;
            }
            total_matches += correspondences.len();
            let factor = RayFactor { correspondences };
            let loss: Option<Box<dyn Loss + Send>> = if config.huber_scale > 0.0 {
                Some(Box::new(HuberLoss::new(config.huber_scale)))
            } else {
                None
            };
            problem.add_residual_block(
                factor.residual_num(),
                &[names[i].as_str(), names[j].as_str()],
                Box::new(factor),
                loss,
            );
            active[i] = true;
            active[j] = true;
        }
    }

    if total_matches == 0 {
        warn!(
            "no pair reaches confidence {:.2}, keeping closed-form estimate",
            confidence_threshold
        );
        return Ok(());
    }

    // gauge: one rotation per solve stays put
    let fixed = if active[reference] {
        reference
    } else {
        active.iter().position(|a| *a).unwrap_or(reference)
    };
    for idx in 1..4 {
        problem.fix_variable(&names[fixed], idx);
    }

    let initial: HashMap<String, na::DVector<f64>> = (0..n)
        .filter(|&i| active[i])
        .map(|i| {
            let r = cameras[i].rvec();
            (
                names[i].clone(),
                na::dvector![cameras[i].focal, r.x, r.y, r.z],
            )
        })
        .collect();
    debug!(
        "bundle adjustment over {} cameras, {} correspondences",
        initial.len(),
        total_matches
    );

    let options = OptimizerOptions {
        max_iteration: config.max_iterations,
        ..OptimizerOptions::default()
    };
    let optimizer = LevenbergMarquardtOptimizer::default();
    let solution = optimizer
        .optimize(&problem, &initial, Some(options))
        .ok_or_else(|| CalibrationError::Convergence("bundle adjustment failed".to_string()))?;

    for (i, camera) in cameras.iter_mut().enumerate() {
        if !active[i] {
            continue;
        }
        let v = solution.get(&names[i]).ok_or_else(|| {
            CalibrationError::Convergence(format!("solver dropped camera {}", i))
        })?;
        if v.len() != 4 || !v.iter().all(|x| x.is_finite()) || v[0] <= 0.0 {
            return Err(CalibrationError::Convergence(format!(
                "camera {} refined to invalid parameters {:?}",
                i,
                v.as_slice()
            )));
        }
        camera.focal = v[0];
        camera.rotation =
            na::Rotation3::from_scaled_axis(na::Vector3::new(v[1], v[2], v[3])).into_inner();
    }

    let r_inv = cameras[reference].rotation.transpose();
    for camera in cameras.iter_mut() {
        camera.rotation = r_inv * camera.rotation;
    }
    info!(
        "bundle adjustment done, focals {:?}",
        cameras.iter().map(|c| c.focal).collect::<Vec<_>>()
    );
    Ok(())
}
