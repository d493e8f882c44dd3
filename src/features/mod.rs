pub mod keypoints;
pub mod matcher;
pub mod preprocess;

pub use keypoints::KeypointExtractor;
pub use matcher::{match_pair, match_pairs};
pub use preprocess::preprocess;

use std::ops::Deref;

use image::RgbImage;
use log::info;
use rayon::prelude::*;

use crate::config::CalibrationConfig;
use crate::detected_points::FeatureSet;
use crate::error::{CalibrationError, CalibrationResult};

/// Preprocesses every image and extracts its keypoints, one camera per task.
///
/// Empty frames and frames without a single keypoint fail with
/// `FeatureExtraction` naming the camera.
pub fn extract_features<I>(images: &[I], config: &CalibrationConfig) -> CalibrationResult<Vec<FeatureSet>>
where
    I: Deref<Target = RgbImage> + Sync,
{
    if let Some(camera) = images.iter().position(|img| img.width() == 0 || img.height() == 0) {
        return Err(CalibrationError::FeatureExtraction {
            camera,
            reason: "empty frame".to_string(),
        });
    }
    let extractor = KeypointExtractor::new(&config.keypoints);
    let features: Vec<opencv::Result<FeatureSet>> = images
        .par_iter()
        .map(|img| extractor.extract(&preprocess(img, &config.preprocess)?))
        .collect();

    let mut sets = Vec::with_capacity(features.len());
    for (camera, f) in features.into_iter().enumerate() {
        let f = f.map_err(|e| CalibrationError::FeatureExtraction {
            camera,
            reason: e.to_string(),
        })?;
        info!("camera {}: {} keypoints", camera, f.len());
        if f.is_empty() {
            return Err(CalibrationError::FeatureExtraction {
                camera,
                reason: "no keypoints detected".to_string(),
            });
        }
        sets.push(f);
    }
    Ok(sets)
}
