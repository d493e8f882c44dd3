//! SIFT keypoints and 128-d descriptors on the preprocessed gray image.

use opencv::core::{KeyPoint, Mat, Ptr, Vector};
use opencv::features2d::SIFT;
use opencv::prelude::*;

use crate::config::KeypointConfig;
use crate::detected_points::{DESCRIPTOR_LEN, Descriptor, FeatureSet, Keypoint};

/// Smaller images cannot hold a single descriptor window.
const MIN_IMAGE_SIDE: i32 = 16;

/// SIFT stores the octave in the low byte as a signed value, the upsampled
/// base image being octave -1.
fn unpack_octave(packed: i32) -> i32 {
    let octave = packed & 255;
    if octave >= 128 { octave - 256 } else { octave }
}

/// Holds only the detector settings; every call builds its own detector so
/// one extractor can be shared across worker threads.
pub struct KeypointExtractor {
    config: KeypointConfig,
}

impl KeypointExtractor {
    pub fn new(config: &KeypointConfig) -> KeypointExtractor {
        KeypointExtractor {
            config: config.clone(),
        }
    }

    fn detector(&self) -> opencv::Result<Ptr<SIFT>> {
        SIFT::create(
            self.config.max_features as i32,
            self.config.octave_layers as i32,
            self.config.contrast_threshold as f64,
            self.config.edge_threshold as f64,
            self.config.sigma as f64,
            false,
        )
    }

    /// Detects keypoints on a `CV_8U` gray image, strongest first and at
    /// most `max_features` of them when the budget is non-zero.
    pub fn extract(&self, img: &Mat) -> opencv::Result<FeatureSet> {
        let img_w_h = (img.cols().max(0) as u32, img.rows().max(0) as u32);
        if img.cols() < MIN_IMAGE_SIDE || img.rows() < MIN_IMAGE_SIDE {
            return Ok(FeatureSet::empty(img_w_h));
        }

        let mut sift = self.detector()?;
        let mut keypoints = Vector::<KeyPoint>::new();
        let mut descriptors = Mat::default();
        let mask = Mat::default();
        sift.detect_and_compute(img, &mask, &mut keypoints, &mut descriptors, false)?;
        if keypoints.is_empty() {
            return Ok(FeatureSet::empty(img_w_h));
        }

        let values = descriptors.data_typed::<f32>()?;
        let mut detected: Vec<(Keypoint, Descriptor)> = keypoints
            .iter()
            .zip(values.chunks_exact(DESCRIPTOR_LEN))
            .map(|(kp, row)| {
                let mut desc = [0f32; DESCRIPTOR_LEN];
                desc.copy_from_slice(row);
                let pt = kp.pt();
                (
                    Keypoint {
                        p2d: glam::Vec2::new(pt.x, pt.y),
                        size: kp.size(),
                        angle: kp.angle().to_radians(),
                        response: kp.response(),
                        octave: unpack_octave(kp.octave()),
                    },
                    desc,
                )
            })
            .collect();
        detected.sort_by(|a, b| b.0.response.total_cmp(&a.0.response));
        // ties at the budget edge survive the detector's own cut
        if self.config.max_features > 0 {
            detected.truncate(self.config.max_features);
        }

        let (keypoints, descriptors) = detected.into_iter().unzip();
        Ok(FeatureSet {
            img_w_h,
            keypoints,
            descriptors,
        })
    }
}
