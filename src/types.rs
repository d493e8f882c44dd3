use std::sync::Arc;

use image::RgbImage;
use nalgebra as na;
use serde::{Deserialize, Serialize};

/// Geometry of one camera: `ray = R * K^-1 * [u, v, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraParameters {
    pub intrinsic: na::Matrix3<f64>,
    pub rotation: na::Matrix3<f64>,
    pub translation: na::Vector3<f64>,
}

impl CameraParameters {
    pub fn new(focal: f64, ppx: f64, ppy: f64, rotation: na::Matrix3<f64>) -> CameraParameters {
        CameraParameters {
            intrinsic: na::Matrix3::new(focal, 0.0, ppx, 0.0, focal, ppy, 0.0, 0.0, 1.0),
            rotation,
            translation: na::Vector3::zeros(),
        }
    }
    pub fn focal(&self) -> f64 {
        self.intrinsic[(0, 0)]
    }
    pub fn principal_point(&self) -> (f64, f64) {
        (self.intrinsic[(0, 2)], self.intrinsic[(1, 2)])
    }
    pub fn rvec(&self) -> na::Vector3<f64> {
        na::Rotation3::from_matrix_unchecked(self.rotation).scaled_axis()
    }
}

/// Committed calibration of the whole rig.
///
/// Only built once every camera has parameters, so a value of this type is
/// always complete.
#[derive(Debug, Clone, PartialEq)]
pub struct RigCalibration {
    warped_scale: f64,
    cameras: Vec<CameraParameters>,
}

impl RigCalibration {
    pub fn new(warped_scale: f64, cameras: Vec<CameraParameters>) -> RigCalibration {
        RigCalibration {
            warped_scale,
            cameras,
        }
    }
    /// Focal length shared by every camera's projection surface.
    pub fn warped_scale(&self) -> f64 {
        self.warped_scale
    }
    pub fn cameras(&self) -> &[CameraParameters] {
        &self.cameras
    }
    pub fn camera_count(&self) -> usize {
        self.cameras.len()
    }
}

/// A captured image. Reference counted so snapshots survive the next capture.
pub type Frame = Arc<RgbImage>;

/// One image per camera, captured in the same cycle.
#[derive(Debug, Clone, Default)]
pub struct FrameSet {
    frames: Vec<Frame>,
}

impl FrameSet {
    pub fn new(camera_count: usize) -> FrameSet {
        FrameSet {
            frames: (0..camera_count)
                .map(|_| Arc::new(RgbImage::new(0, 0)))
                .collect(),
        }
    }
    pub fn from_images(images: Vec<RgbImage>) -> FrameSet {
        FrameSet {
            frames: images.into_iter().map(Arc::new).collect(),
        }
    }
    /// Replaces the frame of `camera`; snapshots holding the old frame keep it.
    pub fn set(&mut self, camera: usize, image: RgbImage) {
        self.frames[camera] = Arc::new(image);
    }
    pub fn get(&self, camera: usize) -> Option<&Frame> {
        self.frames.get(camera)
    }
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }
    pub fn len(&self) -> usize {
        self.frames.len()
    }
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
    /// Index of the first camera whose frame has no pixels.
    pub fn first_empty(&self) -> Option<usize> {
        self.frames
            .iter()
            .position(|f| f.width() == 0 || f.height() == 0)
    }
}

/// Axis-aligned region reported by the object detector, in camera pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}
