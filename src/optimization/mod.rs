pub mod bundle;
pub mod estimator;
pub mod factors;
pub mod homography;
pub mod wave;

pub use bundle::*;
pub use estimator::*;
pub use homography::*;
pub use wave::*;

use nalgebra as na;

/// Working state of one camera while the rig is solved; pixels are centred
/// so the principal point is implicitly zero.
#[derive(Debug, Clone, Copy)]
pub struct CameraEstimate {
    pub focal: f64,
    pub rotation: na::Matrix3<f64>,
}

impl CameraEstimate {
    /// Axis-angle vector of the closest proper rotation.
    pub fn rvec(&self) -> na::Vector3<f64> {
        na::Rotation3::from_matrix(&self.rotation).scaled_axis()
    }
}
