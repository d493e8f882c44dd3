//! Contracts of the hardware and rendering components driven by the
//! pipeline. Implementations live outside this crate, except for the folder
//! replay source in `data_loader`.

use std::path::Path;

use image::RgbImage;

use super::render_setup::RenderSetup;
use crate::types::{DetectionRegion, FrameSet, RigCalibration};

/// Synchronized multi-camera source.
pub trait CaptureSource: Send {
    fn start_stream(&mut self) -> bool;
    fn stop_stream(&mut self);
    /// Fills `frames` with one image per camera. `false` means nothing was
    /// captured this time; a successful capture may still contain empty
    /// images.
    fn capture(&mut self, frames: &mut FrameSet) -> bool;
}

/// Composites camera frames onto the projection surface and owns the
/// photometric state.
///
/// Shared between the render cycle and maintenance jobs, so every method
/// takes `&self`.
pub trait Stitcher: Send + Sync {
    /// Loads persisted calibration records from `calib_folder`.
    /// `initial_gain` asks for a gain estimate from `frames` during setup.
    fn init_from_file(&self, calib_folder: &Path, frames: &FrameSet, initial_gain: bool) -> bool;
    /// Seeds the stitcher with a freshly estimated calibration.
    fn init_with_calibration(&self, calibration: &RigCalibration, frames: &FrameSet) -> bool;
    fn is_initialized(&self) -> bool;
    fn stitch(&self, frames: &FrameSet) -> RgbImage;
    fn recompute_gain(&self, frames: &FrameSet);
    fn recompute_tone_luminance(&self, composite: &RgbImage);
    fn white_luminance(&self) -> f32;
    fn luminance(&self) -> f32;
}

pub trait ObjectDetector: Send {
    /// Writes the detections of camera `i` into `regions[i]`.
    fn detect(&mut self, frames: &FrameSet, regions: &mut [Vec<DetectionRegion>]);
}

pub trait Renderer {
    fn init(&mut self, setup: &RenderSetup) -> bool;
    /// `false` is a fatal condition for the render cycle.
    fn render(&mut self, composite: &RgbImage) -> bool;
    fn set_white_luminance(&mut self, v: f32);
    fn set_tone_luminance(&mut self, v: f32);
}
