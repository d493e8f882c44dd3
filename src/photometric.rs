//! Tear-free exchange of the photometric parameters between maintenance jobs
//! and the render cycle.
//!
//! Scalars are stored as `f32` bit patterns in atomics. The per-camera gain
//! vector is published by swapping in a new `Arc`, so a reader always sees
//! either the previous or the next complete vector.
//!
//! The pipeline never touches this type directly: it is the building block a
//! `Stitcher` implementation embeds to answer `white_luminance`/`luminance`
//! from the render thread while its gain and tone jobs publish new values.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;

#[derive(Debug, Clone, PartialEq)]
pub struct PhotometricSnapshot {
    pub white_luminance: f32,
    pub tone_luminance: f32,
    pub gains: Arc<[f32]>,
}

#[derive(Debug)]
pub struct PhotometricState {
    white_luminance: AtomicU32,
    tone_luminance: AtomicU32,
    gains: RwLock<Arc<[f32]>>,
}

impl PhotometricState {
    /// Neutral state: unit luminance and unit gain for every camera.
    pub fn new(camera_count: usize) -> PhotometricState {
        PhotometricState {
            white_luminance: AtomicU32::new(1f32.to_bits()),
            tone_luminance: AtomicU32::new(1f32.to_bits()),
            gains: RwLock::new(vec![1.0; camera_count].into()),
        }
    }

    pub fn white_luminance(&self) -> f32 {
        f32::from_bits(self.white_luminance.load(Ordering::Acquire))
    }

    pub fn set_white_luminance(&self, v: f32) {
        self.white_luminance.store(v.to_bits(), Ordering::Release);
    }

    pub fn tone_luminance(&self) -> f32 {
        f32::from_bits(self.tone_luminance.load(Ordering::Acquire))
    }

    pub fn set_tone_luminance(&self, v: f32) {
        self.tone_luminance.store(v.to_bits(), Ordering::Release);
    }

    pub fn gains(&self) -> Arc<[f32]> {
        self.gains.read().clone()
    }

    /// Replaces the whole gain vector at once.
    pub fn publish_gains(&self, gains: Vec<f32>) {
        *self.gains.write() = gains.into();
    }

    pub fn snapshot(&self) -> PhotometricSnapshot {
        PhotometricSnapshot {
            white_luminance: self.white_luminance(),
            tone_luminance: self.tone_luminance(),
            gains: self.gains(),
        }
    }
}

impl Default for PhotometricState {
    fn default() -> Self {
        PhotometricState::new(0)
    }
}
