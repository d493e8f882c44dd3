//! Accumulate-and-fire timing of the photometric maintenance jobs.

use std::sync::Arc;
use std::time::Duration;

use image::RgbImage;
use log::debug;

use super::collaborators::Stitcher;
use super::worker_pool::WorkerPool;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::types::FrameSet;

/// Fires once the time fed to it reaches `interval`, then starts over from
/// zero. Overshoot is discarded, so consecutive fires are at least
/// `interval` apart.
#[derive(Debug, Clone)]
pub struct PeriodicTask {
    interval: Duration,
    accumulated: Duration,
}

impl PeriodicTask {
    pub fn new(interval: Duration) -> PeriodicTask {
        PeriodicTask {
            interval,
            accumulated: Duration::ZERO,
        }
    }

    pub fn advance(&mut self, dt: Duration) -> bool {
        self.accumulated += dt;
        if self.accumulated >= self.interval {
            self.accumulated = Duration::ZERO;
            true
        } else {
            false
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn accumulated(&self) -> Duration {
        self.accumulated
    }
}

/// Which jobs a single tick submitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub gain: bool,
    pub tone: bool,
}

pub struct MaintenanceScheduler {
    gain: PeriodicTask,
    tone: PeriodicTask,
    pool: WorkerPool,
    stitcher: Arc<dyn Stitcher>,
}

impl MaintenanceScheduler {
    pub fn new(config: &PipelineConfig, stitcher: Arc<dyn Stitcher>) -> Result<MaintenanceScheduler, PipelineError> {
        Ok(MaintenanceScheduler {
            gain: PeriodicTask::new(config.gain_interval()),
            tone: PeriodicTask::new(config.luminance_interval()),
            pool: WorkerPool::new(config.worker_threads, config.overflow, config.job_cooldown())?,
            stitcher,
        })
    }

    /// Feeds one cycle's duration to both tasks and submits the jobs that
    /// fire. Frames and composite are handed over as shared handles; the
    /// caller never waits for the jobs.
    pub fn tick(&mut self, dt: Duration, frames: &FrameSet, composite: &Arc<RgbImage>) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        if self.gain.advance(dt) {
            let snapshot = frames.clone();
            let stitcher = self.stitcher.clone();
            outcome.gain = self
                .pool
                .submit("gain", move || stitcher.recompute_gain(&snapshot));
            debug!("gain recompute submitted: {}", outcome.gain);
        }
        if self.tone.advance(dt) {
            let snapshot = composite.clone();
            let stitcher = self.stitcher.clone();
            outcome.tone = self
                .pool
                .submit("tone luminance", move || stitcher.recompute_tone_luminance(&snapshot));
            debug!("tone luminance recompute submitted: {}", outcome.tone);
        }
        outcome
    }

    pub fn gain_task(&self) -> &PeriodicTask {
        &self.gain
    }

    pub fn tone_task(&self) -> &PeriodicTask {
        &self.tone
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }
}
