//! Top-level state machine of the surround-view application.
//!
//! `init` captures frames until the stitcher accepts a calibration, `run`
//! drives the strictly ordered capture, detect, stitch, render cycle and
//! feeds the maintenance scheduler. Only the scheduler's jobs run
//! concurrently with the cycle.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info, warn};

use super::cancel::StopToken;
use super::collaborators::{CaptureSource, ObjectDetector, Renderer, Stitcher};
use super::render_setup::RenderSetup;
use super::scheduler::MaintenanceScheduler;
use crate::calibration::CalibrationEstimator;
use crate::config::{InitMode, SurroundViewConfig};
use crate::error::PipelineError;
use crate::types::{DetectionRegion, FrameSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Uninitialized,
    Initializing,
    Running,
    Stopped,
}

/// External components the application drives.
pub struct Collaborators {
    pub capture: Box<dyn CaptureSource>,
    pub stitcher: Arc<dyn Stitcher>,
    pub renderer: Box<dyn Renderer>,
    pub detector: Option<Box<dyn ObjectDetector>>,
}

/// Counters of the last `run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub capture_attempts: usize,
    pub rendered_cycles: usize,
    pub skipped_cycles: usize,
}

pub struct SurroundViewApp {
    config: SurroundViewConfig,
    capture: Box<dyn CaptureSource>,
    stitcher: Arc<dyn Stitcher>,
    renderer: Box<dyn Renderer>,
    detector: Option<Box<dyn ObjectDetector>>,
    estimator: CalibrationEstimator,
    scheduler: MaintenanceScheduler,
    frames: FrameSet,
    regions: Vec<Vec<DetectionRegion>>,
    state: AppState,
    streaming: bool,
    stats: RunStats,
}

impl SurroundViewApp {
    pub fn new(config: SurroundViewConfig, collaborators: Collaborators) -> Result<SurroundViewApp, PipelineError> {
        let scheduler = MaintenanceScheduler::new(&config.pipeline, collaborators.stitcher.clone())?;
        let estimator = CalibrationEstimator::new(
            config.camera_count,
            config.calibration.clone(),
            config.calib_folder.clone(),
        );
        Ok(SurroundViewApp {
            frames: FrameSet::new(config.camera_count),
            regions: vec![Vec::new(); config.camera_count],
            capture: collaborators.capture,
            stitcher: collaborators.stitcher,
            renderer: collaborators.renderer,
            detector: collaborators.detector,
            estimator,
            scheduler,
            state: AppState::Uninitialized,
            streaming: false,
            stats: RunStats::default(),
            config,
        })
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    pub fn scheduler(&self) -> &MaintenanceScheduler {
        &self.scheduler
    }

    pub fn estimator(&self) -> &CalibrationEstimator {
        &self.estimator
    }

    /// Latest detections, one list per camera.
    pub fn regions(&self) -> &[Vec<DetectionRegion>] {
        &self.regions
    }

    /// Captures frames and attempts initialization until it succeeds, the
    /// attempt budget runs out or `stop` is signalled.
    ///
    /// Capture failures are retried after the backoff and do not consume the
    /// budget. A stitcher that is already initialized skips the attempts. On
    /// success the renderer receives its setup and the state moves to
    /// `Running`; calling `init` again after that is a no-op.
    pub fn init(&mut self, stop: &StopToken) -> Result<bool, PipelineError> {
        if self.state == AppState::Running {
            return Ok(true);
        }
        self.state = AppState::Initializing;
        if !self.streaming {
            if !self.capture.start_stream() {
                self.state = AppState::Stopped;
                return Err(PipelineError::StreamStart);
            }
            self.streaming = true;
        }

        let backoff = self.config.pipeline.capture_backoff();
        let mut budget = self.config.pipeline.init_iterations;
        while !self.stitcher.is_initialized() && budget != 0 && !stop.is_stopped() {
            if !self.capture.capture(&mut self.frames) {
                error!("capture failed during initialization");
                std::thread::sleep(backoff);
                continue;
            }
            if !self.try_initialize() {
                debug!("initialization attempt rejected");
            }
            if budget > 0 {
                budget -= 1;
            }
        }

        let initialized = self.stitcher.is_initialized();
        if initialized {
            let setup = RenderSetup::from_config(&self.config.render);
            if !self.renderer.init(&setup) {
                self.state = AppState::Stopped;
                return Err(PipelineError::RendererInit);
            }
        }

        self.state = if initialized {
            info!("initialization done, entering render loop");
            AppState::Running
        } else if stop.is_stopped() {
            AppState::Stopped
        } else {
            warn!("initialization budget exhausted");
            AppState::Uninitialized
        };
        Ok(initialized)
    }

    fn try_initialize(&mut self) -> bool {
        match self.config.pipeline.init_mode {
            InitMode::FromFile => self
                .stitcher
                .init_from_file(&self.config.calib_folder, &self.frames, false),
            InitMode::Calibrate => {
                let persist = self.config.pipeline.persist_calibration;
                match self.estimator.calibrate(self.frames.frames(), persist) {
                    Ok(rig) => self.stitcher.init_with_calibration(&rig, &self.frames),
                    Err(e) => {
                        warn!("calibration attempt failed: {}", e);
                        false
                    }
                }
            }
        }
    }

    /// Runs the render cycle until `stop` is signalled or a fatal condition
    /// occurs. The capture stream is stopped on every exit path.
    pub fn run(&mut self, stop: &StopToken) -> Result<(), PipelineError> {
        if self.state != AppState::Running {
            return Err(PipelineError::NotInitialized);
        }
        self.stats = RunStats::default();
        let result = self.render_loop(stop);
        self.shutdown();
        info!(
            "render loop finished: {} cycles rendered, {} skipped",
            self.stats.rendered_cycles, self.stats.skipped_cycles
        );
        result
    }

    fn render_loop(&mut self, stop: &StopToken) -> Result<(), PipelineError> {
        let pipeline = &self.config.pipeline;
        let backoff = pipeline.capture_backoff();
        let render_pause = pipeline.render_pause();
        let ceiling = pipeline.max_consecutive_capture_failures;
        let object_detection = pipeline.object_detection;
        let mut failures = 0usize;
        let mut last_tick = Instant::now();

        while !stop.is_stopped() {
            self.stats.capture_attempts += 1;
            if !self.capture.capture(&mut self.frames) {
                failures += 1;
                error!("capture failed ({} consecutive)", failures);
                if failures >= ceiling {
                    error!("camera subsystem is down");
                    return Err(PipelineError::CameraDown { failures });
                }
                std::thread::sleep(backoff);
                continue;
            }
            failures = 0;

            if let Some(camera) = self.frames.first_empty() {
                warn!("frame of camera {} is empty, skipping cycle", camera);
                self.stats.skipped_cycles += 1;
                std::thread::sleep(backoff);
                continue;
            }

            if object_detection {
                if let Some(detector) = self.detector.as_mut() {
                    self.regions.iter_mut().for_each(|r| r.clear());
                    detector.detect(&self.frames, &mut self.regions);
                }
            }

            let composite = Arc::new(self.stitcher.stitch(&self.frames));

            self.renderer.set_white_luminance(self.stitcher.white_luminance());
            self.renderer.set_tone_luminance(self.stitcher.luminance());
            if !self.renderer.render(&composite) {
                error!("renderer reported a fatal condition");
                return Err(PipelineError::RenderFatal);
            }
            self.stats.rendered_cycles += 1;
            std::thread::sleep(render_pause);

            let now = Instant::now();
            let dt = now - last_tick;
            last_tick = now;
            self.scheduler.tick(dt, &self.frames, &composite);
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        if self.streaming {
            self.capture.stop_stream();
            self.streaming = false;
        }
        self.state = AppState::Stopped;
    }
}

impl Drop for SurroundViewApp {
    fn drop(&mut self) {
        self.shutdown();
    }
}
