//! In-memory collaborators recording how the pipeline drives them.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use image::RgbImage;
use parking_lot::Mutex;
use surround_view::config::SurroundViewConfig;
use surround_view::photometric::PhotometricState;
use surround_view::pipeline::{
    CaptureSource, Collaborators, ObjectDetector, RenderSetup, Renderer, StopToken, Stitcher,
};
use surround_view::types::{DetectionRegion, FrameSet, RigCalibration};

pub const CAMERAS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Fail,
    /// Capture succeeds but camera 0 delivers no pixels.
    Empty,
    Frames,
}

#[derive(Debug, Default)]
pub struct CaptureLog {
    pub captures: AtomicUsize,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
}

/// Replays `script`, then repeats `fallback`. Signals `stop` once the given
/// number of captures happened.
pub struct ScriptedCapture {
    pub script: VecDeque<Step>,
    pub fallback: Step,
    pub stop_after: Option<(usize, StopToken)>,
    pub stream_ok: bool,
    pub log: Arc<CaptureLog>,
}

impl ScriptedCapture {
    pub fn new(script: &[Step], fallback: Step) -> ScriptedCapture {
        ScriptedCapture {
            script: script.iter().copied().collect(),
            fallback,
            stop_after: None,
            stream_ok: true,
            log: Arc::new(CaptureLog::default()),
        }
    }

    pub fn stop_after(mut self, captures: usize, stop: &StopToken) -> ScriptedCapture {
        self.stop_after = Some((captures, stop.clone()));
        self
    }
}

pub fn frame_set(size: u32) -> FrameSet {
    FrameSet::from_images(vec![RgbImage::new(size, size); CAMERAS])
}

impl CaptureSource for ScriptedCapture {
    fn start_stream(&mut self) -> bool {
        self.log.starts.fetch_add(1, Ordering::SeqCst);
        self.stream_ok
    }

    fn stop_stream(&mut self) {
        self.log.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn capture(&mut self, frames: &mut FrameSet) -> bool {
        let count = self.log.captures.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, stop)) = &self.stop_after {
            if count >= *limit {
                stop.stop();
            }
        }
        match self.script.pop_front().unwrap_or(self.fallback) {
            Step::Fail => false,
            Step::Empty => {
                *frames = frame_set(8);
                frames.set(0, RgbImage::new(0, 0));
                true
            }
            Step::Frames => {
                *frames = frame_set(8);
                true
            }
        }
    }
}

#[derive(Debug)]
pub struct StubStitcher {
    pub accept_init: AtomicBool,
    pub panic_on_gain: AtomicBool,
    pub init_calls: AtomicUsize,
    pub stitches: AtomicUsize,
    pub gains: AtomicUsize,
    pub tones: AtomicUsize,
    /// Width of camera 0 in the last frames handed to a gain job.
    pub gain_frame_width: AtomicUsize,
    pub photometric: PhotometricState,
}

impl StubStitcher {
    pub fn new(accept_init: bool) -> Arc<StubStitcher> {
        let photometric = PhotometricState::new(CAMERAS);
        photometric.set_white_luminance(0.75);
        photometric.set_tone_luminance(0.5);
        Arc::new(StubStitcher {
            accept_init: AtomicBool::new(accept_init),
            panic_on_gain: AtomicBool::new(false),
            init_calls: AtomicUsize::new(0),
            stitches: AtomicUsize::new(0),
            gains: AtomicUsize::new(0),
            tones: AtomicUsize::new(0),
            gain_frame_width: AtomicUsize::new(0),
            photometric,
        })
    }
}

impl Stitcher for StubStitcher {
    fn init_from_file(&self, _calib_folder: &Path, _frames: &FrameSet, initial_gain: bool) -> bool {
        assert!(!initial_gain);
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        self.accept_init.load(Ordering::SeqCst)
    }

    fn init_with_calibration(&self, _calibration: &RigCalibration, _frames: &FrameSet) -> bool {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        self.accept_init.load(Ordering::SeqCst)
    }

    fn is_initialized(&self) -> bool {
        self.init_calls.load(Ordering::SeqCst) > 0 && self.accept_init.load(Ordering::SeqCst)
    }

    fn stitch(&self, frames: &FrameSet) -> RgbImage {
        self.stitches.fetch_add(1, Ordering::SeqCst);
        let w = frames.frames().iter().map(|f| f.width()).sum();
        RgbImage::new(w, 8)
    }

    fn recompute_gain(&self, frames: &FrameSet) {
        if self.panic_on_gain.load(Ordering::SeqCst) {
            panic!("gain estimation blew up");
        }
        let width = frames.get(0).map(|f| f.width()).unwrap_or(0);
        self.gain_frame_width.store(width as usize, Ordering::SeqCst);
        self.photometric.publish_gains(vec![1.1; frames.len()]);
        self.gains.fetch_add(1, Ordering::SeqCst);
    }

    fn recompute_tone_luminance(&self, _composite: &RgbImage) {
        self.photometric.set_tone_luminance(0.6);
        self.tones.fetch_add(1, Ordering::SeqCst);
    }

    fn white_luminance(&self) -> f32 {
        self.photometric.white_luminance()
    }

    fn luminance(&self) -> f32 {
        self.photometric.tone_luminance()
    }
}

#[derive(Debug, Default)]
pub struct RenderLog {
    pub inits: AtomicUsize,
    pub renders: AtomicUsize,
    pub last_white: Mutex<f32>,
    pub last_tone: Mutex<f32>,
    pub setup_size: Mutex<(u32, u32)>,
}

pub struct StubRenderer {
    pub init_ok: bool,
    /// Render call, counted from one, that reports a fatal condition.
    pub fail_at: Option<usize>,
    pub log: Arc<RenderLog>,
}

impl StubRenderer {
    pub fn new() -> StubRenderer {
        StubRenderer {
            init_ok: true,
            fail_at: None,
            log: Arc::new(RenderLog::default()),
        }
    }
}

impl Renderer for StubRenderer {
    fn init(&mut self, setup: &RenderSetup) -> bool {
        self.log.inits.fetch_add(1, Ordering::SeqCst);
        *self.log.setup_size.lock() = (setup.width, setup.height);
        self.init_ok
    }

    fn render(&mut self, _composite: &RgbImage) -> bool {
        let n = self.log.renders.fetch_add(1, Ordering::SeqCst) + 1;
        self.fail_at != Some(n)
    }

    fn set_white_luminance(&mut self, v: f32) {
        *self.log.last_white.lock() = v;
    }

    fn set_tone_luminance(&mut self, v: f32) {
        *self.log.last_tone.lock() = v;
    }
}

/// Reports one fixed region per camera.
pub struct StubDetector;

impl ObjectDetector for StubDetector {
    fn detect(&mut self, _frames: &FrameSet, regions: &mut [Vec<DetectionRegion>]) {
        for (i, r) in regions.iter_mut().enumerate() {
            r.push(DetectionRegion {
                x: i as u32,
                y: 0,
                width: 2,
                height: 2,
            });
        }
    }
}

/// Fast-cycling configuration: no sleeps, long maintenance intervals.
pub fn test_config() -> SurroundViewConfig {
    let mut config = SurroundViewConfig {
        camera_count: CAMERAS,
        ..Default::default()
    };
    config.pipeline.capture_backoff_ms = 0;
    config.pipeline.render_pause_ms = 0;
    config.pipeline.job_cooldown_ms = 0;
    config.pipeline.worker_threads = 2;
    config.pipeline.gain_interval_ms = 60_000;
    config.pipeline.luminance_interval_ms = 60_000;
    config
}

pub fn collaborators(
    capture: ScriptedCapture,
    stitcher: &Arc<StubStitcher>,
    renderer: StubRenderer,
) -> Collaborators {
    Collaborators {
        capture: Box::new(capture),
        stitcher: stitcher.clone(),
        renderer: Box::new(renderer),
        detector: None,
    }
}
