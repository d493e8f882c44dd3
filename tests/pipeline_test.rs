mod common;

use std::sync::atomic::Ordering;

use common::stubs::*;
use surround_view::config::InitMode;
use surround_view::error::PipelineError;
use surround_view::pipeline::{AppState, StopToken, Stitcher, SurroundViewApp};

#[test]
fn run_stops_at_capture_failure_ceiling() {
    let stop = StopToken::new();
    let capture = ScriptedCapture::new(&[Step::Frames], Step::Fail);
    let capture_log = capture.log.clone();
    let stitcher = StubStitcher::new(true);
    let renderer = StubRenderer::new();
    let render_log = renderer.log.clone();

    let mut app = SurroundViewApp::new(test_config(), collaborators(capture, &stitcher, renderer)).unwrap();
    assert!(app.init(&stop).unwrap());
    assert_eq!(app.state(), AppState::Running);

    match app.run(&stop) {
        Err(PipelineError::CameraDown { failures }) => assert_eq!(failures, 100),
        other => panic!("expected CameraDown, got {:?}", other),
    }
    assert_eq!(app.stats().capture_attempts, 100);
    assert_eq!(app.stats().rendered_cycles, 0);
    // one capture during init plus exactly the ceiling during run
    assert_eq!(capture_log.captures.load(Ordering::SeqCst), 101);
    assert_eq!(capture_log.stops.load(Ordering::SeqCst), 1);
    assert_eq!(render_log.renders.load(Ordering::SeqCst), 0);
    assert_eq!(app.state(), AppState::Stopped);
}

#[test]
fn empty_frames_skip_cycle_without_failures() {
    let stop = StopToken::new();
    let mut script = vec![Step::Frames];
    for _ in 0..5 {
        script.extend([Step::Empty, Step::Frames]);
    }
    // init takes the first capture, run the next ten
    let capture = ScriptedCapture::new(&script, Step::Fail).stop_after(11, &stop);
    let stitcher = StubStitcher::new(true);
    let renderer = StubRenderer::new();
    let render_log = renderer.log.clone();

    let mut config = test_config();
    config.pipeline.max_consecutive_capture_failures = 1;
    let mut app = SurroundViewApp::new(config, collaborators(capture, &stitcher, renderer)).unwrap();
    assert!(app.init(&stop).unwrap());
    app.run(&stop).unwrap();

    let stats = app.stats();
    assert_eq!(stats.capture_attempts, 10);
    assert_eq!(stats.skipped_cycles, 5);
    assert_eq!(stats.rendered_cycles, 5);
    assert_eq!(stitcher.stitches.load(Ordering::SeqCst), 5);
    assert_eq!(render_log.renders.load(Ordering::SeqCst), 5);
}

#[test]
fn successful_capture_resets_failure_count() {
    let stop = StopToken::new();
    let script = [
        Step::Frames,
        Step::Fail,
        Step::Fail,
        Step::Frames,
        Step::Fail,
        Step::Fail,
        Step::Frames,
    ];
    let capture = ScriptedCapture::new(&script, Step::Frames).stop_after(script.len(), &stop);
    let stitcher = StubStitcher::new(true);

    let mut config = test_config();
    config.pipeline.max_consecutive_capture_failures = 3;
    let mut app = SurroundViewApp::new(config, collaborators(capture, &stitcher, StubRenderer::new())).unwrap();
    assert!(app.init(&stop).unwrap());
    app.run(&stop).unwrap();
    assert_eq!(app.stats().capture_attempts, 6);
    assert_eq!(app.stats().rendered_cycles, 2);
}

#[test]
fn luminance_is_forwarded_to_renderer() {
    let stop = StopToken::new();
    let capture = ScriptedCapture::new(&[], Step::Frames).stop_after(3, &stop);
    let stitcher = StubStitcher::new(true);
    let renderer = StubRenderer::new();
    let render_log = renderer.log.clone();

    let mut app = SurroundViewApp::new(test_config(), collaborators(capture, &stitcher, renderer)).unwrap();
    assert!(app.init(&stop).unwrap());
    assert_eq!(render_log.inits.load(Ordering::SeqCst), 1);
    assert_eq!(*render_log.setup_size.lock(), (1280, 720));
    app.run(&stop).unwrap();
    assert_eq!(*render_log.last_white.lock(), 0.75);
    assert_eq!(*render_log.last_tone.lock(), 0.5);
}

#[test]
fn detections_are_collected_when_enabled() {
    let stop = StopToken::new();
    let capture = ScriptedCapture::new(&[], Step::Frames).stop_after(2, &stop);
    let stitcher = StubStitcher::new(true);
    let mut collab = collaborators(capture, &stitcher, StubRenderer::new());
    collab.detector = Some(Box::new(StubDetector));

    let mut config = test_config();
    config.pipeline.object_detection = true;
    let mut app = SurroundViewApp::new(config, collab).unwrap();
    assert!(app.init(&stop).unwrap());
    app.run(&stop).unwrap();

    assert_eq!(app.regions().len(), CAMERAS);
    for (i, regions) in app.regions().iter().enumerate() {
        // cleared every cycle, so one region per camera
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].x, i as u32);
    }
}

#[test]
fn render_failure_is_fatal() {
    let stop = StopToken::new();
    let capture = ScriptedCapture::new(&[], Step::Frames);
    let capture_log = capture.log.clone();
    let stitcher = StubStitcher::new(true);
    let mut renderer = StubRenderer::new();
    renderer.fail_at = Some(3);

    let mut app = SurroundViewApp::new(test_config(), collaborators(capture, &stitcher, renderer)).unwrap();
    assert!(app.init(&stop).unwrap());
    assert!(matches!(app.run(&stop), Err(PipelineError::RenderFatal)));
    assert_eq!(app.stats().rendered_cycles, 2);
    assert_eq!(capture_log.stops.load(Ordering::SeqCst), 1);
    assert_eq!(app.state(), AppState::Stopped);
}

#[test]
fn run_before_init_is_rejected() {
    let stop = StopToken::new();
    let capture = ScriptedCapture::new(&[], Step::Frames);
    let stitcher = StubStitcher::new(true);
    let mut app = SurroundViewApp::new(test_config(), collaborators(capture, &stitcher, StubRenderer::new())).unwrap();
    assert_eq!(app.state(), AppState::Uninitialized);
    assert!(matches!(app.run(&stop), Err(PipelineError::NotInitialized)));
}

#[test]
fn zero_budget_skips_initialization() {
    let stop = StopToken::new();
    let capture = ScriptedCapture::new(&[], Step::Frames);
    let capture_log = capture.log.clone();
    let stitcher = StubStitcher::new(true);

    let mut config = test_config();
    config.pipeline.init_iterations = 0;
    let mut app = SurroundViewApp::new(config, collaborators(capture, &stitcher, StubRenderer::new())).unwrap();
    assert!(!app.init(&stop).unwrap());
    assert_eq!(app.state(), AppState::Uninitialized);
    assert_eq!(capture_log.captures.load(Ordering::SeqCst), 0);
    assert_eq!(stitcher.init_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn capture_failures_do_not_consume_init_budget() {
    let stop = StopToken::new();
    let script = [Step::Fail, Step::Frames, Step::Fail, Step::Frames, Step::Frames];
    let capture = ScriptedCapture::new(&script, Step::Frames);
    let capture_log = capture.log.clone();
    let stitcher = StubStitcher::new(false);
    let renderer = StubRenderer::new();
    let render_log = renderer.log.clone();

    let mut config = test_config();
    config.pipeline.init_iterations = 3;
    let mut app = SurroundViewApp::new(config, collaborators(capture, &stitcher, renderer)).unwrap();
    assert!(!app.init(&stop).unwrap());
    assert_eq!(stitcher.init_calls.load(Ordering::SeqCst), 3);
    assert_eq!(capture_log.captures.load(Ordering::SeqCst), 5);
    assert_eq!(render_log.inits.load(Ordering::SeqCst), 0);
    assert_eq!(app.state(), AppState::Uninitialized);
}

#[test]
fn stop_ends_unlimited_initialization() {
    let stop = StopToken::new();
    let capture = ScriptedCapture::new(&[], Step::Frames).stop_after(5, &stop);
    let stitcher = StubStitcher::new(false);

    let mut app = SurroundViewApp::new(test_config(), collaborators(capture, &stitcher, StubRenderer::new())).unwrap();
    assert!(!app.init(&stop).unwrap());
    assert_eq!(stitcher.init_calls.load(Ordering::SeqCst), 5);
    assert_eq!(app.state(), AppState::Stopped);
}

#[test]
fn failed_calibration_attempts_are_retried() {
    let stop = StopToken::new();
    let capture = ScriptedCapture::new(&[], Step::Frames);
    let stitcher = StubStitcher::new(true);

    let mut config = test_config();
    config.pipeline.init_mode = InitMode::Calibrate;
    config.pipeline.init_iterations = 2;
    let mut app = SurroundViewApp::new(config, collaborators(capture, &stitcher, StubRenderer::new())).unwrap();
    // 8x8 frames carry no keypoints, every attempt fails
    assert!(!app.init(&stop).unwrap());
    assert!(!app.estimator().is_calibrated());
    assert_eq!(stitcher.init_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn renderer_init_failure_is_reported() {
    let stop = StopToken::new();
    let capture = ScriptedCapture::new(&[], Step::Frames);
    let stitcher = StubStitcher::new(true);
    let mut renderer = StubRenderer::new();
    renderer.init_ok = false;

    let mut app = SurroundViewApp::new(test_config(), collaborators(capture, &stitcher, renderer)).unwrap();
    assert!(matches!(app.init(&stop), Err(PipelineError::RendererInit)));
    assert_eq!(app.state(), AppState::Stopped);
}

#[test]
fn stream_start_failure_is_reported() {
    let stop = StopToken::new();
    let mut capture = ScriptedCapture::new(&[], Step::Frames);
    capture.stream_ok = false;
    let stitcher = StubStitcher::new(true);

    let mut app = SurroundViewApp::new(test_config(), collaborators(capture, &stitcher, StubRenderer::new())).unwrap();
    assert!(matches!(app.init(&stop), Err(PipelineError::StreamStart)));
}

#[test]
fn repeated_init_does_not_reinitialize() {
    let stop = StopToken::new();
    let capture = ScriptedCapture::new(&[], Step::Frames);
    let capture_log = capture.log.clone();
    let stitcher = StubStitcher::new(true);
    let renderer = StubRenderer::new();
    let render_log = renderer.log.clone();

    let mut app = SurroundViewApp::new(test_config(), collaborators(capture, &stitcher, renderer)).unwrap();
    assert!(app.init(&stop).unwrap());
    assert!(app.init(&stop).unwrap());
    assert_eq!(app.state(), AppState::Running);
    assert_eq!(stitcher.init_calls.load(Ordering::SeqCst), 1);
    assert_eq!(render_log.inits.load(Ordering::SeqCst), 1);
    assert_eq!(capture_log.captures.load(Ordering::SeqCst), 1);
}

#[test]
fn initialized_stitcher_skips_init_attempts() {
    let stop = StopToken::new();
    let capture = ScriptedCapture::new(&[], Step::Frames);
    let capture_log = capture.log.clone();
    let stitcher = StubStitcher::new(true);
    let renderer = StubRenderer::new();
    let render_log = renderer.log.clone();

    let frames = frame_set(8);
    assert!(stitcher.init_from_file(std::path::Path::new("unused"), &frames, false));
    assert!(stitcher.is_initialized());

    let mut app = SurroundViewApp::new(test_config(), collaborators(capture, &stitcher, renderer)).unwrap();
    assert!(app.init(&stop).unwrap());
    assert_eq!(app.state(), AppState::Running);
    assert_eq!(stitcher.init_calls.load(Ordering::SeqCst), 1);
    assert_eq!(capture_log.captures.load(Ordering::SeqCst), 0);
    assert_eq!(render_log.inits.load(Ordering::SeqCst), 1);
}
