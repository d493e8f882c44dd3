use thiserror::Error;

/// Failures of one calibration attempt. Every variant is terminal for the
/// attempt and leaves no parameters committed.
#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("got {got} images but the rig has {expected} cameras")]
    InputCount { got: usize, expected: usize },
    #[error("camera {camera}: {reason}")]
    FeatureExtraction { camera: usize, reason: String },
    #[error("insufficient overlap: {0}")]
    InsufficientOverlap(String),
    #[error("camera parameter estimation did not converge: {0}")]
    Convergence(String),
    #[error("calibration record io: {0}")]
    Io(#[from] std::io::Error),
    #[error("calibration record format: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Conditions that end the pipeline loops.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("capture failed {failures} consecutive times, camera subsystem is down")]
    CameraDown { failures: usize },
    #[error("renderer reported a fatal condition")]
    RenderFatal,
    #[error("renderer initialization failed")]
    RendererInit,
    #[error("capture stream could not be started")]
    StreamStart,
    #[error("run requested before initialization succeeded")]
    NotInitialized,
    #[error("worker pool: {0}")]
    WorkerPool(String),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
}

pub type CalibrationResult<T> = Result<T, CalibrationError>;
