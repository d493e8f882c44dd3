pub mod calibration;
pub mod config;
pub mod data_loader;
pub mod detected_points;
pub mod error;
pub mod features;
pub mod io;
pub mod optimization;
pub mod photometric;
pub mod pipeline;
pub mod types;
pub mod visualization;

pub use calibration::CalibrationEstimator;
pub use error::{CalibrationError, CalibrationResult, PipelineError};
