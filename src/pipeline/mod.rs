pub mod app;
pub mod cancel;
pub mod collaborators;
pub mod render_setup;
pub mod scheduler;
pub mod worker_pool;

pub use app::{AppState, Collaborators, RunStats, SurroundViewApp};
pub use cancel::StopToken;
pub use collaborators::{CaptureSource, ObjectDetector, Renderer, Stitcher};
pub use render_setup::{BowlConfig, RenderSetup};
pub use scheduler::{MaintenanceScheduler, PeriodicTask, TickOutcome};
pub use worker_pool::WorkerPool;
