//! The document pipeline: stages, quality gate and progress reporting.

pub mod config;
pub mod context;
pub mod error;
pub mod gate;
pub mod progress;
pub mod runner;
pub mod stage;

pub use config::PipelineConfig;
pub use context::{PipelineContext, ScratchFiles};
pub use error::{PipelineError, StageFailure};
pub use gate::{GateRoute, QualityGate, QualityGateDecision};
pub use progress::{HubProgress, NoopProgress, ProgressReporter, ProgressUpdate};
pub use runner::{Collaborators, Pipeline};
pub use stage::Stage;
