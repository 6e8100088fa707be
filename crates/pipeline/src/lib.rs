//! Background execution of generation requests.
//!
//! [`GenerationOrchestrator::submit`] does the synchronous part of a
//! request (lookups, validation, record creation) and hands the rest to the
//! [`JobRunner`]: input persistence, the provider exchange under its own
//! deadline, output persistence, the final usage-record update and the
//! completion notification.

pub mod error;
pub mod orchestrator;
pub mod runner;

pub use error::PipelineError;
pub use orchestrator::{GenerationOrchestrator, OrchestratorDeps, Submission, DEFAULT_JOB_TIMEOUT};
pub use runner::JobRunner;
