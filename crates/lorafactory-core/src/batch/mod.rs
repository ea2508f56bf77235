//! Batch orchestration: jobs, prompt synthesis and bounded-concurrency runs.

mod job;
mod orchestrator;
pub(crate) mod prompts;

pub use job::{GenerationJob, ReferenceAsset};
pub use orchestrator::{BatchEvent, BatchRun, BatchState, Orchestrator, OrchestratorOptions};
