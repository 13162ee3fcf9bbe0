//! Propagation job orchestration.
//!
//! - [`PropagationOrchestrator`] plans, enqueues and runs jobs.
//! - [`JobRegistry`] holds job records and enforces legal transitions.
//! - [`JobTasks`] tracks the background task of every running job.
//! - [`MaskPersister`] commits each segment's masks in one batch.
//! - [`retention::run`] evicts finished jobs after a retention period.

pub mod job;
pub mod orchestrator;
pub mod persister;
pub mod registry;
pub mod retention;
pub mod tasks;

pub use job::{JobState, PropagationJob};
pub use orchestrator::{PipelineConfig, PropagationOrchestrator, StartedJob};
pub use persister::{MaskPersister, ObjectLabels};
pub use registry::JobRegistry;
pub use tasks::JobTasks;
