//! Job lifecycle and the bounded worker pool that drives it.

pub mod job;
pub mod orchestrator;
pub mod table;

pub use job::{Job, JobStatus, ProcessingResult, CANCELLED};
pub use orchestrator::{ApprovalOutcome, Orchestrator, OrchestratorSettings};
pub use table::{JobTable, QueueStats};
