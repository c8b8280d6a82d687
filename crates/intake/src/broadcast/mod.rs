//! Broadcasting of job progress, replacing per-job callbacks with a channel
//! any number of consumers can subscribe to.

pub mod job_progress;

pub use job_progress::{JobPhase, JobProgressBroadcaster, JobProgressEvent, JobProgressTracker};
