use crate::broadcast::job_progress::JobPhase;

/// Receives pipeline checkpoints as a job moves through its steps.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, phase: JobPhase, message: &str);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _phase: JobPhase, _message: &str) {}
}
