//! Job progress broadcaster for real-time job status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::worker::job::JobStatus;

/// Pipeline checkpoint reached by a job, with its fixed progress percentage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Queued,
    Dequeued,
    Extracting,
    Extracted,
    Validated,
    Checked,
    Suggested,
    Stored,
    Failed,
}

impl JobPhase {
    /// Progress percentage reported at this checkpoint. `Queued` and
    /// `Failed` do not move progress.
    pub fn progress(&self) -> Option<u8> {
        match self {
            JobPhase::Dequeued => Some(10),
            JobPhase::Extracting => Some(20),
            JobPhase::Extracted => Some(50),
            JobPhase::Validated => Some(70),
            JobPhase::Checked => Some(85),
            JobPhase::Suggested => Some(95),
            JobPhase::Stored => Some(100),
            JobPhase::Queued | JobPhase::Failed => None,
        }
    }
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobPhase::Queued => write!(f, "Queued"),
            JobPhase::Dequeued => write!(f, "Dequeued"),
            JobPhase::Extracting => write!(f, "Extracting"),
            JobPhase::Extracted => write!(f, "Extracted"),
            JobPhase::Validated => write!(f, "Validated"),
            JobPhase::Checked => write!(f, "Duplicate and anomaly check"),
            JobPhase::Suggested => write!(f, "Suggestions generated"),
            JobPhase::Stored => write!(f, "Stored"),
            JobPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Progress event for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    pub job_id: String,
    pub owner: String,
    /// Upload file name, never the full path.
    pub filename: String,
    pub phase: JobPhase,
    pub status: JobStatus,
    /// 0-100.
    pub progress: u8,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Broadcasts job progress events for streaming.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressBroadcaster {
    /// Creates a new job progress broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Creates a new subscriber for progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.sender.subscribe()
    }

    /// Creates a tracker for one job.
    pub fn tracker(&self, job_id: &str, owner: &str, filename: &str) -> JobProgressTracker {
        JobProgressTracker {
            job_id: job_id.to_string(),
            owner: owner.to_string(),
            filename: filename.to_string(),
            sender: Arc::clone(&self.sender),
        }
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Tracks progress for a single job.
#[derive(Clone)]
pub struct JobProgressTracker {
    job_id: String,
    owner: String,
    filename: String,
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressTracker {
    fn event(&self, phase: JobPhase, status: JobStatus, progress: u8, message: &str) -> JobProgressEvent {
        JobProgressEvent {
            job_id: self.job_id.clone(),
            owner: self.owner.clone(),
            filename: self.filename.clone(),
            phase,
            status,
            progress,
            message: message.to_string(),
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub fn queued(&self) {
        let _ = self
            .sender
            .send(self.event(JobPhase::Queued, JobStatus::Pending, 0, "Job queued for processing"));
    }

    /// Reports a checkpoint of a processing job.
    pub fn checkpoint(&self, phase: JobPhase, message: &str) {
        let progress = phase.progress().unwrap_or_default();
        let status = if phase == JobPhase::Stored {
            JobStatus::Completed
        } else {
            JobStatus::Processing
        };
        let _ = self.sender.send(self.event(phase, status, progress, message));
    }

    /// Marks the job as failed. `progress` is where the job stopped.
    pub fn failed(&self, progress: u8, error: &str) {
        let mut event = self.event(JobPhase::Failed, JobStatus::Failed, progress, "Processing failed");
        event.error = Some(error.to_string());
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcaster_send_receive() {
        let broadcaster = JobProgressBroadcaster::new(10);
        let mut rx = broadcaster.subscribe();

        let tracker = broadcaster.tracker("job-1", "alice", "invoice.json");
        tracker.queued();
        tracker.checkpoint(JobPhase::Extracted, "Extraction finished");

        let queued = rx.try_recv().unwrap();
        assert_eq!(queued.job_id, "job-1");
        assert_eq!(queued.owner, "alice");
        assert_eq!(queued.status, JobStatus::Pending);

        let extracted = rx.try_recv().unwrap();
        assert_eq!(extracted.phase, JobPhase::Extracted);
        assert_eq!(extracted.progress, 50);
        assert_eq!(extracted.status, JobStatus::Processing);
    }

    #[test]
    fn test_stored_completes_job() {
        let broadcaster = JobProgressBroadcaster::new(10);
        let mut rx = broadcaster.subscribe();
        broadcaster
            .tracker("job-2", "bob", "a.json")
            .checkpoint(JobPhase::Stored, "Result stored");

        let event = rx.try_recv().unwrap();
        assert_eq!(event.progress, 100);
        assert_eq!(event.status, JobStatus::Completed);
    }

    #[test]
    fn test_job_failure() {
        let broadcaster = JobProgressBroadcaster::new(10);
        let mut rx = broadcaster.subscribe();

        broadcaster
            .tracker("job-3", "bob", "corrupt.json")
            .failed(20, "Extraction failed: unreadable scan");

        let received = rx.try_recv().unwrap();
        assert_eq!(received.phase, JobPhase::Failed);
        assert_eq!(received.status, JobStatus::Failed);
        assert_eq!(received.progress, 20);
        assert_eq!(
            received.error,
            Some("Extraction failed: unreadable scan".to_string())
        );
    }

    #[test]
    fn test_checkpoints_are_increasing() {
        let phases = [
            JobPhase::Dequeued,
            JobPhase::Extracting,
            JobPhase::Extracted,
            JobPhase::Validated,
            JobPhase::Checked,
            JobPhase::Suggested,
            JobPhase::Stored,
        ];
        let values: Vec<u8> = phases.iter().filter_map(JobPhase::progress).collect();
        assert_eq!(values, vec![10, 20, 50, 70, 85, 95, 100]);
    }

    #[test]
    fn test_send_without_subscribers() {
        let broadcaster = JobProgressBroadcaster::default();
        broadcaster.tracker("job-4", "x", "y").queued();
    }
}
