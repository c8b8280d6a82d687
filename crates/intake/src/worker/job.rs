use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::CandidateRecord;
use crate::suggest::CorrectionSuggestion;
use crate::template::AnomalyReport;
use crate::validation::ValidationResult;

/// Error recorded on jobs cancelled before a worker picked them up.
pub const CANCELLED: &str = "cancelled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Legal edges of the job lifecycle. `Pending -> Failed` is cancellation,
    /// `Failed -> Pending` an operator retry.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
                | (JobStatus::Failed, JobStatus::Pending)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "PENDING"),
            JobStatus::Processing => write!(f, "PROCESSING"),
            JobStatus::Completed => write!(f, "COMPLETED"),
            JobStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Everything the pipeline produced for one upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    pub record: CandidateRecord,
    pub validation: ValidationResult,
    /// Key the counterparty's template is learned under, when known.
    pub counterparty_id: Option<String>,
    /// `None` when the counterparty is unknown and no match was attempted.
    pub anomalies: Option<AnomalyReport>,
    pub suggestions: Vec<CorrectionSuggestion>,
    /// Id of an approved record with the same counterparty and invoice number.
    pub duplicate_of: Option<String>,
}

/// One unit of queued work.
///
/// `result` is set iff the job is COMPLETED and `error` iff it is FAILED.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub file: PathBuf,
    pub owner: String,
    /// MIME type of the upload (e.g., "application/pdf", "image/png").
    pub mime_type: Option<String>,
    pub status: JobStatus,
    /// 0-100, never decreasing while PROCESSING.
    pub progress: u8,
    pub result: Option<ProcessingResult>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// How many times a worker has picked the job up.
    pub attempts: u32,
}

impl Job {
    pub fn new(file: PathBuf, owner: &str) -> Self {
        let mime_type = Self::detect_mime_type(&file);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file,
            owner: owner.to_string(),
            mime_type,
            status: JobStatus::Pending,
            progress: 0,
            result: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
            attempts: 0,
        }
    }

    /// Detects MIME type from file path using the mime_guess crate.
    /// Returns `None` for unknown extensions.
    fn detect_mime_type(path: &Path) -> Option<String> {
        mime_guess::from_path(path).first().map(|m| m.to_string())
    }

    /// Moves the job along its lifecycle.
    ///
    /// # Panics
    /// Panics on an edge [`JobStatus::can_transition_to`] rejects. Reaching
    /// one is a bug in the caller, not a recoverable condition.
    fn transition(&mut self, next: JobStatus) {
        assert!(
            self.status.can_transition_to(next),
            "illegal job transition {} -> {} for job {}",
            self.status,
            next,
            self.id
        );
        self.status = next;
    }

    pub fn start(&mut self) {
        self.transition(JobStatus::Processing);
        self.attempts += 1;
    }

    /// Raises progress; lower values are ignored.
    pub fn advance(&mut self, progress: u8) {
        assert!(
            self.status == JobStatus::Processing,
            "progress update for job {} while {}",
            self.id,
            self.status
        );
        self.progress = self.progress.max(progress.min(100));
    }

    pub fn complete(&mut self, result: ProcessingResult) {
        self.transition(JobStatus::Completed);
        self.progress = 100;
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.transition(JobStatus::Failed);
        self.error = Some(reason.into());
        self.completed_at = Some(Utc::now());
    }

    /// Cancels a PENDING job. Returns `false` in any other state.
    pub fn cancel(&mut self) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }
        self.fail(CANCELLED);
        true
    }

    /// Resets a FAILED job to PENDING. Returns `false` in any other state.
    pub fn reset(&mut self) -> bool {
        if self.status != JobStatus::Failed {
            return false;
        }
        self.transition(JobStatus::Pending);
        self.progress = 0;
        self.error = None;
        self.completed_at = None;
        true
    }
}
