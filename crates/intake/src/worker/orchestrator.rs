use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::broadcast::job_progress::{JobPhase, JobProgressBroadcaster, JobProgressEvent, JobProgressTracker};
use crate::cache::MokaCache;
use crate::config::{validate_config, IntakeConfig};
use crate::db::{ApprovedRecord, Database, Persistence};
use crate::error::{ConfigError, QueueError, Result};
use crate::extraction::Extractor;
use crate::pipeline::{Pipeline, PipelineConfig, PipelineContext, ProgressReporter};
use crate::sanitize;
use crate::template::{LearnOutcome, TemplateStore};

use super::job::{Job, JobStatus};
use super::table::{JobTable, QueueStats};

/// How long an idle worker sleeps before checking the queue again when no
/// wake-up arrives.
const IDLE_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub worker_count: usize,
    pub max_pending: Option<usize>,
    pub retention: Duration,
    pub cleanup_interval: Duration,
    pub delete_upload_on_success: bool,
}

impl OrchestratorSettings {
    pub fn from_config(config: &IntakeConfig) -> Self {
        Self {
            worker_count: config.worker_count,
            max_pending: config.max_pending,
            retention: config.retention(),
            cleanup_interval: config.cleanup_interval(),
            delete_upload_on_success: config.delete_upload_on_success,
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&IntakeConfig::default())
    }
}

/// Result of approving a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalOutcome {
    /// Id of the approved record; the job id.
    pub record_id: String,
    /// `false` when the job had already been approved.
    pub newly_saved: bool,
    /// `None` when the counterparty is unknown and nothing could be learned.
    pub learn: Option<LearnOutcome>,
}

struct Shared {
    table: Mutex<JobTable>,
    wakeup: Notify,
    shutdown: AtomicBool,
    active_workers: AtomicUsize,
    pipeline: Pipeline,
    persistence: Arc<dyn Persistence>,
    progress: JobProgressBroadcaster,
    settings: OrchestratorSettings,
}

impl Shared {
    fn table(&self) -> MutexGuard<'_, JobTable> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn tracker(&self, job: &Job) -> JobProgressTracker {
        self.progress
            .tracker(&job.id, &job.owner, &sanitize::redact_path(&job.file))
    }

    /// Claims the next PENDING job and counts the claiming worker as active
    /// until the job is completed or failed.
    fn claim(&self) -> Option<Job> {
        let mut table = self.table();
        let job = table.claim_next()?;
        self.active_workers.fetch_add(1, Ordering::SeqCst);
        if table.pending_len() > 0 {
            self.wakeup.notify_one();
        }
        Some(job)
    }

    async fn process(&self, worker_id: usize, job: Job) {
        debug!(
            "Worker {} processing job {} ({})",
            worker_id,
            job.id,
            sanitize::redact_path(&job.file)
        );

        let tracker = self.tracker(&job);
        let reporter = JobReporter {
            shared: self,
            job_id: &job.id,
            tracker: &tracker,
        };
        let ctx = PipelineContext::new(&job.id, job.file.clone(), &job.owner);

        match AssertUnwindSafe(self.pipeline.run(ctx, &reporter))
            .catch_unwind()
            .await
        {
            Ok(Ok(result)) => {
                if self.settings.delete_upload_on_success {
                    remove_upload(&job.file).await;
                }
                {
                    let mut table = self.table();
                    table.complete(&job.id, result);
                    self.active_workers.fetch_sub(1, Ordering::SeqCst);
                }
                tracker.checkpoint(JobPhase::Stored, "Result stored");
                info!("Job {} completed", job.id);
            }
            Ok(Err(e)) => self.fail(&job, &tracker, &e.to_string()).await,
            Err(panic) => {
                let reason = format!("worker panicked: {}", panic_message(panic.as_ref()));
                self.fail(&job, &tracker, &reason).await;
            }
        }
    }

    async fn fail(&self, job: &Job, tracker: &JobProgressTracker, reason: &str) {
        remove_upload(&job.file).await;
        let progress = {
            let mut table = self.table();
            let progress = table.get(&job.id).map(|j| j.progress).unwrap_or_default();
            table.fail(&job.id, reason);
            self.active_workers.fetch_sub(1, Ordering::SeqCst);
            progress
        };
        tracker.failed(progress, reason);
        error!("Job {} failed: {}", job.id, reason);
    }
}

/// Mirrors pipeline checkpoints into the job table and the broadcaster.
struct JobReporter<'a> {
    shared: &'a Shared,
    job_id: &'a str,
    tracker: &'a JobProgressTracker,
}

impl ProgressReporter for JobReporter<'_> {
    fn report(&self, phase: JobPhase, message: &str) {
        if let Some(progress) = phase.progress() {
            self.shared.table().advance(self.job_id, progress);
        }
        self.tracker.checkpoint(phase, message);
    }
}

/// Bounded async worker pool over an in-memory job table.
///
/// At most `worker_count` jobs are PROCESSING at once; the rest wait as
/// PENDING and are served in submission order.
pub struct Orchestrator {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    cleanup: JoinHandle<()>,
}

impl Orchestrator {
    /// Starts the workers and the retention task.
    ///
    /// # Panics
    /// Panics if `settings.worker_count` or `settings.cleanup_interval` is
    /// zero, or if called outside a Tokio runtime.
    pub fn new(settings: OrchestratorSettings, pipeline: Pipeline, persistence: Arc<dyn Persistence>) -> Self {
        assert!(settings.worker_count > 0, "worker_count must be > 0");
        let worker_count = settings.worker_count;

        let shared = Arc::new(Shared {
            table: Mutex::new(JobTable::new()),
            wakeup: Notify::new(),
            shutdown: AtomicBool::new(false),
            active_workers: AtomicUsize::new(0),
            pipeline,
            persistence,
            progress: JobProgressBroadcaster::default(),
            settings,
        });

        let workers = (0..worker_count)
            .map(|worker_id| tokio::spawn(run_worker(worker_id, Arc::clone(&shared))))
            .collect();
        let cleanup = tokio::spawn(run_cleanup(Arc::clone(&shared)));

        info!("Started {} workers", worker_count);

        Self {
            shared,
            workers,
            cleanup,
        }
    }

    /// Opens the configured database and wires up the full pipeline.
    pub fn from_config(config: &IntakeConfig, extractor: Arc<dyn Extractor>) -> Result<Self> {
        validate_config(config)?;
        let path = config
            .resolved_database_path()
            .ok_or_else(|| ConfigError::Validation {
                message: "databasePath is not set and no home directory was found".to_string(),
            })?;
        let database = Database::open(&path)?;
        Ok(Self::with_persistence(config, extractor, Arc::new(database)))
    }

    /// Like [`Orchestrator::from_config`], over an already opened store.
    pub fn with_persistence(
        config: &IntakeConfig,
        extractor: Arc<dyn Extractor>,
        persistence: Arc<dyn Persistence>,
    ) -> Self {
        let templates = Arc::new(TemplateStore::new(
            Arc::clone(&persistence),
            Arc::new(MokaCache::new(config.template_cache_capacity)),
            config.template_cache_ttl(),
        ));
        let pipeline = Pipeline::new(
            PipelineConfig::from_config(config),
            extractor,
            Arc::clone(&persistence),
            templates,
        );
        Self::new(OrchestratorSettings::from_config(config), pipeline, persistence)
    }

    /// Queues one upload. Returns immediately with the new job id.
    pub fn submit(&self, file: impl Into<PathBuf>, owner: &str) -> std::result::Result<String, QueueError> {
        let mut ids = self.enqueue(vec![file.into()], owner)?;
        Ok(ids.remove(0))
    }

    /// Queues several uploads. Either all are accepted or none.
    pub fn submit_batch<I, P>(&self, files: I, owner: &str) -> std::result::Result<Vec<String>, QueueError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.enqueue(files.into_iter().map(Into::into).collect(), owner)
    }

    fn enqueue(&self, files: Vec<PathBuf>, owner: &str) -> std::result::Result<Vec<String>, QueueError> {
        if self.is_shutdown() {
            return Err(QueueError::ShutDown);
        }

        let jobs: Vec<Job> = files.into_iter().map(|file| Job::new(file, owner)).collect();
        {
            let mut table = self.shared.table();
            if let Some(limit) = self.shared.settings.max_pending {
                if table.pending_len() + jobs.len() > limit {
                    warn!("Rejecting {} uploads from {}: queue full", jobs.len(), owner);
                    return Err(QueueError::QueueFull { limit });
                }
            }
            for job in &jobs {
                table.insert(job.clone());
                self.shared.tracker(job).queued();
            }
        }

        for _ in &jobs {
            self.shared.wakeup.notify_one();
        }
        debug!("Queued {} jobs for {}", jobs.len(), owner);

        Ok(jobs.into_iter().map(|job| job.id).collect())
    }

    pub fn get_job(&self, job_id: &str) -> Option<Job> {
        self.shared.table().get(job_id).cloned()
    }

    pub fn jobs_for(&self, owner: &str) -> Vec<Job> {
        self.shared.table().jobs_for(owner)
    }

    /// Cancels a PENDING job and deletes its upload. Returns `false` for
    /// jobs in any other state, or unknown ids.
    pub fn cancel(&self, job_id: &str) -> bool {
        let Some(job) = self.shared.table().cancel(job_id) else {
            return false;
        };
        if let Err(e) = std::fs::remove_file(&job.file) {
            log_failed_removal(&job.file, &e);
        }
        self.shared
            .tracker(&job)
            .failed(job.progress, job.error.as_deref().unwrap_or_default());
        info!("Job {} cancelled", job_id);
        true
    }

    /// Puts a FAILED job back in the queue. The upload must be in place
    /// again before a worker picks it up.
    pub fn retry(&self, job_id: &str) -> bool {
        if self.is_shutdown() {
            return false;
        }
        let job = {
            let mut table = self.shared.table();
            let Some(job) = table.retry(job_id) else {
                return false;
            };
            self.shared.tracker(&job).queued();
            job
        };
        self.shared.wakeup.notify_one();
        info!("Job {} requeued (attempt {})", job_id, job.attempts + 1);
        true
    }

    pub fn stats(&self) -> QueueStats {
        let mut stats = self.shared.table().stats();
        stats.active_workers = self.shared.active_workers.load(Ordering::SeqCst);
        stats
    }

    /// Stores a COMPLETED job's record as approved and folds it into the
    /// counterparty's template.
    pub async fn approve(&self, job_id: &str, was_accurate: bool) -> Result<ApprovalOutcome> {
        let Job { id, status, result, .. } = self
            .get_job(job_id)
            .ok_or_else(|| QueueError::NotFound(job_id.to_string()))?;
        let result = match result {
            Some(result) if status == JobStatus::Completed => result,
            _ => {
                return Err(QueueError::NotApprovable {
                    id,
                    status: status.to_string(),
                }
                .into())
            }
        };

        let approved = ApprovedRecord {
            id: id.clone(),
            counterparty_id: result.counterparty_id.clone(),
            record: result.record.clone(),
            approved_at: Utc::now(),
        };
        let newly_saved = self.shared.persistence.save_approved_record(&approved).await?;

        let learn = match &result.counterparty_id {
            Some(counterparty_id) => Some(
                self.shared
                    .pipeline
                    .templates()
                    .learn(&result.record, counterparty_id, was_accurate)
                    .await,
            ),
            None => None,
        };

        info!("Job {} approved (learn: {:?})", id, learn);
        Ok(ApprovalOutcome {
            record_id: id,
            newly_saved,
            learn,
        })
    }

    /// Progress events for every job, from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.shared.progress.subscribe()
    }

    /// Stops workers from claiming more jobs. Jobs already PROCESSING run
    /// to completion.
    pub fn shutdown(&self) {
        info!("Shutting down orchestrator...");
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.wakeup.notify_waiters();
        self.cleanup.abort();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::SeqCst)
    }

    /// Waits for every worker to stop. Call [`Orchestrator::shutdown`] first.
    pub async fn wait(self) {
        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.await {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        if let Err(e) = self.cleanup.await {
            if !e.is_cancelled() {
                error!("Cleanup task failed: {:?}", e);
            }
        }

        info!("All workers have stopped");
    }
}

async fn run_worker(worker_id: usize, shared: Arc<Shared>) {
    debug!("Worker {} started", worker_id);

    loop {
        if shared.shutdown.load(Ordering::SeqCst) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match shared.claim() {
            Some(job) => shared.process(worker_id, job).await,
            None => {
                let _ = tokio::time::timeout(IDLE_POLL, shared.wakeup.notified()).await;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

async fn run_cleanup(shared: Arc<Shared>) {
    let mut ticker = tokio::time::interval(shared.settings.cleanup_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let purged = shared
            .table()
            .purge_expired(Utc::now(), shared.settings.retention);
        if !purged.is_empty() {
            debug!("Purged {} expired jobs", purged.len());
        }
    }
}

async fn remove_upload(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed upload {}", sanitize::redact_path(path)),
        Err(e) => log_failed_removal(path, &e),
    }
}

fn log_failed_removal(path: &Path, e: &std::io::Error) {
    if e.kind() != std::io::ErrorKind::NotFound {
        warn!("Failed to remove upload {}: {}", sanitize::redact_path(path), e);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
