//! Test harness for isolated orchestrator runs.
//!
//! The `TestHarness` owns a temp upload directory and an in-memory database
//! and builds orchestrators wired to a given extractor.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use intake::cache::NoopCache;
use intake::db::{Database, Persistence};
use intake::extraction::Extractor;
use intake::pipeline::{Pipeline, PipelineConfig};
use intake::record::CandidateRecord;
use intake::template::store::DEFAULT_TEMPLATE_TTL;
use intake::template::TemplateStore;
use intake::worker::{Job, Orchestrator, OrchestratorSettings};

pub struct TestHarness {
    temp_dir: TempDir,
    pub uploads: PathBuf,
    pub database: Database,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let uploads = temp_dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).expect("Failed to create uploads directory");
        let database = Database::open_in_memory().expect("Failed to open database");
        Self {
            temp_dir,
            uploads,
            database,
        }
    }

    /// Writes `record` as a JSON upload and returns its path.
    pub fn upload(&self, name: &str, record: &CandidateRecord) -> PathBuf {
        let path = self.uploads.join(name);
        let body = serde_json::to_string(record).expect("Failed to serialize record");
        std::fs::write(&path, body).expect("Failed to write upload");
        path
    }

    /// Settings with a short retention sweep and the given worker count.
    pub fn settings(&self, worker_count: usize) -> OrchestratorSettings {
        OrchestratorSettings {
            worker_count,
            cleanup_interval: Duration::from_millis(50),
            ..Default::default()
        }
    }

    pub fn orchestrator(&self, extractor: Arc<dyn Extractor>, settings: OrchestratorSettings) -> Orchestrator {
        self.orchestrator_with(extractor, settings, PipelineConfig::default())
    }

    pub fn orchestrator_with(
        &self,
        extractor: Arc<dyn Extractor>,
        settings: OrchestratorSettings,
        pipeline_config: PipelineConfig,
    ) -> Orchestrator {
        let persistence: Arc<dyn Persistence> = Arc::new(self.database.clone());
        let templates = Arc::new(TemplateStore::new(
            Arc::clone(&persistence),
            Arc::new(NoopCache),
            DEFAULT_TEMPLATE_TTL,
        ));
        let pipeline = Pipeline::new(pipeline_config, extractor, Arc::clone(&persistence), templates);
        Orchestrator::new(settings, pipeline, persistence)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Polls until `predicate` holds for the job, or panics after five seconds.
pub async fn wait_for_job<F>(orch: &Orchestrator, job_id: &str, predicate: F) -> Job
where
    F: Fn(&Job) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(job) = orch.get_job(job_id) {
                if predicate(&job) {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("job {job_id} did not reach the expected state: {:?}", orch.get_job(job_id)))
}

pub async fn wait_for_terminal(orch: &Orchestrator, job_id: &str) -> Job {
    wait_for_job(orch, job_id, |job| job.status.is_terminal()).await
}
