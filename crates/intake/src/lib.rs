pub mod broadcast;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod extraction;
pub mod logging;
pub mod pipeline;
pub mod record;
pub mod sanitize;
pub mod suggest;
pub mod template;
pub mod validation;
pub mod worker;

pub use broadcast::{JobPhase, JobProgressBroadcaster, JobProgressEvent};
pub use cache::{Cache, MokaCache, NoopCache};
pub use config::{load_config, load_config_from_str, IntakeConfig, LoggingConfig};
pub use db::{Database, DatabaseError, Persistence};
pub use error::{ConfigError, IntakeError, LoggingError, QueueError, Result};
pub use extraction::{ExtractionError, Extractor, JsonExtractor};
pub use logging::init_logging;
pub use pipeline::{Pipeline, PipelineConfig, PipelineContext, PipelineError};
pub use record::{CandidateRecord, LineItem, TaxComponents, TaxRegime};
pub use suggest::{CorrectionSuggester, CorrectionSuggestion};
pub use template::{AnomalyReport, LearnOutcome, Template, TemplateStore};
pub use validation::{ValidationResult, Validator};
pub use worker::{ApprovalOutcome, Job, JobStatus, Orchestrator, OrchestratorSettings, ProcessingResult, QueueStats};
