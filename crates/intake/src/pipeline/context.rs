use std::path::PathBuf;

use crate::record::CandidateRecord;
use crate::suggest::CorrectionSuggestion;
use crate::template::AnomalyReport;
use crate::validation::ValidationResult;

pub struct PipelineContext {
    // Input
    pub job_id: String,
    pub file: PathBuf,
    pub owner: String,

    // Step 1 result, guaranteed Some after step_extract
    pub record: Option<CandidateRecord>,

    // Step 2 result, guaranteed Some after step_validate
    pub validation: Option<ValidationResult>,

    // Step 3 results
    pub counterparty_id: Option<String>,
    pub duplicate_of: Option<String>,
    pub anomalies: Option<AnomalyReport>,

    // Step 4 result
    pub suggestions: Vec<CorrectionSuggestion>,
}

impl PipelineContext {
    pub fn new(job_id: &str, file: PathBuf, owner: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            file,
            owner: owner.to_string(),
            record: None,
            validation: None,
            counterparty_id: None,
            duplicate_of: None,
            anomalies: None,
            suggestions: Vec::new(),
        }
    }
}
