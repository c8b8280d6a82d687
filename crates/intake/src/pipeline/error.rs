use thiserror::Error;

/// Errors that terminate a job. Everything downstream of extraction is
/// captured into the job's result instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Extraction(#[from] crate::extraction::ExtractionError),
}
