//! Extraction adapter boundary.
//!
//! Field extraction from the raw document (OCR, AI, ...) happens outside
//! this crate. The pipeline only sees an [`Extractor`] that turns a file
//! into a [`CandidateRecord`] or fails.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::record::CandidateRecord;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Extraction failed: {0}")]
    Failed(String),

    #[error("Extraction timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to read upload '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse extracted record: {0}")]
    Parse(#[from] serde_json::Error),
}

#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<CandidateRecord, ExtractionError>;
}

/// Reads a candidate record serialized as JSON. Used for local runs and for
/// uploads that were extracted upstream.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonExtractor;

#[async_trait]
impl Extractor for JsonExtractor {
    async fn extract(&self, path: &Path) -> Result<CandidateRecord, ExtractionError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ExtractionError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
        Ok(serde_json::from_str(&content)?)
    }
}
