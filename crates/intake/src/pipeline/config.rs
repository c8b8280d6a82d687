use std::time::Duration;

use crate::config::IntakeConfig;

#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// `None` lets a hung extractor hold its worker indefinitely.
    pub extraction_timeout: Option<Duration>,
    pub buyer_jurisdiction: Option<String>,
}

impl PipelineConfig {
    pub fn from_config(config: &IntakeConfig) -> Self {
        Self {
            extraction_timeout: config.extraction_timeout(),
            buyer_jurisdiction: config.buyer_jurisdiction.clone(),
        }
    }
}
