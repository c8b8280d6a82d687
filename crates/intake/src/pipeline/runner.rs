use std::sync::Arc;

use tracing::{debug, info_span, warn, Instrument};

use crate::broadcast::job_progress::JobPhase;
use crate::db::Persistence;
use crate::extraction::{ExtractionError, Extractor};
use crate::record::CandidateRecord;
use crate::sanitize;
use crate::suggest::CorrectionSuggester;
use crate::template::TemplateStore;
use crate::validation::Validator;
use crate::worker::job::ProcessingResult;

use super::config::PipelineConfig;
use super::context::PipelineContext;
use super::error::PipelineError;
use super::progress::ProgressReporter;

pub struct Pipeline {
    config: PipelineConfig,
    extractor: Arc<dyn Extractor>,
    validator: Validator,
    persistence: Arc<dyn Persistence>,
    templates: Arc<TemplateStore>,
    suggester: CorrectionSuggester,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        extractor: Arc<dyn Extractor>,
        persistence: Arc<dyn Persistence>,
        templates: Arc<TemplateStore>,
    ) -> Self {
        let validator = Validator::new(config.buyer_jurisdiction.clone());
        let suggester = CorrectionSuggester::new(Arc::clone(&persistence));
        Self {
            config,
            extractor,
            validator,
            persistence,
            templates,
            suggester,
        }
    }

    pub fn templates(&self) -> &Arc<TemplateStore> {
        &self.templates
    }

    /// Runs every step for one job. Only extraction failures are errors;
    /// everything after extraction is captured into the result.
    pub async fn run(
        &self,
        mut ctx: PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<ProcessingResult, PipelineError> {
        let span = info_span!("pipeline",
            job_id = %ctx.job_id,
            filename = %sanitize::redact_path(&ctx.file),
            owner = %ctx.owner,
        );

        async move {
            progress.report(JobPhase::Dequeued, "Picked up by a worker");

            // Step 1: Extract
            progress.report(JobPhase::Extracting, "Extracting fields from the document...");
            self.step_extract(&mut ctx)
                .instrument(info_span!("extract"))
                .await?;
            progress.report(JobPhase::Extracted, "Extraction finished");

            // Step 2: Validate
            {
                let _step = info_span!("validate").entered();
                self.step_validate(&mut ctx);
            }
            progress.report(JobPhase::Validated, "Validation finished");

            // Step 3: Duplicate and anomaly check
            self.step_check(&mut ctx)
                .instrument(info_span!("check"))
                .await;
            progress.report(JobPhase::Checked, "Duplicate and anomaly check finished");

            // Step 4: Correction suggestions
            self.step_suggest(&mut ctx)
                .instrument(info_span!("suggest"))
                .await;
            progress.report(JobPhase::Suggested, "Suggestions generated");

            Ok(ProcessingResult {
                record: ctx.record.take().expect("step 1 completed"),
                validation: ctx.validation.take().expect("step 2 completed"),
                counterparty_id: ctx.counterparty_id.take(),
                anomalies: ctx.anomalies.take(),
                suggestions: std::mem::take(&mut ctx.suggestions),
                duplicate_of: ctx.duplicate_of.take(),
            })
        }
        .instrument(span)
        .await
    }

    async fn step_extract(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let extraction = self.extractor.extract(&ctx.file);
        let record = match self.config.extraction_timeout {
            Some(limit) => tokio::time::timeout(limit, extraction)
                .await
                .map_err(|_| ExtractionError::Timeout(limit))??,
            None => extraction.await?,
        };
        debug!(
            items = record.items.len(),
            extraction_confidence = record.extraction_confidence,
            "Record extracted"
        );
        ctx.record = Some(record);
        Ok(())
    }

    fn step_validate(&self, ctx: &mut PipelineContext) {
        let record = ctx.record.as_ref().expect("step 1 completed");
        let validation = self.validator.validate(record);
        debug!(
            confidence = validation.confidence_score,
            errors = validation.errors.len(),
            auto_approve = validation.can_auto_approve,
            "Record validated"
        );
        ctx.validation = Some(validation);
    }

    async fn step_check(&self, ctx: &mut PipelineContext) {
        let record = ctx.record.as_ref().expect("step 1 completed");
        let Some(counterparty_id) = record.counterparty_key() else {
            debug!("Counterparty unknown, skipping template match");
            return;
        };

        if let Some(duplicate) = self.find_duplicate(&counterparty_id, record).await {
            let validation = ctx.validation.as_mut().expect("step 2 completed");
            validation.warn(format!(
                "Invoice {} was already approved as record {}",
                record.invoice_number().unwrap_or_default(),
                duplicate
            ));
            validation.can_auto_approve = false;
            ctx.duplicate_of = Some(duplicate);
        }

        let report = self.templates.match_record(record, &counterparty_id).await;
        debug!(matches = report.matches, confidence = report.confidence, "Template matched");
        ctx.anomalies = Some(report);
        ctx.counterparty_id = Some(counterparty_id);
    }

    async fn find_duplicate(&self, counterparty_id: &str, record: &CandidateRecord) -> Option<String> {
        let number = record.invoice_number()?;
        match self.persistence.find_duplicate(counterparty_id, number).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Duplicate lookup failed, assuming none: {}", e);
                None
            }
        }
    }

    async fn step_suggest(&self, ctx: &mut PipelineContext) {
        let record = ctx.record.as_ref().expect("step 1 completed");
        let validation = ctx.validation.as_ref().expect("step 2 completed");
        ctx.suggestions = self.suggester.suggest(record, validation).await;
    }
}
