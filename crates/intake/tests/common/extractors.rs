//! Fake extraction adapters.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use intake::extraction::{ExtractionError, Extractor};
use intake::record::CandidateRecord;

/// Always returns the same record.
pub struct FixedExtractor(pub CandidateRecord);

#[async_trait]
impl Extractor for FixedExtractor {
    async fn extract(&self, _path: &Path) -> Result<CandidateRecord, ExtractionError> {
        Ok(self.0.clone())
    }
}

/// Sleeps before returning a record and records peak concurrency.
pub struct SlowExtractor {
    delay: Duration,
    record: CandidateRecord,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl SlowExtractor {
    pub fn new(delay: Duration, record: CandidateRecord) -> Self {
        Self {
            delay,
            record,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for SlowExtractor {
    async fn extract(&self, _path: &Path) -> Result<CandidateRecord, ExtractionError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(self.record.clone())
    }
}

/// Always fails.
pub struct FailingExtractor;

#[async_trait]
impl Extractor for FailingExtractor {
    async fn extract(&self, _path: &Path) -> Result<CandidateRecord, ExtractionError> {
        Err(ExtractionError::Failed("upstream service returned 503".to_string()))
    }
}

/// Never returns.
pub struct HangingExtractor;

#[async_trait]
impl Extractor for HangingExtractor {
    async fn extract(&self, _path: &Path) -> Result<CandidateRecord, ExtractionError> {
        std::future::pending().await
    }
}

/// Blocks every extraction until a permit is released through `open`.
pub struct GatedExtractor {
    gate: Arc<Semaphore>,
    record: CandidateRecord,
}

impl GatedExtractor {
    pub fn new(record: CandidateRecord) -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            record,
        }
    }

    /// Lets `n` waiting extractions through.
    pub fn open(&self, n: usize) {
        self.gate.add_permits(n);
    }
}

#[async_trait]
impl Extractor for GatedExtractor {
    async fn extract(&self, _path: &Path) -> Result<CandidateRecord, ExtractionError> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| ExtractionError::Failed(e.to_string()))?;
        permit.forget();
        Ok(self.record.clone())
    }
}
