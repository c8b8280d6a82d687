//! Read-through template store.
//!
//! Reads go cache first, then the durable store, and populate the cache.
//! Writes (`learn`) are serialized per counterparty so two concurrent
//! approvals for the same counterparty never interleave their running-mean
//! updates. Every persistence failure degrades to "no data".

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::cache::Cache;
use crate::db::persistence::normalize_invoice_number;
use crate::db::Persistence;
use crate::record::CandidateRecord;
use crate::sanitize::redact_tax_id;

use super::matcher::{match_template, AnomalyReport};
use super::model::Template;

/// Default template cache lifetime.
pub const DEFAULT_TEMPLATE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearnOutcome {
    /// First record for the counterparty; a template was seeded.
    Created,
    Updated,
    /// The same record was learned before; nothing changed.
    AlreadyLearned,
    /// The durable store could not be reached; nothing changed.
    Unavailable,
}

impl LearnOutcome {
    pub fn changed(&self) -> bool {
        matches!(self, LearnOutcome::Created | LearnOutcome::Updated)
    }
}

/// Identifies one approved record for idempotent learning. Records without
/// an invoice number cannot be fingerprinted.
pub fn learn_fingerprint(counterparty_id: &str, record: &CandidateRecord) -> Option<String> {
    record
        .invoice_number()
        .map(|n| format!("{counterparty_id}:{}", normalize_invoice_number(n)))
}

fn cache_key(counterparty_id: &str) -> String {
    format!("template:{counterparty_id}")
}

pub struct TemplateStore {
    persistence: Arc<dyn Persistence>,
    cache: Arc<dyn Cache>,
    cache_ttl: Duration,
    learn_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TemplateStore {
    pub fn new(persistence: Arc<dyn Persistence>, cache: Arc<dyn Cache>, cache_ttl: Duration) -> Self {
        Self {
            persistence,
            cache,
            cache_ttl,
            learn_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Looks up the counterparty's template.
    pub async fn get_template(&self, counterparty_id: &str) -> Option<Template> {
        let key = cache_key(counterparty_id);
        if let Some(body) = self.cache.get(&key) {
            match serde_json::from_str(&body) {
                Ok(template) => return Some(template),
                Err(e) => {
                    warn!(
                        "Dropping unreadable cached template {}: {}",
                        redact_tax_id(counterparty_id),
                        e
                    );
                    self.cache.invalidate(&key);
                }
            }
        }

        match self.persistence.get_template(counterparty_id).await {
            Ok(Some(template)) => {
                self.store_in_cache(&template);
                Some(template)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(
                    "Template lookup for {} failed, treating as unknown: {}",
                    redact_tax_id(counterparty_id),
                    e
                );
                None
            }
        }
    }

    /// Compares `record` with the counterparty's template.
    pub async fn match_record(&self, record: &CandidateRecord, counterparty_id: &str) -> AnomalyReport {
        let template = self.get_template(counterparty_id).await;
        match_template(record, template.as_ref())
    }

    /// Folds an approved record into the counterparty's template.
    pub async fn learn(
        &self,
        record: &CandidateRecord,
        counterparty_id: &str,
        was_accurate: bool,
    ) -> LearnOutcome {
        let lock = self.learn_lock(counterparty_id);
        let _guard = lock.lock().await;

        let fingerprint = learn_fingerprint(counterparty_id, record);
        if let Some(fp) = &fingerprint {
            match self.persistence.mark_learned(fp, counterparty_id).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!("Record from {} already learned", redact_tax_id(counterparty_id));
                    return LearnOutcome::AlreadyLearned;
                }
                Err(e) => {
                    warn!(
                        "Could not record learn fingerprint for {}: {}",
                        redact_tax_id(counterparty_id),
                        e
                    );
                    return LearnOutcome::Unavailable;
                }
            }
        }

        let existing = match self.persistence.get_template(counterparty_id).await {
            Ok(existing) => existing,
            Err(e) => {
                warn!(
                    "Template read for {} failed, skipping learn: {}",
                    redact_tax_id(counterparty_id),
                    e
                );
                self.release_fingerprint(counterparty_id, fingerprint.as_deref()).await;
                return LearnOutcome::Unavailable;
            }
        };

        let (template, outcome) = match existing {
            Some(mut template) => {
                template.absorb(record, was_accurate);
                (template, LearnOutcome::Updated)
            }
            None => (
                Template::seed(counterparty_id, record, was_accurate),
                LearnOutcome::Created,
            ),
        };

        if let Err(e) = self.persistence.put_template(&template).await {
            warn!("Template write for {} failed: {}", redact_tax_id(counterparty_id), e);
            self.release_fingerprint(counterparty_id, fingerprint.as_deref()).await;
            self.cache.invalidate(&cache_key(counterparty_id));
            return LearnOutcome::Unavailable;
        }

        self.store_in_cache(&template);
        debug!(
            "Learned record for {} ({} processed)",
            redact_tax_id(counterparty_id),
            template.stats.total_processed
        );
        outcome
    }

    fn store_in_cache(&self, template: &Template) {
        match serde_json::to_string(template) {
            Ok(body) => self
                .cache
                .set(&cache_key(&template.counterparty_id), body, self.cache_ttl),
            Err(e) => warn!(
                "Could not cache template {}: {}",
                redact_tax_id(&template.counterparty_id),
                e
            ),
        }
    }

    async fn release_fingerprint(&self, counterparty_id: &str, fingerprint: Option<&str>) {
        if let Some(fp) = fingerprint {
            if let Err(e) = self.persistence.unmark_learned(fp).await {
                warn!(
                    "Could not release learn fingerprint for {}: {}",
                    redact_tax_id(counterparty_id),
                    e
                );
            }
        }
    }

    fn learn_lock(&self, counterparty_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .learn_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(
            locks
                .entry(counterparty_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MokaCache, NoopCache};
    use crate::db::{ApprovedRecord, Database, DatabaseError, KnownCounterparty};
    use crate::record::LineItem;
    use async_trait::async_trait;

    fn record(number: &str, total: f64) -> CandidateRecord {
        CandidateRecord {
            invoice_number: Some(number.to_string()),
            counterparty_name: Some("Acme".to_string()),
            total_amount: Some(total),
            items: vec![LineItem {
                name: "Hex Bolt".to_string(),
                classification_code: Some("7318".to_string()),
                quantity: 1.0,
                unit_price: total,
                tax_rate: 0.0,
                amount: total,
            }],
            ..Default::default()
        }
    }

    fn store_with(db: Database, cache: Arc<dyn Cache>) -> TemplateStore {
        TemplateStore::new(Arc::new(db), cache, DEFAULT_TEMPLATE_TTL)
    }

    #[tokio::test]
    async fn test_learn_seeds_then_updates() {
        let store = store_with(Database::open_in_memory().unwrap(), Arc::new(NoopCache));
        assert!(store.get_template("C1").await.is_none());

        assert_eq!(store.learn(&record("A-1", 100.0), "C1", true).await, LearnOutcome::Created);
        assert_eq!(store.learn(&record("A-2", 300.0), "C1", false).await, LearnOutcome::Updated);

        let template = store.get_template("C1").await.unwrap();
        assert_eq!(template.stats.total_processed, 2);
        assert_eq!(template.avg_total_amount, 200.0);
        assert_eq!(template.stats.accuracy_rate, 50.0);
    }

    #[tokio::test]
    async fn test_learn_is_idempotent_per_record() {
        let store = store_with(Database::open_in_memory().unwrap(), Arc::new(NoopCache));
        store.learn(&record("A-1", 100.0), "C1", true).await;
        assert_eq!(
            store.learn(&record(" a-1 ", 100.0), "C1", true).await,
            LearnOutcome::AlreadyLearned
        );
        assert_eq!(store.get_template("C1").await.unwrap().stats.total_processed, 1);
    }

    #[tokio::test]
    async fn test_records_without_number_always_learn() {
        let store = store_with(Database::open_in_memory().unwrap(), Arc::new(NoopCache));
        let mut r = record("", 100.0);
        r.invoice_number = None;
        store.learn(&r, "C1", true).await;
        store.learn(&r, "C1", true).await;
        assert_eq!(store.get_template("C1").await.unwrap().stats.total_processed, 2);
    }

    #[tokio::test]
    async fn test_reads_populate_cache() {
        let db = Database::open_in_memory().unwrap();
        let cache = Arc::new(MokaCache::new(100));
        let writer = store_with(db.clone(), Arc::new(NoopCache));
        writer.learn(&record("A-1", 100.0), "C1", true).await;

        let reader = store_with(db, cache.clone());
        assert!(cache.get("template:C1").is_none());
        assert!(reader.get_template("C1").await.is_some());
        assert!(cache.get("template:C1").is_some());
    }

    #[tokio::test]
    async fn test_match_record_cold_start() {
        let store = store_with(Database::open_in_memory().unwrap(), Arc::new(NoopCache));
        let report = store.match_record(&record("A-1", 100.0), "C1").await;
        assert!(report.matches);
        assert_eq!(report.confidence, 50);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_learns_do_not_lose_updates() {
        let store = Arc::new(store_with(
            Database::open_in_memory().unwrap(),
            Arc::new(MokaCache::new(100)),
        ));

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.learn(&record(&format!("A-{i}"), 100.0), "C1", true).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().changed());
        }

        let template = store.get_template("C1").await.unwrap();
        assert_eq!(template.stats.total_processed, 20);
    }

    struct Unavailable;

    #[async_trait]
    impl Persistence for Unavailable {
        async fn get_template(&self, _: &str) -> Result<Option<Template>, DatabaseError> {
            Err(DatabaseError::LockPoisoned)
        }
        async fn put_template(&self, _: &Template) -> Result<(), DatabaseError> {
            Err(DatabaseError::LockPoisoned)
        }
        async fn mark_learned(&self, _: &str, _: &str) -> Result<bool, DatabaseError> {
            Ok(true)
        }
        async fn unmark_learned(&self, _: &str) -> Result<(), DatabaseError> {
            Ok(())
        }
        async fn save_approved_record(&self, _: &ApprovedRecord) -> Result<bool, DatabaseError> {
            Err(DatabaseError::LockPoisoned)
        }
        async fn find_counterparties_by_name(&self, _: &str) -> Result<Vec<KnownCounterparty>, DatabaseError> {
            Err(DatabaseError::LockPoisoned)
        }
        async fn find_item_code(&self, _: &str) -> Result<Option<String>, DatabaseError> {
            Err(DatabaseError::LockPoisoned)
        }
        async fn find_duplicate(&self, _: &str, _: &str) -> Result<Option<String>, DatabaseError> {
            Err(DatabaseError::LockPoisoned)
        }
    }

    #[tokio::test]
    async fn test_unavailable_persistence_degrades() {
        let store = TemplateStore::new(Arc::new(Unavailable), Arc::new(NoopCache), DEFAULT_TEMPLATE_TTL);
        assert!(store.get_template("C1").await.is_none());
        assert_eq!(store.learn(&record("A-1", 1.0), "C1", true).await, LearnOutcome::Unavailable);
        assert!(store.match_record(&record("A-1", 1.0), "C1").await.matches);
    }
}
