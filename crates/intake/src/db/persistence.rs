//! Key-based persistence interface consumed by the template store, the
//! correction suggester and duplicate detection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::{normalize_name, CandidateRecord};
use crate::template::Template;

use super::record_repo::{self, ApprovedItemRow, ApprovedRecordRow};
use super::template_repo::{self, TemplateRow};
use super::{Database, DatabaseError};

/// How many name-matched counterparties a lookup returns at most.
const COUNTERPARTY_LOOKUP_LIMIT: u32 = 10;

/// A record a human (or the auto-approval gate) accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovedRecord {
    pub id: String,
    pub counterparty_id: Option<String>,
    pub record: CandidateRecord,
    pub approved_at: DateTime<Utc>,
}

/// A counterparty seen on an approved record, with the tax id it carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownCounterparty {
    pub name: String,
    pub tax_id: String,
}

/// Durable storage used by the pipeline.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn get_template(&self, counterparty_id: &str) -> Result<Option<Template>, DatabaseError>;

    async fn put_template(&self, template: &Template) -> Result<(), DatabaseError>;

    /// Marks a record fingerprint as learned. Returns `false` if it was
    /// already marked.
    async fn mark_learned(&self, fingerprint: &str, counterparty_id: &str) -> Result<bool, DatabaseError>;

    async fn unmark_learned(&self, fingerprint: &str) -> Result<(), DatabaseError>;

    /// Stores an approved record. Returns `false` if a record with the same
    /// id was stored before.
    async fn save_approved_record(&self, approved: &ApprovedRecord) -> Result<bool, DatabaseError>;

    /// Counterparties with a similar name that carried a tax id.
    async fn find_counterparties_by_name(&self, name: &str) -> Result<Vec<KnownCounterparty>, DatabaseError>;

    /// A classification code previously approved for a similarly named item.
    async fn find_item_code(&self, item_name: &str) -> Result<Option<String>, DatabaseError>;

    /// Id of an approved record with the same counterparty and invoice number.
    async fn find_duplicate(
        &self,
        counterparty_id: &str,
        invoice_number: &str,
    ) -> Result<Option<String>, DatabaseError>;
}

/// Normalizes invoice numbers for storage and duplicate lookups.
pub fn normalize_invoice_number(number: &str) -> String {
    number.trim().to_ascii_uppercase()
}

/// Runs each statement inline under the connection lock; every call is one
/// short indexed query against a local SQLite file.
#[async_trait]
impl Persistence for Database {
    async fn get_template(&self, counterparty_id: &str) -> Result<Option<Template>, DatabaseError> {
        match template_repo::find_by_id(self, counterparty_id)? {
            Some(row) => Ok(Some(serde_json::from_str(&row.body)?)),
            None => Ok(None),
        }
    }

    async fn put_template(&self, template: &Template) -> Result<(), DatabaseError> {
        let row = TemplateRow {
            counterparty_id: template.counterparty_id.clone(),
            counterparty_name: template.counterparty_name.clone(),
            body: serde_json::to_string(template)?,
            updated_at: template.stats.last_updated.to_rfc3339(),
        };
        template_repo::upsert(self, &row)
    }

    async fn mark_learned(&self, fingerprint: &str, counterparty_id: &str) -> Result<bool, DatabaseError> {
        template_repo::mark_learned(self, fingerprint, counterparty_id, &Utc::now().to_rfc3339())
    }

    async fn unmark_learned(&self, fingerprint: &str) -> Result<(), DatabaseError> {
        template_repo::unmark_learned(self, fingerprint)
    }

    async fn save_approved_record(&self, approved: &ApprovedRecord) -> Result<bool, DatabaseError> {
        let record = &approved.record;
        let counterparty_name = record.counterparty_name().map(str::to_string);
        let row = ApprovedRecordRow {
            id: approved.id.clone(),
            counterparty_id: approved.counterparty_id.clone(),
            normalized_name: counterparty_name.as_deref().map(normalize_name),
            counterparty_name,
            tax_id: record.tax_id(),
            invoice_number: record.invoice_number().map(normalize_invoice_number),
            total_amount: record.total_amount,
            body: serde_json::to_string(record)?,
            approved_at: approved.approved_at.to_rfc3339(),
        };
        let items: Vec<ApprovedItemRow> = record
            .items
            .iter()
            .filter(|i| i.has_name())
            .map(|i| ApprovedItemRow {
                name: i.name.trim().to_string(),
                normalized_name: normalize_name(&i.name),
                code: i.code().map(str::to_string),
            })
            .collect();
        record_repo::insert(self, &row, &items)
    }

    async fn find_counterparties_by_name(&self, name: &str) -> Result<Vec<KnownCounterparty>, DatabaseError> {
        let normalized = normalize_name(name);
        if normalized.is_empty() {
            return Ok(Vec::new());
        }
        let rows = record_repo::find_tax_ids_by_name(self, &normalized, COUNTERPARTY_LOOKUP_LIMIT)?;
        Ok(rows
            .into_iter()
            .map(|(name, tax_id)| KnownCounterparty { name, tax_id })
            .collect())
    }

    async fn find_item_code(&self, item_name: &str) -> Result<Option<String>, DatabaseError> {
        let normalized = normalize_name(item_name);
        if normalized.is_empty() {
            return Ok(None);
        }
        record_repo::find_item_code(self, &normalized)
    }

    async fn find_duplicate(
        &self,
        counterparty_id: &str,
        invoice_number: &str,
    ) -> Result<Option<String>, DatabaseError> {
        record_repo::find_duplicate(self, counterparty_id, &normalize_invoice_number(invoice_number))
    }
}
