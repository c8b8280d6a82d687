//! Correction suggestions for low-confidence fields.
//!
//! The suggester only proposes; it never touches the record.

use std::sync::Arc;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::db::Persistence;
use crate::record::CandidateRecord;
use crate::validation::{check_tax_id, ValidationResult};

/// Tax id scores below this are worth a lookup.
pub const TAX_ID_SUGGEST_BELOW: u8 = 80;
/// Amount scores below this get the recomputed total proposed.
pub const AMOUNTS_SUGGEST_BELOW: u8 = 90;

pub const TAX_ID_SUGGESTION_CONFIDENCE: u8 = 75;
pub const TOTAL_SUGGESTION_CONFIDENCE: u8 = 85;
pub const ITEM_CODE_SUGGESTION_CONFIDENCE: u8 = 70;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionSuggestion {
    /// Path of the field within the record, e.g. `items[2].classificationCode`.
    pub field: String,
    pub original_value: Option<String>,
    pub suggested_value: String,
    pub reason: String,
    pub confidence: u8,
}

pub struct CorrectionSuggester {
    persistence: Arc<dyn Persistence>,
}

impl CorrectionSuggester {
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self { persistence }
    }

    pub async fn suggest(
        &self,
        record: &CandidateRecord,
        validation: &ValidationResult,
    ) -> Vec<CorrectionSuggestion> {
        let mut suggestions = Vec::new();

        if validation.field_confidence.tax_id < TAX_ID_SUGGEST_BELOW {
            if let Some(s) = self.suggest_tax_id(record).await {
                suggestions.push(s);
            }
        }

        if validation.field_confidence.amounts < AMOUNTS_SUGGEST_BELOW {
            if let Some(total) = validation.amount_check.computed_total {
                suggestions.push(CorrectionSuggestion {
                    field: "totalAmount".to_string(),
                    original_value: record.total_amount.map(|t| format!("{t:.2}")),
                    suggested_value: format!("{total:.2}"),
                    reason: "Sum of line items plus declared taxes".to_string(),
                    confidence: TOTAL_SUGGESTION_CONFIDENCE,
                });
            }
        }

        for (index, item) in record.items.iter().enumerate() {
            if item.code().is_some() || !item.has_name() {
                continue;
            }
            match self.persistence.find_item_code(&item.name).await {
                Ok(Some(code)) => suggestions.push(CorrectionSuggestion {
                    field: format!("items[{index}].classificationCode"),
                    original_value: None,
                    suggested_value: code,
                    reason: format!("Code used before for a similar item \"{}\"", item.name.trim()),
                    confidence: ITEM_CODE_SUGGESTION_CONFIDENCE,
                }),
                Ok(None) => {}
                Err(e) => warn!("Item code lookup failed for \"{}\": {}", item.name.trim(), e),
            }
        }

        suggestions
    }

    async fn suggest_tax_id(&self, record: &CandidateRecord) -> Option<CorrectionSuggestion> {
        let name = record.counterparty_name()?;
        let own = record.tax_id();

        let known = match self.persistence.find_counterparties_by_name(name).await {
            Ok(known) => known,
            Err(e) => {
                warn!("Counterparty lookup failed for \"{}\": {}", name, e);
                return None;
            }
        };

        let candidate = known
            .into_iter()
            .find(|k| check_tax_id(&k.tax_id).is_ok() && own.as_deref() != Some(k.tax_id.as_str()))?;

        Some(CorrectionSuggestion {
            field: "counterpartyTaxId".to_string(),
            original_value: own,
            suggested_value: candidate.tax_id,
            reason: format!("Tax id on file for \"{}\"", candidate.name),
            confidence: TAX_ID_SUGGESTION_CONFIDENCE,
        })
    }
}
