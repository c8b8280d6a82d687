use serde::{Deserialize, Serialize};

/// Per-field confidence, each 0-100.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConfidence {
    pub identifier: u8,
    pub amounts: u8,
    pub items: u8,
    pub tax_id: u8,
}

/// Figures recomputed from the line items during the amounts check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmountCheck {
    /// Sum of line amounts, or the declared subtotal when there are no lines.
    pub computed_subtotal: Option<f64>,
    /// `computed_subtotal` plus all declared tax components.
    pub computed_total: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtotal_difference: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_difference: Option<f64>,
}

/// Outcome of validating one candidate record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// Hard failures. Any entry blocks auto-approval.
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
    pub can_auto_approve: bool,
    /// Weighted aggregate of `field_confidence`, 0-100.
    pub confidence_score: u8,
    pub field_confidence: FieldConfidence,
    pub amount_check: AmountCheck,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub(crate) fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub(crate) fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub(crate) fn suggest(&mut self, message: impl Into<String>) {
        self.suggestions.push(message.into());
    }
}
