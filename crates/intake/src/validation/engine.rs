//! Field-by-field confidence scoring.
//!
//! The score constants below are observable behaviour: dashboards and the
//! auto-approval gate depend on their exact values.

use std::sync::OnceLock;

use regex::Regex;

use crate::record::{CandidateRecord, LineItem};

use super::result::{AmountCheck, FieldConfidence, ValidationResult};
use super::tax_id::{check_tax_id, jurisdiction_name};

// Identifier
pub const IDENTIFIER_WELL_FORMED_SCORE: u8 = 95;
pub const IDENTIFIER_UNUSUAL_SCORE: u8 = 60;

// Amounts
pub const AMOUNT_TOLERANCE: f64 = 1.0;
pub const AMOUNT_WARNING_TOLERANCE: f64 = 10.0;
pub const AMOUNTS_MATCH_SCORE: u8 = 95;
pub const AMOUNTS_CLOSE_SCORE: u8 = 75;
pub const AMOUNTS_MISMATCH_SCORE: u8 = 40;
pub const AMOUNTS_UNVERIFIABLE_SCORE: u8 = 50;

// Items
pub const ITEM_MISSING_NAME_PENALTY: u8 = 20;
pub const ITEM_INVALID_QUANTITY_PENALTY: u8 = 15;
pub const ITEM_INVALID_PRICE_PENALTY: u8 = 15;
pub const ITEM_MISSING_CODE_PENALTY: u8 = 5;
pub const ITEM_AMOUNT_MISMATCH_PENALTY: u8 = 10;

// Tax id
pub const TAX_ID_VALID_SCORE: u8 = 95;
pub const TAX_ID_INVALID_SCORE: u8 = 30;

// Aggregate weights, in percent
pub const WEIGHT_IDENTIFIER: u32 = 20;
pub const WEIGHT_AMOUNTS: u32 = 35;
pub const WEIGHT_ITEMS: u32 = 30;
pub const WEIGHT_TAX_ID: u32 = 15;

// Auto-approval gate
pub const AUTO_APPROVE_MIN_CONFIDENCE: u8 = 85;
pub const AUTO_APPROVE_MIN_EXTRACTION: u8 = 85;
pub const AUTO_APPROVE_MIN_AMOUNTS: u8 = 90;
pub const AUTO_APPROVE_MIN_ITEMS: u8 = 80;

fn identifier_regex() -> &'static Regex {
    static IDENTIFIER: OnceLock<Regex> = OnceLock::new();
    IDENTIFIER.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9/_.#\-]{1,28}[A-Za-z0-9]$")
            .expect("identifier pattern is valid")
    })
}

/// Scores candidate records. Pure and deterministic.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    /// Jurisdiction code of the receiving business; enables the
    /// split/consolidated tax convention cross-check.
    buyer_jurisdiction: Option<String>,
}

impl Validator {
    pub fn new(buyer_jurisdiction: Option<String>) -> Self {
        Self { buyer_jurisdiction }
    }

    pub fn validate(&self, record: &CandidateRecord) -> ValidationResult {
        let mut result = ValidationResult::default();

        let identifier = score_identifier(record, &mut result);
        let amounts = score_amounts(record, &mut result);
        let items = score_items(record, &mut result);
        let tax_id = self.score_tax_id(record, &mut result);

        let field_confidence = FieldConfidence {
            identifier,
            amounts,
            items,
            tax_id,
        };
        result.confidence_score = aggregate_confidence(&field_confidence);
        result.field_confidence = field_confidence;
        result.can_auto_approve = can_auto_approve(&result, record.extraction_confidence);

        if !result.can_auto_approve && result.errors.is_empty() {
            result.suggest("Review the low-confidence fields before approving");
        }

        result
    }

    fn score_tax_id(&self, record: &CandidateRecord, result: &mut ValidationResult) -> u8 {
        let mut supplier_jurisdiction = None;

        let score = match record.tax_id() {
            None => {
                result.warn("Counterparty tax id is missing");
                result.suggest("Contact the counterparty to obtain their tax id");
                0
            }
            Some(tax_id) => match check_tax_id(&tax_id) {
                Ok(info) => {
                    supplier_jurisdiction = Some(info.jurisdiction);
                    TAX_ID_VALID_SCORE
                }
                Err(defect) => {
                    result.warn(format!("Counterparty tax id {tax_id} looks invalid: {defect}"));
                    TAX_ID_INVALID_SCORE
                }
            },
        };

        self.check_tax_convention(record, supplier_jurisdiction.as_deref(), result);
        score
    }

    /// Cross-checks which tax components are charged against where the trade
    /// happens. Produces warnings only.
    fn check_tax_convention(
        &self,
        record: &CandidateRecord,
        supplier_jurisdiction: Option<&str>,
        result: &mut ValidationResult,
    ) {
        let taxes = record.taxes;
        let split = taxes.has_split();
        let consolidated = taxes.has_consolidated();

        if split && consolidated {
            result.warn("Both CGST/SGST and IGST are charged on the same invoice");
            return;
        }
        if !split && !consolidated {
            result.warn("No tax amount found on the invoice");
            return;
        }
        if split && (taxes.cgst - taxes.sgst).abs() > AMOUNT_TOLERANCE {
            result.warn(format!(
                "CGST ({:.2}) and SGST ({:.2}) should be equal halves",
                taxes.cgst, taxes.sgst
            ));
        }

        let (Some(supplier), Some(buyer)) = (supplier_jurisdiction, self.buyer_jurisdiction.as_deref())
        else {
            return;
        };
        let place = jurisdiction_name(supplier).unwrap_or(supplier);

        if supplier == buyer && consolidated {
            result.warn(format!(
                "IGST charged on a same-jurisdiction supply from {place}"
            ));
            result.suggest("Same-jurisdiction supplies should charge CGST and SGST in equal halves");
        } else if supplier != buyer && split {
            result.warn(format!(
                "CGST/SGST charged on a cross-jurisdiction supply from {place}"
            ));
            result.suggest("Cross-jurisdiction supplies should charge IGST only");
        }
    }
}

fn score_identifier(record: &CandidateRecord, result: &mut ValidationResult) -> u8 {
    match record.invoice_number() {
        None => {
            result.error("Invoice number is missing");
            0
        }
        Some(number) if identifier_regex().is_match(number) => IDENTIFIER_WELL_FORMED_SCORE,
        Some(number) => {
            result.warn(format!("Invoice number format looks unusual: {number}"));
            IDENTIFIER_UNUSUAL_SCORE
        }
    }
}

/// Recomputes subtotal and total from the line items and declared taxes and
/// compares them with the declared figures.
fn score_amounts(record: &CandidateRecord, result: &mut ValidationResult) -> u8 {
    let taxes = record.taxes.total();
    let computed_subtotal = if record.items.is_empty() {
        record.subtotal
    } else {
        Some(round2(record.items_subtotal()))
    };
    let computed_total = computed_subtotal.map(|s| round2(s + taxes));

    result.amount_check = AmountCheck {
        computed_subtotal,
        computed_total,
        subtotal_difference: None,
        total_difference: None,
    };

    let Some(total) = record.total_amount else {
        result.error("Total amount is missing");
        return 0;
    };
    let Some(computed_total) = computed_total else {
        result.warn("Total cannot be verified: no line items or subtotal present");
        return AMOUNTS_UNVERIFIABLE_SCORE;
    };

    let mut score = AMOUNTS_MATCH_SCORE;

    if let (Some(declared), false) = (record.subtotal, record.items.is_empty()) {
        let computed = computed_subtotal.unwrap_or_default();
        let diff = round2((declared - computed).abs());
        result.amount_check.subtotal_difference = Some(diff);

        if diff <= AMOUNT_TOLERANCE {
            score = AMOUNTS_MATCH_SCORE;
        } else if diff <= AMOUNT_WARNING_TOLERANCE {
            result.warn(format!(
                "Subtotal {declared:.2} differs slightly from line item sum {computed:.2}"
            ));
            score = AMOUNTS_CLOSE_SCORE;
        } else {
            result.error(format!(
                "Subtotal {declared:.2} does not match line item sum {computed:.2}"
            ));
            score = AMOUNTS_MISMATCH_SCORE;
        }
    }

    let diff = round2((total - computed_total).abs());
    result.amount_check.total_difference = Some(diff);

    // A reconciling grand total leaves the subtotal tier as it is.
    if diff > AMOUNT_WARNING_TOLERANCE {
        result.error(format!(
            "Total {total:.2} does not match computed total {computed_total:.2}"
        ));
        score = score.min(AMOUNTS_MISMATCH_SCORE);
    } else if diff > AMOUNT_TOLERANCE {
        result.warn(format!(
            "Total {total:.2} differs slightly from computed total {computed_total:.2}"
        ));
        score = score.min(AMOUNTS_CLOSE_SCORE);
    }

    score
}

/// Additive per-item penalty model, floored at zero.
fn score_items(record: &CandidateRecord, result: &mut ValidationResult) -> u8 {
    if record.items.is_empty() {
        result.error("No line items found");
        return 0;
    }

    let mut penalty: u32 = 0;
    for (index, item) in record.items.iter().enumerate() {
        penalty += item_penalty(index + 1, item, result);
    }

    100u32.saturating_sub(penalty) as u8
}

fn item_penalty(line: usize, item: &LineItem, result: &mut ValidationResult) -> u32 {
    let mut penalty = 0u32;

    if !item.has_name() {
        result.error(format!("Item {line}: name is missing"));
        penalty += u32::from(ITEM_MISSING_NAME_PENALTY);
    }
    let quantity_ok = item.quantity.is_finite() && item.quantity > 0.0;
    if !quantity_ok {
        result.error(format!("Item {line}: invalid quantity {}", item.quantity));
        penalty += u32::from(ITEM_INVALID_QUANTITY_PENALTY);
    }
    let price_ok = item.unit_price.is_finite() && item.unit_price > 0.0;
    if !price_ok {
        result.error(format!("Item {line}: invalid unit price {}", item.unit_price));
        penalty += u32::from(ITEM_INVALID_PRICE_PENALTY);
    }
    if item.code().is_none() {
        result.warn(format!("Item {line}: classification code is missing"));
        penalty += u32::from(ITEM_MISSING_CODE_PENALTY);
    }
    if quantity_ok && price_ok {
        let expected = round2(item.quantity * item.unit_price);
        if (expected - item.amount).abs() > AMOUNT_TOLERANCE {
            result.warn(format!(
                "Item {line}: amount {:.2} does not equal quantity x price {expected:.2}",
                item.amount
            ));
            penalty += u32::from(ITEM_AMOUNT_MISMATCH_PENALTY);
        }
    }

    penalty
}

/// Weighted sum of the four field scores, rounded half up to the nearest
/// integer. Integer arithmetic keeps the result exact.
pub fn aggregate_confidence(fields: &FieldConfidence) -> u8 {
    let weighted = u32::from(fields.identifier) * WEIGHT_IDENTIFIER
        + u32::from(fields.amounts) * WEIGHT_AMOUNTS
        + u32::from(fields.items) * WEIGHT_ITEMS
        + u32::from(fields.tax_id) * WEIGHT_TAX_ID;
    ((weighted + 50) / 100).min(100) as u8
}

/// All five conditions are required.
fn can_auto_approve(result: &ValidationResult, extraction_confidence: u8) -> bool {
    result.errors.is_empty()
        && result.confidence_score >= AUTO_APPROVE_MIN_CONFIDENCE
        && extraction_confidence >= AUTO_APPROVE_MIN_EXTRACTION
        && result.field_confidence.amounts >= AUTO_APPROVE_MIN_AMOUNTS
        && result.field_confidence.items >= AUTO_APPROVE_MIN_ITEMS
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
