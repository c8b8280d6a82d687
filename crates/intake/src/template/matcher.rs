//! Compares a candidate record against its counterparty's template.
//!
//! Every rule is evaluated independently and in a fixed order; a penalty
//! never prevents a later rule from running.

use serde::{Deserialize, Serialize};

use crate::record::{CandidateRecord, TaxRegime};

use super::model::{identifier_shape, Template};

pub const COLD_START_CONFIDENCE: u8 = 50;
pub const PATTERN_MISMATCH_PENALTY: i32 = 10;
pub const ITEM_COUNT_PENALTY: i32 = 5;
pub const TOTAL_AMOUNT_PENALTY: i32 = 15;
pub const TAX_REGIME_PENALTY: i32 = 10;
pub const UNKNOWN_CODES_PENALTY: i32 = 10;
pub const UNKNOWN_ITEMS_PENALTY: i32 = 15;
/// Relative deviation from a running mean above which a value is anomalous.
pub const DEVIATION_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyReport {
    /// True when no anomaly was found.
    pub matches: bool,
    pub anomalies: Vec<String>,
    pub suggestions: Vec<String>,
    /// 0-100; starts at 100 and loses points per anomaly.
    pub confidence: u8,
}

impl AnomalyReport {
    /// Report for a counterparty with no history yet.
    pub fn cold_start() -> Self {
        Self {
            matches: true,
            anomalies: Vec::new(),
            suggestions: vec![
                "First record from this counterparty; not enough history to compare against"
                    .to_string(),
            ],
            confidence: COLD_START_CONFIDENCE,
        }
    }
}

/// A zero mean is exceeded by any positive value.
fn deviates(value: f64, mean: f64) -> bool {
    if mean <= 0.0 {
        return value > 0.0;
    }
    ((value - mean).abs() / mean) > DEVIATION_THRESHOLD
}

fn names_overlap(a: &str, b: &str) -> bool {
    a.contains(b) || b.contains(a)
}

/// Scores `record` against `template`. `None` is the cold-start case and
/// never blocks.
pub fn match_template(record: &CandidateRecord, template: Option<&Template>) -> AnomalyReport {
    let Some(template) = template else {
        return AnomalyReport::cold_start();
    };

    let mut score: i32 = 100;
    let mut anomalies = Vec::new();
    let mut suggestions = Vec::new();

    if let (Some(expected), Some(number)) =
        (template.identifier_pattern.as_deref(), record.invoice_number())
    {
        let shape = identifier_shape(number);
        if shape != expected {
            score -= PATTERN_MISMATCH_PENALTY;
            anomalies.push(format!(
                "Invoice number {number} does not follow the usual format {expected}"
            ));
        }
    }

    let item_count = record.items.len() as f64;
    if deviates(item_count, template.avg_item_count) {
        score -= ITEM_COUNT_PENALTY;
        anomalies.push(format!(
            "{} line items; this counterparty usually sends about {:.1}",
            record.items.len(),
            template.avg_item_count
        ));
    }

    if let Some(total) = record.total_amount {
        if deviates(total, template.avg_total_amount) {
            score -= TOTAL_AMOUNT_PENALTY;
            anomalies.push(format!(
                "Total {total:.2} is far from the usual {:.2}",
                template.avg_total_amount
            ));
            suggestions.push("Verify the total amount with the counterparty".to_string());
        }
    }

    if let (Some(expected), Some(observed)) = (template.tax_regime, record.tax_regime()) {
        if expected != TaxRegime::Mixed && observed != expected {
            score -= TAX_REGIME_PENALTY;
            anomalies.push(format!(
                "Tax charged as {observed}; this counterparty usually bills {expected}"
            ));
        }
    }

    if !template.common_codes.is_empty() {
        let known = record
            .codes()
            .iter()
            .any(|code| template.common_codes.contains(code));
        if !known {
            score -= UNKNOWN_CODES_PENALTY;
            anomalies.push("None of the classification codes were seen before".to_string());
        }
    }

    if !template.common_items.is_empty() {
        let known = record.item_names().iter().any(|name| {
            template
                .common_items
                .values()
                .any(|usual| names_overlap(name, usual))
        });
        if !known {
            score -= UNKNOWN_ITEMS_PENALTY;
            anomalies.push("None of the items resemble this counterparty's usual items".to_string());
            suggestions.push("Confirm the invoice was issued by this counterparty".to_string());
        }
    }

    AnomalyReport {
        matches: anomalies.is_empty(),
        anomalies,
        suggestions,
        confidence: score.clamp(0, 100) as u8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{LineItem, TaxComponents};

    fn record(number: &str, total: f64, items: &[(&str, &str)]) -> CandidateRecord {
        CandidateRecord {
            invoice_number: Some(number.to_string()),
            total_amount: Some(total),
            taxes: TaxComponents {
                cgst: 9.0,
                sgst: 9.0,
                igst: 0.0,
            },
            items: items
                .iter()
                .map(|(name, code)| LineItem {
                    name: name.to_string(),
                    classification_code: Some(code.to_string()),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    fn template() -> Template {
        Template::seed(
            "C1",
            &record("INV-0001", 1000.0, &[("Steel Rod", "7214"), ("Hex Bolt", "7318")]),
            true,
        )
    }

    #[test]
    fn test_cold_start() {
        let report = match_template(&record("X-1", 10.0, &[]), None);
        assert!(report.matches);
        assert_eq!(report.confidence, 50);
        assert_eq!(report.suggestions.len(), 1);
        assert!(report.anomalies.is_empty());
    }

    #[test]
    fn test_matching_record() {
        let report = match_template(
            &record("INV-0002", 1100.0, &[("steel rod 12mm", "7214"), ("Hex Bolt", "7318")]),
            Some(&template()),
        );
        assert!(report.matches, "{:?}", report.anomalies);
        assert_eq!(report.confidence, 100);
    }

    #[test]
    fn test_every_rule_applies_without_short_circuit() {
        let mut odd = record(
            "2024/77",
            9000.0,
            &[("Paint", "3208"), ("Brush", "9603"), ("Roller", "9603"), ("Tape", "3919"), ("Tray", "3924")],
        );
        odd.taxes = TaxComponents {
            cgst: 0.0,
            sgst: 0.0,
            igst: 18.0,
        };

        let report = match_template(&odd, Some(&template()));
        assert!(!report.matches);
        assert_eq!(report.anomalies.len(), 6);
        // 100 - 10 - 5 - 15 - 10 - 10 - 15
        assert_eq!(report.confidence, 35);
        assert_eq!(report.suggestions.len(), 2);
    }

    #[test]
    fn test_mixed_regime_is_wildcard() {
        let mut t = template();
        t.tax_regime = Some(TaxRegime::Mixed);
        let mut r = record("INV-0003", 1000.0, &[("Steel Rod", "7214"), ("Hex Bolt", "7318")]);
        r.taxes = TaxComponents {
            cgst: 0.0,
            sgst: 0.0,
            igst: 180.0,
        };
        assert!(match_template(&r, Some(&t)).matches);
    }

    #[test]
    fn test_zero_average_flags_any_positive_value() {
        let mut empty = record("INV-0001", 0.0, &[]);
        empty.total_amount = None;
        empty.taxes = TaxComponents::default();
        let t = Template::seed("C1", &empty, true);
        assert_eq!(t.avg_total_amount, 0.0);
        assert_eq!(t.avg_item_count, 0.0);

        let items: Vec<(&str, &str)> = (0..40).map(|_| ("Steel Rod", "7214")).collect();
        let report = match_template(&record("INV-0002", 1_000_000.0, &items), Some(&t));
        assert!(!report.matches);
        assert_eq!(report.anomalies.len(), 2);
        assert_eq!(report.confidence, 80);

        let again = match_template(&empty, Some(&t));
        assert!(again.matches, "{:?}", again.anomalies);
    }

    #[test]
    fn test_empty_known_lists_are_not_evaluated() {
        let mut t = template();
        t.common_codes = Default::default();
        t.common_items = Default::default();
        let report = match_template(&record("INV-0004", 1000.0, &[("A", "1"), ("B", "2")]), Some(&t));
        assert!(report.matches, "{:?}", report.anomalies);
    }
}
