//! The learned per-counterparty profile.
//!
//! Templates are frequency counts and running means, updated one approved
//! record at a time and never recomputed from history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::{CandidateRecord, TaxRegime};

/// Upper bound on every most-frequent list.
pub const MAX_FREQUENT_ENTRIES: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyEntry {
    pub value: String,
    pub count: u64,
}

/// Values ranked by descending count (ties broken by value), capped at
/// [`MAX_FREQUENT_ENTRIES`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrequencyList(Vec<FrequencyEntry>);

impl FrequencyList {
    pub fn from_values(values: &[String]) -> Self {
        let mut list = Self::default();
        list.merge(values);
        list
    }

    /// Adds one observation for each value, then re-ranks and truncates.
    pub fn merge(&mut self, values: &[String]) {
        for value in values {
            match self.0.iter_mut().find(|e| &e.value == value) {
                Some(entry) => entry.count += 1,
                None => self.0.push(FrequencyEntry {
                    value: value.clone(),
                    count: 1,
                }),
            }
        }
        self.0
            .sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        self.0.truncate(MAX_FREQUENT_ENTRIES);
    }

    pub fn contains(&self, value: &str) -> bool {
        self.0.iter().any(|e| e.value == value)
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|e| e.value.as_str())
    }

    pub fn entries(&self) -> &[FrequencyEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateStats {
    pub total_processed: u64,
    pub last_updated: DateTime<Utc>,
    /// Share of learned records that were extracted accurately, 0-100.
    pub accuracy_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub counterparty_id: String,
    pub counterparty_name: Option<String>,
    /// Shape of the counterparty's invoice numbers, see [`identifier_shape`].
    pub identifier_pattern: Option<String>,
    pub common_codes: FrequencyList,
    pub common_items: FrequencyList,
    pub avg_item_count: f64,
    pub avg_total_amount: f64,
    /// `None` until a record with tax has been seen.
    pub tax_regime: Option<TaxRegime>,
    pub stats: TemplateStats,
}

/// Reduces an invoice number to its shape: letters become `A`, digits become
/// `9`, everything else is kept. `INV/24-0012` becomes `AAA/99-9999`.
pub fn identifier_shape(identifier: &str) -> String {
    identifier
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_digit() {
                '9'
            } else if c.is_alphabetic() {
                'A'
            } else {
                c
            }
        })
        .collect()
}

fn accuracy_sample(was_accurate: bool) -> f64 {
    if was_accurate {
        100.0
    } else {
        0.0
    }
}

/// Total used for the running mean; falls back to the recomputed figure.
fn observed_total(record: &CandidateRecord) -> f64 {
    record
        .total_amount
        .unwrap_or_else(|| record.items_subtotal() + record.taxes.total())
}

fn running_mean(mean: f64, count: u64, sample: f64) -> f64 {
    let n = count as f64;
    (mean * n + sample) / (n + 1.0)
}

impl Template {
    /// Creates a template from a single record.
    pub fn seed(counterparty_id: &str, record: &CandidateRecord, was_accurate: bool) -> Self {
        Self {
            counterparty_id: counterparty_id.to_string(),
            counterparty_name: record.counterparty_name().map(str::to_string),
            identifier_pattern: record.invoice_number().map(identifier_shape),
            common_codes: FrequencyList::from_values(&record.codes()),
            common_items: FrequencyList::from_values(&record.item_names()),
            avg_item_count: record.items.len() as f64,
            avg_total_amount: observed_total(record),
            tax_regime: record.tax_regime(),
            stats: TemplateStats {
                total_processed: 1,
                last_updated: Utc::now(),
                accuracy_rate: accuracy_sample(was_accurate),
            },
        }
    }

    /// Folds one more record into the template.
    pub fn absorb(&mut self, record: &CandidateRecord, was_accurate: bool) {
        let n = self.stats.total_processed;

        self.avg_item_count = running_mean(self.avg_item_count, n, record.items.len() as f64);
        self.avg_total_amount = running_mean(self.avg_total_amount, n, observed_total(record));
        self.stats.accuracy_rate =
            running_mean(self.stats.accuracy_rate, n, accuracy_sample(was_accurate));

        self.common_codes.merge(&record.codes());
        self.common_items.merge(&record.item_names());

        self.tax_regime = match (self.tax_regime, record.tax_regime()) {
            (None, observed) => observed,
            (Some(known), Some(observed)) if known != observed => Some(TaxRegime::Mixed),
            (known, _) => known,
        };

        if self.identifier_pattern.is_none() {
            self.identifier_pattern = record.invoice_number().map(identifier_shape);
        }
        if self.counterparty_name.is_none() {
            self.counterparty_name = record.counterparty_name().map(str::to_string);
        }

        self.stats.total_processed = n + 1;
        self.stats.last_updated = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{LineItem, TaxComponents};

    fn record(total: f64, items: &[(&str, Option<&str>)]) -> CandidateRecord {
        CandidateRecord {
            invoice_number: Some("INV-0001".to_string()),
            counterparty_name: Some("Acme".to_string()),
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
                    classification_code: code.map(str::to_string),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_identifier_shape() {
        assert_eq!(identifier_shape("INV/24-0012"), "AAA/99-9999");
        assert_eq!(identifier_shape(" 2024_a "), "9999_A");
    }

    #[test]
    fn test_seed_from_single_record() {
        let t = Template::seed("C1", &record(500.0, &[("Bolt", Some("7318"))]), false);
        assert_eq!(t.avg_total_amount, 500.0);
        assert_eq!(t.avg_item_count, 1.0);
        assert_eq!(t.stats.total_processed, 1);
        assert_eq!(t.stats.accuracy_rate, 0.0);
        assert_eq!(t.identifier_pattern.as_deref(), Some("AAA-9999"));
        assert_eq!(t.tax_regime, Some(TaxRegime::Intra));
        assert!(t.common_codes.contains("7318"));
        assert!(t.common_items.contains("bolt"));
    }

    #[test]
    fn test_running_means_converge_to_arithmetic_mean() {
        let totals = [100.0, 250.0, 40.0, 610.0, 5.0];
        let mut template = Template::seed("C1", &record(totals[0], &[("a", None)]), true);
        assert_eq!(template.avg_total_amount, 100.0);

        template.absorb(&record(totals[1], &[("a", None), ("b", None)]), false);
        assert_eq!(template.avg_total_amount, 175.0);
        assert_eq!(template.avg_item_count, 1.5);
        assert_eq!(template.stats.accuracy_rate, 50.0);

        for total in &totals[2..] {
            template.absorb(&record(*total, &[("a", None)]), true);
        }
        let mean = totals.iter().sum::<f64>() / totals.len() as f64;
        assert!((template.avg_total_amount - mean).abs() < 1e-9);
        assert_eq!(template.stats.total_processed, totals.len() as u64);
    }

    #[test]
    fn test_frequency_list_ranks_and_caps() {
        let mut list = FrequencyList::default();
        for round in 0..5 {
            let values: Vec<String> = (0..10).map(|i| format!("v{}", i + round * 10)).collect();
            list.merge(&values);
            assert!(list.len() <= MAX_FREQUENT_ENTRIES);
        }
        list.merge(&["v0".to_string()]);
        list.merge(&["v0".to_string()]);

        assert_eq!(list.len(), MAX_FREQUENT_ENTRIES);
        assert_eq!(list.entries()[0], FrequencyEntry { value: "v0".to_string(), count: 3 });
        let counts: Vec<u64> = list.entries().iter().map(|e| e.count).collect();
        assert!(counts.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_frequency_ties_break_by_value() {
        let list = FrequencyList::from_values(&["b".to_string(), "a".to_string()]);
        assert_eq!(list.values().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_tax_regime_becomes_mixed() {
        let mut template = Template::seed("C1", &record(100.0, &[]), true);
        let mut inter = record(100.0, &[]);
        inter.taxes = TaxComponents {
            cgst: 0.0,
            sgst: 0.0,
            igst: 18.0,
        };
        template.absorb(&inter, true);
        assert_eq!(template.tax_regime, Some(TaxRegime::Mixed));

        template.absorb(&record(100.0, &[]), true);
        assert_eq!(template.tax_regime, Some(TaxRegime::Mixed));
    }

    #[test]
    fn test_unknown_regime_adopts_first_observation() {
        let mut untaxed = record(100.0, &[]);
        untaxed.taxes = TaxComponents::default();
        let mut template = Template::seed("C1", &untaxed, true);
        assert_eq!(template.tax_regime, None);

        template.absorb(&record(100.0, &[]), true);
        assert_eq!(template.tax_regime, Some(TaxRegime::Intra));
    }
}
