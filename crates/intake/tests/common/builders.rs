//! Builders for creating test data programmatically.

#![allow(dead_code)]

use intake::record::{CandidateRecord, LineItem, TaxComponents};

/// Builder for `CandidateRecord` instances. Starts from a clean,
/// auto-approvable intra-jurisdiction invoice.
pub struct RecordBuilder {
    record: CandidateRecord,
}

impl RecordBuilder {
    pub fn new() -> Self {
        Self {
            record: CandidateRecord {
                invoice_number: Some("INV-2024-001".to_string()),
                counterparty_name: Some("Acme Traders".to_string()),
                counterparty_tax_id: Some("27AAPFU0939F1ZV".to_string()),
                subtotal: Some(1000.0),
                taxes: TaxComponents {
                    cgst: 90.0,
                    sgst: 90.0,
                    igst: 0.0,
                },
                total_amount: Some(1180.0),
                items: vec![LineItem {
                    name: "Steel Rod".to_string(),
                    classification_code: Some("7214".to_string()),
                    quantity: 10.0,
                    unit_price: 100.0,
                    tax_rate: 18.0,
                    amount: 1000.0,
                }],
                extraction_confidence: 92,
                ..Default::default()
            },
        }
    }

    pub fn invoice_number(mut self, number: &str) -> Self {
        self.record.invoice_number = Some(number.to_string());
        self
    }

    pub fn without_counterparty(mut self) -> Self {
        self.record.counterparty_name = None;
        self.record.counterparty_tax_id = None;
        self
    }

    pub fn total_amount(mut self, total: f64) -> Self {
        self.record.total_amount = Some(total);
        self
    }

    pub fn build(self) -> CandidateRecord {
        self.record
    }
}

impl Default for RecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}
