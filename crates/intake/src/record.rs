//! Strongly-typed extraction output.
//!
//! A [`CandidateRecord`] is what the extraction adapter hands back for one
//! uploaded invoice, before any validation has run. All amounts are in the
//! invoice currency's major unit.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One line of an invoice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    #[serde(default)]
    pub name: String,
    /// Product/service classification code (HSN/SAC).
    #[serde(default, alias = "hsnCode")]
    pub classification_code: Option<String>,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub unit_price: f64,
    /// Tax rate in percent.
    #[serde(default)]
    pub tax_rate: f64,
    #[serde(default)]
    pub amount: f64,
}

impl LineItem {
    /// Returns the trimmed classification code, treating blanks as absent.
    pub fn code(&self) -> Option<&str> {
        non_blank(self.classification_code.as_deref())
    }

    pub fn has_name(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

/// Declared tax components.
///
/// `cgst` and `sgst` are the two co-equal halves charged on same-jurisdiction
/// trade; `igst` is the single consolidated component for cross-jurisdiction
/// trade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TaxComponents {
    #[serde(default)]
    pub cgst: f64,
    #[serde(default)]
    pub sgst: f64,
    #[serde(default)]
    pub igst: f64,
}

impl TaxComponents {
    pub fn total(&self) -> f64 {
        self.cgst + self.sgst + self.igst
    }

    pub fn has_split(&self) -> bool {
        self.cgst > 0.0 || self.sgst > 0.0
    }

    pub fn has_consolidated(&self) -> bool {
        self.igst > 0.0
    }
}

/// Which tax convention a record (or a counterparty's history) follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxRegime {
    /// Same-jurisdiction trade, split components.
    Intra,
    /// Cross-jurisdiction trade, consolidated component.
    Inter,
    /// Both conventions observed. Acts as a wildcard when matching.
    Mixed,
}

impl std::fmt::Display for TaxRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaxRegime::Intra => write!(f, "intra-jurisdiction"),
            TaxRegime::Inter => write!(f, "inter-jurisdiction"),
            TaxRegime::Mixed => write!(f, "mixed"),
        }
    }
}

/// Structured candidate record returned by the extraction adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRecord {
    #[serde(default)]
    pub invoice_number: Option<String>,
    #[serde(default)]
    pub invoice_date: Option<NaiveDate>,
    #[serde(default)]
    pub counterparty_name: Option<String>,
    #[serde(default, alias = "gstin")]
    pub counterparty_tax_id: Option<String>,
    #[serde(default)]
    pub subtotal: Option<f64>,
    #[serde(default)]
    pub taxes: TaxComponents,
    #[serde(default)]
    pub total_amount: Option<f64>,
    #[serde(default)]
    pub items: Vec<LineItem>,
    /// Confidence reported by the extractor, 0-100.
    #[serde(default)]
    pub extraction_confidence: u8,
}

impl CandidateRecord {
    pub fn invoice_number(&self) -> Option<&str> {
        non_blank(self.invoice_number.as_deref())
    }

    pub fn counterparty_name(&self) -> Option<&str> {
        non_blank(self.counterparty_name.as_deref())
    }

    /// Tax id, trimmed and upper-cased.
    pub fn tax_id(&self) -> Option<String> {
        non_blank(self.counterparty_tax_id.as_deref()).map(|s| s.to_ascii_uppercase())
    }

    /// Sum of line amounts.
    pub fn items_subtotal(&self) -> f64 {
        self.items.iter().map(|i| i.amount).sum()
    }

    /// Tax convention the declared components follow, `None` when no tax was
    /// declared at all.
    pub fn tax_regime(&self) -> Option<TaxRegime> {
        match (self.taxes.has_split(), self.taxes.has_consolidated()) {
            (true, false) => Some(TaxRegime::Intra),
            (false, true) => Some(TaxRegime::Inter),
            (true, true) => Some(TaxRegime::Mixed),
            (false, false) => None,
        }
    }

    /// Key under which the counterparty's template is learned.
    ///
    /// The tax id identifies a counterparty most reliably; the normalized name
    /// is the fallback. `None` means the counterparty is unknown.
    pub fn counterparty_key(&self) -> Option<String> {
        if let Some(tax_id) = self.tax_id() {
            return Some(tax_id);
        }
        self.counterparty_name()
            .map(normalize_name)
            .filter(|n| !n.is_empty())
    }

    /// Distinct classification codes across all lines, in first-seen order.
    pub fn codes(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for code in self.items.iter().filter_map(LineItem::code) {
            let code = code.to_ascii_uppercase();
            if !out.contains(&code) {
                out.push(code);
            }
        }
        out
    }

    /// Distinct normalized item names, in first-seen order.
    pub fn item_names(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for name in self.items.iter().map(|i| normalize_name(&i.name)) {
            if !name.is_empty() && !out.contains(&name) {
                out.push(name);
            }
        }
        out
    }
}

/// Lower-cases and collapses a free-text name to alphanumeric words.
pub fn normalize_name(name: &str) -> String {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, code: Option<&str>) -> LineItem {
        LineItem {
            name: name.to_string(),
            classification_code: code.map(str::to_string),
            quantity: 1.0,
            unit_price: 10.0,
            tax_rate: 18.0,
            amount: 10.0,
        }
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  ACME Traders Pvt. Ltd. "), "acme traders pvt ltd");
        assert_eq!(normalize_name("---"), "");
    }

    #[test]
    fn test_tax_regime() {
        let mut record = CandidateRecord::default();
        assert_eq!(record.tax_regime(), None);

        record.taxes = TaxComponents {
            cgst: 9.0,
            sgst: 9.0,
            igst: 0.0,
        };
        assert_eq!(record.tax_regime(), Some(TaxRegime::Intra));

        record.taxes = TaxComponents {
            cgst: 0.0,
            sgst: 0.0,
            igst: 18.0,
        };
        assert_eq!(record.tax_regime(), Some(TaxRegime::Inter));

        record.taxes.cgst = 1.0;
        assert_eq!(record.tax_regime(), Some(TaxRegime::Mixed));
    }

    #[test]
    fn test_counterparty_key_prefers_tax_id() {
        let mut record = CandidateRecord {
            counterparty_name: Some("Acme Traders".to_string()),
            counterparty_tax_id: Some(" 27aapfu0939f1zv ".to_string()),
            ..Default::default()
        };
        assert_eq!(record.counterparty_key(), Some("27AAPFU0939F1ZV".to_string()));

        record.counterparty_tax_id = Some("   ".to_string());
        assert_eq!(record.counterparty_key(), Some("acme traders".to_string()));

        record.counterparty_name = None;
        assert_eq!(record.counterparty_key(), None);
    }

    #[test]
    fn test_codes_and_names_are_distinct() {
        let record = CandidateRecord {
            items: vec![
                item("Steel Rod", Some("7214")),
                item("steel rod", Some("7214")),
                item("Bolt", None),
                item("", Some(" 7318 ")),
            ],
            ..Default::default()
        };
        assert_eq!(record.codes(), vec!["7214", "7318"]);
        assert_eq!(record.item_names(), vec!["steel rod", "bolt"]);
    }

    #[test]
    fn test_deserialize_with_aliases() {
        let json = r#"{
            "invoiceNumber": "INV-1",
            "invoiceDate": "2024-03-01",
            "gstin": "27AAPFU0939F1ZV",
            "taxes": { "cgst": 9, "sgst": 9 },
            "items": [{ "name": "Bolt", "hsnCode": "7318", "quantity": 2, "unitPrice": 5, "amount": 10 }],
            "extractionConfidence": 90
        }"#;
        let record: CandidateRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.invoice_number(), Some("INV-1"));
        assert_eq!(record.tax_id().as_deref(), Some("27AAPFU0939F1ZV"));
        assert_eq!(record.items[0].code(), Some("7318"));
        assert_eq!(record.taxes.igst, 0.0);
        assert_eq!(record.extraction_confidence, 90);
    }
}
