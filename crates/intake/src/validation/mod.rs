//! Confidence scoring and validation of candidate records.

pub mod engine;
pub mod result;
pub mod tax_id;

pub use engine::Validator;
pub use result::{AmountCheck, FieldConfidence, ValidationResult};
pub use tax_id::{check_tax_id, jurisdiction_name, TaxIdDefect, TaxIdInfo};
