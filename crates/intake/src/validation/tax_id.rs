//! Structural validation of counterparty tax identifiers (GSTIN).
//!
//! A GSTIN is 15 characters: a two-digit jurisdiction (state) code, the
//! ten-character PAN of the holder, an entity number, the literal `Z`, and a
//! trailing checksum character. Only the structure is checked here.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

pub const TAX_ID_LENGTH: usize = 15;

/// Known jurisdiction codes.
const JURISDICTIONS: &[(&str, &str)] = &[
    ("01", "Jammu and Kashmir"),
    ("02", "Himachal Pradesh"),
    ("03", "Punjab"),
    ("04", "Chandigarh"),
    ("05", "Uttarakhand"),
    ("06", "Haryana"),
    ("07", "Delhi"),
    ("08", "Rajasthan"),
    ("09", "Uttar Pradesh"),
    ("10", "Bihar"),
    ("11", "Sikkim"),
    ("12", "Arunachal Pradesh"),
    ("13", "Nagaland"),
    ("14", "Manipur"),
    ("15", "Mizoram"),
    ("16", "Tripura"),
    ("17", "Meghalaya"),
    ("18", "Assam"),
    ("19", "West Bengal"),
    ("20", "Jharkhand"),
    ("21", "Odisha"),
    ("22", "Chhattisgarh"),
    ("23", "Madhya Pradesh"),
    ("24", "Gujarat"),
    ("26", "Dadra and Nagar Haveli and Daman and Diu"),
    ("27", "Maharashtra"),
    ("28", "Andhra Pradesh (old)"),
    ("29", "Karnataka"),
    ("30", "Goa"),
    ("31", "Lakshadweep"),
    ("32", "Kerala"),
    ("33", "Tamil Nadu"),
    ("34", "Puducherry"),
    ("35", "Andaman and Nicobar Islands"),
    ("36", "Telangana"),
    ("37", "Andhra Pradesh"),
    ("38", "Ladakh"),
    ("97", "Other Territory"),
    ("99", "Centre Jurisdiction"),
];

/// Why a tax id failed the structural check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaxIdDefect {
    #[error("expected 15 characters, found {0}")]
    Length(usize),

    #[error("unknown jurisdiction code '{0}'")]
    Jurisdiction(String),

    #[error("body does not follow the PAN/entity layout")]
    Format,

    #[error("checksum character is missing")]
    Checksum,
}

/// Facts recovered from a structurally valid tax id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxIdInfo {
    pub jurisdiction: String,
}

fn body_regex() -> &'static Regex {
    static BODY: OnceLock<Regex> = OnceLock::new();
    BODY.get_or_init(|| {
        Regex::new(r"^[A-Z]{5}[0-9]{4}[A-Z][1-9A-Z]Z$").expect("tax id body pattern is valid")
    })
}

/// Returns the jurisdiction name for a two-digit code.
pub fn jurisdiction_name(code: &str) -> Option<&'static str> {
    JURISDICTIONS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// Checks length, jurisdiction code, body layout and checksum presence, in
/// that order. `tax_id` is expected to be trimmed and upper-cased.
pub fn check_tax_id(tax_id: &str) -> Result<TaxIdInfo, TaxIdDefect> {
    let chars = tax_id.chars().count();
    if chars != TAX_ID_LENGTH {
        return Err(TaxIdDefect::Length(chars));
    }
    if !tax_id.is_ascii() {
        return Err(TaxIdDefect::Format);
    }

    let jurisdiction = &tax_id[..2];
    if jurisdiction_name(jurisdiction).is_none() {
        return Err(TaxIdDefect::Jurisdiction(jurisdiction.to_string()));
    }

    if !body_regex().is_match(&tax_id[2..14]) {
        return Err(TaxIdDefect::Format);
    }

    let checksum = tax_id.as_bytes()[14];
    if !checksum.is_ascii_alphanumeric() {
        return Err(TaxIdDefect::Checksum);
    }

    Ok(TaxIdInfo {
        jurisdiction: jurisdiction.to_string(),
    })
}
