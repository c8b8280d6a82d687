//! Helpers for sanitizing data before it enters log lines and span fields.
//!
//! Uploads live in per-user temp directories and tax ids identify real
//! businesses; neither goes into traces verbatim.

use std::path::Path;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Masks everything but the jurisdiction prefix and the last two characters.
///
/// `27AAPFU0939F1ZV` becomes `27***********ZV`.
pub fn redact_tax_id(tax_id: &str) -> String {
    let chars: Vec<char> = tax_id.trim().chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let last = chars.len() - 2;
    chars
        .iter()
        .enumerate()
        .map(|(i, c)| if i < 2 || i >= last { *c } else { '*' })
        .collect()
}
