//! Approved record repository: `approved_records` and `approved_items`.

use rusqlite::{params, OptionalExtension};

use super::{Database, DatabaseError};

/// A raw approved record row. `body` holds the JSON-serialized record.
#[derive(Debug, Clone)]
pub struct ApprovedRecordRow {
    pub id: String,
    pub counterparty_id: Option<String>,
    pub counterparty_name: Option<String>,
    pub normalized_name: Option<String>,
    pub tax_id: Option<String>,
    pub invoice_number: Option<String>,
    pub total_amount: Option<f64>,
    pub body: String,
    pub approved_at: String,
}

/// A raw approved line item row.
#[derive(Debug, Clone)]
pub struct ApprovedItemRow {
    pub name: String,
    pub normalized_name: String,
    pub code: Option<String>,
}

/// Inserts an approved record and its items in one transaction. Returns
/// `false` without touching the items when the record id already exists.
pub fn insert(
    db: &Database,
    record: &ApprovedRecordRow,
    items: &[ApprovedItemRow],
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO approved_records (id, counterparty_id, counterparty_name, normalized_name,
             tax_id, invoice_number, total_amount, body, approved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.id,
                record.counterparty_id,
                record.counterparty_name,
                record.normalized_name,
                record.tax_id,
                record.invoice_number,
                record.total_amount,
                record.body,
                record.approved_at,
            ],
        )?;
        if inserted == 0 {
            return Ok(false);
        }
        for item in items {
            tx.execute(
                "INSERT INTO approved_items (record_id, name, normalized_name, code)
                 VALUES (?1, ?2, ?3, ?4)",
                params![record.id, item.name, item.normalized_name, item.code],
            )?;
        }
        tx.commit()?;
        Ok(true)
    })
}

/// Returns `(counterparty_name, tax_id)` pairs of approved records whose
/// normalized name equals, contains, or is contained in `normalized_name`.
/// Exact matches come first, then the most recently approved.
pub fn find_tax_ids_by_name(
    db: &Database,
    normalized_name: &str,
    limit: u32,
) -> Result<Vec<(String, String)>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT counterparty_name, tax_id FROM approved_records
             WHERE tax_id IS NOT NULL AND counterparty_name IS NOT NULL
               AND normalized_name IS NOT NULL AND normalized_name != ''
               AND (normalized_name = ?1
                    OR instr(normalized_name, ?1) > 0
                    OR instr(?1, normalized_name) > 0)
             ORDER BY CASE WHEN normalized_name = ?1 THEN 0 ELSE 1 END, approved_at DESC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![normalized_name, limit], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Finds a classification code previously approved for a similarly named item.
pub fn find_item_code(db: &Database, normalized_name: &str) -> Result<Option<String>, DatabaseError> {
    db.with_conn(|conn| {
        let code = conn
            .query_row(
                "SELECT code FROM approved_items
                 WHERE code IS NOT NULL AND code != '' AND normalized_name != ''
                   AND (normalized_name = ?1
                        OR instr(normalized_name, ?1) > 0
                        OR instr(?1, normalized_name) > 0)
                 ORDER BY CASE WHEN normalized_name = ?1 THEN 0 ELSE 1 END, rowid DESC
                 LIMIT 1",
                params![normalized_name],
                |r| r.get::<_, String>(0),
            )
            .optional()?;
        Ok(code)
    })
}

/// Returns the id of an approved record with the same counterparty and
/// invoice number, if any.
pub fn find_duplicate(
    db: &Database,
    counterparty_id: &str,
    invoice_number: &str,
) -> Result<Option<String>, DatabaseError> {
    db.with_conn(|conn| {
        let id = conn
            .query_row(
                "SELECT id FROM approved_records
                 WHERE counterparty_id = ?1 AND invoice_number = ?2
                 ORDER BY approved_at ASC LIMIT 1",
                params![counterparty_id, invoice_number],
                |r| r.get::<_, String>(0),
            )
            .optional()?;
        Ok(id)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, name: &str, tax_id: Option<&str>) -> ApprovedRecordRow {
        ApprovedRecordRow {
            id: id.to_string(),
            counterparty_id: Some("C1".to_string()),
            counterparty_name: Some(name.to_string()),
            normalized_name: Some(crate::record::normalize_name(name)),
            tax_id: tax_id.map(str::to_string),
            invoice_number: Some("INV-1".to_string()),
            total_amount: Some(100.0),
            body: "{}".to_string(),
            approved_at: format!("2026-01-0{}T00:00:00Z", id.len()),
        }
    }

    fn item(name: &str, code: Option<&str>) -> ApprovedItemRow {
        ApprovedItemRow {
            name: name.to_string(),
            normalized_name: crate::record::normalize_name(name),
            code: code.map(str::to_string),
        }
    }

    #[test]
    fn test_insert_and_find_duplicate() {
        let db = Database::open_in_memory().unwrap();
        assert!(insert(&db, &record("r1", "Acme Traders", None), &[]).unwrap());
        assert!(!insert(&db, &record("r1", "Acme Traders", None), &[]).unwrap());

        assert_eq!(find_duplicate(&db, "C1", "INV-1").unwrap(), Some("r1".to_string()));
        assert_eq!(find_duplicate(&db, "C1", "INV-2").unwrap(), None);
        assert_eq!(find_duplicate(&db, "C2", "INV-1").unwrap(), None);
    }

    #[test]
    fn test_find_tax_ids_by_name() {
        let db = Database::open_in_memory().unwrap();
        insert(&db, &record("r1", "Acme Traders Pvt Ltd", Some("27AAPFU0939F1ZV")), &[]).unwrap();
        insert(&db, &record("r22", "Other Co", Some("29AAPFU0939F1ZV")), &[]).unwrap();
        insert(&db, &record("r333", "Acme Traders", None), &[]).unwrap();

        let found = find_tax_ids_by_name(&db, "acme traders", 10).unwrap();
        assert_eq!(
            found,
            vec![("Acme Traders Pvt Ltd".to_string(), "27AAPFU0939F1ZV".to_string())]
        );
        assert!(find_tax_ids_by_name(&db, "nobody", 10).unwrap().is_empty());
    }

    #[test]
    fn test_find_item_code_prefers_exact_match() {
        let db = Database::open_in_memory().unwrap();
        insert(
            &db,
            &record("r1", "Acme", None),
            &[
                item("Steel Rod 10mm", Some("7214")),
                item("Steel Rod", Some("7215")),
                item("Bolt", None),
            ],
        )
        .unwrap();

        assert_eq!(find_item_code(&db, "steel rod").unwrap(), Some("7215".to_string()));
        assert_eq!(find_item_code(&db, "steel rod 10mm").unwrap(), Some("7214".to_string()));
        assert_eq!(find_item_code(&db, "bolt").unwrap(), None);
    }
}
