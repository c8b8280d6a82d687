//! Template repository: the `templates` and `learned_records` tables.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw template row. `body` holds the JSON-serialized template.
#[derive(Debug, Clone)]
pub struct TemplateRow {
    pub counterparty_id: String,
    pub counterparty_name: Option<String>,
    pub body: String,
    pub updated_at: String,
}

impl TemplateRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            counterparty_id: row.get("counterparty_id")?,
            counterparty_name: row.get("counterparty_name")?,
            body: row.get("body")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Inserts or replaces the template for a counterparty.
pub fn upsert(db: &Database, template: &TemplateRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO templates (counterparty_id, counterparty_name, body, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(counterparty_id) DO UPDATE SET
               counterparty_name = excluded.counterparty_name,
               body = excluded.body,
               updated_at = excluded.updated_at",
            params![
                template.counterparty_id,
                template.counterparty_name,
                template.body,
                template.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds the template for a counterparty.
pub fn find_by_id(db: &Database, counterparty_id: &str) -> Result<Option<TemplateRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM templates WHERE counterparty_id = ?1",
                params![counterparty_id],
                TemplateRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Records that a fingerprinted record has been learned.
///
/// Returns `true` if the fingerprint was new, `false` if it had already been
/// recorded.
pub fn mark_learned(
    db: &Database,
    fingerprint: &str,
    counterparty_id: &str,
    learned_at: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO learned_records (fingerprint, counterparty_id, learned_at)
             VALUES (?1, ?2, ?3)",
            params![fingerprint, counterparty_id, learned_at],
        )?;
        Ok(inserted == 1)
    })
}

/// Removes a learned marker. Used to roll back when the template write fails.
pub fn unmark_learned(db: &Database, fingerprint: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "DELETE FROM learned_records WHERE fingerprint = ?1",
            params![fingerprint],
        )?;
        Ok(())
    })
}
