//! Append-only audit trail of stage outcomes per document.

use chrono::Utc;
use rusqlite::{params, Row};

use super::{Database, DatabaseError};

#[derive(Debug, Clone, PartialEq)]
pub struct AuditRow {
    pub id: i64,
    pub document_id: String,
    pub stage: String,
    pub outcome: String,
    pub detail: Option<String>,
    pub recorded_at: String,
}

impl AuditRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            document_id: row.get("document_id")?,
            stage: row.get("stage")?,
            outcome: row.get("outcome")?,
            detail: row.get("detail")?,
            recorded_at: row.get("recorded_at")?,
        })
    }
}

pub fn append(
    db: &Database,
    document_id: &str,
    stage: &str,
    outcome: &str,
    detail: Option<&str>,
) -> Result<(), DatabaseError> {
    let now = Utc::now().to_rfc3339();
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO pipeline_audit (document_id, stage, outcome, detail, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![document_id, stage, outcome, detail, now],
        )?;
        Ok(())
    })
}

/// Entries for one document, oldest first.
pub fn list_for_document(db: &Database, document_id: &str) -> Result<Vec<AuditRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM pipeline_audit WHERE document_id = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map(params![document_id], AuditRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
