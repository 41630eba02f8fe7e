//! Timetable repository: one row per document, rewritten on reprocessing.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

#[derive(Debug, Clone, PartialEq)]
pub struct TimetableRow {
    pub timetable_id: String,
    pub document_id: String,
    pub data: serde_json::Value,
    pub validated: bool,
    /// `"ocr"` or `"ai:<provider>"`.
    pub source: String,
    pub created_at: String,
    pub updated_at: String,
}

impl TimetableRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let data: String = row.get("data")?;
        let data = serde_json::from_str(&data).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(Self {
            timetable_id: row.get("timetable_id")?,
            document_id: row.get("document_id")?,
            data,
            validated: row.get("validated")?,
            source: row.get("source")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Inserts or replaces the timetable for `document_id` and returns its id.
///
/// The id is assigned on first save and kept on every later save, so a
/// redelivered job updates the same row.
pub fn upsert(
    db: &Database,
    document_id: &str,
    data: &serde_json::Value,
    validated: bool,
    source: &str,
) -> Result<String, DatabaseError> {
    let payload = serde_json::to_string(data)?;
    let now = Utc::now().to_rfc3339();
    let candidate_id = uuid::Uuid::new_v4().to_string();

    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO timetables (timetable_id, document_id, data, validated, source, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(document_id) DO UPDATE SET
                data = excluded.data,
                validated = excluded.validated,
                source = excluded.source,
                updated_at = excluded.updated_at",
            params![candidate_id, document_id, payload, validated, source, now],
        )?;

        let id: String = conn.query_row(
            "SELECT timetable_id FROM timetables WHERE document_id = ?1",
            params![document_id],
            |r| r.get(0),
        )?;
        Ok(id)
    })
}

pub fn find_by_document(
    db: &Database,
    document_id: &str,
) -> Result<Option<TimetableRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM timetables WHERE document_id = ?1",
                params![document_id],
                TimetableRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

pub fn count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM timetables", [], |r| r.get(0))?;
        Ok(n.max(0) as u64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_upsert_then_find() {
        let db = Database::open_in_memory().unwrap();
        let data = json!({ "timeblocks": [{ "day": "Monday", "name": "Maths" }] });

        let id = upsert(&db, "doc-1", &data, true, "ai:claude").unwrap();
        let row = find_by_document(&db, "doc-1").unwrap().unwrap();

        assert_eq!(row.timetable_id, id);
        assert_eq!(row.data, data);
        assert!(row.validated);
        assert_eq!(row.source, "ai:claude");
    }

    #[test]
    fn test_upsert_keeps_id_and_single_row() {
        let db = Database::open_in_memory().unwrap();
        let first = upsert(&db, "doc-1", &json!({ "v": 1 }), false, "ocr").unwrap();
        let second = upsert(&db, "doc-1", &json!({ "v": 2 }), true, "ai:claude").unwrap();

        assert_eq!(first, second);
        assert_eq!(count(&db).unwrap(), 1);

        let row = find_by_document(&db, "doc-1").unwrap().unwrap();
        assert_eq!(row.data, json!({ "v": 2 }));
        assert!(row.validated);
    }

    #[test]
    fn test_find_missing() {
        let db = Database::open_in_memory().unwrap();
        assert!(find_by_document(&db, "nope").unwrap().is_none());
    }
}
