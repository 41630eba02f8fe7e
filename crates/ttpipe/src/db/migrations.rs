//! Schema migrations, tracked in a `_migrations` table and applied in order.

use rusqlite::Connection;

use super::error::DatabaseError;

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_timetables_table",
        sql: include_str!("sql/001_create_timetables.sql"),
    },
    Migration {
        version: 2,
        description: "create_pipeline_audit_table",
        sql: include_str!("sql/002_create_pipeline_audit.sql"),
    },
];

const LEDGER_DDL: &str = "CREATE TABLE IF NOT EXISTS _migrations (
    version INTEGER PRIMARY KEY,
    description TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);";

/// Highest applied migration, 0 on a fresh database.
pub fn schema_version(conn: &Connection) -> Result<u32, DatabaseError> {
    conn.execute_batch(LEDGER_DDL)?;
    let version = conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |r| {
        r.get(0)
    })?;
    Ok(version)
}

/// Applies every pending migration, each in its own transaction.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    let applied = schema_version(conn)?;
    let pending = MIGRATIONS.iter().filter(|m| m.version > applied);

    for migration in pending {
        log::info!("Applying schema v{} ({})", migration.version, migration.description);
        let failed = |e: rusqlite::Error| DatabaseError::Migration {
            version: migration.version,
            reason: e.to_string(),
        };

        let tx = conn.unchecked_transaction().map_err(failed)?;
        tx.execute_batch(migration.sql).map_err(failed)?;
        tx.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )
        .map_err(failed)?;
        tx.commit().map_err(failed)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_db_reaches_latest_version() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(schema_version(&conn).unwrap(), 0);

        run_all(&conn).unwrap();
        run_all(&conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), 2);
    }

    #[test]
    fn test_document_id_is_unique() {
        let conn = Connection::open_in_memory().unwrap();
        run_all(&conn).unwrap();

        let insert = "INSERT INTO timetables (timetable_id, document_id, data, source, created_at, updated_at)
                      VALUES (?1, 'doc', '{}', 'ocr', 'now', 'now')";
        conn.execute(insert, ["a"]).unwrap();
        assert!(conn.execute(insert, ["b"]).is_err());
    }
}
