use std::path::PathBuf;

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Timetable store query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The directory holding the database file could not be created.
    #[error("Cannot create database directory '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Schema migration v{version} failed: {reason}")]
    Migration { version: u32, reason: String },

    /// A timetable payload could not be encoded for storage.
    #[error("Timetable payload is not storable JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Timetable store connection poisoned by a panicked writer")]
    LockPoisoned,
}

impl DatabaseError {
    /// Busy or locked database; the same write can succeed later.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(failure, _)) => matches!(
                failure.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            Self::Io { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(code: i32) -> DatabaseError {
        DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(code),
            None,
        ))
    }

    #[test]
    fn test_busy_database_is_transient() {
        assert!(sqlite_failure(rusqlite::ffi::SQLITE_BUSY).is_transient());
        assert!(sqlite_failure(rusqlite::ffi::SQLITE_LOCKED).is_transient());
        assert!(!sqlite_failure(rusqlite::ffi::SQLITE_CONSTRAINT).is_transient());
    }

    #[test]
    fn test_payload_and_schema_errors_are_permanent() {
        let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = DatabaseError::from(json);
        assert!(!err.is_transient());
        assert!(err.to_string().starts_with("Timetable payload"));

        let migration = DatabaseError::Migration {
            version: 2,
            reason: "no such table".to_string(),
        };
        assert!(!migration.is_transient());
        assert_eq!(
            migration.to_string(),
            "Schema migration v2 failed: no such table"
        );
    }
}
