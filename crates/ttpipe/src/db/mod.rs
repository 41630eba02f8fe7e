//! SQLite persistence for extracted timetables and the pipeline audit trail.
//!
//! A single rusqlite connection behind a `Mutex`; SQLite serializes writes
//! anyway. File databases run in WAL mode.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

pub mod audit_repo;
pub mod error;
pub mod migrations;
pub mod timetable_repo;

pub use error::DatabaseError;

/// Cloneable handle; clones share the connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) the database file and applies pending migrations.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let db = Self::migrated(conn)?;
        log::info!("Timetable store ready at {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::migrated(Connection::open_in_memory()?)
    }

    fn migrated(conn: Connection) -> Result<Self, DatabaseError> {
        migrations::run_all(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens the configured path, or [`default_database_path`].
    pub fn open_configured(path: Option<&str>) -> Result<Self, DatabaseError> {
        match path.map(PathBuf::from).or_else(default_database_path) {
            Some(path) => Self::open(&path),
            None => {
                log::warn!("No home directory found; using an in-memory database");
                Self::open_in_memory()
            }
        }
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }
}

/// `~/.ttpipe/data/ttpipe.db`
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".ttpipe").join("data").join("ttpipe.db"))
}
