//! SQLite connection management.
//!
//! A single rusqlite `Connection` behind a `Mutex`, opened in WAL mode with
//! migrations applied before the handle is returned.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::info;

use prospect_core::error::ProspectError;

use crate::migrations;

/// Thread-safe SQLite handle.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database file at `path` and migrate it.
    pub fn open(path: &Path) -> Result<Self, ProspectError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| ProspectError::Storage(format!("Failed to open database: {}", e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| ProspectError::Storage(format!("Failed to set pragmas: {}", e)))?;

        info!(path = %path.display(), "State database opened");
        Self::migrated(conn)
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> Result<Self, ProspectError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ProspectError::Storage(format!("Failed to open in-memory db: {}", e)))?;
        Self::migrated(conn)
    }

    fn migrated(conn: Connection) -> Result<Self, ProspectError> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Run `f` with exclusive access to the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, ProspectError>
    where
        F: FnOnce(&Connection) -> Result<T, ProspectError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ProspectError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}
