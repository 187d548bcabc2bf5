//! Database schema migrations.

use rusqlite::Connection;
use tracing::info;

use prospect_core::error::ProspectError;

/// Apply every migration newer than the recorded schema version.
pub fn run_migrations(conn: &Connection) -> Result<(), ProspectError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| ProspectError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| ProspectError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: conversation_states");
    }

    Ok(())
}

/// Version 1: one row per call, the record itself stored as JSON.
fn apply_v1(conn: &Connection) -> Result<(), ProspectError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS conversation_states (
            call_id         TEXT PRIMARY KEY NOT NULL,
            user_id         TEXT NOT NULL,
            created_at      INTEGER NOT NULL,
            last_activity   INTEGER NOT NULL,
            turn_count      INTEGER NOT NULL DEFAULT 0,
            record_json     TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_conversation_states_last_activity
            ON conversation_states (last_activity ASC);

        CREATE INDEX IF NOT EXISTS idx_conversation_states_user
            ON conversation_states (user_id, last_activity DESC);

        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'conversation_states');
        ",
    )
    .map_err(|e| ProspectError::Storage(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}
