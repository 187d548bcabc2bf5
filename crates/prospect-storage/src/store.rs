//! Keyed conversation-state stores.
//!
//! `StateStore` is the seam the conversation state manager persists through.
//! `SqliteStateStore` survives restarts and can be shared by several server
//! processes pointing at the same file; `MemoryStateStore` is for tests and
//! throwaway runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use tracing::debug;

use prospect_core::error::ProspectError;
use prospect_core::types::ConversationRecord;

use crate::db::Database;

/// Durable key-value store of conversation records, keyed by call id.
pub trait StateStore: Send + Sync {
    /// Fetch the record for `call_id`, if any.
    fn load(&self, call_id: &str) -> Result<Option<ConversationRecord>, ProspectError>;

    /// Insert or replace the record for `record.call_id`.
    fn save(&self, record: &ConversationRecord) -> Result<(), ProspectError>;

    /// Remove the record. Returns whether one existed.
    fn delete(&self, call_id: &str) -> Result<bool, ProspectError>;

    /// Remove records whose last activity is before `cutoff`.
    fn purge_inactive_since(&self, cutoff: DateTime<Utc>) -> Result<usize, ProspectError>;

    /// Number of stored records.
    fn count(&self) -> Result<usize, ProspectError>;
}

// =============================================================================
// SQLite
// =============================================================================

/// `StateStore` backed by the `conversation_states` table.
pub struct SqliteStateStore {
    db: Arc<Database>,
}

impl SqliteStateStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl StateStore for SqliteStateStore {
    fn load(&self, call_id: &str) -> Result<Option<ConversationRecord>, ProspectError> {
        let json: Option<String> = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT record_json FROM conversation_states WHERE call_id = ?1",
                rusqlite::params![call_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| ProspectError::Storage(format!("Failed to load call state: {}", e)))
        })?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn save(&self, record: &ConversationRecord) -> Result<(), ProspectError> {
        let json = serde_json::to_string(record)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO conversation_states
                    (call_id, user_id, created_at, last_activity, turn_count, record_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(call_id) DO UPDATE SET
                    user_id = excluded.user_id,
                    last_activity = excluded.last_activity,
                    turn_count = excluded.turn_count,
                    record_json = excluded.record_json",
                rusqlite::params![
                    record.call_id,
                    record.user_id,
                    record.created_at.timestamp_millis(),
                    record.last_activity.timestamp_millis(),
                    record.conversation_history.len() as i64,
                    json,
                ],
            )
            .map_err(|e| ProspectError::Storage(format!("Failed to save call state: {}", e)))?;
            Ok(())
        })?;
        debug!(call_id = %record.call_id, "Call state saved");
        Ok(())
    }

    fn delete(&self, call_id: &str) -> Result<bool, ProspectError> {
        self.db.with_conn(|conn| {
            let removed = conn
                .execute(
                    "DELETE FROM conversation_states WHERE call_id = ?1",
                    rusqlite::params![call_id],
                )
                .map_err(|e| ProspectError::Storage(format!("Failed to delete call state: {}", e)))?;
            Ok(removed > 0)
        })
    }

    fn purge_inactive_since(&self, cutoff: DateTime<Utc>) -> Result<usize, ProspectError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM conversation_states WHERE last_activity < ?1",
                rusqlite::params![cutoff.timestamp_millis()],
            )
            .map_err(|e| ProspectError::Storage(format!("Failed to purge call states: {}", e)))
        })
    }

    fn count(&self) -> Result<usize, ProspectError> {
        self.db.with_conn(|conn| {
            let n: i64 = conn
                .query_row("SELECT COUNT(*) FROM conversation_states", [], |row| {
                    row.get(0)
                })
                .map_err(|e| ProspectError::Storage(e.to_string()))?;
            Ok(n as usize)
        })
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// Process-local `StateStore`. Holds serialized records so reads hand out
/// independent copies, the same as the SQLite store.
#[derive(Default)]
pub struct MemoryStateStore {
    records: Mutex<HashMap<String, String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, ProspectError> {
        self.records
            .lock()
            .map_err(|e| ProspectError::Storage(format!("Store lock poisoned: {}", e)))
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, call_id: &str) -> Result<Option<ConversationRecord>, ProspectError> {
        match self.lock()?.get(call_id) {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }

    fn save(&self, record: &ConversationRecord) -> Result<(), ProspectError> {
        let json = serde_json::to_string(record)?;
        self.lock()?.insert(record.call_id.clone(), json);
        Ok(())
    }

    fn delete(&self, call_id: &str) -> Result<bool, ProspectError> {
        Ok(self.lock()?.remove(call_id).is_some())
    }

    fn purge_inactive_since(&self, cutoff: DateTime<Utc>) -> Result<usize, ProspectError> {
        let mut records = self.lock()?;
        let before = records.len();
        records.retain(|_, json| {
            serde_json::from_str::<ConversationRecord>(json)
                .map(|r| r.last_activity >= cutoff)
                .unwrap_or(false)
        });
        Ok(before - records.len())
    }

    fn count(&self) -> Result<usize, ProspectError> {
        Ok(self.lock()?.len())
    }
}
