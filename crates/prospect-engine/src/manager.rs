//! Conversation state manager.
//!
//! Keeps one `ProspectEngine` per call in memory, restores engines from the
//! durable store after eviction or restart, persists state according to the
//! configured policy, and sweeps idle calls on a background interval.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use prospect_core::config::{PersistPolicy, SessionConfig};
use prospect_core::types::{ConversationRecord, ScenarioConfig, Turn};
use prospect_storage::StateStore;

use crate::engine::ProspectEngine;
use crate::error::EngineError;

/// Shared handle to a call's engine. Holding the lock serializes turns.
pub type EngineHandle = Arc<tokio::sync::Mutex<ProspectEngine>>;

/// Wall-clock source for activity stamps and the cleanup sweep.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

struct CallSlot {
    engine: EngineHandle,
    user_id: String,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    turns_since_flush: u32,
}

pub struct ConversationStateManager {
    store: Arc<dyn StateStore>,
    config: SessionConfig,
    calls: Mutex<HashMap<String, CallSlot>>,
    clock: Clock,
}

impl ConversationStateManager {
    pub fn new(store: Arc<dyn StateStore>, config: SessionConfig) -> Self {
        Self::with_clock(store, config, Arc::new(Utc::now))
    }

    pub fn with_clock(store: Arc<dyn StateStore>, config: SessionConfig, clock: Clock) -> Self {
        Self {
            store,
            config,
            calls: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn calls(&self) -> Result<MutexGuard<'_, HashMap<String, CallSlot>>, EngineError> {
        self.calls
            .lock()
            .map_err(|e| EngineError::StorageError(format!("call map lock poisoned: {}", e)))
    }

    /// Engine for `call_id`, restored from the store or created fresh on a
    /// miss. `config` and `history` only seed a brand-new engine.
    pub fn get_or_create_engine(
        &self,
        call_id: &str,
        user_id: &str,
        config: ScenarioConfig,
        history: Vec<Turn>,
    ) -> Result<EngineHandle, EngineError> {
        let now = self.now();
        {
            let mut calls = self.calls()?;
            if let Some(slot) = calls.get_mut(call_id) {
                check_owner(call_id, &slot.user_id, user_id)?;
                slot.last_activity = now;
                return Ok(Arc::clone(&slot.engine));
            }
        }

        let restored = match self.store.load(call_id) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(call_id, error = %e, "Failed to load stored call, starting fresh");
                None
            }
        };

        let (engine, created_at) = match restored {
            Some(record) => {
                check_owner(call_id, &record.user_id, user_id)?;
                tracing::info!(
                    call_id,
                    turns = record.conversation_history.len(),
                    "Restored call from store"
                );
                let created_at = record.created_at;
                (ProspectEngine::from_record(record), created_at)
            }
            None => {
                tracing::info!(
                    call_id,
                    user_id,
                    seeded_turns = history.len(),
                    "Starting new call"
                );
                (ProspectEngine::with_history(call_id, config, history), now)
            }
        };

        // Another request may have inserted the call while the store was read.
        let mut calls = self.calls()?;
        let slot = calls.entry(call_id.to_string()).or_insert_with(|| CallSlot {
            engine: Arc::new(tokio::sync::Mutex::new(engine)),
            user_id: user_id.to_string(),
            created_at,
            last_activity: now,
            turns_since_flush: 0,
        });
        check_owner(call_id, &slot.user_id, user_id)?;
        Ok(Arc::clone(&slot.engine))
    }

    /// Record a completed turn. Returns whether the state was written to the
    /// store; write failures are logged, never returned.
    pub fn update_engine_state(&self, call_id: &str, engine: &ProspectEngine) -> bool {
        let now = self.now();
        let (user_id, created_at) = {
            let mut calls = match self.calls() {
                Ok(calls) => calls,
                Err(e) => {
                    tracing::error!(call_id, error = %e, "Cannot update call state");
                    return false;
                }
            };
            let Some(slot) = calls.get_mut(call_id) else {
                tracing::warn!(call_id, "Update for a call that is no longer in memory");
                return false;
            };
            slot.last_activity = now;
            slot.turns_since_flush += 1;

            let flush = match self.config.persist_policy {
                PersistPolicy::WriteThrough => true,
                PersistPolicy::EveryNTurns => {
                    slot.turns_since_flush >= self.config.flush_every_turns.max(1)
                }
            };
            if !flush {
                return false;
            }
            slot.turns_since_flush = 0;
            (slot.user_id.clone(), slot.created_at)
        };

        let record = engine.to_record(&user_id, created_at, now);
        match self.store.save(&record) {
            Ok(()) => {
                tracing::debug!(call_id, turns = record.conversation_history.len(), "Call persisted");
                true
            }
            Err(e) => {
                tracing::warn!(call_id, error = %e, "Failed to persist call state");
                false
            }
        }
    }

    /// Evict calls idle for longer than the idle timeout, persisting each
    /// first. Calls with a turn in flight are kept. Also purges durable
    /// records past the retention window. Returns the number evicted.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - chrono::Duration::seconds(self.config.idle_timeout_secs as i64);
        let mut evicted = 0usize;
        let mut busy = 0usize;

        match self.calls() {
            Ok(mut calls) => {
                calls.retain(|call_id, slot| {
                    if slot.last_activity >= cutoff {
                        return true;
                    }
                    let Ok(engine) = slot.engine.try_lock() else {
                        busy += 1;
                        return true;
                    };
                    let record = engine.to_record(&slot.user_id, slot.created_at, slot.last_activity);
                    if let Err(e) = self.store.save(&record) {
                        tracing::warn!(call_id = %call_id, error = %e, "Failed to persist call before eviction");
                    }
                    evicted += 1;
                    false
                });
            }
            Err(e) => tracing::error!(error = %e, "Skipping call sweep"),
        }

        let retention_cutoff = now - chrono::Duration::hours(self.config.retention_hours as i64);
        let purged = match self.store.purge_inactive_since(retention_cutoff) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to purge stored calls");
                0
            }
        };

        if evicted > 0 || busy > 0 || purged > 0 {
            tracing::info!(evicted, busy, purged, "Call sweep complete");
        }
        evicted
    }

    /// Run `sweep_expired` every cleanup interval until the task is aborted.
    pub fn spawn_cleanup(self: Arc<Self>) -> JoinHandle<()> {
        let period = Duration::from_secs(self.config.cleanup_interval_secs.max(1));
        tokio::spawn(async move {
            tracing::info!(interval_secs = period.as_secs(), "Call cleanup loop started");
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                self.sweep_expired(self.now());
            }
        })
    }

    /// Current record for a call, from memory or the store.
    pub async fn get_record(
        &self,
        call_id: &str,
    ) -> Result<Option<ConversationRecord>, EngineError> {
        let live = {
            let calls = self.calls()?;
            calls.get(call_id).map(|slot| {
                (
                    Arc::clone(&slot.engine),
                    slot.user_id.clone(),
                    slot.created_at,
                    slot.last_activity,
                )
            })
        };

        match live {
            Some((engine, user_id, created_at, last_activity)) => {
                let engine = engine.lock().await;
                Ok(Some(engine.to_record(&user_id, created_at, last_activity)))
            }
            None => Ok(self.store.load(call_id)?),
        }
    }

    /// Drop a call from memory and the store. Returns whether it existed.
    pub fn end_call(&self, call_id: &str) -> Result<bool, EngineError> {
        let in_memory = self.calls()?.remove(call_id).is_some();
        let stored = self.store.delete(call_id)?;
        if in_memory || stored {
            tracing::info!(call_id, "Call ended");
        }
        Ok(in_memory || stored)
    }

    /// Persist every in-memory call. Used on shutdown.
    pub async fn flush_all(&self) -> usize {
        let slots: Vec<_> = match self.calls() {
            Ok(calls) => calls
                .values()
                .map(|slot| {
                    (
                        Arc::clone(&slot.engine),
                        slot.user_id.clone(),
                        slot.created_at,
                        slot.last_activity,
                    )
                })
                .collect(),
            Err(e) => {
                tracing::error!(error = %e, "Cannot flush calls");
                return 0;
            }
        };

        let mut flushed = 0;
        for (engine, user_id, created_at, last_activity) in slots {
            let record = engine
                .lock()
                .await
                .to_record(&user_id, created_at, last_activity);
            match self.store.save(&record) {
                Ok(()) => flushed += 1,
                Err(e) => {
                    tracing::warn!(call_id = %record.call_id, error = %e, "Failed to flush call")
                }
            }
        }
        flushed
    }

    pub fn active_calls(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

fn check_owner(call_id: &str, owner: &str, user_id: &str) -> Result<(), EngineError> {
    if owner == user_id {
        Ok(())
    } else {
        tracing::warn!(call_id, "Rejected turn from a user who does not own the call");
        Err(EngineError::CallOwnership {
            call_id: call_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlm;
    use crate::prompt::PromptCompiler;
    use prospect_core::types::{CallType, Difficulty, Seniority};
    use prospect_storage::{Database, MemoryStateStore, SqliteStateStore};

    fn scenario() -> ScenarioConfig {
        ScenarioConfig {
            seniority: Seniority::Manager,
            call_type: CallType::DiscoveryInbound,
            scenario: "requested pricing info last week".to_string(),
            difficulty: Difficulty::new(2).unwrap(),
            prospect_name: None,
            company: None,
            emotional_state: None,
            extra: serde_json::Value::Null,
        }
    }

    fn manager_with(store: Arc<dyn StateStore>, config: SessionConfig) -> ConversationStateManager {
        ConversationStateManager::new(store, config)
    }

    fn manager() -> (ConversationStateManager, Arc<MemoryStateStore>) {
        let store = Arc::new(MemoryStateStore::new());
        (manager_with(store.clone(), SessionConfig::default()), store)
    }

    async fn take_turn(manager: &ConversationStateManager, call_id: &str, message: &str) {
        let handle = manager
            .get_or_create_engine(call_id, "user-1", scenario(), Vec::new())
            .unwrap();
        let mut engine = handle.lock().await;
        engine
            .generate_response(message, &MockLlm::new(), &PromptCompiler::default(), 0)
            .await
            .unwrap();
        manager.update_engine_state(call_id, &engine);
    }

    #[test]
    fn test_same_call_reuses_engine() {
        let (manager, _) = manager();
        let a = manager
            .get_or_create_engine("call-1", "user-1", scenario(), Vec::new())
            .unwrap();
        let b = manager
            .get_or_create_engine("call-1", "user-1", scenario(), Vec::new())
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.active_calls(), 1);
    }

    #[tokio::test]
    async fn test_new_engine_is_seeded_with_history() {
        let (manager, _) = manager();
        let history = vec![Turn::rep("hello"), Turn::ai("Hi, who's this?")];
        let handle = manager
            .get_or_create_engine("call-1", "user-1", scenario(), history)
            .unwrap();
        assert_eq!(handle.lock().await.history().len(), 2);
    }

    #[test]
    fn test_foreign_user_is_rejected() {
        let (manager, _) = manager();
        manager
            .get_or_create_engine("call-1", "user-1", scenario(), Vec::new())
            .unwrap();
        let err = manager
            .get_or_create_engine("call-1", "intruder", scenario(), Vec::new())
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::CallOwnership { .. }));
    }

    #[tokio::test]
    async fn test_write_through_persists_every_turn() {
        let (manager, store) = manager();
        take_turn(&manager, "call-1", "What made you reach out?").await;

        let record = store.load("call-1").unwrap().unwrap();
        assert_eq!(record.user_id, "user-1");
        assert_eq!(record.conversation_history.len(), 2);
    }

    #[tokio::test]
    async fn test_every_n_turns_defers_writes() {
        let store = Arc::new(MemoryStateStore::new());
        let config = SessionConfig {
            persist_policy: PersistPolicy::EveryNTurns,
            flush_every_turns: 2,
            ..SessionConfig::default()
        };
        let manager = manager_with(store.clone(), config);

        take_turn(&manager, "call-1", "What made you reach out?").await;
        assert!(store.load("call-1").unwrap().is_none());

        take_turn(&manager, "call-1", "How many reps are on the team?").await;
        assert_eq!(
            store.load("call-1").unwrap().unwrap().conversation_history.len(),
            4
        );
    }

    #[tokio::test]
    async fn test_sweep_evicts_idle_calls_and_keeps_recent() {
        let (manager, _) = manager();
        take_turn(&manager, "call-1", "What made you reach out?").await;

        let soon = Utc::now() + chrono::Duration::minutes(30);
        assert_eq!(manager.sweep_expired(soon), 0);
        assert_eq!(manager.active_calls(), 1);

        let later = Utc::now() + chrono::Duration::minutes(61);
        assert_eq!(manager.sweep_expired(later), 1);
        assert_eq!(manager.active_calls(), 0);
    }

    #[tokio::test]
    async fn test_sweep_flushes_unsaved_turns_before_eviction() {
        let store = Arc::new(MemoryStateStore::new());
        let config = SessionConfig {
            persist_policy: PersistPolicy::EveryNTurns,
            flush_every_turns: 10,
            ..SessionConfig::default()
        };
        let manager = manager_with(store.clone(), config);
        take_turn(&manager, "call-1", "What made you reach out?").await;
        assert!(store.load("call-1").unwrap().is_none());

        manager.sweep_expired(Utc::now() + chrono::Duration::hours(2));
        assert_eq!(
            store.load("call-1").unwrap().unwrap().conversation_history.len(),
            2
        );
    }

    #[tokio::test]
    async fn test_sweep_retains_call_mid_turn() {
        let (manager, _) = manager();
        let handle = manager
            .get_or_create_engine("call-1", "user-1", scenario(), Vec::new())
            .unwrap();
        let _turn_in_flight = handle.lock().await;

        let evicted = manager.sweep_expired(Utc::now() + chrono::Duration::hours(2));
        assert_eq!(evicted, 0);
        assert_eq!(manager.active_calls(), 1);
    }

    #[tokio::test]
    async fn test_restore_after_eviction() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open(&dir.path().join("calls.db")).unwrap());
        let store: Arc<dyn StateStore> = Arc::new(SqliteStateStore::new(db));
        let manager = manager_with(store, SessionConfig::default());

        take_turn(&manager, "call-1", "What made you reach out?").await;
        manager.sweep_expired(Utc::now() + chrono::Duration::hours(2));
        assert_eq!(manager.active_calls(), 0);

        let handle = manager
            .get_or_create_engine("call-1", "user-1", scenario(), Vec::new())
            .unwrap();
        let engine = handle.lock().await;
        assert_eq!(engine.history().len(), 2);
        assert_eq!(engine.history()[0].content, "What made you reach out?");
    }

    #[tokio::test]
    async fn test_restored_call_still_checks_owner() {
        let (manager, _) = manager();
        take_turn(&manager, "call-1", "What made you reach out?").await;
        manager.sweep_expired(Utc::now() + chrono::Duration::hours(2));

        let err = manager
            .get_or_create_engine("call-1", "someone-else", scenario(), Vec::new())
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::CallOwnership { .. }));
        assert_eq!(manager.active_calls(), 0);
    }

    #[tokio::test]
    async fn test_sweep_purges_records_past_retention() {
        let (manager, store) = manager();
        take_turn(&manager, "call-1", "What made you reach out?").await;

        manager.sweep_expired(Utc::now() + chrono::Duration::days(8));
        assert!(store.load("call-1").unwrap().is_none());
    }

    /// Clock that follows tokio's (pausable) time.
    fn tokio_clock() -> Clock {
        let origin = tokio::time::Instant::now();
        let origin_utc = Utc::now();
        Arc::new(move || origin_utc + chrono::Duration::from_std(origin.elapsed()).unwrap())
    }

    async fn advance_secs(secs: u64) {
        tokio::time::advance(Duration::from_secs(secs)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_evicts_idle_call_on_next_tick() {
        let store = Arc::new(MemoryStateStore::new());
        let config = SessionConfig::default();
        let interval = config.cleanup_interval_secs;
        let idle = config.idle_timeout_secs;
        let manager = Arc::new(ConversationStateManager::with_clock(
            store.clone(),
            config,
            tokio_clock(),
        ));

        take_turn(&manager, "stale", "What made you reach out?").await;
        let cleanup = Arc::clone(&manager).spawn_cleanup();
        tokio::task::yield_now().await;

        // Every tick up to the idle timeout keeps the call.
        let mut elapsed = 0;
        while elapsed + interval <= idle {
            advance_secs(interval).await;
            elapsed += interval;
        }
        assert_eq!(manager.active_calls(), 1);

        take_turn(&manager, "fresh", "Who else is involved?").await;
        advance_secs(interval).await;

        let calls = manager.calls().unwrap();
        assert!(!calls.contains_key("stale"));
        assert!(calls.contains_key("fresh"));
        drop(calls);
        assert!(store.load("stale").unwrap().is_some());
        cleanup.abort();
    }

    #[tokio::test]
    async fn test_get_record_and_end_call() {
        let (manager, store) = manager();
        take_turn(&manager, "call-1", "What made you reach out?").await;

        let record = manager.get_record("call-1").await.unwrap().unwrap();
        assert_eq!(record.conversation_history.len(), 2);
        assert!(manager.get_record("missing").await.unwrap().is_none());

        assert!(manager.end_call("call-1").unwrap());
        assert_eq!(manager.active_calls(), 0);
        assert!(store.load("call-1").unwrap().is_none());
        assert!(!manager.end_call("call-1").unwrap());
    }

    #[tokio::test]
    async fn test_flush_all_writes_every_call() {
        let store = Arc::new(MemoryStateStore::new());
        let config = SessionConfig {
            persist_policy: PersistPolicy::EveryNTurns,
            flush_every_turns: 10,
            ..SessionConfig::default()
        };
        let manager = manager_with(store.clone(), config);
        take_turn(&manager, "call-1", "What made you reach out?").await;
        take_turn(&manager, "call-2", "Who else is involved?").await;

        assert_eq!(manager.flush_all().await, 2);
        assert_eq!(store.count().unwrap(), 2);
    }
}
