//! In-memory `TurnStore` that drives the real commit protocol.
//!
//! One async mutex stands in for the session row lock, and each commit runs
//! against a scratch copy of the tables that is only written back on
//! success, so rollback-on-error behaves like the real transaction.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use fableloom_core::clock::Clock;
use fableloom_core::error::CoreError;
use fableloom_engine::{EngineState, FinalId};
use fableloom_session::domain::event::TurnEvent;
use fableloom_session::domain::outcome::TurnOutcome;
use fableloom_session::domain::session::{
    SessionKey, SessionRecord, SessionStatus, new_public_id,
};
use fableloom_session::protocol::run_commit;
use fableloom_session::store::{CommitRequest, NewSession, SessionTxn, TurnStore};

#[derive(Debug, Clone, Default)]
struct MemDb {
    sessions: HashMap<Uuid, SessionRecord>,
    events: HashMap<(Uuid, i32), TurnEvent>,
}

impl MemDb {
    fn session_by_key(&self, key: &SessionKey) -> Option<&SessionRecord> {
        self.sessions
            .values()
            .find(|s| s.participant_id == key.participant_id && s.public_id == key.public_id)
    }
}

struct MemSessionTxn<'a> {
    db: &'a mut MemDb,
    now: DateTime<Utc>,
}

#[async_trait]
impl SessionTxn for MemSessionTxn<'_> {
    async fn lock_session(&mut self, key: &SessionKey) -> Result<Option<SessionRecord>, CoreError> {
        Ok(self.db.session_by_key(key).cloned())
    }

    async fn insert_event_if_absent(
        &mut self,
        session_id: Uuid,
        step: i32,
        turn: &serde_json::Value,
    ) -> Result<Option<Uuid>, CoreError> {
        if self.db.events.contains_key(&(session_id, step)) {
            return Ok(None);
        }
        let event = TurnEvent {
            id: Uuid::new_v4(),
            session_id,
            step,
            turn: turn.clone(),
            step_log: None,
            outcome: None,
            payload: None,
            occurred_at: self.now,
        };
        let id = event.id;
        self.db.events.insert((session_id, step), event);
        Ok(Some(id))
    }

    async fn event_by_step(
        &mut self,
        session_id: Uuid,
        step: i32,
    ) -> Result<Option<TurnEvent>, CoreError> {
        Ok(self.db.events.get(&(session_id, step)).cloned())
    }

    async fn update_event(
        &mut self,
        event_id: Uuid,
        step_log: &serde_json::Value,
        payload: &serde_json::Value,
        outcome: &str,
    ) -> Result<(), CoreError> {
        let event = self
            .db
            .events
            .values_mut()
            .find(|e| e.id == event_id)
            .ok_or_else(|| CoreError::StoreUnavailable("no such event".to_owned()))?;
        event.step_log = Some(step_log.clone());
        event.payload = Some(payload.clone());
        event.outcome = Some(outcome.to_owned());
        Ok(())
    }

    async fn update_engine_state_and_step(
        &mut self,
        session_id: Uuid,
        engine_state: &serde_json::Value,
        step: i32,
    ) -> Result<(), CoreError> {
        let session = self
            .db
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| CoreError::StoreUnavailable("no such session".to_owned()))?;
        session.engine_state = engine_state.clone();
        session.step = step;
        session.updated_at = self.now;
        Ok(())
    }

    async fn finalize_session(
        &mut self,
        session_id: Uuid,
        ending_id: FinalId,
        ending_meta: &serde_json::Value,
    ) -> Result<(), CoreError> {
        let session = self
            .db
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| CoreError::StoreUnavailable("no such session".to_owned()))?;
        session.status = SessionStatus::Finished;
        session.ending_id = Some(ending_id);
        session.ending_meta = Some(ending_meta.clone());
        session.updated_at = self.now;
        Ok(())
    }
}

/// In-memory session store for protocol and runtime tests.
#[derive(Clone)]
pub struct InMemoryTurnStore {
    clock: Arc<dyn Clock>,
    inner: Arc<Mutex<MemDb>>,
}

impl InMemoryTurnStore {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Arc::new(Mutex::new(MemDb::default())),
        }
    }

    /// All events recorded for a session, ordered by step.
    pub async fn events_for(&self, session_id: Uuid) -> Vec<TurnEvent> {
        let db = self.inner.lock().await;
        let mut events: Vec<TurnEvent> = db
            .events
            .values()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.step);
        events
    }
}

#[async_trait]
impl TurnStore for InMemoryTurnStore {
    async fn commit_turn(&self, request: CommitRequest<'_>) -> Result<TurnOutcome, CoreError> {
        let mut db = self.inner.lock().await;
        let mut scratch = db.clone();
        let mut txn = MemSessionTxn {
            db: &mut scratch,
            now: self.clock.now(),
        };
        let outcome = run_commit(&mut txn, request).await?;
        *db = scratch;
        Ok(outcome)
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionRecord, CoreError> {
        let mut db = self.inner.lock().await;
        let now = self.clock.now();
        for session in db.sessions.values_mut() {
            if session.participant_id == new_session.participant_id
                && session.status == SessionStatus::Active
            {
                session.status = SessionStatus::Aborted;
                session.updated_at = now;
            }
        }
        let state = EngineState::initial(new_session.max_steps);
        let session = SessionRecord {
            id: Uuid::new_v4(),
            participant_id: new_session.participant_id,
            public_id: new_public_id(),
            status: SessionStatus::Active,
            theme_id: new_session.theme_id,
            step: 0,
            max_steps: new_session.max_steps,
            engine_state: serde_json::to_value(&state)
                .map_err(|e| CoreError::Serialization(e.to_string()))?,
            facts: serde_json::Value::Object(serde_json::Map::new()),
            ending_id: None,
            ending_meta: None,
            last_delivered_message_ref: None,
            last_delivered_at: None,
            created_at: now,
            updated_at: now,
        };
        db.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn active_session(
        &self,
        participant_id: i64,
    ) -> Result<Option<SessionRecord>, CoreError> {
        let db = self.inner.lock().await;
        Ok(db
            .sessions
            .values()
            .find(|s| s.participant_id == participant_id && s.status == SessionStatus::Active)
            .cloned())
    }

    async fn session_by_key(&self, key: &SessionKey) -> Result<Option<SessionRecord>, CoreError> {
        let db = self.inner.lock().await;
        Ok(db.session_by_key(key).cloned())
    }

    async fn update_last_delivered(
        &self,
        session_id: Uuid,
        message_ref: i64,
        delivered_at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let mut db = self.inner.lock().await;
        let session = db
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| CoreError::StoreUnavailable("no such session".to_owned()))?;
        session.last_delivered_message_ref = Some(message_ref);
        session.last_delivered_at = Some(delivered_at);
        session.updated_at = self.clock.now();
        Ok(())
    }
}
