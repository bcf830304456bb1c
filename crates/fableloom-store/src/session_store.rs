//! `PostgreSQL` implementation of the session store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use fableloom_core::clock::{Clock, SystemClock};
use fableloom_core::error::CoreError;
use fableloom_engine::{EngineState, FinalId};
use fableloom_session::domain::event::TurnEvent;
use fableloom_session::domain::outcome::TurnOutcome;
use fableloom_session::domain::session::{SessionKey, SessionRecord, SessionStatus, new_public_id};
use fableloom_session::protocol::run_commit;
use fableloom_session::store::{CommitRequest, NewSession, SessionTxn, TurnStore};

use crate::row::{event_from_row, session_from_row};
use crate::store_err;

/// Attempts at generating a non-colliding public id before giving up.
const PUBLIC_ID_ATTEMPTS: usize = 8;

const SELECT_SESSION: &str = "
SELECT id, participant_id, public_id, status, theme_id, step, max_steps,
       engine_state, facts, ending_id, ending_meta,
       last_delivered_message_ref, last_delivered_at, created_at, updated_at
FROM sessions
";

/// `PostgreSQL`-backed session store. One transaction per commit; the
/// session row lock serializes concurrent commits for the same session.
#[derive(Clone)]
pub struct PgTurnStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgTurnStore {
    /// Creates a store over the given pool with the system clock.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    /// Creates a store with an injected clock.
    #[must_use]
    pub fn with_clock(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

struct PgSessionTxn {
    txn: Transaction<'static, Postgres>,
    now: DateTime<Utc>,
}

#[async_trait]
impl SessionTxn for PgSessionTxn {
    async fn lock_session(&mut self, key: &SessionKey) -> Result<Option<SessionRecord>, CoreError> {
        let sql = format!("{SELECT_SESSION} WHERE participant_id = $1 AND public_id = $2 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(key.participant_id)
            .bind(&key.public_id)
            .fetch_optional(&mut *self.txn)
            .await
            .map_err(store_err)?;
        row.as_ref().map(session_from_row).transpose()
    }

    async fn insert_event_if_absent(
        &mut self,
        session_id: Uuid,
        step: i32,
        turn: &serde_json::Value,
    ) -> Result<Option<Uuid>, CoreError> {
        let row = sqlx::query(
            "INSERT INTO session_events (id, session_id, step, turn, occurred_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (session_id, step) DO NOTHING
             RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(session_id)
        .bind(step)
        .bind(turn)
        .bind(self.now)
        .fetch_optional(&mut *self.txn)
        .await
        .map_err(store_err)?;
        row.map(|r| sqlx::Row::try_get(&r, "id").map_err(store_err))
            .transpose()
    }

    async fn event_by_step(
        &mut self,
        session_id: Uuid,
        step: i32,
    ) -> Result<Option<TurnEvent>, CoreError> {
        let row = sqlx::query(
            "SELECT id, session_id, step, turn, step_log, outcome, payload, occurred_at
             FROM session_events
             WHERE session_id = $1 AND step = $2",
        )
        .bind(session_id)
        .bind(step)
        .fetch_optional(&mut *self.txn)
        .await
        .map_err(store_err)?;
        row.as_ref().map(event_from_row).transpose()
    }

    async fn update_event(
        &mut self,
        event_id: Uuid,
        step_log: &serde_json::Value,
        payload: &serde_json::Value,
        outcome: &str,
    ) -> Result<(), CoreError> {
        sqlx::query("UPDATE session_events SET step_log = $2, payload = $3, outcome = $4 WHERE id = $1")
            .bind(event_id)
            .bind(step_log)
            .bind(payload)
            .bind(outcome)
            .execute(&mut *self.txn)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn update_engine_state_and_step(
        &mut self,
        session_id: Uuid,
        engine_state: &serde_json::Value,
        step: i32,
    ) -> Result<(), CoreError> {
        sqlx::query("UPDATE sessions SET engine_state = $2, step = $3, updated_at = $4 WHERE id = $1")
            .bind(session_id)
            .bind(engine_state)
            .bind(step)
            .bind(self.now)
            .execute(&mut *self.txn)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn finalize_session(
        &mut self,
        session_id: Uuid,
        ending_id: FinalId,
        ending_meta: &serde_json::Value,
    ) -> Result<(), CoreError> {
        sqlx::query(
            "UPDATE sessions
             SET status = 'FINISHED', ending_id = $2, ending_meta = $3, updated_at = $4
             WHERE id = $1",
        )
        .bind(session_id)
        .bind(ending_id.as_str())
        .bind(ending_meta)
        .bind(self.now)
        .execute(&mut *self.txn)
        .await
        .map_err(store_err)?;
        Ok(())
    }
}

#[async_trait]
impl TurnStore for PgTurnStore {
    async fn commit_turn(&self, request: CommitRequest<'_>) -> Result<TurnOutcome, CoreError> {
        let txn = self.pool.begin().await.map_err(store_err)?;
        let mut pg = PgSessionTxn {
            txn,
            now: self.clock.now(),
        };
        match run_commit(&mut pg, request).await {
            Ok(outcome) => {
                pg.txn.commit().await.map_err(store_err)?;
                Ok(outcome)
            }
            Err(err) => {
                if let Err(rollback_err) = pg.txn.rollback().await {
                    tracing::warn!(error = %rollback_err, "turn commit rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionRecord, CoreError> {
        let now = self.clock.now();
        let state = EngineState::initial(new_session.max_steps);
        let state_json =
            serde_json::to_value(&state).map_err(|e| CoreError::Serialization(e.to_string()))?;

        let mut txn = self.pool.begin().await.map_err(store_err)?;
        sqlx::query(
            "UPDATE sessions SET status = 'ABORTED', updated_at = $2
             WHERE participant_id = $1 AND status = 'ACTIVE'",
        )
        .bind(new_session.participant_id)
        .bind(now)
        .execute(&mut *txn)
        .await
        .map_err(store_err)?;

        // (participant, public_id) is unique; regenerate on the rare collision.
        for _ in 0..PUBLIC_ID_ATTEMPTS {
            let public_id = new_public_id();
            let row = sqlx::query(
                "INSERT INTO sessions
                     (id, participant_id, public_id, status, theme_id, step, max_steps,
                      engine_state, facts, created_at, updated_at)
                 VALUES ($1, $2, $3, 'ACTIVE', $4, 0, $5, $6, '{}'::jsonb, $7, $7)
                 ON CONFLICT (participant_id, public_id) DO NOTHING
                 RETURNING id",
            )
            .bind(Uuid::new_v4())
            .bind(new_session.participant_id)
            .bind(&public_id)
            .bind(&new_session.theme_id)
            .bind(new_session.max_steps)
            .bind(&state_json)
            .bind(now)
            .fetch_optional(&mut *txn)
            .await
            .map_err(store_err)?;
            if let Some(row) = row {
                let id: Uuid = sqlx::Row::try_get(&row, "id").map_err(store_err)?;
                txn.commit().await.map_err(store_err)?;
                tracing::info!(
                    participant_id = new_session.participant_id,
                    session_id = %id,
                    "session created"
                );
                return Ok(SessionRecord {
                    id,
                    participant_id: new_session.participant_id,
                    public_id,
                    status: SessionStatus::Active,
                    theme_id: new_session.theme_id,
                    step: 0,
                    max_steps: new_session.max_steps,
                    engine_state: state_json,
                    facts: serde_json::Value::Object(serde_json::Map::new()),
                    ending_id: None,
                    ending_meta: None,
                    last_delivered_message_ref: None,
                    last_delivered_at: None,
                    created_at: now,
                    updated_at: now,
                });
            }
        }
        Err(CoreError::StoreUnavailable(
            "could not allocate a unique public session id".to_owned(),
        ))
    }

    async fn active_session(
        &self,
        participant_id: i64,
    ) -> Result<Option<SessionRecord>, CoreError> {
        let sql = format!(
            "{SELECT_SESSION} WHERE participant_id = $1 AND status = 'ACTIVE'
             ORDER BY created_at DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(participant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        row.as_ref().map(session_from_row).transpose()
    }

    async fn session_by_key(&self, key: &SessionKey) -> Result<Option<SessionRecord>, CoreError> {
        let sql = format!("{SELECT_SESSION} WHERE participant_id = $1 AND public_id = $2");
        let row = sqlx::query(&sql)
            .bind(key.participant_id)
            .bind(&key.public_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        row.as_ref().map(session_from_row).transpose()
    }

    async fn update_last_delivered(
        &self,
        session_id: Uuid,
        message_ref: i64,
        delivered_at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        sqlx::query(
            "UPDATE sessions
             SET last_delivered_message_ref = $2, last_delivered_at = $3, updated_at = $4
             WHERE id = $1",
        )
        .bind(session_id)
        .bind(message_ref)
        .bind(delivered_at)
        .bind(self.clock.now())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }
}
