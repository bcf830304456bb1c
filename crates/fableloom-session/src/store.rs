//! Store seams for the Session & Turn Commit context.
//!
//! The protocol in [`crate::protocol`] drives these traits; implementations
//! (PostgreSQL, in-memory) decide how a transaction and its row locks are
//! realized. No other code path may write session or event rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use fableloom_core::error::CoreError;
use fableloom_engine::{EngineState, FinalId, StepLog, Turn};

use crate::domain::event::TurnEvent;
use crate::domain::outcome::TurnOutcome;
use crate::domain::payload::StepPayload;
use crate::domain::session::{SessionKey, SessionRecord};

/// Result of the caller's apply function: everything the protocol persists
/// for an accepted turn.
#[derive(Debug, Clone)]
pub struct ApplyOutput {
    /// Replacement engine state.
    pub new_state: EngineState,
    /// Full audit log of the applied turn.
    pub step_log: StepLog,
    /// Rendered step payload to store and deliver.
    pub payload: StepPayload,
}

/// Caller-supplied validity predicate over the locked session row.
pub type ValidateFn<'a> = Box<dyn FnOnce(&SessionRecord) -> bool + Send + 'a>;

/// Caller-supplied apply function; invoked at most once, inside the
/// transaction, only after the idempotent insert succeeded.
pub type ApplyFn<'a> = Box<dyn FnOnce(&SessionRecord) -> Result<ApplyOutput, CoreError> + Send + 'a>;

/// One turn-commit request.
pub struct CommitRequest<'a> {
    /// Session to commit against.
    pub key: SessionKey,
    /// The step the caller believes is current.
    pub expected_step: i32,
    /// The raw turn, stored verbatim in the event row.
    pub turn: Turn,
    /// Optional extra validity check beyond the turn-shape check.
    pub validate: Option<ValidateFn<'a>>,
    /// Produces the new state and rendered payload for an accepted turn.
    pub apply: ApplyFn<'a>,
}

impl std::fmt::Debug for CommitRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitRequest")
            .field("key", &self.key)
            .field("expected_step", &self.expected_step)
            .field("turn", &self.turn)
            .finish_non_exhaustive()
    }
}

/// Parameters for creating a session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub participant_id: i64,
    pub theme_id: Option<String>,
    pub max_steps: i32,
}

/// Operations available inside one store transaction. The lock taken by
/// `lock_session` must be held until the transaction commits; it is the
/// protocol's sole serialization point.
#[async_trait]
pub trait SessionTxn: Send {
    /// Locks and returns the session row for the key, if it exists.
    async fn lock_session(&mut self, key: &SessionKey) -> Result<Option<SessionRecord>, CoreError>;

    /// Inserts a claim row for (session, step). Returns the new event id,
    /// or `None` when a row for that step already exists.
    async fn insert_event_if_absent(
        &mut self,
        session_id: Uuid,
        step: i32,
        turn: &serde_json::Value,
    ) -> Result<Option<Uuid>, CoreError>;

    /// Fetches the event recorded for (session, step).
    async fn event_by_step(
        &mut self,
        session_id: Uuid,
        step: i32,
    ) -> Result<Option<TurnEvent>, CoreError>;

    /// Finalizes a just-inserted event with its audit log and payload.
    async fn update_event(
        &mut self,
        event_id: Uuid,
        step_log: &serde_json::Value,
        payload: &serde_json::Value,
        outcome: &str,
    ) -> Result<(), CoreError>;

    /// Replaces the session's engine state and advances its step counter.
    async fn update_engine_state_and_step(
        &mut self,
        session_id: Uuid,
        engine_state: &serde_json::Value,
        step: i32,
    ) -> Result<(), CoreError>;

    /// Marks the session finished with its ending.
    async fn finalize_session(
        &mut self,
        session_id: Uuid,
        ending_id: FinalId,
        ending_meta: &serde_json::Value,
    ) -> Result<(), CoreError>;
}

/// The transactional session store.
#[async_trait]
pub trait TurnStore: Send + Sync {
    /// Runs the atomic turn-commit protocol in one transaction.
    ///
    /// # Errors
    ///
    /// `CoreError::SessionNotFound` when no session exists for the key;
    /// `CoreError::StoreUnavailable` on infrastructure failure (the
    /// transaction is rolled back and the attempt is safe to retry).
    async fn commit_turn(&self, request: CommitRequest<'_>) -> Result<TurnOutcome, CoreError>;

    /// Creates a new ACTIVE session, aborting any prior ACTIVE session of
    /// the same participant.
    async fn create_session(&self, new_session: NewSession) -> Result<SessionRecord, CoreError>;

    /// The participant's current ACTIVE session, if any.
    async fn active_session(&self, participant_id: i64)
    -> Result<Option<SessionRecord>, CoreError>;

    /// Looks up a session by key without locking it.
    async fn session_by_key(&self, key: &SessionKey) -> Result<Option<SessionRecord>, CoreError>;

    /// Records the transport reference of the last delivered step message.
    async fn update_last_delivered(
        &self,
        session_id: Uuid,
        message_ref: i64,
        delivered_at: DateTime<Utc>,
    ) -> Result<(), CoreError>;
}
