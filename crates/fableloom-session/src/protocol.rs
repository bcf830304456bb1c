//! The atomic turn-commit protocol.
//!
//! [`run_commit`] is the single source of the protocol logic; every store
//! implementation wraps it in its own transaction. The session row lock is
//! the sole serialization point: two concurrent commits for the same
//! session cannot both apply, because the second blocks on the lock until
//! the first commits and then finds the step already recorded, backed by
//! the uniqueness constraint on (session, step).

use fableloom_core::error::CoreError;

use crate::domain::event::EVENT_OUTCOME_ACCEPTED;
use crate::domain::outcome::TurnOutcome;
use crate::domain::session::SessionStatus;
use crate::store::{CommitRequest, SessionTxn};

fn encode<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, CoreError> {
    serde_json::to_value(value).map_err(|e| CoreError::Serialization(e.to_string()))
}

/// Drives one commit attempt over an open transaction.
///
/// The caller owns the transaction: commit on `Ok`, roll back on `Err`.
/// All four outcome variants are `Ok`; only missing sessions and
/// infrastructure failures are errors.
///
/// # Errors
///
/// `CoreError::SessionNotFound` when the key matches no session;
/// `CoreError::Serialization` when a JSON column cannot be encoded;
/// any error the transaction surfaces.
pub async fn run_commit<T: SessionTxn + ?Sized>(
    txn: &mut T,
    request: CommitRequest<'_>,
) -> Result<TurnOutcome, CoreError> {
    let CommitRequest {
        key,
        expected_step,
        turn,
        validate,
        apply,
    } = request;

    let Some(session) = txn.lock_session(&key).await? else {
        return Err(CoreError::SessionNotFound {
            participant_id: key.participant_id,
            public_id: key.public_id,
        });
    };

    if session.step != expected_step {
        // A commit for a step that is already durably recorded is a retry,
        // even when the session has moved on; replay it instead of forcing
        // a resync.
        if let Some(event) = txn.event_by_step(session.id, expected_step).await? {
            tracing::debug!(
                session_id = %session.id,
                step = expected_step,
                "turn commit resolved as duplicate; replaying stored payload"
            );
            return Ok(TurnOutcome::Duplicate { session, event });
        }
        tracing::debug!(
            session_id = %session.id,
            expected_step,
            actual_step = session.step,
            "turn commit resolved as stale"
        );
        return Ok(TurnOutcome::Stale { session });
    }

    let shape_ok = turn.has_input();
    let caller_ok = match validate {
        Some(validate) => validate(&session),
        None => true,
    };
    if !shape_ok || !caller_ok {
        tracing::debug!(session_id = %session.id, expected_step, "turn commit rejected as invalid");
        return Ok(TurnOutcome::Invalid { session });
    }

    let turn_json = encode(&turn)?;
    let Some(event_id) = txn
        .insert_event_if_absent(session.id, expected_step, &turn_json)
        .await?
    else {
        let event = txn
            .event_by_step(session.id, expected_step)
            .await?
            .ok_or_else(|| {
                CoreError::StoreUnavailable("event row vanished after conflict".to_owned())
            })?;
        tracing::debug!(
            session_id = %session.id,
            step = expected_step,
            "turn commit resolved as duplicate; replaying stored payload"
        );
        return Ok(TurnOutcome::Duplicate { session, event });
    };

    let output = apply(&session)?;
    let step_log_json = encode(&output.step_log)?;
    let payload_json = encode(&output.payload)?;
    let state_json = encode(&output.new_state)?;

    txn.update_event(event_id, &step_log_json, &payload_json, EVENT_OUTCOME_ACCEPTED)
        .await?;
    txn.update_engine_state_and_step(session.id, &state_json, output.new_state.step0)
        .await?;

    let mut updated = session;
    updated.engine_state = state_json;
    updated.step = output.new_state.step0;

    if let Some(final_id) = output.step_log.final_id {
        let meta_json = encode(&output.step_log.final_meta)?;
        txn.finalize_session(updated.id, final_id, &meta_json).await?;
        updated.status = SessionStatus::Finished;
        updated.ending_id = Some(final_id);
        updated.ending_meta = Some(meta_json);
    }

    let event = txn
        .event_by_step(updated.id, expected_step)
        .await?
        .ok_or_else(|| {
            CoreError::StoreUnavailable("inserted event row missing on read-back".to_owned())
        })?;

    tracing::info!(
        session_id = %updated.id,
        step = expected_step,
        finished = updated.status == SessionStatus::Finished,
        "turn committed"
    );
    Ok(TurnOutcome::Accepted {
        session: updated,
        event,
    })
}
