//! Row decoding for session, event, and delivery tables.

use sqlx::Row;
use sqlx::postgres::PgRow;

use fableloom_core::error::CoreError;
use fableloom_delivery::record::{DeliveryRecord, DeliveryState};
use fableloom_engine::FinalId;
use fableloom_session::domain::event::TurnEvent;
use fableloom_session::domain::session::{SessionRecord, SessionStatus};

use crate::store_err;

/// Decodes one `sessions` row.
///
/// # Errors
///
/// `CoreError::Validation` when a status or ending column holds an unknown
/// value; `CoreError::StoreUnavailable` on column type mismatches.
pub fn session_from_row(row: &PgRow) -> Result<SessionRecord, CoreError> {
    let status: String = row.try_get("status").map_err(store_err)?;
    let status = SessionStatus::parse(&status)
        .ok_or_else(|| CoreError::Validation(format!("unknown session status: {status}")))?;
    let ending_id: Option<String> = row.try_get("ending_id").map_err(store_err)?;
    let ending_id = match ending_id {
        Some(value) => Some(
            FinalId::parse(&value)
                .ok_or_else(|| CoreError::Validation(format!("unknown ending id: {value}")))?,
        ),
        None => None,
    };
    Ok(SessionRecord {
        id: row.try_get("id").map_err(store_err)?,
        participant_id: row.try_get("participant_id").map_err(store_err)?,
        public_id: row.try_get("public_id").map_err(store_err)?,
        status,
        theme_id: row.try_get("theme_id").map_err(store_err)?,
        step: row.try_get("step").map_err(store_err)?,
        max_steps: row.try_get("max_steps").map_err(store_err)?,
        engine_state: row.try_get("engine_state").map_err(store_err)?,
        facts: row.try_get("facts").map_err(store_err)?,
        ending_id,
        ending_meta: row.try_get("ending_meta").map_err(store_err)?,
        last_delivered_message_ref: row
            .try_get("last_delivered_message_ref")
            .map_err(store_err)?,
        last_delivered_at: row.try_get("last_delivered_at").map_err(store_err)?,
        created_at: row.try_get("created_at").map_err(store_err)?,
        updated_at: row.try_get("updated_at").map_err(store_err)?,
    })
}

/// Decodes one `session_events` row.
///
/// # Errors
///
/// `CoreError::StoreUnavailable` on column type mismatches.
pub fn event_from_row(row: &PgRow) -> Result<TurnEvent, CoreError> {
    Ok(TurnEvent {
        id: row.try_get("id").map_err(store_err)?,
        session_id: row.try_get("session_id").map_err(store_err)?,
        step: row.try_get("step").map_err(store_err)?,
        turn: row.try_get("turn").map_err(store_err)?,
        step_log: row.try_get("step_log").map_err(store_err)?,
        outcome: row.try_get("outcome").map_err(store_err)?,
        payload: row.try_get("payload").map_err(store_err)?,
        occurred_at: row.try_get("occurred_at").map_err(store_err)?,
    })
}

/// Decodes one `delivery_events` row.
///
/// # Errors
///
/// `CoreError::Validation` when the state column holds an unknown value;
/// `CoreError::StoreUnavailable` on column type mismatches.
pub fn delivery_from_row(row: &PgRow) -> Result<DeliveryRecord, CoreError> {
    let state: String = row.try_get("state").map_err(store_err)?;
    Ok(DeliveryRecord {
        id: row.try_get("id").map_err(store_err)?,
        session_id: row.try_get("session_id").map_err(store_err)?,
        step: row.try_get("step").map_err(store_err)?,
        kind: row.try_get("kind").map_err(store_err)?,
        state: DeliveryState::parse(&state)?,
        content_hash: row.try_get("content_hash").map_err(store_err)?,
        fail_count: row.try_get("fail_count").map_err(store_err)?,
        pending_since: row.try_get("pending_since").map_err(store_err)?,
        next_retry_at: row.try_get("next_retry_at").map_err(store_err)?,
        message_ref: row.try_get("message_ref").map_err(store_err)?,
        updated_at: row.try_get("updated_at").map_err(store_err)?,
    })
}
