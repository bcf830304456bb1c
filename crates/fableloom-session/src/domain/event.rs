//! Turn events — one immutable row per (session, step).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome tag written into finalized event rows.
pub const EVENT_OUTCOME_ACCEPTED: &str = "accepted";

/// One committed turn. The row is inserted as a claim on (session, step)
/// and finalized with the audit log and rendered payload in the same
/// transaction; after that it never changes, so duplicate deliveries can
/// replay `payload` byte-identically without recomputation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnEvent {
    pub id: Uuid,
    pub session_id: Uuid,
    /// The step this event is the unique record of.
    pub step: i32,
    /// The raw turn as submitted.
    pub turn: serde_json::Value,
    /// The engine's audit log for the applied turn.
    pub step_log: Option<serde_json::Value>,
    /// Commit outcome tag.
    pub outcome: Option<String>,
    /// The fully rendered step payload that was (or will be) shown.
    pub payload: Option<serde_json::Value>,
    pub occurred_at: DateTime<Utc>,
}
