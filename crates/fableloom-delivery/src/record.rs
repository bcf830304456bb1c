//! Delivery ledger rows and retry timing.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fableloom_core::error::CoreError;

/// Ledger kind for the rendered step (or ending) content itself.
pub const KIND_STEP_CONTENT: &str = "step_content";

/// Ledger kind for the short "turn locked in" acknowledgement.
pub const KIND_STEP_LOCKED: &str = "step_locked";

/// Lifecycle of one delivery attempt series.
///
/// `Pending` means a worker holds the send right now; `Shown` is terminal;
/// `Failed` waits out a backoff window before the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryState {
    Pending,
    Shown,
    Failed,
}

impl DeliveryState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Shown => "SHOWN",
            Self::Failed => "FAILED",
        }
    }

    /// Parses the database representation.
    ///
    /// # Errors
    ///
    /// `CoreError::Validation` for unknown values.
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "PENDING" => Ok(Self::Pending),
            "SHOWN" => Ok(Self::Shown),
            "FAILED" => Ok(Self::Failed),
            other => Err(CoreError::Validation(format!(
                "unknown delivery state: {other}"
            ))),
        }
    }
}

/// One row of the delivery ledger, unique per (session, step, kind).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub step: i32,
    pub kind: String,
    pub state: DeliveryState,
    pub content_hash: String,
    pub fail_count: i32,
    pub pending_since: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub message_ref: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

/// How long a PENDING claim stays valid before another worker may treat the
/// attempt as crashed and take over.
#[must_use]
pub fn pending_timeout() -> TimeDelta {
    TimeDelta::seconds(30)
}

/// Retry delay after the given cumulative failure count: 10s, then 30s,
/// then 120s for every further failure.
#[must_use]
pub fn backoff_delay(fail_count: i32) -> TimeDelta {
    match fail_count {
        i32::MIN..=1 => TimeDelta::seconds(10),
        2 => TimeDelta::seconds(30),
        _ => TimeDelta::seconds(120),
    }
}
