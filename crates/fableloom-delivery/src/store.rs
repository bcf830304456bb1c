//! Delivery store traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use fableloom_core::error::CoreError;

use crate::record::DeliveryRecord;

/// What the caller should do with the content after an acquire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireDecision {
    /// The caller holds the send: deliver, then report `mark_shown` or
    /// `mark_failed` with the returned record id.
    Show,
    /// Someone else delivered it, is delivering it, or a backoff window is
    /// still open. Do not send.
    Skip,
}

/// Outcome of one acquire attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireResult {
    pub decision: AcquireDecision,
    pub record_id: Uuid,
}

impl AcquireResult {
    #[must_use]
    pub fn should_show(&self) -> bool {
        self.decision == AcquireDecision::Show
    }
}

/// One open transaction over the delivery ledger.
///
/// [`crate::ledger::run_acquire`] drives the state machine through this
/// seam; implementations only move rows. `lock_record` must take a
/// row-level lock so concurrent acquires for the same unit serialize.
#[async_trait]
pub trait DeliveryTxn: Send {
    /// Locks and returns the row for (session, step, kind), if present.
    async fn lock_record(
        &mut self,
        session_id: Uuid,
        step: i32,
        kind: &str,
    ) -> Result<Option<DeliveryRecord>, CoreError>;

    /// Locks and returns a row by id, if present.
    async fn lock_record_by_id(
        &mut self,
        record_id: Uuid,
    ) -> Result<Option<DeliveryRecord>, CoreError>;

    /// Inserts a fresh PENDING row and returns its id.
    async fn insert_pending(
        &mut self,
        session_id: Uuid,
        step: i32,
        kind: &str,
        content_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Uuid, CoreError>;

    /// Moves a row to FAILED with the given count and retry horizon. A
    /// `content_hash` of `None` leaves the stored hash untouched.
    async fn store_failure(
        &mut self,
        record_id: Uuid,
        fail_count: i32,
        next_retry_at: DateTime<Utc>,
        content_hash: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError>;

    /// Moves a FAILED row back to PENDING for a fresh attempt, keeping its
    /// failure count.
    async fn restore_pending(
        &mut self,
        record_id: Uuid,
        content_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError>;

    /// Moves a row to the terminal SHOWN state.
    async fn store_shown(
        &mut self,
        record_id: Uuid,
        message_ref: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError>;
}

/// Transactional facade over the ledger.
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    /// Claims the right to deliver one content unit.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    async fn acquire(
        &self,
        session_id: Uuid,
        step: i32,
        kind: &str,
        content_hash: &str,
    ) -> Result<AcquireResult, CoreError>;

    /// Records a successful delivery.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    async fn mark_shown(&self, record_id: Uuid, message_ref: Option<i64>) -> Result<(), CoreError>;

    /// Records a failed delivery attempt, opening a backoff window.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    async fn mark_failed(&self, record_id: Uuid) -> Result<(), CoreError>;
}
