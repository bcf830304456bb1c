//! The delivery state machine.
//!
//! [`run_acquire`] is the single source of the ledger logic; every store
//! implementation wraps it in its own transaction. The row lock taken by
//! `lock_record` serializes concurrent acquires for one content unit, so
//! at most one caller per unit ever gets `Show` at a time.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use fableloom_core::error::CoreError;

use crate::record::{DeliveryState, backoff_delay, pending_timeout};
use crate::store::{AcquireDecision, AcquireResult, DeliveryTxn};

/// Drives one acquire attempt over an open transaction.
///
/// The caller owns the transaction: commit on `Ok`, roll back on `Err`.
/// Both decisions are `Ok`; only infrastructure failures are errors.
///
/// # Errors
///
/// Any error the transaction surfaces.
pub async fn run_acquire<T: DeliveryTxn + ?Sized>(
    txn: &mut T,
    now: DateTime<Utc>,
    session_id: Uuid,
    step: i32,
    kind: &str,
    content_hash: &str,
) -> Result<AcquireResult, CoreError> {
    let Some(record) = txn.lock_record(session_id, step, kind).await? else {
        let record_id = txn
            .insert_pending(session_id, step, kind, content_hash, now)
            .await?;
        tracing::debug!(%session_id, step, kind, "delivery claimed; first attempt");
        return Ok(AcquireResult {
            decision: AcquireDecision::Show,
            record_id,
        });
    };

    match record.state {
        DeliveryState::Shown => {
            tracing::debug!(%session_id, step, kind, "delivery already shown; skipping");
            Ok(AcquireResult {
                decision: AcquireDecision::Skip,
                record_id: record.id,
            })
        }
        DeliveryState::Pending => {
            // A missing pending_since counts as expired: the claim cannot
            // be proven fresh, so the attempt is treated as crashed.
            let fresh = record
                .pending_since
                .is_some_and(|since| now - since < pending_timeout());
            if fresh {
                tracing::debug!(%session_id, step, kind, "delivery in flight elsewhere; skipping");
                return Ok(AcquireResult {
                    decision: AcquireDecision::Skip,
                    record_id: record.id,
                });
            }
            let fail_count = record.fail_count + 1;
            let next_retry_at = now + backoff_delay(fail_count);
            txn.store_failure(record.id, fail_count, next_retry_at, Some(content_hash), now)
                .await?;
            tracing::debug!(
                %session_id,
                step,
                kind,
                fail_count,
                "stale pending claim expired; backing off"
            );
            Ok(AcquireResult {
                decision: AcquireDecision::Skip,
                record_id: record.id,
            })
        }
        DeliveryState::Failed => {
            if record.next_retry_at.is_some_and(|at| at > now) {
                tracing::debug!(%session_id, step, kind, "delivery backoff window open; skipping");
                return Ok(AcquireResult {
                    decision: AcquireDecision::Skip,
                    record_id: record.id,
                });
            }
            txn.restore_pending(record.id, content_hash, now).await?;
            tracing::debug!(
                %session_id,
                step,
                kind,
                fail_count = record.fail_count,
                "delivery claimed; retrying after backoff"
            );
            Ok(AcquireResult {
                decision: AcquireDecision::Show,
                record_id: record.id,
            })
        }
    }
}

/// Records a successful delivery.
///
/// # Errors
///
/// Any error the transaction surfaces.
pub async fn run_mark_shown<T: DeliveryTxn + ?Sized>(
    txn: &mut T,
    now: DateTime<Utc>,
    record_id: Uuid,
    message_ref: Option<i64>,
) -> Result<(), CoreError> {
    txn.store_shown(record_id, message_ref, now).await?;
    tracing::debug!(%record_id, ?message_ref, "delivery marked shown");
    Ok(())
}

/// Records a failed attempt, bumping the failure count and opening the
/// next backoff window. A missing row is treated as already cleaned up.
///
/// # Errors
///
/// Any error the transaction surfaces.
pub async fn run_mark_failed<T: DeliveryTxn + ?Sized>(
    txn: &mut T,
    now: DateTime<Utc>,
    record_id: Uuid,
) -> Result<(), CoreError> {
    let Some(record) = txn.lock_record_by_id(record_id).await? else {
        tracing::warn!(%record_id, "mark_failed for unknown delivery record");
        return Ok(());
    };
    let fail_count = record.fail_count + 1;
    let next_retry_at = now + backoff_delay(fail_count);
    txn.store_failure(record_id, fail_count, next_retry_at, None, now)
        .await?;
    tracing::debug!(%record_id, fail_count, "delivery marked failed");
    Ok(())
}
