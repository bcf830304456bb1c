//! Integration tests for the delivery ledger state machine, driven through
//! the in-memory store with a manually advanced clock.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use uuid::Uuid;

use fableloom_core::clock::Clock;
use fableloom_delivery::record::{DeliveryState, KIND_STEP_CONTENT, KIND_STEP_LOCKED};
use fableloom_delivery::store::{AcquireDecision, DeliveryStore};
use fableloom_test_support::{InMemoryDeliveryStore, ManualClock};

const HASH: &str = "0c6f1a9d";

fn store_with_clock() -> (InMemoryDeliveryStore, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    (InMemoryDeliveryStore::new(clock.clone()), clock)
}

#[tokio::test]
async fn test_first_acquire_claims_the_send() {
    let (store, _) = store_with_clock();
    let session_id = Uuid::new_v4();

    let result = store
        .acquire(session_id, 0, KIND_STEP_CONTENT, HASH)
        .await
        .unwrap();

    assert_eq!(result.decision, AcquireDecision::Show);
    let record = store.record(session_id, 0, KIND_STEP_CONTENT).await.unwrap();
    assert_eq!(record.state, DeliveryState::Pending);
    assert_eq!(record.fail_count, 0);
}

#[tokio::test]
async fn test_fresh_pending_claim_blocks_other_workers() {
    let (store, clock) = store_with_clock();
    let session_id = Uuid::new_v4();

    store
        .acquire(session_id, 0, KIND_STEP_CONTENT, HASH)
        .await
        .unwrap();
    clock.advance(TimeDelta::seconds(29));
    let result = store
        .acquire(session_id, 0, KIND_STEP_CONTENT, HASH)
        .await
        .unwrap();

    assert_eq!(result.decision, AcquireDecision::Skip);
}

#[tokio::test]
async fn test_shown_is_terminal() {
    let (store, _) = store_with_clock();
    let session_id = Uuid::new_v4();

    let result = store
        .acquire(session_id, 0, KIND_STEP_CONTENT, HASH)
        .await
        .unwrap();
    store.mark_shown(result.record_id, Some(42)).await.unwrap();
    let replay = store
        .acquire(session_id, 0, KIND_STEP_CONTENT, HASH)
        .await
        .unwrap();

    assert_eq!(replay.decision, AcquireDecision::Skip);
    let record = store.record(session_id, 0, KIND_STEP_CONTENT).await.unwrap();
    assert_eq!(record.state, DeliveryState::Shown);
    assert_eq!(record.message_ref, Some(42));
}

#[tokio::test]
async fn test_expired_pending_claim_fails_over_to_backoff() {
    let (store, clock) = store_with_clock();
    let session_id = Uuid::new_v4();

    store
        .acquire(session_id, 0, KIND_STEP_CONTENT, HASH)
        .await
        .unwrap();
    // The holder crashed: no mark_shown ever arrives.
    clock.advance(TimeDelta::seconds(31));
    let takeover = store
        .acquire(session_id, 0, KIND_STEP_CONTENT, HASH)
        .await
        .unwrap();

    // The takeover itself only opens the backoff window.
    assert_eq!(takeover.decision, AcquireDecision::Skip);
    let record = store.record(session_id, 0, KIND_STEP_CONTENT).await.unwrap();
    assert_eq!(record.state, DeliveryState::Failed);
    assert_eq!(record.fail_count, 1);

    // Still inside the 10s window.
    clock.advance(TimeDelta::seconds(5));
    let early = store
        .acquire(session_id, 0, KIND_STEP_CONTENT, HASH)
        .await
        .unwrap();
    assert_eq!(early.decision, AcquireDecision::Skip);

    // Past the window the claim reopens.
    clock.advance(TimeDelta::seconds(6));
    let retry = store
        .acquire(session_id, 0, KIND_STEP_CONTENT, HASH)
        .await
        .unwrap();
    assert_eq!(retry.decision, AcquireDecision::Show);
    let record = store.record(session_id, 0, KIND_STEP_CONTENT).await.unwrap();
    assert_eq!(record.state, DeliveryState::Pending);
    assert_eq!(record.fail_count, 1);
}

#[tokio::test]
async fn test_reported_failures_escalate_backoff() {
    let (store, clock) = store_with_clock();
    let session_id = Uuid::new_v4();

    // First attempt fails: 10s window.
    let first = store
        .acquire(session_id, 0, KIND_STEP_CONTENT, HASH)
        .await
        .unwrap();
    store.mark_failed(first.record_id).await.unwrap();
    let record = store.record(session_id, 0, KIND_STEP_CONTENT).await.unwrap();
    assert_eq!(record.fail_count, 1);
    assert_eq!(record.next_retry_at, Some(clock.now() + TimeDelta::seconds(10)));

    // Second attempt fails: 30s window.
    clock.advance(TimeDelta::seconds(10));
    let second = store
        .acquire(session_id, 0, KIND_STEP_CONTENT, HASH)
        .await
        .unwrap();
    assert_eq!(second.decision, AcquireDecision::Show);
    store.mark_failed(second.record_id).await.unwrap();
    let record = store.record(session_id, 0, KIND_STEP_CONTENT).await.unwrap();
    assert_eq!(record.fail_count, 2);
    assert_eq!(record.next_retry_at, Some(clock.now() + TimeDelta::seconds(30)));

    // Every further failure caps at 120s.
    clock.advance(TimeDelta::seconds(30));
    let third = store
        .acquire(session_id, 0, KIND_STEP_CONTENT, HASH)
        .await
        .unwrap();
    store.mark_failed(third.record_id).await.unwrap();
    let record = store.record(session_id, 0, KIND_STEP_CONTENT).await.unwrap();
    assert_eq!(record.fail_count, 3);
    assert_eq!(record.next_retry_at, Some(clock.now() + TimeDelta::seconds(120)));
}

#[tokio::test]
async fn test_retry_succeeds_after_backoff() {
    let (store, clock) = store_with_clock();
    let session_id = Uuid::new_v4();

    let first = store
        .acquire(session_id, 0, KIND_STEP_CONTENT, HASH)
        .await
        .unwrap();
    store.mark_failed(first.record_id).await.unwrap();

    clock.advance(TimeDelta::seconds(10));
    let retry = store
        .acquire(session_id, 0, KIND_STEP_CONTENT, HASH)
        .await
        .unwrap();
    assert_eq!(retry.decision, AcquireDecision::Show);
    store.mark_shown(retry.record_id, Some(7)).await.unwrap();

    let record = store.record(session_id, 0, KIND_STEP_CONTENT).await.unwrap();
    assert_eq!(record.state, DeliveryState::Shown);
    assert_eq!(record.fail_count, 1);
}

#[tokio::test]
async fn test_kinds_are_independent_units() {
    let (store, _) = store_with_clock();
    let session_id = Uuid::new_v4();

    let content = store
        .acquire(session_id, 0, KIND_STEP_CONTENT, HASH)
        .await
        .unwrap();
    let locked = store
        .acquire(session_id, 0, KIND_STEP_LOCKED, HASH)
        .await
        .unwrap();

    assert_eq!(content.decision, AcquireDecision::Show);
    assert_eq!(locked.decision, AcquireDecision::Show);
    assert_ne!(content.record_id, locked.record_id);
}

#[tokio::test]
async fn test_mark_failed_for_unknown_record_is_a_no_op() {
    let (store, _) = store_with_clock();

    store.mark_failed(Uuid::new_v4()).await.unwrap();
}
