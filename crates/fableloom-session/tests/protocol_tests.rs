//! Integration tests for the turn commit protocol, driven through the
//! in-memory store so the real `run_commit` logic is exercised end to end.

use std::sync::Arc;

use chrono::Utc;

use fableloom_core::error::CoreError;
use fableloom_engine::{NarrativeEngine, Turn};
use fableloom_session::TurnRuntime;
use fableloom_session::domain::outcome::TurnOutcome;
use fableloom_session::domain::session::{SessionKey, SessionStatus};
use fableloom_session::store::{NewSession, TurnStore};
use fableloom_test_support::{FixedClock, FixtureContentProvider, InMemoryTurnStore};

fn runtime() -> TurnRuntime<InMemoryTurnStore> {
    let store = InMemoryTurnStore::new(Arc::new(FixedClock(Utc::now())));
    TurnRuntime::new(
        NarrativeEngine::default(),
        Arc::new(FixtureContentProvider),
        store,
    )
}

fn new_session(participant_id: i64) -> NewSession {
    NewSession {
        participant_id,
        theme_id: Some("forest".to_owned()),
        max_steps: 8,
    }
}

#[tokio::test]
async fn test_first_commit_is_accepted_and_advances_step() {
    let rt = runtime();
    let session = rt.store().create_session(new_session(1)).await.unwrap();

    let outcome = rt
        .play_turn(&session.key(), 0, Turn::choice("A"))
        .await
        .unwrap();

    let TurnOutcome::Accepted { session, event } = outcome else {
        panic!("expected accepted, got {}", outcome.tag());
    };
    assert_eq!(session.step, 1);
    assert_eq!(event.step, 0);
    assert!(event.payload.is_some());
    assert_eq!(event.outcome.as_deref(), Some("accepted"));
}

#[tokio::test]
async fn test_duplicate_replays_stored_payload() {
    let rt = runtime();
    let session = rt.store().create_session(new_session(1)).await.unwrap();
    let key = session.key();

    let first = rt.play_turn(&key, 0, Turn::choice("A")).await.unwrap();
    let second = rt.play_turn(&key, 0, Turn::choice("A")).await.unwrap();

    let TurnOutcome::Accepted { event: original, .. } = first else {
        panic!("expected accepted");
    };
    let TurnOutcome::Duplicate { session, event } = second else {
        panic!("expected duplicate, got {}", second.tag());
    };
    // Byte-identical replay: the stored payload, not a re-render.
    assert_eq!(event.payload, original.payload);
    assert_eq!(session.step, 1);
}

#[tokio::test]
async fn test_duplicate_with_different_turn_still_replays() {
    let rt = runtime();
    let session = rt.store().create_session(new_session(1)).await.unwrap();
    let key = session.key();

    rt.play_turn(&key, 0, Turn::choice("A")).await.unwrap();
    let outcome = rt.play_turn(&key, 0, Turn::choice("B")).await.unwrap();

    // The (session, step) pair decides idempotency; the turn content does not.
    assert_eq!(outcome.tag(), "duplicate");
}

#[tokio::test]
async fn test_mismatched_step_is_stale() {
    let rt = runtime();
    let session = rt.store().create_session(new_session(1)).await.unwrap();

    let outcome = rt
        .play_turn(&session.key(), 3, Turn::choice("A"))
        .await
        .unwrap();

    let TurnOutcome::Stale { session } = outcome else {
        panic!("expected stale, got {}", outcome.tag());
    };
    assert_eq!(session.step, 0);
}

#[tokio::test]
async fn test_turn_without_input_is_invalid() {
    let rt = runtime();
    let session = rt.store().create_session(new_session(1)).await.unwrap();

    let outcome = rt
        .play_turn(&session.key(), 0, Turn::Choice { choice_id: None })
        .await
        .unwrap();

    assert_eq!(outcome.tag(), "invalid");
    // An invalid turn consumes nothing.
    let current = rt
        .store()
        .session_by_key(&session.key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.step, 0);
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let rt = runtime();

    let key = SessionKey {
        participant_id: 99,
        public_id: "nosuchid".to_owned(),
    };
    let err = rt.play_turn(&key, 0, Turn::choice("A")).await.unwrap_err();

    assert!(matches!(err, CoreError::SessionNotFound { .. }));
}

#[tokio::test]
async fn test_concurrent_commits_yield_one_accepted_one_duplicate() {
    let rt = runtime();
    let session = rt.store().create_session(new_session(1)).await.unwrap();
    let key = session.key();

    let (a, b) = tokio::join!(
        rt.play_turn(&key, 0, Turn::choice("A")),
        rt.play_turn(&key, 0, Turn::choice("A")),
    );

    let tags = [a.unwrap().tag(), b.unwrap().tag()];
    assert!(tags.contains(&"accepted"));
    assert!(tags.contains(&"duplicate"));
}

#[tokio::test]
async fn test_new_session_aborts_previous_active_one() {
    let rt = runtime();
    let first = rt.store().create_session(new_session(1)).await.unwrap();

    let second = rt.store().create_session(new_session(1)).await.unwrap();

    let first = rt
        .store()
        .session_by_key(&first.key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.status, SessionStatus::Aborted);
    assert_eq!(second.status, SessionStatus::Active);
    let active = rt.store().active_session(1).await.unwrap().unwrap();
    assert_eq!(active.id, second.id);
}

#[tokio::test]
async fn test_full_story_reaches_an_ending() {
    let rt = runtime();
    let session = rt.store().create_session(new_session(1)).await.unwrap();
    let key = session.key();

    let mut last = None;
    for step in 0..8 {
        last = Some(rt.play_turn(&key, step, Turn::choice("A")).await.unwrap());
    }

    let TurnOutcome::Accepted { session, event } = last.unwrap() else {
        panic!("expected the last turn to be accepted");
    };
    assert_eq!(session.status, SessionStatus::Finished);
    assert!(session.ending_id.is_some());
    assert!(session.ending_meta.is_some());
    let payload = event.payload.unwrap();
    assert!(payload["final_id"].is_string());
}

#[tokio::test]
async fn test_persistent_noise_aborts_the_story() {
    let rt = runtime();
    let session = rt.store().create_session(new_session(1)).await.unwrap();
    let key = session.key();

    let mut step = 0;
    let mut last = None;
    for _ in 0..5 {
        let outcome = rt.play_turn(&key, step, Turn::free_text("...")).await.unwrap();
        if let TurnOutcome::Accepted { session, .. } = &outcome {
            step = session.step;
        }
        last = Some(outcome);
    }

    let TurnOutcome::Accepted { session, .. } = last.unwrap() else {
        panic!("expected the aborting turn to be accepted");
    };
    assert_eq!(session.status, SessionStatus::Finished);
    assert_eq!(
        session.ending_id.map(|id| id.as_str()),
        Some("F5")
    );
}
