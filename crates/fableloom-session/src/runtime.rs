//! Turn runtime — composes provider, engine, rendering, and store.
//!
//! This is the entry point the transport layer calls: it builds the apply
//! closure for the commit protocol and hands back the tagged outcome. The
//! transport then consults the delivery ledger before showing anything.

use std::sync::Arc;

use fableloom_core::error::CoreError;
use fableloom_engine::{ContentProvider, NarrativeEngine, Turn};

use crate::domain::outcome::TurnOutcome;
use crate::domain::payload::StepPayload;
use crate::domain::session::{SessionKey, SessionRecord};
use crate::render::{final_payload, render_step};
use crate::store::{ApplyOutput, CommitRequest, NewSession, TurnStore};

/// Drives complete turns against a session store.
pub struct TurnRuntime<S> {
    engine: NarrativeEngine,
    provider: Arc<dyn ContentProvider>,
    store: S,
}

impl<S: TurnStore> TurnRuntime<S> {
    /// Creates a runtime over the given engine, content provider, and store.
    pub fn new(engine: NarrativeEngine, provider: Arc<dyn ContentProvider>, store: S) -> Self {
        Self {
            engine,
            provider,
            store,
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Starts a new story: creates an ACTIVE session (superseding any prior
    /// one) and renders the opening step.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn start_session(
        &self,
        new_session: NewSession,
    ) -> Result<(SessionRecord, StepPayload), CoreError> {
        let session = self.store.create_session(new_session).await?;
        let state = session.engine_state_or_initial();
        let payload = render_step(&session, &state, &*self.provider);
        Ok((session, payload))
    }

    /// Commits one turn and returns its outcome.
    ///
    /// On `Accepted` the event carries the freshly rendered payload; on
    /// `Duplicate` it carries the payload stored by the original commit, so
    /// retried deliveries replay identical bytes.
    ///
    /// # Errors
    ///
    /// `CoreError::SessionNotFound` for expired/unknown sessions; store
    /// failures otherwise.
    pub async fn play_turn(
        &self,
        key: &SessionKey,
        expected_step: i32,
        turn: Turn,
    ) -> Result<TurnOutcome, CoreError> {
        let engine = &self.engine;
        let provider = &*self.provider;
        let engine_turn = turn.clone();
        let apply = Box::new(move |session: &SessionRecord| {
            let state = session.engine_state_or_initial();
            let content = provider.step_content(session.theme_id.as_deref(), state.step0, &state);
            let (new_state, step_log) = engine.apply(&state, &engine_turn, &content);
            let payload = if step_log.final_id.is_some() {
                final_payload(step_log.final_id)
            } else {
                render_step(session, &new_state, provider)
            };
            Ok(ApplyOutput {
                new_state,
                step_log,
                payload,
            })
        });

        self.store
            .commit_turn(CommitRequest {
                key: key.clone(),
                expected_step,
                turn,
                validate: None,
                apply,
            })
            .await
    }
}
