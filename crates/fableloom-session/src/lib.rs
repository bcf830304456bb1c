//! Fableloom — Session & Turn Commit bounded context.
//!
//! Owns the session data model, the atomic turn-commit protocol that applies
//! the narrative engine to a stored session exactly once per step, and the
//! rendered step payloads replayed for duplicate deliveries.

pub mod domain;
pub mod protocol;
pub mod render;
pub mod runtime;
pub mod store;

pub use domain::outcome::TurnOutcome;
pub use domain::payload::{ChoiceRef, StepPayload};
pub use domain::session::{SessionKey, SessionRecord, SessionStatus, new_public_id};
pub use domain::event::TurnEvent;
pub use runtime::TurnRuntime;
pub use store::{ApplyOutput, CommitRequest, NewSession, SessionTxn, TurnStore};
