//! Fableloom — pure narrative transition engine.
//!
//! Given an engine state, one participant turn, and the content available at
//! the current step, [`NarrativeEngine::apply`] computes the successor state
//! and a full audit log. The engine performs no I/O, holds no hidden state,
//! and never fails: malformed input degrades to a neutral turn, not an error.
//! Identical inputs always produce identical outputs.

pub mod apply;
pub mod config;
pub mod content;
pub mod deltas;
pub mod finale;
pub mod log;
pub mod milestones;
pub mod noise;
pub mod state;
pub mod turn;

pub use apply::NarrativeEngine;
pub use config::EngineConfig;
pub use content::{Choice, ContentProvider, ContentStep, Delta, StepType};
pub use finale::{AbortReason, ClosingTone, FinalMeta, RuleHit, pick_final};
pub use log::{NeutralReason, StepLog};
pub use milestones::Milestones;
pub use state::{EngineState, FinalId, MilestoneId, MilestoneVote, TraitId};
pub use turn::{ClassifierOutcome, SafetyVerdict, Turn, TurnKind};
