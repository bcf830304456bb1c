//! Rendered step payloads.

use serde::{Deserialize, Serialize};

use fableloom_engine::FinalId;

/// One selectable choice as presented to the participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceRef {
    pub choice_id: String,
    pub label: String,
}

/// The rendered view of one step, stored with the turn event so duplicate
/// deliveries replay identical bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepPayload {
    /// Display text for the step (or ending).
    pub text: String,
    /// Choices to offer; empty for endings.
    pub choices: Vec<ChoiceRef>,
    /// Whether free-text input is offered alongside the choices.
    pub allow_free_text: bool,
    /// Set when this payload announces an ending.
    pub final_id: Option<FinalId>,
}
