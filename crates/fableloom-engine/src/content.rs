//! Content inputs the engine consumes.
//!
//! The content catalog itself is an external collaborator; the engine only
//! sees the one [`ContentStep`] resolved for the current step and treats it
//! as an opaque, trusted input.

use serde::{Deserialize, Serialize};

use crate::state::{EngineState, MilestoneVote, TraitId};

/// Weight class of a content step, which bounds the total trait movement a
/// single turn may cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepType {
    Normal,
    Semi,
    Heavy,
}

impl StepType {
    /// Maximum allowed sum of absolute applied deltas for this step.
    #[must_use]
    pub fn delta_budget(self) -> i32 {
        match self {
            Self::Normal => 2,
            Self::Semi => 3,
            Self::Heavy => 4,
        }
    }
}

/// One declared trait movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    /// The trait to move.
    #[serde(rename = "trait")]
    pub trait_id: TraitId,
    /// Signed movement amount.
    pub delta: i32,
}

/// One selectable option within a content step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    /// Stable identifier the participant's turn references.
    pub choice_id: String,
    /// Display label.
    pub label: String,
    /// Declared trait deltas (at most two are honored).
    pub deltas: Vec<Delta>,
    /// Vote recorded if this choice is taken at a milestone step.
    pub milestone_vote: MilestoneVote,
}

/// The content available at one step of the story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentStep {
    /// Narrative text shown for this step.
    pub scene_text: String,
    /// Weight class, which selects the delta budget.
    pub step_type: StepType,
    /// Options offered to the participant.
    pub choices: Vec<Choice>,
}

impl ContentStep {
    /// Looks up a choice by id.
    #[must_use]
    pub fn choice(&self, choice_id: &str) -> Option<&Choice> {
        self.choices.iter().find(|c| c.choice_id == choice_id)
    }
}

/// Pure lookup of the content for a given step. Implemented by the content
/// catalog, which is outside this core.
pub trait ContentProvider: Send + Sync {
    /// Returns the content step for `step0` of the given theme and state.
    fn step_content(&self, theme_id: Option<&str>, step0: i32, state: &EngineState) -> ContentStep;
}
