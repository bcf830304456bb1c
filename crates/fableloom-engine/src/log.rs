//! Step audit log.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::content::{Delta, StepType};
use crate::finale::FinalMeta;
use crate::state::{FinalId, MilestoneId, MilestoneVote, TraitId};
use crate::turn::TurnKind;

/// Why a turn was applied as neutral (zero deltas, no trait movement).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeutralReason {
    /// Free text classified as noise.
    NoiseInput,
    /// Free text with no classifier output to act on.
    ParseFail,
    /// Classifier confidence below the configured floor.
    LowConfidence,
    /// Classifier safety verdict was not clear.
    SafetyUnclear,
    /// Choice id absent or unknown to the content step.
    MissingMapping,
}

/// Full deterministic audit of one `apply` call. Produced once per committed
/// turn, persisted alongside the event, never recomputed for duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepLog {
    /// Engine state version the turn was applied under.
    pub version: String,
    /// Story length.
    pub total_steps: i32,
    /// Step the turn was applied at.
    pub step0: i32,
    /// Weight class of the content step.
    pub step_type: StepType,
    /// Kind of the turn.
    pub turn_kind: TurnKind,
    /// Choice id, for choice turns.
    pub choice_id: Option<String>,
    /// Whether the turn carried any participant input.
    pub user_input_present: bool,
    /// Whether free text was classified as noise.
    pub noise_input: bool,
    pub noise_streak_before: u32,
    pub noise_streak_after: u32,
    /// Whether free text remains offered after this turn.
    pub free_text_allowed_after: bool,
    /// Set when the turn was applied as neutral.
    pub neutral_reason: Option<NeutralReason>,
    /// The deltas that survived normalization and were applied.
    pub applied_deltas: Vec<Delta>,
    pub traits_before: BTreeMap<TraitId, i32>,
    pub traits_after: BTreeMap<TraitId, i32>,
    /// Milestone hit at this step, if any.
    pub milestone_id: Option<MilestoneId>,
    /// The vote recorded at the milestone, if one was hit.
    pub milestone_vote: Option<MilestoneVote>,
    /// Milestones visited without a usable vote.
    pub milestone_vote_missing: Vec<MilestoneId>,
    /// Ending produced by this turn, if any.
    pub final_id: Option<FinalId>,
    /// Audit of the ending decision, when one was made.
    pub final_meta: Option<FinalMeta>,
    /// Whether choice-declared deltas were altered by normalization.
    pub content_delta_clamped: bool,
    /// Whether classifier-derived deltas were altered by normalization.
    pub classifier_delta_clamped: bool,
    /// Whether the choice id had no mapping in the content step.
    pub content_missing_mapping: bool,
}
