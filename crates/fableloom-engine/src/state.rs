//! Engine state and the identifier vocabulary it is built from.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Version tag written into every persisted engine state.
pub const STATE_VERSION: &str = "0.1";

/// Default value every trait starts at.
pub const TRAIT_BASELINE: i32 = 5;

/// Identifier of one trait in the six-slot trait vector.
///
/// `T1`..`T5` are the core traits that participate in ending selection;
/// `T6` is the volatile "chaos" trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraitId {
    T1,
    T2,
    T3,
    T4,
    T5,
    T6,
}

impl TraitId {
    /// The five core traits, in canonical order.
    pub const CORE: [Self; 5] = [Self::T1, Self::T2, Self::T3, Self::T4, Self::T5];

    /// All six traits, in canonical order.
    pub const ALL: [Self; 6] = [Self::T1, Self::T2, Self::T3, Self::T4, Self::T5, Self::T6];

    /// The volatile chaos trait.
    pub const CHAOS: Self = Self::T6;

    /// Returns true for the five traits used by ending selection.
    #[must_use]
    pub fn is_core(self) -> bool {
        self != Self::CHAOS
    }
}

/// Identifier of a milestone step at which a vote is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MilestoneId {
    M2,
    M6,
    M7,
}

impl MilestoneId {
    /// All milestones, in the order they are checked against a step.
    pub const ALL: [Self; 3] = [Self::M2, Self::M6, Self::M7];
}

/// One of the five terminal narrative endings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FinalId {
    F1,
    F2,
    F3,
    F4,
    F5,
}

impl FinalId {
    /// Stable string form, as stored in the session row.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::F1 => "F1",
            Self::F2 => "F2",
            Self::F3 => "F3",
            Self::F4 => "F4",
            Self::F5 => "F5",
        }
    }

    /// Parses the stored string form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "F1" => Some(Self::F1),
            "F2" => Some(Self::F2),
            "F3" => Some(Self::F3),
            "F4" => Some(Self::F4),
            "F5" => Some(Self::F5),
            _ => None,
        }
    }
}

/// A vote recorded at a milestone step, used later for ending tie-breaks.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MilestoneVote {
    /// The core trait this vote favors, if any.
    pub vote: Option<TraitId>,
    /// Free-form provenance tag supplied by the content catalog.
    pub reason: Option<String>,
}

impl MilestoneVote {
    /// The empty vote recorded when a milestone turn carried no usable choice.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }
}

/// The full narrative state of one session. Replaced wholesale on every
/// committed turn; never mutated in place by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineState {
    /// State format version.
    pub version: String,
    /// Fixed number of steps in this story.
    pub total_steps: i32,
    /// Zero-based index of the current step.
    pub step0: i32,
    /// The trait vector, each value clamped to `[0, 10]`.
    pub traits: BTreeMap<TraitId, i32>,
    /// Count of consecutive noise turns.
    pub noise_streak: u32,
    /// Whether free-text input is still offered to the participant.
    pub free_text_allowed: bool,
    /// Votes recorded at visited milestone steps.
    pub milestone_votes: BTreeMap<MilestoneId, MilestoneVote>,
}

impl EngineState {
    /// The state a freshly created session starts from.
    #[must_use]
    pub fn initial(total_steps: i32) -> Self {
        Self {
            version: STATE_VERSION.to_owned(),
            total_steps,
            step0: 0,
            traits: TraitId::ALL.iter().map(|t| (*t, TRAIT_BASELINE)).collect(),
            noise_streak: 0,
            free_text_allowed: true,
            milestone_votes: MilestoneId::ALL
                .iter()
                .map(|m| (*m, MilestoneVote::none()))
                .collect(),
        }
    }

    /// Current value of one trait. Absent entries read as zero.
    #[must_use]
    pub fn trait_value(&self, id: TraitId) -> i32 {
        self.traits.get(&id).copied().unwrap_or(0)
    }

    /// Whether the current step is the story's last one.
    #[must_use]
    pub fn is_last_step(&self) -> bool {
        self.step0 == self.total_steps - 1
    }
}
