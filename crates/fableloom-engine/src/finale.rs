//! Ending selection — the rule cascade evaluated on the last step.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::state::{EngineState, FinalId, TraitId};

/// Which rule of the ending cascade fired. Exactly one fires per resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleHit {
    /// Rule A — the noise streak reached the abort threshold.
    NoiseAbort,
    /// Rule B — the chaos trait dominates the core traits.
    ChaosDominant,
    /// Rule C — a unique core leader with a clear gap.
    ClearLeader,
    /// Rule D — leaders tied; milestone votes broke (or failed to break) the tie.
    TieBreak,
    /// Rule E — the default ending.
    Default,
}

/// Why the F5 ending was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    NoiseAbort,
    ChaosDominant,
}

/// Tone of the default F4 ending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosingTone {
    Growth,
    Success,
}

/// Full audit of one ending decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalMeta {
    /// The cascade rule that fired.
    pub rule_hit: RuleHit,
    /// Highest core trait value.
    pub max_core: i32,
    /// Lowest core trait value.
    pub min_core: i32,
    /// Gap between the highest and second-highest core values.
    pub gap_core: i32,
    /// The unique leading core trait, or `None` on a tie.
    pub leader_core: Option<TraitId>,
    /// Whether milestone votes were consulted.
    pub tie_break_used: bool,
    /// Vote tally per core trait.
    pub tie_break_votes: BTreeMap<TraitId, u32>,
    /// Winning trait of the tie-break, if one emerged.
    pub tie_break_winner: Option<TraitId>,
    /// Reason when F5 was selected.
    pub abort_reason: Option<AbortReason>,
    /// Tone when F4 was selected.
    pub closing_tone: Option<ClosingTone>,
}

impl FinalMeta {
    fn base(rule_hit: RuleHit, max_core: i32, min_core: i32, gap_core: i32) -> Self {
        Self {
            rule_hit,
            max_core,
            min_core,
            gap_core,
            leader_core: None,
            tie_break_used: false,
            tie_break_votes: TraitId::CORE.iter().map(|t| (*t, 0)).collect(),
            tie_break_winner: None,
            abort_reason: None,
            closing_tone: None,
        }
    }
}

/// Fixed mapping from a leading core trait to its thematic ending.
#[must_use]
pub fn leader_final(leader: TraitId) -> FinalId {
    match leader {
        TraitId::T1 | TraitId::T5 => FinalId::F1,
        TraitId::T2 | TraitId::T4 => FinalId::F2,
        _ => FinalId::F3,
    }
}

/// Majority vote among the recorded milestone votes. Returns the unique
/// winner (if any) alongside the full tally.
#[must_use]
pub fn tie_break_winner(state: &EngineState) -> (Option<TraitId>, BTreeMap<TraitId, u32>) {
    let mut votes: BTreeMap<TraitId, u32> = TraitId::CORE.iter().map(|t| (*t, 0)).collect();
    for milestone_vote in state.milestone_votes.values() {
        if let Some(trait_id) = milestone_vote.vote
            && let Some(count) = votes.get_mut(&trait_id)
        {
            *count += 1;
        }
    }
    let max_votes = votes.values().copied().max().unwrap_or(0);
    if max_votes == 0 {
        return (None, votes);
    }
    let leaders: Vec<TraitId> = votes
        .iter()
        .filter(|(_, count)| **count == max_votes)
        .map(|(trait_id, _)| *trait_id)
        .collect();
    if leaders.len() == 1 {
        (Some(leaders[0]), votes)
    } else {
        (None, votes)
    }
}

/// The metadata recorded when a noise streak aborts the story mid-way.
/// Trait statistics are taken from the state as it stood before the turn.
#[must_use]
pub fn noise_abort_meta(traits_before: &BTreeMap<TraitId, i32>) -> FinalMeta {
    let core = TraitId::CORE
        .iter()
        .map(|t| traits_before.get(t).copied().unwrap_or(0));
    let max_core = core.clone().max().unwrap_or(0);
    let min_core = core.min().unwrap_or(0);
    let mut meta = FinalMeta::base(RuleHit::NoiseAbort, max_core, min_core, 0);
    meta.abort_reason = Some(AbortReason::NoiseAbort);
    meta
}

/// Resolves the ending for a state that reached the last step.
///
/// Evaluates the cascade in order: noise abort, chaos dominance, clear
/// leader, milestone tie-break, default. Exactly one rule fires, and every
/// input to the decision lands in the returned [`FinalMeta`].
#[must_use]
pub fn pick_final(state: &EngineState, config: &EngineConfig) -> (FinalId, FinalMeta) {
    let core_values: Vec<(TraitId, i32)> = TraitId::CORE
        .iter()
        .map(|t| (*t, state.trait_value(*t)))
        .collect();
    let mut sorted: Vec<i32> = core_values.iter().map(|(_, v)| *v).collect();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    let max_core = sorted[0];
    let second = sorted.get(1).copied().unwrap_or(max_core);
    let gap = max_core - second;
    let min_core = sorted[sorted.len() - 1];
    let leaders: Vec<TraitId> = core_values
        .iter()
        .filter(|(_, v)| *v == max_core)
        .map(|(t, _)| *t)
        .collect();
    let leader = if leaders.len() == 1 {
        Some(leaders[0])
    } else {
        None
    };

    let mut meta = FinalMeta::base(RuleHit::Default, max_core, min_core, gap);
    meta.leader_core = leader;

    if state.noise_streak >= config.abort_streak {
        meta.rule_hit = RuleHit::NoiseAbort;
        meta.abort_reason = Some(AbortReason::NoiseAbort);
        return (FinalId::F5, meta);
    }

    if state.trait_value(TraitId::CHAOS) >= 9 && max_core <= 8 {
        meta.rule_hit = RuleHit::ChaosDominant;
        meta.abort_reason = Some(AbortReason::ChaosDominant);
        return (FinalId::F5, meta);
    }

    if max_core >= 9 && gap >= 2 && leader.is_some() {
        meta.rule_hit = RuleHit::ClearLeader;
        return (leader_final(leaders[0]), meta);
    }

    if max_core >= 9 {
        let (winner, votes) = tie_break_winner(state);
        meta.rule_hit = RuleHit::TieBreak;
        meta.tie_break_used = true;
        meta.tie_break_votes = votes;
        meta.tie_break_winner = winner;
        if let Some(winner) = winner {
            return (leader_final(winner), meta);
        }
        meta.closing_tone = Some(if min_core <= 3 {
            ClosingTone::Growth
        } else {
            ClosingTone::Success
        });
        return (FinalId::F4, meta);
    }

    meta.closing_tone = Some(if min_core <= 3 {
        ClosingTone::Growth
    } else {
        ClosingTone::Success
    });
    (FinalId::F4, meta)
}
