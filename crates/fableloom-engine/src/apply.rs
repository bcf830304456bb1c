//! The turn application function — the heart of the engine.

use crate::config::EngineConfig;
use crate::content::{ContentStep, Delta};
use crate::deltas::{apply_deltas, normalize_deltas};
use crate::finale::{noise_abort_meta, pick_final};
use crate::log::{NeutralReason, StepLog};
use crate::milestones::Milestones;
use crate::noise::is_noise;
use crate::state::{EngineState, FinalId, MilestoneVote};
use crate::turn::{SafetyVerdict, Turn, TurnKind};

/// The narrative transition engine.
///
/// A pure function library over `(state, turn, content)`: no I/O, no clocks,
/// no randomness. Two calls with identical inputs yield identical outputs.
#[derive(Debug, Clone, Default)]
pub struct NarrativeEngine {
    config: EngineConfig,
}

impl NarrativeEngine {
    /// Creates an engine with the given policy configuration.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Resolves the ending for a state standing on its last step.
    #[must_use]
    pub fn pick_final(&self, state: &EngineState) -> (FinalId, crate::finale::FinalMeta) {
        pick_final(state, &self.config)
    }

    /// Applies one turn to a state, producing the successor state and the
    /// full audit log.
    ///
    /// Malformed input never fails: unknown choice ids and unusable free
    /// text degrade to neutral turns with a recorded [`NeutralReason`].
    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub fn apply(&self, state: &EngineState, turn: &Turn, content: &ContentStep) -> (EngineState, StepLog) {
        let step0 = state.step0;
        let milestones = Milestones::for_total_steps(state.total_steps);
        let milestone_id = milestones.milestone_at(step0);
        let traits_before = state.traits.clone();

        let mut applied_deltas: Vec<Delta> = Vec::new();
        let mut neutral_reason: Option<NeutralReason> = None;
        let mut content_missing_mapping = false;
        let mut content_delta_clamped = false;
        let mut classifier_delta_clamped = false;
        let mut noise_input = false;

        match turn {
            Turn::FreeText { text, classifier } => {
                noise_input = is_noise(text.as_deref(), &self.config);
                if noise_input {
                    neutral_reason = Some(NeutralReason::NoiseInput);
                } else {
                    match classifier {
                        None => neutral_reason = Some(NeutralReason::ParseFail),
                        Some(outcome) if outcome.confidence < self.config.confidence_floor => {
                            neutral_reason = Some(NeutralReason::LowConfidence);
                        }
                        Some(outcome) if outcome.safety != SafetyVerdict::Clear => {
                            neutral_reason = Some(NeutralReason::SafetyUnclear);
                        }
                        Some(outcome) => {
                            (applied_deltas, classifier_delta_clamped) =
                                normalize_deltas(&outcome.deltas, content.step_type, false);
                        }
                    }
                }
            }
            Turn::Choice { .. } => match turn.choice_id() {
                None => {
                    neutral_reason = Some(NeutralReason::MissingMapping);
                    content_missing_mapping = true;
                }
                Some(choice_id) => match content.choice(choice_id) {
                    None => {
                        neutral_reason = Some(NeutralReason::MissingMapping);
                        content_missing_mapping = true;
                    }
                    Some(choice) => {
                        (applied_deltas, content_delta_clamped) =
                            normalize_deltas(&choice.deltas, content.step_type, true);
                    }
                },
            },
        }

        let noise_streak_before = state.noise_streak;
        let noise_streak_after = if turn.kind() == TurnKind::FreeText && noise_input {
            noise_streak_before + 1
        } else {
            0
        };
        let free_text_allowed_after = noise_streak_after < self.config.gate_streak;

        let mut new_state = state.clone();
        new_state.noise_streak = noise_streak_after;
        new_state.free_text_allowed = free_text_allowed_after;

        let mut final_id = None;
        let mut final_meta = None;
        if noise_streak_after >= self.config.abort_streak {
            final_id = Some(FinalId::F5);
            final_meta = Some(noise_abort_meta(&traits_before));
        }

        if neutral_reason.is_none() && final_id.is_none() {
            new_state.traits = apply_deltas(&new_state.traits, &applied_deltas);
        }

        let mut milestone_vote = None;
        let mut milestone_vote_missing = Vec::new();
        if let Some(milestone) = milestone_id {
            if neutral_reason.is_none() {
                let chosen = turn.choice_id().and_then(|id| content.choice(id));
                if let Some(choice) = chosen {
                    milestone_vote = Some(choice.milestone_vote.clone());
                    new_state
                        .milestone_votes
                        .insert(milestone, choice.milestone_vote.clone());
                } else {
                    // Non-choice turns visit the milestone without a vote.
                    milestone_vote = Some(MilestoneVote::none());
                }
            } else {
                milestone_vote = Some(MilestoneVote::none());
                milestone_vote_missing.push(milestone);
            }
        }

        if final_id.is_none() && state.is_last_step() {
            let (resolved, meta) = pick_final(&new_state, &self.config);
            final_id = Some(resolved);
            final_meta = Some(meta);
        }

        if final_id.is_none() {
            new_state.step0 = step0 + 1;
        }

        let user_input_present = match turn {
            Turn::Choice { .. } => turn.choice_id().is_some(),
            Turn::FreeText { text, .. } => text.as_deref().is_some_and(|t| !t.is_empty()),
        };

        let step_log = StepLog {
            version: state.version.clone(),
            total_steps: state.total_steps,
            step0,
            step_type: content.step_type,
            turn_kind: turn.kind(),
            choice_id: turn.choice_id().map(ToOwned::to_owned),
            user_input_present,
            noise_input,
            noise_streak_before,
            noise_streak_after,
            free_text_allowed_after,
            neutral_reason,
            applied_deltas,
            traits_before,
            traits_after: new_state.traits.clone(),
            milestone_id,
            milestone_vote,
            milestone_vote_missing,
            final_id,
            final_meta,
            content_delta_clamped,
            classifier_delta_clamped,
            content_missing_mapping,
        };

        (new_state, step_log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Choice, StepType};
    use crate::finale::{AbortReason, RuleHit};
    use crate::state::{MilestoneId, TraitId};
    use crate::turn::ClassifierOutcome;

    fn choice_with_deltas(choice_id: &str, deltas: Vec<Delta>) -> Choice {
        Choice {
            choice_id: choice_id.to_owned(),
            label: choice_id.to_owned(),
            deltas,
            milestone_vote: MilestoneVote::none(),
        }
    }

    fn content_step(step_type: StepType, choices: Vec<Choice>) -> ContentStep {
        ContentStep {
            scene_text: "The path divides.".to_owned(),
            step_type,
            choices,
        }
    }

    fn delta(trait_id: TraitId, value: i32) -> Delta {
        Delta {
            trait_id,
            delta: value,
        }
    }

    fn engine() -> NarrativeEngine {
        NarrativeEngine::default()
    }

    #[test]
    fn test_resolved_choice_advances_step() {
        let state = EngineState::initial(8);
        let content = content_step(
            StepType::Normal,
            vec![choice_with_deltas("A", vec![delta(TraitId::T1, 1)])],
        );

        let (new_state, log) = engine().apply(&state, &Turn::choice("A"), &content);

        assert_eq!(new_state.step0, 1);
        assert_eq!(new_state.trait_value(TraitId::T1), 6);
        assert_eq!(log.final_id, None);
        assert_eq!(log.applied_deltas, vec![delta(TraitId::T1, 1)]);
    }

    #[test]
    fn test_unknown_choice_is_neutral() {
        let state = EngineState::initial(8);
        let content = content_step(StepType::Normal, vec![choice_with_deltas("A", vec![])]);

        let (new_state, log) = engine().apply(&state, &Turn::choice("B"), &content);

        assert_eq!(log.neutral_reason, Some(NeutralReason::MissingMapping));
        assert!(log.content_missing_mapping);
        assert!(log.applied_deltas.is_empty());
        assert_eq!(new_state.traits, state.traits);
        assert_eq!(new_state.step0, 1);
    }

    #[test]
    fn test_noise_turn_increments_streak_and_gates_free_text() {
        let mut state = EngineState::initial(8);
        state.noise_streak = 2;
        let content = content_step(StepType::Normal, vec![]);

        let (new_state, log) = engine().apply(&state, &Turn::free_text("..."), &content);

        assert_eq!(new_state.noise_streak, 3);
        assert!(!log.free_text_allowed_after);
        assert!(!new_state.free_text_allowed);
        assert_eq!(log.neutral_reason, Some(NeutralReason::NoiseInput));
    }

    #[test]
    fn test_non_noise_turn_resets_streak() {
        let mut state = EngineState::initial(8);
        state.noise_streak = 2;
        let content = content_step(StepType::Normal, vec![choice_with_deltas("A", vec![])]);

        let (new_state, _) = engine().apply(&state, &Turn::choice("A"), &content);

        assert_eq!(new_state.noise_streak, 0);
        assert!(new_state.free_text_allowed);
    }

    #[test]
    fn test_fifth_noise_turn_aborts_without_advancing() {
        let mut state = EngineState::initial(8);
        state.noise_streak = 4;
        let content = content_step(StepType::Normal, vec![]);

        let (new_state, log) = engine().apply(&state, &Turn::free_text("ok"), &content);

        assert_eq!(log.final_id, Some(FinalId::F5));
        let meta = log.final_meta.unwrap();
        assert_eq!(meta.rule_hit, RuleHit::NoiseAbort);
        assert_eq!(meta.abort_reason, Some(AbortReason::NoiseAbort));
        assert_eq!(new_state.step0, state.step0);
    }

    #[test]
    fn test_milestone_choice_records_vote() {
        let mut state = EngineState::initial(8);
        state.step0 = 2;
        let vote = MilestoneVote {
            vote: Some(TraitId::T2),
            reason: Some("content".to_owned()),
        };
        let mut choice = choice_with_deltas("A", vec![]);
        choice.milestone_vote = vote.clone();
        let content = content_step(StepType::Semi, vec![choice]);

        let (new_state, log) = engine().apply(&state, &Turn::choice("A"), &content);

        assert_eq!(log.milestone_id, Some(MilestoneId::M2));
        assert_eq!(log.milestone_vote, Some(vote.clone()));
        assert_eq!(new_state.milestone_votes[&MilestoneId::M2], vote);
        assert!(log.milestone_vote_missing.is_empty());
    }

    #[test]
    fn test_milestone_neutral_turn_flags_missing_vote() {
        let mut state = EngineState::initial(8);
        state.step0 = 2;
        let content = content_step(StepType::Semi, vec![choice_with_deltas("A", vec![])]);

        let (new_state, log) = engine().apply(&state, &Turn::choice("B"), &content);

        assert_eq!(log.milestone_id, Some(MilestoneId::M2));
        assert_eq!(log.milestone_vote, Some(MilestoneVote::none()));
        assert_eq!(log.milestone_vote_missing, vec![MilestoneId::M2]);
        assert_eq!(
            new_state.milestone_votes[&MilestoneId::M2],
            MilestoneVote::none()
        );
    }

    #[test]
    fn test_choice_deltas_clamped_to_normal_budget() {
        let state = EngineState::initial(8);
        let content = content_step(
            StepType::Normal,
            vec![choice_with_deltas(
                "A",
                vec![delta(TraitId::T1, 2), delta(TraitId::T2, 2)],
            )],
        );

        let (_, log) = engine().apply(&state, &Turn::choice("A"), &content);

        assert!(log.content_delta_clamped);
        let sum: i32 = log.applied_deltas.iter().map(|d| d.delta.abs()).sum();
        assert!(sum <= 2);
    }

    #[test]
    fn test_last_step_resolves_ending() {
        let mut state = EngineState::initial(8);
        state.step0 = 7;
        let content = content_step(StepType::Heavy, vec![choice_with_deltas("A", vec![])]);

        let (new_state, log) = engine().apply(&state, &Turn::choice("A"), &content);

        assert_eq!(log.final_id, Some(FinalId::F4));
        assert!(log.final_meta.is_some());
        assert_eq!(new_state.step0, 7);
    }

    #[test]
    fn test_free_text_without_classifier_is_parse_fail() {
        let state = EngineState::initial(8);
        let content = content_step(StepType::Normal, vec![]);

        let (new_state, log) = engine().apply(&state, &Turn::free_text("open the gate"), &content);

        assert_eq!(log.neutral_reason, Some(NeutralReason::ParseFail));
        assert_eq!(new_state.traits, state.traits);
        assert_eq!(new_state.noise_streak, 0);
    }

    #[test]
    fn test_free_text_low_confidence_is_neutral() {
        let state = EngineState::initial(8);
        let content = content_step(StepType::Normal, vec![]);
        let turn = Turn::FreeText {
            text: Some("I sneak past the guards".to_owned()),
            classifier: Some(ClassifierOutcome {
                confidence: 0.4,
                safety: SafetyVerdict::Clear,
                deltas: vec![delta(TraitId::T1, 1)],
            }),
        };

        let (new_state, log) = engine().apply(&state, &turn, &content);

        assert_eq!(log.neutral_reason, Some(NeutralReason::LowConfidence));
        assert!(log.applied_deltas.is_empty());
        assert_eq!(new_state.traits, state.traits);
    }

    #[test]
    fn test_free_text_unclear_safety_is_neutral() {
        let state = EngineState::initial(8);
        let content = content_step(StepType::Normal, vec![]);
        let turn = Turn::FreeText {
            text: Some("I sneak past the guards".to_owned()),
            classifier: Some(ClassifierOutcome {
                confidence: 0.9,
                safety: SafetyVerdict::Unclear,
                deltas: vec![delta(TraitId::T1, 1)],
            }),
        };

        let (_, log) = engine().apply(&state, &turn, &content);

        assert_eq!(log.neutral_reason, Some(NeutralReason::SafetyUnclear));
        assert!(log.applied_deltas.is_empty());
    }

    #[test]
    fn test_free_text_high_confidence_applies_and_clamps() {
        let state = EngineState::initial(8);
        let content = content_step(StepType::Normal, vec![]);
        let turn = Turn::FreeText {
            text: Some("I sneak past the guards".to_owned()),
            classifier: Some(ClassifierOutcome {
                confidence: 0.9,
                safety: SafetyVerdict::Clear,
                deltas: vec![delta(TraitId::T1, 2), delta(TraitId::T2, 2)],
            }),
        };

        let (new_state, log) = engine().apply(&state, &turn, &content);

        assert_eq!(log.neutral_reason, None);
        assert!(log.classifier_delta_clamped);
        let sum: i32 = log.applied_deltas.iter().map(|d| d.delta.abs()).sum();
        assert!(sum <= 2);
        let moved = new_state.trait_value(TraitId::T1) + new_state.trait_value(TraitId::T2);
        assert!(moved <= 12);
    }

    #[test]
    fn test_apply_is_deterministic() {
        let state = EngineState::initial(8);
        let content = content_step(
            StepType::Normal,
            vec![choice_with_deltas("A", vec![delta(TraitId::T1, 1)])],
        );
        let turn = Turn::choice("A");

        let first = engine().apply(&state, &turn, &content);
        let second = engine().apply(&state, &turn, &content);

        assert_eq!(first, second);
        // The audit log must serialize cleanly for JSONB persistence.
        serde_json::to_value(&first.1).unwrap();
        serde_json::to_value(&first.0).unwrap();
    }
}
