//! Fixture content catalog — a deterministic `ContentProvider` that covers
//! every step type and milestone without external content.

use fableloom_engine::{
    Choice, ContentProvider, ContentStep, Delta, EngineState, Milestones, MilestoneVote, StepType,
    TraitId,
};

fn trait_label(trait_id: TraitId) -> &'static str {
    match trait_id {
        TraitId::T1 => "Courage",
        TraitId::T2 => "Kindness",
        TraitId::T3 => "Wisdom",
        TraitId::T4 => "Honesty",
        TraitId::T5 => "Responsibility",
        TraitId::T6 => "Imagination",
    }
}

/// Which three traits the step's choices move, rotating by step.
fn choice_traits(step0: i32) -> [TraitId; 3] {
    match step0.rem_euclid(3) {
        0 => [TraitId::T1, TraitId::T2, TraitId::T3],
        1 => [TraitId::T4, TraitId::T5, TraitId::T6],
        _ => [TraitId::T1, TraitId::T5, TraitId::T6],
    }
}

/// Deterministic catalog: three choices (`A`, `B`, `C`) per step, each
/// bumping one trait by one; SEMI weight at `m2`, HEAVY at `m6`/`m7`;
/// milestone votes attached on milestone steps.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureContentProvider;

impl ContentProvider for FixtureContentProvider {
    fn step_content(&self, theme_id: Option<&str>, step0: i32, state: &EngineState) -> ContentStep {
        let milestones = Milestones::for_total_steps(state.total_steps);
        let step_type = if step0 == milestones.m2 {
            StepType::Semi
        } else if step0 == milestones.m6 || step0 == milestones.m7 {
            StepType::Heavy
        } else {
            StepType::Normal
        };
        let at_milestone = milestones.milestone_at(step0).is_some();

        let choices = choice_traits(step0)
            .into_iter()
            .enumerate()
            .map(|(idx, trait_id)| {
                let choice_id = char::from(b'A' + u8::try_from(idx).unwrap_or(0)).to_string();
                Choice {
                    label: format!("{choice_id} — {}", trait_label(trait_id)),
                    choice_id,
                    deltas: vec![Delta { trait_id, delta: 1 }],
                    milestone_vote: if at_milestone {
                        MilestoneVote {
                            vote: Some(trait_id),
                            reason: Some("content".to_owned()),
                        }
                    } else {
                        MilestoneVote::none()
                    },
                }
            })
            .collect();

        ContentStep {
            scene_text: format!(
                "Theme {}: scene {}.\nThe hero faces a choice that changes the course of the story.",
                theme_id.unwrap_or("default"),
                step0 + 1,
            ),
            step_type,
            choices,
        }
    }
}
