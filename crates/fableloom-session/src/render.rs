//! Step payload rendering.

use fableloom_engine::{ContentProvider, EngineState, FinalId};

use crate::domain::payload::{ChoiceRef, StepPayload};
use crate::domain::session::SessionRecord;

/// Renders the view of the step the given state stands on.
#[must_use]
pub fn render_step(
    session: &SessionRecord,
    state: &EngineState,
    provider: &dyn ContentProvider,
) -> StepPayload {
    if state.step0 >= state.total_steps {
        return final_payload(None);
    }
    let content = provider.step_content(session.theme_id.as_deref(), state.step0, state);
    let labels: Vec<&str> = content.choices.iter().map(|c| c.label.as_str()).collect();
    let text = format!(
        "Step {}/{}.\n{}\n\nYour choices:\n{}",
        state.step0 + 1,
        state.total_steps,
        content.scene_text,
        labels.join("\n"),
    );
    StepPayload {
        text,
        choices: content
            .choices
            .iter()
            .map(|c| ChoiceRef {
                choice_id: c.choice_id.clone(),
                label: c.label.clone(),
            })
            .collect(),
        allow_free_text: state.free_text_allowed,
        final_id: None,
    }
}

/// Renders the terminal view shown when a story ends.
#[must_use]
pub fn final_payload(final_id: Option<FinalId>) -> StepPayload {
    let text = match final_id {
        Some(id) => format!(
            "Ending {}.\nThanks for playing! Start a new story any time.",
            id.as_str()
        ),
        None => "The story is complete. Start a new one any time.".to_owned(),
    };
    StepPayload {
        text,
        choices: Vec::new(),
        allow_free_text: false,
        final_id,
    }
}
