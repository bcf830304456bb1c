//! Participant turns — the transient input applied to a session state.

use serde::{Deserialize, Serialize};

use crate::content::Delta;

/// Safety verdict attached to a classified free-text turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyVerdict {
    Clear,
    Unclear,
}

/// Result of the external free-text classifier, if one ran for this turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierOutcome {
    /// Classifier confidence in `[0, 1]`.
    pub confidence: f64,
    /// Safety verdict; anything but `clear` keeps the turn neutral.
    pub safety: SafetyVerdict,
    /// Trait deltas the classifier derived from the text.
    pub deltas: Vec<Delta>,
}

/// Discriminant of a turn, kept for audit logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    Choice,
    FreeText,
}

/// One participant input for the current step. Never stored mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Turn {
    /// A tap on one of the offered choices.
    Choice {
        /// Identifier of the chosen option.
        choice_id: Option<String>,
    },
    /// Free-form text, optionally pre-classified by an external model.
    FreeText {
        /// The raw text as submitted.
        text: Option<String>,
        /// Classifier output, when a classifier ran.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        classifier: Option<ClassifierOutcome>,
    },
}

impl Turn {
    /// A choice turn.
    #[must_use]
    pub fn choice(choice_id: impl Into<String>) -> Self {
        Self::Choice {
            choice_id: Some(choice_id.into()),
        }
    }

    /// A free-text turn without classifier output.
    #[must_use]
    pub fn free_text(text: impl Into<String>) -> Self {
        Self::FreeText {
            text: Some(text.into()),
            classifier: None,
        }
    }

    /// The kind discriminant.
    #[must_use]
    pub fn kind(&self) -> TurnKind {
        match self {
            Self::Choice { .. } => TurnKind::Choice,
            Self::FreeText { .. } => TurnKind::FreeText,
        }
    }

    /// The choice id, if this is a choice turn with a non-empty id.
    #[must_use]
    pub fn choice_id(&self) -> Option<&str> {
        match self {
            Self::Choice { choice_id } => choice_id.as_deref().filter(|id| !id.is_empty()),
            Self::FreeText { .. } => None,
        }
    }

    /// The submitted text, if this is a free-text turn.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::FreeText { text, .. } => text.as_deref(),
            Self::Choice { .. } => None,
        }
    }

    /// Whether the turn carries any participant input at all. Turns without
    /// input are rejected by the commit protocol as invalid.
    #[must_use]
    pub fn has_input(&self) -> bool {
        match self {
            Self::Choice { .. } => self.choice_id().is_some(),
            Self::FreeText { text, .. } => text.as_deref().is_some_and(|t| !t.is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_serializes_with_kind_tag() {
        let json = serde_json::to_value(Turn::choice("A")).unwrap();
        assert_eq!(json["kind"], "choice");
        assert_eq!(json["choice_id"], "A");

        let json = serde_json::to_value(Turn::free_text("onward")).unwrap();
        assert_eq!(json["kind"], "free_text");
        assert_eq!(json["text"], "onward");
        assert!(json.get("classifier").is_none());
    }

    #[test]
    fn test_empty_choice_id_counts_as_missing_input() {
        let turn = Turn::Choice {
            choice_id: Some(String::new()),
        };

        assert!(turn.choice_id().is_none());
        assert!(!turn.has_input());
    }

    #[test]
    fn test_has_input() {
        assert!(Turn::choice("A").has_input());
        assert!(Turn::free_text("hello").has_input());
        assert!(!Turn::Choice { choice_id: None }.has_input());
        assert!(
            !Turn::FreeText {
                text: None,
                classifier: None
            }
            .has_input()
        );
    }
}
