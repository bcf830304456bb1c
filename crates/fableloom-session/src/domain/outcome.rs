//! Commit outcomes.
//!
//! Stale, duplicate, and invalid turns are routine high-frequency control
//! paths, so they are outcome variants rather than errors.

use super::event::TurnEvent;
use super::session::SessionRecord;

/// Classification of one turn-commit attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The turn was applied; `session` is the post-commit snapshot.
    Accepted {
        session: SessionRecord,
        event: TurnEvent,
    },
    /// The step was already durably recorded; `event` carries the stored
    /// payload to replay. Nothing was recomputed.
    Duplicate {
        session: SessionRecord,
        event: TurnEvent,
    },
    /// The caller referenced a step the session has moved past. `session`
    /// is the authoritative snapshot to resynchronize against.
    Stale { session: SessionRecord },
    /// The turn shape was rejected; no row was written.
    Invalid { session: SessionRecord },
}

impl TurnOutcome {
    /// Short tag for logs.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Accepted { .. } => "accepted",
            Self::Duplicate { .. } => "duplicate",
            Self::Stale { .. } => "stale",
            Self::Invalid { .. } => "invalid",
        }
    }

    /// The session snapshot carried by every outcome.
    #[must_use]
    pub fn session(&self) -> &SessionRecord {
        match self {
            Self::Accepted { session, .. }
            | Self::Duplicate { session, .. }
            | Self::Stale { session }
            | Self::Invalid { session } => session,
        }
    }
}
