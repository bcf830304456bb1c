//! Session rows and keys.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fableloom_engine::{EngineState, FinalId, state::STATE_VERSION};

/// Length of the public session identifier.
const PUBLIC_ID_LEN: usize = 8;

/// Alphabet the public identifier is sampled from.
const PUBLIC_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Generates a fresh public session identifier.
#[must_use]
pub fn new_public_id() -> String {
    let mut rng = rand::rng();
    (0..PUBLIC_ID_LEN)
        .map(|_| char::from(PUBLIC_ID_ALPHABET[rng.random_range(0..PUBLIC_ID_ALPHABET.len())]))
        .collect()
}

/// The pair a caller uses to address one session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    /// The participant that owns the session.
    pub participant_id: i64,
    /// Short public identifier carried in transport callbacks.
    pub public_id: String,
}

/// Session lifecycle status. `Finished` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Active,
    Finished,
    Aborted,
}

impl SessionStatus {
    /// Stable string form, as stored in the session row.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Finished => "FINISHED",
            Self::Aborted => "ABORTED",
        }
    }

    /// Parses the stored string form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ACTIVE" => Some(Self::Active),
            "FINISHED" => Some(Self::Finished),
            "ABORTED" => Some(Self::Aborted),
            _ => None,
        }
    }
}

/// One stored session. Mutated only through the turn commit protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub participant_id: i64,
    pub public_id: String,
    pub status: SessionStatus,
    pub theme_id: Option<String>,
    /// Authoritative current step (mirrors the engine state's `step0`).
    pub step: i32,
    pub max_steps: i32,
    /// Engine state as stored in the JSONB column.
    pub engine_state: serde_json::Value,
    /// Accumulated story facts (opaque to this core).
    pub facts: serde_json::Value,
    pub ending_id: Option<FinalId>,
    pub ending_meta: Option<serde_json::Value>,
    /// Transport reference of the last delivered step message.
    pub last_delivered_message_ref: Option<i64>,
    pub last_delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    /// The key this session is addressed by.
    #[must_use]
    pub fn key(&self) -> SessionKey {
        SessionKey {
            participant_id: self.participant_id,
            public_id: self.public_id.clone(),
        }
    }

    /// Decodes the stored engine state, falling back to a fresh state when
    /// the stored JSON is absent, corrupt, or from another engine version.
    /// The fallback is persisted by the next committed turn.
    #[must_use]
    pub fn engine_state_or_initial(&self) -> EngineState {
        match serde_json::from_value::<EngineState>(self.engine_state.clone()) {
            Ok(state) if state.version == STATE_VERSION => state,
            _ => EngineState::initial(self.max_steps),
        }
    }
}
