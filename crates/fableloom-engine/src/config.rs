//! Engine configuration.
//!
//! The noise thresholds and word list are tuned policy, not algorithmic
//! truth, so they live here instead of in code constants.

use std::collections::BTreeSet;

/// Tunable policy knobs of the narrative engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Free text shorter than this many characters (trimmed) is noise.
    pub noise_min_len: usize,
    /// Consecutive noise turns after which free-text input is withheld.
    pub gate_streak: u32,
    /// Consecutive noise turns that abort the story with the noise ending.
    pub abort_streak: u32,
    /// Classifier confidence below this floor keeps the turn neutral.
    pub confidence_floor: f64,
    /// Exact (lowercased) inputs treated as noise regardless of length.
    pub noise_words: BTreeSet<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let noise_words = [
            "idk", "dunno", "lol", "ok", "okay", "meh", "uh", "um", "hmm", "...", "…",
        ];
        Self {
            noise_min_len: 3,
            gate_streak: 3,
            abort_streak: 5,
            confidence_floor: 0.75,
            noise_words: noise_words.iter().map(|w| (*w).to_owned()).collect(),
        }
    }
}
