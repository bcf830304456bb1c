//! Noise classification for free-text turns.

use crate::config::EngineConfig;

/// Whether a free-text input is too short or too low-content to carry
/// narrative intent. Absent text is always noise.
#[must_use]
pub fn is_noise(text: Option<&str>, config: &EngineConfig) -> bool {
    let Some(text) = text else {
        return true;
    };
    let trimmed = text.trim();
    if trimmed.chars().count() < config.noise_min_len {
        return true;
    }
    if !text.is_empty() && text.chars().all(|c| c.is_whitespace() || c == '.' || c == '…') {
        return true;
    }
    config.noise_words.contains(&trimmed.to_lowercase())
}
