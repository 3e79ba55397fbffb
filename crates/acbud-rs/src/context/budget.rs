//! Size estimates for context strings.
//!
//! Token counts are approximated from character counts; the numbers are used
//! for reporting and gating, never for billing.

use serde::Serialize;

/// Default characters per token (conservative estimate for English text).
/// Most tokenizers average 3-4 chars per token; we use 3.5 as a middle ground.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.5;

/// Estimate the token count of `text`.
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() as f64 / DEFAULT_CHARS_PER_TOKEN).ceil() as usize
}

/// Whitespace-separated word count.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Character, word and estimated token counts of one string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TextSize {
    pub chars: usize,
    pub words: usize,
    pub est_tokens: usize,
}

impl TextSize {
    pub fn of(text: &str) -> Self {
        Self {
            chars: text.chars().count(),
            words: word_count(text),
            est_tokens: estimate_tokens(text),
        }
    }

    /// Compact one-line rendering for logs.
    pub fn to_log_string(&self) -> String {
        format!(
            "{} chars / {} words / ~{} tokens",
            self.chars, self.words, self.est_tokens
        )
    }
}
