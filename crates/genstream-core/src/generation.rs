//! Generation outcomes and the per-request generation loop

pub mod assembler;
pub mod pipeline;

use serde::{Deserialize, Serialize};

/// Reason generation stopped
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Token budget exhausted
    MaxTokens,

    /// A configured stop sequence appeared in the decoded text
    StopSequence,

    /// The caller cancelled between steps
    Cancelled,
}

/// Statistics about one request
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationStats {
    /// Time from request start to the first generated token (ms)
    pub time_to_first_token_ms: f64,

    /// Total generation time (ms)
    pub total_time_ms: f64,

    /// Generated tokens per second
    pub tokens_per_second: f64,
}

/// Result of one completed request
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutcome {
    /// Full released text, stop sequence excluded
    pub text: String,

    /// Reason generation stopped
    pub finish_reason: FinishReason,

    /// Tokens requested from the model
    pub tokens_generated: usize,

    /// Prompt length in tokens, start token included
    pub prompt_tokens: usize,

    /// Output budget derived from the engine's token budget
    pub max_output_tokens: usize,

    /// Generation statistics
    pub stats: GenerationStats,
}
