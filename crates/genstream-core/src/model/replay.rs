//! A language model that plays back a recorded token transcript.
//!
//! Useful for dry runs of stop-sequence and budget configuration against
//! output captured from a real model, and as the deterministic model in tests.

use super::LanguageModel;
use crate::{tokenizer::Tokenizer, CoreError, Result};
use parking_lot::Mutex;
use std::time::Duration;
use tracing::trace;

#[derive(Debug, Default)]
struct ReplayState {
    seeded: bool,
    cursor: usize,
    seed_len: usize,
    calls: usize,
}

/// Replays `transcript` one token per step after every seeding
#[derive(Debug)]
pub struct ReplayModel {
    name: String,
    transcript: Vec<u32>,
    /// Emitted once the transcript is exhausted; `None` makes that an error
    fill_token: Option<u32>,
    /// Simulated compute time per step
    step_delay: Duration,
    state: Mutex<ReplayState>,
}

impl ReplayModel {
    pub fn new(transcript: Vec<u32>) -> Self {
        Self {
            name: "replay".to_string(),
            transcript,
            fill_token: None,
            step_delay: Duration::ZERO,
            state: Mutex::new(ReplayState::default()),
        }
    }

    /// Build a transcript by encoding `text` with `tokenizer`
    pub fn from_text(tokenizer: &dyn Tokenizer, text: &str) -> Result<Self> {
        Ok(Self::new(tokenizer.encode(text)?))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_fill_token(mut self, token: u32) -> Self {
        self.fill_token = Some(token);
        self
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    pub fn transcript(&self) -> &[u32] {
        &self.transcript
    }

    /// Number of `next_token` calls since construction
    pub fn calls(&self) -> usize {
        self.state.lock().calls
    }

    /// Length of the most recent seed sequence
    pub fn last_seed_len(&self) -> usize {
        self.state.lock().seed_len
    }
}

impl LanguageModel for ReplayModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn init_input_tokens(&self, input_ids: &[u32]) -> Result<()> {
        if input_ids.is_empty() {
            return Err(CoreError::model(
                "MODEL_EMPTY_SEED",
                "Cannot seed the model with an empty token sequence",
                "Prefilling input tokens",
                "Prepend the start token before seeding",
            ));
        }

        let mut state = self.state.lock();
        state.seeded = true;
        state.cursor = 0;
        state.seed_len = input_ids.len();
        trace!("Replay model '{}' seeded with {} tokens", self.name, input_ids.len());
        Ok(())
    }

    fn next_token(&self) -> Result<u32> {
        if !self.step_delay.is_zero() {
            std::thread::sleep(self.step_delay);
        }

        let mut state = self.state.lock();
        state.calls += 1;
        if !state.seeded {
            return Err(CoreError::model(
                "MODEL_NOT_SEEDED",
                "next_token called before init_input_tokens",
                "Decode step",
                "Seed the model with the prompt tokens first",
            ));
        }

        let token = match self.transcript.get(state.cursor) {
            Some(&token) => token,
            None => self.fill_token.ok_or_else(|| {
                CoreError::model(
                    "MODEL_TRANSCRIPT_EXHAUSTED",
                    format!("Replay transcript of {} tokens is exhausted", self.transcript.len()),
                    "Decode step",
                    "Record a longer transcript, configure a fill token, or lower the token budget",
                )
            })?,
        };
        state.cursor += 1;
        Ok(token)
    }
}
