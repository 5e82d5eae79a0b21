//! Generation state machine: prompt encoding, model seeding and the decode loop

use crate::{
    engine::Engine,
    generation::{
        assembler::{Assembled, TokenStreamAssembler},
        FinishReason, GenerationOutcome, GenerationStats,
    },
    response::ResponseContext,
    Result,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, trace};

/// Counters a session exposes while its request runs
#[derive(Debug, Default)]
pub struct GenerationProgress {
    response_count: AtomicUsize,
    max_output_tokens: AtomicUsize,
}

impl GenerationProgress {
    pub fn response_count(&self) -> usize {
        self.response_count.load(Ordering::Acquire)
    }

    pub fn max_output_tokens(&self) -> usize {
        self.max_output_tokens.load(Ordering::Acquire)
    }

    pub(crate) fn reset(&self) {
        self.response_count.store(0, Ordering::Release);
        self.max_output_tokens.store(0, Ordering::Release);
    }

    fn begin(&self, max_output_tokens: usize) {
        self.response_count.store(0, Ordering::Release);
        self.max_output_tokens.store(max_output_tokens, Ordering::Release);
    }

    fn advance(&self) -> usize {
        self.response_count.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Drives one request from prompt to final chunk.
///
/// The sync and async session APIs both run through [`GenerationPipeline::run`].
pub struct GenerationPipeline<'a> {
    engine: &'a Engine,
    session_id: &'a str,
    early_stop: &'a AtomicBool,
    progress: &'a GenerationProgress,
}

impl<'a> GenerationPipeline<'a> {
    pub fn new(
        engine: &'a Engine,
        session_id: &'a str,
        early_stop: &'a AtomicBool,
        progress: &'a GenerationProgress,
    ) -> Self {
        Self {
            engine,
            session_id,
            early_stop,
            progress,
        }
    }

    /// Generate a response for `prompt`, handing every chunk to `emit` in
    /// order. The last chunk emitted on success has `done == true`.
    pub fn run<F>(&self, prompt: &str, mut emit: F) -> Result<GenerationOutcome>
    where
        F: FnMut(ResponseContext),
    {
        let start_time = Instant::now();
        let config = self.engine.config();

        let mut input_ids = self.engine.tokenizer().encode(prompt)?;
        input_ids.insert(0, config.start_token_id);
        let prompt_tokens = input_ids.len();
        let max_output_tokens = config.max_num_tokens.saturating_sub(prompt_tokens);
        self.progress.begin(max_output_tokens);

        self.engine.model().init_input_tokens(&input_ids)?;
        debug!(
            "Session '{}' seeded model with {} prompt tokens, output budget {}",
            self.session_id, prompt_tokens, max_output_tokens
        );

        let mut assembler = TokenStreamAssembler::from_config(config);
        let mut output = String::new();
        let mut first_token_at = None;

        let finish_reason = if max_output_tokens == 0 {
            emit(ResponseContext::chunk(String::new(), true));
            FinishReason::MaxTokens
        } else {
            loop {
                if self.is_cancelled() {
                    break self.finish_cancelled(&mut assembler, &mut output, &mut emit);
                }

                let token_id = self.engine.model().next_token()?;
                if self.is_cancelled() {
                    break self.finish_cancelled(&mut assembler, &mut output, &mut emit);
                }

                first_token_at.get_or_insert_with(Instant::now);
                let count = self.progress.advance();

                let piece = self.engine.tokenizer().id_to_piece(token_id)?;
                let piece = match self.engine.normalizer() {
                    Some(normalizer) => normalizer.normalize(&piece),
                    None => piece,
                };

                let Assembled {
                    mut ready,
                    should_stop,
                } = assembler.push(&piece);
                let budget_reached = count >= max_output_tokens;
                if budget_reached && !should_stop {
                    ready.push_str(&assembler.flush());
                }
                let done = should_stop || budget_reached;

                trace!(
                    "Session '{}' step {}/{}: token {} -> {:?}, released {:?}",
                    self.session_id,
                    count,
                    max_output_tokens,
                    token_id,
                    piece,
                    ready
                );

                output.push_str(&ready);
                emit(ResponseContext::chunk(ready, done));

                if should_stop {
                    break FinishReason::StopSequence;
                }
                if budget_reached {
                    break FinishReason::MaxTokens;
                }
            }
        };

        let tokens_generated = self.progress.response_count();
        let elapsed = start_time.elapsed();
        let tokens_per_second = if elapsed.as_secs_f64() > 0.0 {
            tokens_generated as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        Ok(GenerationOutcome {
            text: output,
            finish_reason,
            tokens_generated,
            prompt_tokens,
            max_output_tokens,
            stats: GenerationStats {
                time_to_first_token_ms: first_token_at
                    .map(|t| t.duration_since(start_time).as_secs_f64() * 1000.0)
                    .unwrap_or(0.0),
                total_time_ms: elapsed.as_secs_f64() * 1000.0,
                tokens_per_second,
            },
        })
    }

    fn is_cancelled(&self) -> bool {
        self.early_stop.load(Ordering::Acquire)
    }

    fn finish_cancelled<F>(
        &self,
        assembler: &mut TokenStreamAssembler,
        output: &mut String,
        emit: &mut F,
    ) -> FinishReason
    where
        F: FnMut(ResponseContext),
    {
        let tail = assembler.flush();
        output.push_str(&tail);
        debug!(
            "Session '{}' cancelled after {} tokens",
            self.session_id,
            self.progress.response_count()
        );
        emit(ResponseContext::chunk(tail, true));
        FinishReason::Cancelled
    }
}
