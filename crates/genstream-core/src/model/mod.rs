//! Language model interface

pub mod replay;

use crate::Result;

/// Core trait for autoregressive language models driven by a session.
///
/// A session seeds the model once with the prompt tokens and then asks for
/// one token per step. Both calls block until the computation finishes.
/// Implementations shared by several engines or sessions must tolerate
/// concurrent calls; this crate does not serialize them.
pub trait LanguageModel: Send + Sync {
    /// Get the model name
    fn name(&self) -> &str;

    /// Reset the model state and prefill it with `input_ids`
    fn init_input_tokens(&self, input_ids: &[u32]) -> Result<()>;

    /// Run one decode step and return the produced token id
    fn next_token(&self) -> Result<u32>;
}
