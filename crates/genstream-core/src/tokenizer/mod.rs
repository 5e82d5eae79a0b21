//! Tokenizer and normalizer interfaces
//!
//! Sessions consume a tokenizer through two operations: encoding a prompt into
//! token ids and turning a single generated id back into its text piece. An
//! optional normalizer post-processes each piece before it reaches the
//! stop-sequence assembler.

pub mod normalizer;
pub mod vocab;

use crate::Result;

/// Subword tokenizer consumed by engines and sessions.
///
/// Calls are blocking and may be made concurrently from several session
/// threads.
pub trait Tokenizer: Send + Sync {
    /// Encode text into a sequence of token ids (no start token)
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Text piece for a single token id
    fn id_to_piece(&self, id: u32) -> Result<String>;

    /// Number of entries in the vocabulary
    fn vocab_size(&self) -> usize;
}

/// Text normalizer applied to every decoded piece
pub trait Normalizer: Send + Sync {
    fn normalize(&self, text: &str) -> String;
}
