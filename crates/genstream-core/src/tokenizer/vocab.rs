//! Vocabulary management and a greedy longest-match tokenizer
//!
//! Pieces follow the SentencePiece convention: a word boundary is written as
//! `▁` (U+2581) inside the piece text, and the normalizer turns it back into a
//! space after decoding.

use super::Tokenizer;
use crate::{CoreError, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::debug;

/// Word boundary marker used inside pieces
pub const WORD_BOUNDARY: char = '\u{2581}';

/// Vocabulary container for token-to-id and id-to-token mappings
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    token_to_id: HashMap<String, u32>,
    id_to_token: HashMap<u32, String>,
    special_tokens: HashMap<String, u32>,
    unk_token_id: Option<u32>,
    bos_token_id: Option<u32>,
    eos_token_id: Option<u32>,
    /// Length in chars of the longest token, bounds the matcher's lookahead
    max_token_chars: usize,
}

impl Vocabulary {
    /// Create a new empty vocabulary
    pub fn new() -> Self {
        Self::default()
    }

    /// Create vocabulary with special tokens at the first ids
    pub fn with_special_tokens(
        unk_token: Option<&str>,
        bos_token: Option<&str>,
        eos_token: Option<&str>,
    ) -> Self {
        let mut vocab = Self::new();
        let mut current_id = 0u32;

        if let Some(token) = unk_token {
            vocab.add_special_token(token, current_id);
            vocab.unk_token_id = Some(current_id);
            current_id += 1;
        }

        if let Some(token) = bos_token {
            vocab.add_special_token(token, current_id);
            vocab.bos_token_id = Some(current_id);
            current_id += 1;
        }

        if let Some(token) = eos_token {
            vocab.add_special_token(token, current_id);
            vocab.eos_token_id = Some(current_id);
        }

        vocab
    }

    /// Load vocabulary from a text file.
    /// Format: one token per line, ID is the line number
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            CoreError::tokenizer(
                "TOKENIZER_VOCAB_FILE_OPEN_ERROR",
                format!("Failed to open vocabulary file: {}", e),
                format!("Loading {}", path.display()),
                "Check file path and permissions",
            )
        })?;

        let reader = BufReader::new(file);
        let mut vocab = Self::new();

        for (idx, line) in reader.lines().enumerate() {
            let token = line.map_err(|e| {
                CoreError::tokenizer(
                    "TOKENIZER_VOCAB_LINE_READ_ERROR",
                    format!("Failed to read vocabulary line {}: {}", idx + 1, e),
                    "vocabulary file parsing",
                    "Check file format and encoding",
                )
            })?;
            vocab.add_token(token, idx as u32);
        }

        vocab.detect_special_tokens();
        debug!("Loaded {} vocabulary entries from {}", vocab.size(), path.display());
        Ok(vocab)
    }

    /// Load vocabulary from a JSON object mapping token text to id
    pub fn from_json(json_str: &str) -> Result<Self> {
        let token_map: HashMap<String, u32> = serde_json::from_str(json_str).map_err(|e| {
            CoreError::tokenizer(
                "TOKENIZER_VOCAB_JSON_PARSE_ERROR",
                format!("Failed to parse JSON vocabulary: {}", e),
                "JSON vocabulary file parsing",
                "Check JSON format and syntax",
            )
        })?;

        let mut vocab = Self::new();
        for (token, id) in token_map {
            vocab.add_token(token, id);
        }

        vocab.detect_special_tokens();
        Ok(vocab)
    }

    /// Load from disk, choosing the format by file extension
    pub fn load(path: &Path) -> Result<Self> {
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            let content = std::fs::read_to_string(path)?;
            Self::from_json(&content)
        } else {
            Self::from_file(path)
        }
    }

    /// Mark the conventional `<unk>`, `<s>`, `</s>` entries as special
    fn detect_special_tokens(&mut self) {
        for (token, slot) in [("<unk>", 0), ("<s>", 1), ("</s>", 2)] {
            if let Some(id) = self.token_to_id(token) {
                self.special_tokens.insert(token.to_string(), id);
                match slot {
                    0 => self.unk_token_id = Some(id),
                    1 => self.bos_token_id = Some(id),
                    _ => self.eos_token_id = Some(id),
                }
            }
        }
    }

    /// Add a token to the vocabulary
    pub fn add_token(&mut self, token: String, id: u32) {
        self.max_token_chars = self.max_token_chars.max(token.chars().count());
        self.token_to_id.insert(token.clone(), id);
        self.id_to_token.insert(id, token);
    }

    /// Add a special token
    pub fn add_special_token(&mut self, token: &str, id: u32) {
        self.special_tokens.insert(token.to_string(), id);
        self.add_token(token.to_string(), id);
    }

    /// Get token ID
    pub fn token_to_id(&self, token: &str) -> Option<u32> {
        self.token_to_id.get(token).copied()
    }

    /// Get token by ID
    pub fn id_to_token(&self, id: u32) -> Option<&str> {
        self.id_to_token.get(&id).map(|s| s.as_str())
    }

    /// Get vocabulary size
    pub fn size(&self) -> usize {
        self.token_to_id.len()
    }

    /// Check if a token is special
    pub fn is_special_token(&self, token: &str) -> bool {
        self.special_tokens.contains_key(token)
    }

    pub fn unk_token_id(&self) -> Option<u32> {
        self.unk_token_id
    }

    pub fn bos_token_id(&self) -> Option<u32> {
        self.bos_token_id
    }

    pub fn eos_token_id(&self) -> Option<u32> {
        self.eos_token_id
    }

    pub fn max_token_chars(&self) -> usize {
        self.max_token_chars
    }
}

/// Builder for creating vocabularies
#[derive(Default)]
pub struct VocabularyBuilder {
    tokens: Vec<String>,
    unk_token: Option<String>,
    bos_token: Option<String>,
    eos_token: Option<String>,
}

impl VocabularyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_token(mut self, token: impl Into<String>) -> Self {
        self.tokens.push(token.into());
        self
    }

    pub fn add_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tokens.extend(tokens.into_iter().map(Into::into));
        self
    }

    pub fn set_unk_token(mut self, token: impl Into<String>) -> Self {
        self.unk_token = Some(token.into());
        self
    }

    pub fn set_bos_token(mut self, token: impl Into<String>) -> Self {
        self.bos_token = Some(token.into());
        self
    }

    pub fn set_eos_token(mut self, token: impl Into<String>) -> Self {
        self.eos_token = Some(token.into());
        self
    }

    pub fn build(self) -> Vocabulary {
        let mut vocab = Vocabulary::with_special_tokens(
            self.unk_token.as_deref(),
            self.bos_token.as_deref(),
            self.eos_token.as_deref(),
        );

        let mut current_id = vocab.size() as u32;

        for token in self.tokens {
            if vocab.token_to_id(&token).is_none() {
                vocab.add_token(token, current_id);
                current_id += 1;
            }
        }

        vocab
    }
}

/// Greedy longest-match tokenizer over a [`Vocabulary`]
#[derive(Debug, Clone)]
pub struct VocabTokenizer {
    vocab: Vocabulary,
    /// Prepend a word boundary to non-empty input, as SentencePiece does
    add_dummy_prefix: bool,
}

impl VocabTokenizer {
    pub fn new(vocab: Vocabulary) -> Self {
        Self {
            vocab,
            add_dummy_prefix: true,
        }
    }

    pub fn with_dummy_prefix(mut self, add_dummy_prefix: bool) -> Self {
        self.add_dummy_prefix = add_dummy_prefix;
        self
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        Ok(Self::new(Vocabulary::load(path)?))
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    fn prepare(&self, text: &str) -> String {
        let replaced: String = text
            .chars()
            .map(|c| if c == ' ' { WORD_BOUNDARY } else { c })
            .collect();
        if self.add_dummy_prefix && !replaced.is_empty() && !replaced.starts_with(WORD_BOUNDARY) {
            format!("{}{}", WORD_BOUNDARY, replaced)
        } else {
            replaced
        }
    }
}

impl Tokenizer for VocabTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let text = self.prepare(text);
        let offsets: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let num_chars = offsets.len() - 1;

        let mut ids = Vec::with_capacity(num_chars);
        let mut pos = 0;
        while pos < num_chars {
            let max_end = (pos + self.vocab.max_token_chars()).min(num_chars);
            let matched = (pos + 1..=max_end).rev().find_map(|end| {
                self.vocab
                    .token_to_id(&text[offsets[pos]..offsets[end]])
                    .map(|id| (id, end))
            });

            match (matched, self.vocab.unk_token_id()) {
                (Some((id, end)), _) => {
                    ids.push(id);
                    pos = end;
                }
                (None, Some(unk)) => {
                    ids.push(unk);
                    pos += 1;
                }
                (None, None) => {
                    let ch = &text[offsets[pos]..offsets[pos + 1]];
                    return Err(CoreError::tokenizer(
                        "TOKENIZER_UNKNOWN_CHARACTER",
                        format!("No vocabulary entry covers {:?}", ch),
                        format!("Encoding at char offset {}", pos),
                        "Add an <unk> entry to the vocabulary or extend it to cover this text",
                    ));
                }
            }
        }

        Ok(ids)
    }

    fn id_to_piece(&self, id: u32) -> Result<String> {
        self.vocab
            .id_to_token(id)
            .map(str::to_string)
            .ok_or_else(|| {
                CoreError::tokenizer(
                    "TOKENIZER_UNKNOWN_ID",
                    format!("Token id {} is not in the vocabulary", id),
                    "Decoding a generated token",
                    "Check that the model and tokenizer come from the same checkpoint",
                )
            })
    }

    fn vocab_size(&self) -> usize {
        self.vocab.size()
    }
}
