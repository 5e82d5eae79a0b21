//! Command implementations for the genstream CLI

pub mod count;
pub mod run;

use anyhow::{Context, Result};
use async_trait::async_trait;
use genstream_core::prelude::*;
use std::path::{Path, PathBuf};

use crate::config::Config;

/// Trait for CLI command execution
#[async_trait]
pub trait Command {
    /// Execute the command
    async fn execute(&self, config: &Config, json_output: bool) -> Result<()>;
}

/// Resolve the vocabulary from an explicit path or the configured default
pub fn resolve_vocab_path(vocab: Option<&Path>, config: &Config) -> Result<PathBuf> {
    match vocab {
        Some(path) => config.find_vocab(&path.to_string_lossy()),
        None => match &config.default_vocab {
            Some(default_vocab) => config.find_vocab(&default_vocab.to_string_lossy()),
            None => anyhow::bail!(
                "No vocabulary specified and no default vocabulary configured\n\
                Suggestion: Use --vocab /path/to/vocab.json or set default_vocab in the config file"
            ),
        },
    }
}

/// Load a vocabulary tokenizer honoring the configured dummy-prefix setting
pub fn load_tokenizer(path: &Path, config: &Config) -> Result<VocabTokenizer> {
    let tokenizer = VocabTokenizer::from_path(path)
        .with_context(|| format!("Failed to load vocabulary: {}", path.display()))?;
    Ok(tokenizer.with_dummy_prefix(config.add_dummy_prefix))
}
