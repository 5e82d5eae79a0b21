//! Count command: size of a text in tokens

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Args;
use genstream_core::prelude::*;
use serde_json::json;
use std::path::PathBuf;
use tracing::debug;

use crate::commands::{load_tokenizer, resolve_vocab_path, Command};
use crate::config::Config;
use crate::utils::print_output;

#[derive(Args, Debug)]
pub struct CountCommand {
    /// Text to count
    #[arg(conflicts_with = "file")]
    pub text: Option<String>,

    /// Read the text from a file
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Vocabulary file (one token per line, or a JSON token-to-id map)
    #[arg(long)]
    pub vocab: Option<PathBuf>,
}

#[async_trait]
impl Command for CountCommand {
    async fn execute(&self, config: &Config, json_output: bool) -> Result<()> {
        debug!("Executing count command: {:?}", self);

        let text = match (&self.text, &self.file) {
            (Some(text), _) => text.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read input file: {}", path.display()))?,
            (None, None) => anyhow::bail!(
                "No input specified\n\
                Suggestion: Pass the text as an argument or use --file path/to/input.txt"
            ),
        };

        let vocab_path = resolve_vocab_path(self.vocab.as_deref(), config)?;
        let tokenizer = load_tokenizer(&vocab_path, config)?;
        let engine = Engine::builder()
            .config(config.engine.clone())
            .tokenizer(tokenizer)
            .model(ReplayModel::new(vec![]))
            .build()?;
        let session = engine.create_session();

        let tokens = session.size_in_tokens(&text)?;

        let output = json!({
            "vocab": vocab_path.to_string_lossy(),
            "chars": text.chars().count(),
            "tokens": tokens,
        });
        print_output(&output, json_output)
    }
}
