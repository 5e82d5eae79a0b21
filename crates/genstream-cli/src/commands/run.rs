//! Run command: one generation request through a session
//!
//! The model is a replayed transcript, so a run shows exactly which chunks a
//! session releases for a given stop list, budget and trailing window.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Args;
use console::style;
use futures::StreamExt;
use genstream_core::prelude::*;
use serde_json::json;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::commands::{load_tokenizer, resolve_vocab_path, Command};
use crate::config::Config;
use crate::utils::{create_spinner, format_duration, print_output, print_success, print_warning};

#[derive(Args, Debug)]
pub struct RunCommand {
    /// Vocabulary file (one token per line, or a JSON token-to-id map)
    #[arg(long)]
    pub vocab: Option<PathBuf>,

    /// Text the replayed model produces, encoded with the vocabulary
    #[arg(short, long, conflicts_with = "transcript_file")]
    pub transcript: Option<String>,

    /// File holding the replayed model output
    #[arg(long)]
    pub transcript_file: Option<PathBuf>,

    /// Input text or prompt
    #[arg(short, long, default_value = "")]
    pub prompt: String,

    /// Stop sequence (repeatable, checked in the given order)
    #[arg(short, long = "stop")]
    pub stop: Vec<String>,

    /// Token budget, prompt and start token included
    #[arg(long)]
    pub max_tokens: Option<usize>,

    /// Minimum number of trailing chars withheld mid-stream
    #[arg(long)]
    pub trailing_window: Option<usize>,

    /// Token id prepended to the encoded prompt
    #[arg(long)]
    pub start_token: Option<u32>,

    /// Engine configuration file (TOML), used instead of the CLI config defaults
    #[arg(long)]
    pub engine_config: Option<PathBuf>,

    /// Print chunks as the session releases them
    #[arg(long)]
    pub stream: bool,

    /// Simulated model time per token, in milliseconds
    #[arg(long, default_value = "0")]
    pub step_delay_ms: u64,

    /// Skip normalization of decoded pieces
    #[arg(long)]
    pub no_normalize: bool,

    /// Show timing information
    #[arg(long)]
    pub timing: bool,
}

#[async_trait]
impl Command for RunCommand {
    async fn execute(&self, config: &Config, json_output: bool) -> Result<()> {
        debug!("Executing run command: {:?}", self);

        self.validate_arguments().context("Command validation failed")?;

        let engine = self.build_engine(config)?;
        info!("Engine ready: {:?}", engine);

        let mut session = engine.create_session();
        let prompt = self.prompt.clone();
        let start_time = Instant::now();

        let outcome = if self.stream {
            let mut stream = session.predict_stream(prompt)?;
            let mut stdout = io::stdout();
            let mut chunks = 0usize;
            while let Some(chunk) = stream.next().await {
                chunks += 1;
                if json_output {
                    writeln!(stdout, "{}", serde_json::to_string(&chunk)?)?;
                } else {
                    write!(stdout, "{}", chunk.text())?;
                }
                stdout.flush()?;
            }
            if !json_output {
                writeln!(stdout)?;
            }
            debug!("Received {} chunks", chunks);
            tokio::task::spawn_blocking(move || session.wait()).await??
        } else {
            let spinner = (!json_output).then(|| create_spinner("Generating..."));
            let outcome = tokio::task::spawn_blocking(move || -> genstream_core::Result<GenerationOutcome> {
                session.predict_async(prompt, |_| {})?;
                session.wait()
            })
            .await?;
            if let Some(spinner) = spinner {
                spinner.finish_and_clear();
            }
            let outcome = outcome?;

            if json_output {
                print_output(&serde_json::to_value(&outcome)?, true)?;
            } else {
                println!("{}", outcome.text);
            }
            outcome
        };

        if outcome.max_output_tokens == 0 && !json_output {
            print_warning("The prompt fills the whole token budget; nothing was generated");
        }

        if self.timing && !json_output {
            self.print_timing(&outcome, start_time.elapsed())?;
        }

        Ok(())
    }
}

impl RunCommand {
    fn validate_arguments(&self) -> Result<()> {
        if self.transcript.is_none() && self.transcript_file.is_none() {
            anyhow::bail!(
                "No model output specified\n\
                Suggestion: Use --transcript 'text' or --transcript-file path/to/output.txt"
            );
        }

        if self.stop.iter().any(|s| s.is_empty()) {
            anyhow::bail!(
                "Stop sequences cannot be empty\n\
                Suggestion: Remove the empty --stop argument"
            );
        }

        if self.max_tokens == Some(0) {
            anyhow::bail!(
                "max_tokens must be greater than 0\n\
                Suggestion: The budget counts the start token and the prompt, so use at least prompt length + 2"
            );
        }

        Ok(())
    }

    fn transcript_text(&self) -> Result<String> {
        match (&self.transcript, &self.transcript_file) {
            (Some(text), _) => Ok(text.clone()),
            (None, Some(path)) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read transcript file: {}", path.display()))?;
                Ok(text.trim_end_matches('\n').to_string())
            }
            (None, None) => anyhow::bail!("No model output specified"),
        }
    }

    /// Engine configuration: file or CLI defaults, then flag overrides
    fn engine_config(&self, config: &Config) -> Result<EngineConfig> {
        let mut engine_config = match &self.engine_config {
            Some(path) => EngineConfig::from_file(path)
                .with_context(|| format!("Failed to load engine config: {}", path.display()))?,
            None => config.engine.clone(),
        };

        if !self.stop.is_empty() {
            engine_config.stop_sequences = self.stop.clone();
        }
        if let Some(max_tokens) = self.max_tokens {
            engine_config.max_num_tokens = max_tokens;
        }
        if let Some(window) = self.trailing_window {
            engine_config.trailing_window = window;
        }
        if let Some(start_token) = self.start_token {
            engine_config.start_token_id = start_token;
        }

        Ok(engine_config)
    }

    fn build_engine(&self, config: &Config) -> Result<Engine> {
        let vocab_path = resolve_vocab_path(self.vocab.as_deref(), config)?;
        let tokenizer = load_tokenizer(&vocab_path, config)?;

        let transcript = self.transcript_text()?;
        let mut engine_config = self.engine_config(config)?;
        let mut model = ReplayModel::from_text(&tokenizer, &transcript)
            .context("Failed to encode the transcript with the vocabulary")?
            .with_step_delay(Duration::from_millis(self.step_delay_ms));
        // once the transcript runs out the model emits end-of-sequence, which ends the run
        let vocab = tokenizer.vocabulary();
        if let Some((eos, piece)) = vocab
            .eos_token_id()
            .and_then(|id| vocab.id_to_token(id).map(|piece| (id, piece.to_string())))
        {
            model = model.with_fill_token(eos);
            if !engine_config.stop_sequences.contains(&piece) {
                engine_config.stop_sequences.push(piece);
            }
        }
        debug!("Replaying {} transcript tokens", model.transcript().len());

        let mut builder = Engine::builder()
            .config(engine_config)
            .tokenizer(tokenizer)
            .model(model);
        if config.normalize && !self.no_normalize {
            builder = builder.normalizer(UnicodeNormalizer::default());
        }

        Ok(builder.build()?)
    }

    fn print_timing(&self, outcome: &GenerationOutcome, elapsed: Duration) -> Result<()> {
        print_success(&format!("Request finished in {}", format_duration(elapsed)));
        let timing = json!({
            "finish_reason": format!("{:?}", outcome.finish_reason),
            "prompt_tokens": outcome.prompt_tokens,
            "tokens_generated": outcome.tokens_generated,
            "max_output_tokens": outcome.max_output_tokens,
            "time_to_first_token": format!("{:.2}ms", outcome.stats.time_to_first_token_ms),
            "tokens_per_second": format!("{:.1}", outcome.stats.tokens_per_second),
        });
        println!("{}", style("Timing").bold().underlined());
        print_output(&timing, false)
    }
}
