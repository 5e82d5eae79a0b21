//! Configuration for engines and the sessions derived from them

use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Minimum number of trailing characters withheld from release while
/// generation is mid-stream.
pub const DEFAULT_TRAILING_WINDOW: usize = 10;

/// Generation configuration shared read-only by every session of an engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Token id prepended to every encoded prompt
    pub start_token_id: u32,

    /// Stop sequences, checked in this order
    pub stop_sequences: Vec<String>,

    /// Absolute token budget per request, prompt and start token included
    pub max_num_tokens: usize,

    /// Lower bound on the withheld trailing window (in chars). The effective
    /// window is never shorter than the longest stop sequence.
    pub trailing_window: usize,

    /// What a session does when the tokenizer or model fails mid-request
    pub error_policy: ErrorPolicy,

    /// Compute backend
    pub backend: Backend,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            start_token_id: 2,
            stop_sequences: vec![],
            max_num_tokens: 512,
            trailing_window: DEFAULT_TRAILING_WINDOW,
            error_policy: ErrorPolicy::Report,
            backend: Backend::Cpu,
        }
    }
}

/// Handling of tokenizer/model failures inside a running session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Finish the request and surface the error from `Session::wait`
    Report,
    /// Log and abort the process
    Abort,
}

/// Compute backends an engine can be created for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Cpu,
    Gpu,
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| CoreError::Configuration {
            code: "CONFIG_PARSE_ERROR",
            message: format!("Failed to parse engine configuration: {}", e),
            context: format!("Reading {}", path.display()),
            suggestion: "Check the TOML syntax and field names".to_string(),
            config_path: Some(path.to_path_buf()),
            field_name: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| CoreError::Configuration {
            code: "CONFIG_SERIALIZE_ERROR",
            message: format!("Failed to serialize engine configuration: {}", e),
            context: format!("Writing {}", path.display()),
            suggestion: "Report this as a bug".to_string(),
            config_path: Some(path.to_path_buf()),
            field_name: None,
        })?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_num_tokens == 0 {
            return Err(CoreError::configuration(
                "CONFIG_ZERO_TOKEN_BUDGET",
                "max_num_tokens must be greater than 0",
                "max_num_tokens",
                "Set the token budget to at least the prompt length plus one",
            ));
        }

        if self.trailing_window == 0 {
            return Err(CoreError::configuration(
                "CONFIG_ZERO_TRAILING_WINDOW",
                "trailing_window must be greater than 0",
                "trailing_window",
                "Use the default window of 10 characters",
            ));
        }

        if self.stop_sequences.iter().any(String::is_empty) {
            return Err(CoreError::configuration(
                "CONFIG_EMPTY_STOP_SEQUENCE",
                "Stop sequences must not be empty strings",
                "stop_sequences",
                "Remove the empty entry; an empty stop sequence matches every step",
            ));
        }

        Ok(())
    }

    /// Window actually withheld by the assembler: the configured minimum,
    /// widened to fit the longest stop sequence.
    pub fn effective_trailing_window(&self) -> usize {
        self.stop_sequences
            .iter()
            .map(|s| s.chars().count())
            .max()
            .unwrap_or(0)
            .max(self.trailing_window)
    }
}
