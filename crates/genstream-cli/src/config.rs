//! Configuration management for the genstream CLI

use anyhow::{Context, Result};
use genstream_core::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default vocabulary file
    pub default_vocab: Option<PathBuf>,

    /// Vocabulary search directories
    pub vocab_dirs: Vec<PathBuf>,

    /// Prefix encoded text with the word-boundary marker
    pub add_dummy_prefix: bool,

    /// Normalize decoded pieces before assembly
    pub normalize: bool,

    /// Engine defaults, overridden by command-line flags
    pub engine: EngineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_vocab: None,
            vocab_dirs: vec![
                dirs::home_dir().unwrap_or_default().join(".genstream/vocab"),
                PathBuf::from("./vocab"),
            ],
            add_dummy_prefix: true,
            normalize: true,
            engine: EngineConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config_path = match config_path {
            Some(path) => path.to_path_buf(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

            Ok(config)
        } else {
            let config = Config::default();
            config.save(&config_path)?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".config"))
            .join("genstream")
            .join("config.toml")
    }

    /// Find a vocabulary file, expanding `~` and variables, then searching the
    /// configured directories
    pub fn find_vocab(&self, name: &str) -> Result<PathBuf> {
        let path = Path::new(name);
        if path.exists() {
            return Ok(path.to_path_buf());
        }

        let expanded = shellexpand::full(name).context("Failed to expand shell variables in vocabulary path")?;
        let expanded_path = Path::new(expanded.as_ref());
        if expanded_path.exists() {
            return Ok(expanded_path.to_path_buf());
        }

        for dir in &self.vocab_dirs {
            let candidate = dir.join(name);
            if candidate.exists() {
                return Ok(candidate);
            }

            for ext in ["json", "txt"] {
                let with_ext = dir.join(format!("{}.{}", name, ext));
                if with_ext.exists() {
                    return Ok(with_ext);
                }
            }
        }

        anyhow::bail!("Vocabulary '{}' not found in any configured directory", name);
    }
}
