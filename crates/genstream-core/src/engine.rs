//! Engine: tokenizer, normalizer, model and generation configuration
//!
//! An [`Engine`] is immutable once built and cheap to clone. Every clone and
//! every [`Session`] derived from it share the same state, which stays alive
//! until the last of them is dropped.

use crate::{
    config::{Backend, EngineConfig, ErrorPolicy},
    model::LanguageModel,
    session::Session,
    tokenizer::{Normalizer, Tokenizer},
    CoreError, Result,
};
use std::fmt;
use std::sync::Arc;
use tracing::info;

struct EngineInner {
    tokenizer: Arc<dyn Tokenizer>,
    normalizer: Option<Arc<dyn Normalizer>>,
    model: Arc<dyn LanguageModel>,
    config: EngineConfig,
}

/// Shared, read-only generation engine
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Create a new session bound to this engine
    pub fn create_session(&self) -> Session {
        Session::new(self)
    }

    pub fn tokenizer(&self) -> &dyn Tokenizer {
        self.inner.tokenizer.as_ref()
    }

    pub fn normalizer(&self) -> Option<&dyn Normalizer> {
        self.inner.normalizer.as_deref()
    }

    pub fn model(&self) -> &dyn LanguageModel {
        self.inner.model.as_ref()
    }

    /// Get engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Engine handles and sessions currently sharing this engine
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("model", &self.inner.model.name())
            .field("vocab_size", &self.inner.tokenizer.vocab_size())
            .field("normalizer", &self.inner.normalizer.is_some())
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Builder for [`Engine`]
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    tokenizer: Option<Arc<dyn Tokenizer>>,
    normalizer: Option<Arc<dyn Normalizer>>,
    model: Option<Arc<dyn LanguageModel>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole generation configuration
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn tokenizer<T: Tokenizer + 'static>(self, tokenizer: T) -> Self {
        self.tokenizer_arc(Arc::new(tokenizer))
    }

    pub fn tokenizer_arc(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    pub fn normalizer<N: Normalizer + 'static>(mut self, normalizer: N) -> Self {
        self.normalizer = Some(Arc::new(normalizer));
        self
    }

    pub fn model<M: LanguageModel + 'static>(self, model: M) -> Self {
        self.model_arc(Arc::new(model))
    }

    pub fn model_arc(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn start_token_id(mut self, id: u32) -> Self {
        self.config.start_token_id = id;
        self
    }

    pub fn stop_sequences(mut self, stop_sequences: Vec<String>) -> Self {
        self.config.stop_sequences = stop_sequences;
        self
    }

    pub fn max_num_tokens(mut self, max_num_tokens: usize) -> Self {
        self.config.max_num_tokens = max_num_tokens;
        self
    }

    pub fn trailing_window(mut self, window: usize) -> Self {
        self.config.trailing_window = window;
        self
    }

    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.config.error_policy = policy;
        self
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.config.backend = backend;
        self
    }

    /// Validate the configuration and build the engine
    pub fn build(self) -> Result<Engine> {
        if self.config.backend == Backend::Gpu {
            return Err(CoreError::not_implemented(
                "NOT_IMPLEMENTED",
                "Not implemented",
                "Creating an engine for the GPU backend",
            ));
        }

        self.config.validate()?;

        let tokenizer = self.tokenizer.ok_or_else(|| {
            CoreError::invalid_input(
                "ENGINE_MISSING_TOKENIZER",
                "No tokenizer was provided",
                "Building engine",
                "Call EngineBuilder::tokenizer before build",
            )
        })?;
        let model = self.model.ok_or_else(|| {
            CoreError::invalid_input(
                "ENGINE_MISSING_MODEL",
                "No language model was provided",
                "Building engine",
                "Call EngineBuilder::model before build",
            )
        })?;

        info!(
            "Created engine with model '{}': vocab size {}, token budget {}, {} stop sequences, trailing window {}",
            model.name(),
            tokenizer.vocab_size(),
            self.config.max_num_tokens,
            self.config.stop_sequences.len(),
            self.config.effective_trailing_window()
        );

        Ok(Engine {
            inner: Arc::new(EngineInner {
                tokenizer,
                normalizer: self.normalizer,
                model,
                config: self.config,
            }),
        })
    }
}
