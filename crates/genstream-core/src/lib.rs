//! Genstream Core - streaming text generation sessions
//!
//! This crate turns token ids produced by an on-device language model into
//! incrementally released, stop-sequence-trimmed text. Each request runs on
//! its own background thread and is exposed through a blocking API, a
//! callback-streaming API, an async [`futures::Stream`] adapter and a C ABI.

// Module declarations
pub mod config;
pub mod engine;
pub mod ffi;
pub mod generation;
pub mod model;
pub mod response;
pub mod session;
pub mod stream;
pub mod tokenizer;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Tokenizer encode/decode errors
    #[error("Tokenizer error [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    Tokenizer {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
    },

    /// Language model seeding and next-token errors
    #[error("Model error [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    Model {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
    },

    /// Session lifecycle and generation errors
    #[error("Generation error [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    Generation {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
        session_id: Option<String>,
    },

    /// Input validation and parameter errors
    #[error("Invalid input [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    InvalidInput {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
        parameter_name: Option<String>,
    },

    /// Configuration parsing and validation errors
    #[error("Configuration error [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    Configuration {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
        config_path: Option<std::path::PathBuf>,
        field_name: Option<String>,
    },

    /// Entry points that exist but have no implementation on this build
    #[error("Not implemented [{code}]: {message}\nContext: {context}")]
    NotImplemented {
        code: &'static str,
        message: String,
        context: String,
    },

    /// Resource availability errors (threads, memory)
    #[error("Resource error [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    Resource {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
        resource_type: String,
    },

    /// File system and I/O errors
    #[error("IO error [{code}]: {message}\nPath: {path:?}\nSuggestion: {suggestion}")]
    Io {
        code: &'static str,
        message: String,
        path: Option<std::path::PathBuf>,
        suggestion: String,
        #[source]
        source: std::io::Error,
    },

    /// Other unexpected errors
    #[error("Internal error [{code}]: {message}\nContext: {context}")]
    Internal {
        code: &'static str,
        message: String,
        context: String,
        #[source]
        source: Option<anyhow::Error>,
    },
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Status codes reported across the C ABI, following the absl/gRPC numbering.
pub mod status {
    pub const OK: i32 = 0;
    pub const UNKNOWN: i32 = 2;
    pub const INVALID_ARGUMENT: i32 = 3;
    pub const RESOURCE_EXHAUSTED: i32 = 8;
    pub const FAILED_PRECONDITION: i32 = 9;
    pub const UNIMPLEMENTED: i32 = 12;
    pub const INTERNAL: i32 = 13;
}

impl CoreError {
    /// Create a tokenizer error
    pub fn tokenizer<S1, S2, S3>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::Tokenizer {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a model error
    pub fn model<S1, S2, S3>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::Model {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a generation error bound to a session
    pub fn generation<S1, S2, S3>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
        session_id: Option<&str>,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::Generation {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            session_id: session_id.map(str::to_string),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input<S1, S2, S3>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::InvalidInput {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            parameter_name: None,
        }
    }

    /// Create a configuration error naming the offending field
    pub fn configuration<S1, S2>(
        code: &'static str,
        message: S1,
        field_name: &str,
        suggestion: S2,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self::Configuration {
            code,
            message: message.into(),
            context: format!("Validating field '{}'", field_name),
            suggestion: suggestion.into(),
            config_path: None,
            field_name: Some(field_name.to_string()),
        }
    }

    /// Create a not-implemented error
    pub fn not_implemented<S1, S2>(code: &'static str, message: S1, context: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self::NotImplemented {
            code,
            message: message.into(),
            context: context.into(),
        }
    }

    /// Get the error code for programmatic handling
    pub fn code(&self) -> &'static str {
        match self {
            Self::Tokenizer { code, .. } => *code,
            Self::Model { code, .. } => *code,
            Self::Generation { code, .. } => *code,
            Self::InvalidInput { code, .. } => *code,
            Self::Configuration { code, .. } => *code,
            Self::NotImplemented { code, .. } => *code,
            Self::Resource { code, .. } => *code,
            Self::Io { code, .. } => *code,
            Self::Internal { code, .. } => *code,
        }
    }

    /// Integer status for callers on the other side of the C ABI
    pub fn status_code(&self) -> i32 {
        match self {
            Self::InvalidInput { .. } | Self::Configuration { .. } => status::INVALID_ARGUMENT,
            Self::Generation { .. } => status::FAILED_PRECONDITION,
            Self::NotImplemented { .. } => status::UNIMPLEMENTED,
            Self::Resource { .. } => status::RESOURCE_EXHAUSTED,
            Self::Internal { .. } => status::INTERNAL,
            Self::Tokenizer { .. } | Self::Model { .. } | Self::Io { .. } => status::UNKNOWN,
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        let (code, suggestion) = match err.kind() {
            std::io::ErrorKind::NotFound => (
                "IO_FILE_NOT_FOUND",
                "Check that the file path is correct and the file exists",
            ),
            std::io::ErrorKind::PermissionDenied => (
                "IO_PERMISSION_DENIED",
                "Check file permissions or run with appropriate privileges",
            ),
            std::io::ErrorKind::InvalidData => (
                "IO_INVALID_DATA",
                "The file may be corrupted or in an unexpected format",
            ),
            _ => (
                "IO_UNKNOWN",
                "Check the file system and try the operation again",
            ),
        };

        Self::Io {
            code,
            message: err.to_string(),
            path: None,
            suggestion: suggestion.to_string(),
            source: err,
        }
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal {
            code: "INTERNAL_UNKNOWN",
            message: err.to_string(),
            context: "An unexpected error occurred".to_string(),
            source: Some(err),
        }
    }
}

/// Prelude module for common imports
pub mod prelude {
    pub use crate::{
        config::{Backend, EngineConfig, ErrorPolicy},
        engine::{Engine, EngineBuilder},
        generation::{
            assembler::{Assembled, TokenStreamAssembler},
            FinishReason, GenerationOutcome, GenerationStats,
        },
        model::{replay::ReplayModel, LanguageModel},
        response::ResponseContext,
        session::{CancelHandle, Session},
        stream::ResponseStream,
        tokenizer::{
            normalizer::{NormalizationForm, UnicodeNormalizer},
            vocab::{VocabTokenizer, Vocabulary},
            Normalizer, Tokenizer,
        },
        CoreError, Result,
    };
}

// Re-export key types at the crate root
pub use config::EngineConfig;
pub use engine::{Engine, EngineBuilder};
pub use response::ResponseContext;
pub use session::{CancelHandle, Session};

pub mod error {
    pub use super::{CoreError, Result};
}
