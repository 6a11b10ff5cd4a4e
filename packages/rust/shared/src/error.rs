//! Error types for ResearchKit.
//!
//! Library crates use [`ResearchError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all ResearchKit operations.
#[derive(Debug, thiserror::Error)]
pub enum ResearchError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A host operation failed. The host's message is passed through unchanged.
    #[error("host operation {op} failed: {message}")]
    Host { op: String, message: String },

    /// Network/HTTP error.
    #[error("network error: {0}")]
    Network(String),

    /// LLM chat completion error (transport, API, or empty response).
    #[error("llm error: {0}")]
    Llm(String),

    /// HTML, JSON, or value parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A bounded wait ran out.
    #[error("timed out after {ms}ms waiting for {what}")]
    Timeout { what: String, ms: u64 },

    /// The selected backend cannot perform this operation.
    #[error("operation not supported by this backend: {op}")]
    Unsupported { op: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ResearchError>;

impl ResearchError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a host error for the named operation.
    pub fn host(op: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Host {
            op: op.into(),
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an unsupported-operation error.
    pub fn unsupported(op: impl Into<String>) -> Self {
        Self::Unsupported { op: op.into() }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
