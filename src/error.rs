// SPDX-License-Identifier: MIT

//! Typed error handling for conditioner-rs
//!
//! Construction-time failures (syntax, configuration, unknown tests) are
//! returned synchronously. Load failures are recovered by the owning module
//! controller and surfaced as events, so `LoadError` is cheap to clone.

use thiserror::Error;

/// Top-level error type for conditioner-rs
#[derive(Debug, Error)]
pub enum ConditionerError {
    /// Malformed condition expression
    #[error("Syntax error: {0}")]
    Syntax(#[from] SyntaxError),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Condition references a test that was never registered
    #[error("Test '{name}' is not registered")]
    UnknownTest { name: String },

    /// Module code could not be resolved or instantiated
    #[error(transparent)]
    Load(#[from] LoadError),

    /// A tester or test instance was used after `destroy()`
    #[error("{0} used after destroy")]
    Disposed(&'static str),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON parsing errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl ConditionerError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an unknown test error
    pub fn unknown_test(name: impl Into<String>) -> Self {
        Self::UnknownTest { name: name.into() }
    }
}

/// A condition expression could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at token {position} ('{token}')")]
pub struct SyntaxError {
    /// The offending token, or `<end>` when input ran out
    pub token: String,
    /// Index of the offending token in the formatted token stream
    pub position: usize,
    pub message: String,
}

impl SyntaxError {
    pub fn new(token: impl Into<String>, position: usize, message: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            position,
            message: message.into(),
        }
    }
}

/// Module code resolution or instantiation failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to load module '{path}': {message}")]
pub struct LoadError {
    pub path: String,
    pub message: String,
}

impl LoadError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConditionerError>;
