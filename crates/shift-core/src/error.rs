//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for configuration and input loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Malformed policy, threshold, template, corpus or candidate input.
///
/// Always fatal for a rollout attempt: the pipeline never enters `Testing`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: String, reason: String },

    #[error("invalid template {path}: {reason}")]
    Template { path: PathBuf, reason: String },

    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("duplicate {kind}: {id}")]
    Duplicate { kind: &'static str, id: String },

    #[error("test case `{case}` does not bind template variable `{variable}`")]
    UnboundVariable { case: String, variable: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
