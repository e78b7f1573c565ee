use std::path::PathBuf;

use shift_core::ConfigError;

/// Failure of a single backend call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvocationError {
    /// Network failure, throttling, or a server-side error. Retried.
    #[error("transient invocation failure: {0}")]
    Transient(String),

    /// The request itself is wrong; retrying cannot help.
    #[error("invocation rejected: {0}")]
    Fatal(String),
}

impl InvocationError {
    pub fn is_transient(&self) -> bool {
        matches!(self, InvocationError::Transient(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("no backend configured for provider '{0}'")]
    MissingBackend(String),

    #[error("failed to load replay fixture {path}: {reason}")]
    Fixture { path: PathBuf, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
