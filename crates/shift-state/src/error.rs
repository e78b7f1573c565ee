//! Error types for the PromptShift state store.

use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Another writer committed since this state was read.
    #[error("revision conflict on {target}: expected {expected}, found {found}")]
    Conflict {
        target: String,
        expected: u64,
        found: u64,
    },

    /// The rollback target slot no longer holds the recorded pointer.
    #[error("slot {slot} on {target} no longer holds the recorded deployment")]
    SlotMismatch { target: String, slot: String },
}
