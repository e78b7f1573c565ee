use shift_state::StateError;

use crate::phase::RolloutPhase;

#[derive(Debug, thiserror::Error)]
pub enum RolloutError {
    #[error("target '{target}' already has an active rollout ({pipeline_id})")]
    TargetBusy { target: String, pipeline_id: String },

    #[error("rollout not found: {0}")]
    NotFound(String),

    #[error("rollout {pipeline_id} cannot be rolled back from phase {phase}")]
    NotRollbackable {
        pipeline_id: String,
        phase: RolloutPhase,
    },

    /// A later promotion replaced this attempt's live pointer.
    #[error("rollout {pipeline_id} is no longer live on target '{target}'")]
    Superseded { pipeline_id: String, target: String },

    #[error("invalid phase transition {from} -> {to}")]
    InvalidTransition { from: RolloutPhase, to: RolloutPhase },

    #[error(transparent)]
    State(#[from] StateError),
}

pub type RolloutResult<T> = Result<T, RolloutError>;
