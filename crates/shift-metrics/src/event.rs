//! Structured events emitted over the course of a rollout.

use serde::{Deserialize, Serialize};
use shift_core::{BlockCause, GateOutcome, InvocationStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RolloutEvent {
    /// One model invocation reached a terminal status.
    Invocation {
        pipeline_id: String,
        provider: String,
        model: String,
        case_id: String,
        status: InvocationStatus,
        latency_ms: u64,
        attempts: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tokens: Option<u32>,
    },
    PhaseChanged {
        pipeline_id: String,
        target: String,
        from: String,
        to: String,
    },
    GateDecided {
        pipeline_id: String,
        candidate_id: String,
        outcome: GateOutcome,
        aggregate_score: f64,
        coverage: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cause: Option<BlockCause>,
    },
    HealthPolled {
        pipeline_id: String,
        target: String,
        poll: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_rate: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        p99_latency_ms: Option<u64>,
        within_bounds: bool,
    },
    Promoted {
        pipeline_id: String,
        target: String,
        candidate_id: String,
    },
    RolledBack {
        pipeline_id: String,
        target: String,
        cause: String,
    },
}

impl RolloutEvent {
    pub fn pipeline_id(&self) -> &str {
        match self {
            RolloutEvent::Invocation { pipeline_id, .. }
            | RolloutEvent::PhaseChanged { pipeline_id, .. }
            | RolloutEvent::GateDecided { pipeline_id, .. }
            | RolloutEvent::HealthPolled { pipeline_id, .. }
            | RolloutEvent::Promoted { pipeline_id, .. }
            | RolloutEvent::RolledBack { pipeline_id, .. } => pipeline_id,
        }
    }

    /// Short name used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            RolloutEvent::Invocation { .. } => "invocation",
            RolloutEvent::PhaseChanged { .. } => "phase_changed",
            RolloutEvent::GateDecided { .. } => "gate_decided",
            RolloutEvent::HealthPolled { .. } => "health_polled",
            RolloutEvent::Promoted { .. } => "promoted",
            RolloutEvent::RolledBack { .. } => "rolled_back",
        }
    }
}
