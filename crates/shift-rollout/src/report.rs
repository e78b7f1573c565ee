//! Rollout report: the audit record of one attempt.

use serde::{Deserialize, Serialize};

use shift_core::{GateDecision, ScoreRecord, TemplateRef, TestResult, Violation};
use shift_health::MonitorOutcome;
use shift_state::LivePointer;

use crate::phase::{RolloutPhase, TerminalCause};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: RolloutPhase,
    pub to: RolloutPhase,
    pub at: u64,
}

/// Everything one rollout attempt produced. Published while the attempt
/// runs and persisted once it reaches a terminal phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutReport {
    pub pipeline_id: String,
    pub target: String,
    /// Unknown until the descriptor resolves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_id: Option<String>,
    pub template: TemplateRef,
    pub phase: RolloutPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<TerminalCause>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<GateDecision>,
    #[serde(default)]
    pub results: Vec<TestResult>,
    #[serde(default)]
    pub scores: Vec<ScoreRecord>,
    #[serde(default)]
    pub violations: Vec<Violation>,
    #[serde(default)]
    pub transitions: Vec<PhaseTransition>,
    /// Live pointer immediately before `Deploying`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_live: Option<LivePointer>,
    /// Live pointer right after the promotion flip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promoted_live: Option<LivePointer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor: Option<MonitorOutcome>,
    /// A hosting-layer directive that failed after its state change was
    /// committed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_error: Option<String>,
    pub started_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<u64>,
}

impl RolloutReport {
    pub fn new(pipeline_id: &str, target: &str, template: TemplateRef, started_at: u64) -> Self {
        Self {
            pipeline_id: pipeline_id.to_string(),
            target: target.to_string(),
            candidate_id: None,
            template,
            phase: RolloutPhase::Idle,
            cause: None,
            decision: None,
            results: Vec::new(),
            scores: Vec::new(),
            violations: Vec::new(),
            transitions: Vec::new(),
            previous_live: None,
            promoted_live: None,
            monitor: None,
            host_error: None,
            started_at,
            finished_at: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.phase.is_terminal() && self.finished_at.is_some()
    }

    /// 0 promoted, 1 blocked, 2 rolled back, 3 anything else.
    pub fn exit_code(&self) -> i32 {
        self.phase.exit_code()
    }

    pub fn summary(&self) -> RolloutSummary {
        RolloutSummary {
            pipeline_id: self.pipeline_id.clone(),
            target: self.target.clone(),
            candidate_id: self.candidate_id.clone(),
            template: self.template.to_string(),
            phase: self.phase,
            cause: self.cause.as_ref().map(ToString::to_string),
            aggregate_score: self.decision.as_ref().map(|d| d.aggregate_score),
            coverage: self.decision.as_ref().map(|d| d.coverage),
            violations: self.violations.len(),
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

/// One-line view of a report for listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutSummary {
    pub pipeline_id: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_id: Option<String>,
    pub template: String,
    pub phase: RolloutPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<f64>,
    pub violations: usize,
    pub started_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<u64>,
}
