//! Rollout phases and terminal causes.

use std::fmt;

use serde::{Deserialize, Serialize};
use shift_core::BlockCause;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutPhase {
    Idle,
    Testing,
    Gating,
    /// The gate blocked the candidate. Nothing was deployed.
    Blocked,
    Deploying,
    Monitoring,
    Promoted,
    RolledBack,
    /// Configuration or deployment-write failure.
    Failed,
}

impl RolloutPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RolloutPhase::Blocked
                | RolloutPhase::Promoted
                | RolloutPhase::RolledBack
                | RolloutPhase::Failed
        )
    }

    /// Legal moves of the phase machine. `Promoted → RolledBack` is the
    /// forced rollback after the monitoring window.
    pub fn can_transition_to(self, next: RolloutPhase) -> bool {
        use RolloutPhase::*;
        matches!(
            (self, next),
            (Idle, Testing)
                | (Idle, Failed)
                | (Testing, Gating)
                | (Testing, Failed)
                | (Gating, Blocked)
                | (Gating, Deploying)
                | (Gating, Failed)
                | (Deploying, Monitoring)
                | (Deploying, Failed)
                | (Monitoring, Promoted)
                | (Monitoring, RolledBack)
                | (Monitoring, Failed)
                | (Promoted, RolledBack)
        )
    }

    /// Process exit code for a terminal phase.
    pub fn exit_code(self) -> i32 {
        match self {
            RolloutPhase::Promoted => 0,
            RolloutPhase::Blocked => 1,
            RolloutPhase::RolledBack => 2,
            _ => 3,
        }
    }
}

impl fmt::Display for RolloutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RolloutPhase::Idle => "idle",
            RolloutPhase::Testing => "testing",
            RolloutPhase::Gating => "gating",
            RolloutPhase::Blocked => "blocked",
            RolloutPhase::Deploying => "deploying",
            RolloutPhase::Monitoring => "monitoring",
            RolloutPhase::Promoted => "promoted",
            RolloutPhase::RolledBack => "rolled_back",
            RolloutPhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Why an attempt ended where it did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminalCause {
    GateBlocked { cause: BlockCause },
    ConfigError { message: String },
    DeploymentWrite { message: String },
    HealthDegradation { poll: u32, reason: String },
    ManualOverride,
    /// Cancelled before anything was deployed.
    Interrupted,
    /// A promotion could not be undone; the live pointer may not match
    /// what the hosting layer serves.
    LivePointerInconsistent { message: String },
    Internal { message: String },
}

impl fmt::Display for TerminalCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalCause::GateBlocked { cause } => write!(f, "gate blocked: {cause}"),
            TerminalCause::ConfigError { message } => write!(f, "config error: {message}"),
            TerminalCause::DeploymentWrite { message } => {
                write!(f, "deployment write error: {message}")
            }
            TerminalCause::HealthDegradation { poll, reason } => {
                write!(f, "health degradation at poll {poll}: {reason}")
            }
            TerminalCause::ManualOverride => f.write_str("manual override"),
            TerminalCause::Interrupted => f.write_str("interrupted before deployment"),
            TerminalCause::LivePointerInconsistent { message } => {
                write!(f, "live pointer inconsistent: {message}")
            }
            TerminalCause::Internal { message } => write!(f, "internal error: {message}"),
        }
    }
}
