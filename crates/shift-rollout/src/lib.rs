//! shift-rollout: the rollout controller.
//!
//! Drives one candidate through the phase machine
//!
//! ```text
//! Idle → Testing → Gating → { Blocked | Deploying → Monitoring → { Promoted | RolledBack } }
//! ```
//!
//! with `Failed` reachable from every non-terminal phase for configuration
//! and deployment-write errors. Only one attempt per deployment target may
//! be active at a time; a second request for a busy target is rejected.
//!
//! # Components
//!
//! - **`phase`**: phases, terminal causes, and legal transitions
//! - **`report`**: the audit record of one attempt and its exit code
//! - **`host`**: hosting-layer directives (promote / rollback)
//! - **`controller`**: `RolloutController`: run, status, force-rollback

pub mod controller;
pub mod error;
pub mod host;
pub mod phase;
pub mod report;

pub use controller::{RolloutController, RolloutInputs, RolloutRequest};
pub use error::{RolloutError, RolloutResult};
pub use host::{host_from_config, HostDirective, HostingLayer, LogHost, PointerFileHost};
pub use phase::{RolloutPhase, TerminalCause};
pub use report::{PhaseTransition, RolloutReport, RolloutSummary};
