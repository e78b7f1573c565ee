//! shift-gate: the quality-gate decision engine.
//!
//! Pure, synchronous functions over the executor's results:
//!
//! - **`scorer`**: `Scorer::score` turns a result and its test case into a
//!   `ScoreRecord` in [0, 1]
//! - **`guardrail`**: `PolicySet::validate` turns response text into an
//!   ordered list of `Violation`s
//! - **`evaluator`**: `GateEvaluator::evaluate` aggregates both into one
//!   `GateDecision`: completeness first, then safety, then score

pub mod evaluator;
pub mod guardrail;
pub mod scorer;

pub use evaluator::GateEvaluator;
pub use guardrail::{PolicySet, ProbeFailure, ProbeReport};
pub use scorer::Scorer;
