//! Gate evaluator: one promote/block decision per candidate.
//!
//! Checks run in a fixed order and the first failing check decides:
//!
//! 1. completeness: successful pairs / expected pairs below the floor
//!    blocks as `incomplete-coverage`
//! 2. safety: any block-severity violation blocks as `safety-violation`
//! 3. quality: the tag-weighted mean score must reach the pass threshold
//!    (inclusive) or the candidate is blocked as `score-below-threshold`

use std::collections::HashMap;

use tracing::{info, warn};

use shift_core::config::GateConfig;
use shift_core::{
    BlockCause, Candidate, Corpus, GateDecision, GateOutcome, PairKey, ScoreRecord, Severity,
    Violation,
};

/// Tolerance for threshold comparisons, so that equality survives float
/// rounding and resolves to pass.
const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct GateEvaluator {
    config: GateConfig,
}

impl GateEvaluator {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    /// Aggregate `scores` and `violations` for `candidate` over `corpus`.
    ///
    /// Expected pairs are every (case, variant) combination; a pair with no
    /// score record counts as 0 and as unsuccessful.
    pub fn evaluate(
        &self,
        candidate: &Candidate,
        corpus: &Corpus,
        scores: &[ScoreRecord],
        violations: &[Violation],
        decided_at: u64,
    ) -> GateDecision {
        let by_key: HashMap<&PairKey, &ScoreRecord> = scores.iter().map(|s| (&s.key, s)).collect();

        let mut expected_pairs = 0usize;
        let mut successful_pairs = 0usize;
        let mut weighted = 0.0;
        let mut total_weight = 0.0;
        for case in &corpus.cases {
            let weight = self.config.weight_for(case.tag.as_deref());
            for variant in &candidate.variants {
                expected_pairs += 1;
                let key = PairKey::new(case.id.clone(), variant.id());
                let score = match by_key.get(&key) {
                    Some(record) => {
                        if !record.breakdown.unavailable {
                            successful_pairs += 1;
                        }
                        record.score
                    }
                    None => 0.0,
                };
                weighted += weight * score;
                total_weight += weight;
            }
        }

        let aggregate_score = if total_weight > 0.0 {
            weighted / total_weight
        } else {
            0.0
        };
        let coverage = if expected_pairs > 0 {
            successful_pairs as f64 / expected_pairs as f64
        } else {
            0.0
        };
        let worst_severity = violations.iter().map(|v| v.severity).max();

        let cause = if coverage + EPSILON < self.config.min_coverage {
            Some(BlockCause::IncompleteCoverage)
        } else if worst_severity == Some(Severity::Block) {
            Some(BlockCause::SafetyViolation)
        } else if aggregate_score + EPSILON < self.config.pass_threshold {
            Some(BlockCause::ScoreBelowThreshold)
        } else {
            None
        };
        let outcome = if cause.is_some() {
            GateOutcome::Block
        } else {
            GateOutcome::Pass
        };

        let decision = GateDecision {
            candidate_id: candidate.id.clone(),
            aggregate_score,
            coverage,
            expected_pairs,
            successful_pairs,
            worst_severity,
            outcome,
            cause,
            degraded: successful_pairs < expected_pairs,
            decided_at,
        };

        match cause {
            None => info!(
                candidate = %candidate.id,
                score = aggregate_score,
                coverage,
                violations = violations.len(),
                "gate passed"
            ),
            Some(cause) => warn!(
                candidate = %candidate.id,
                %cause,
                score = aggregate_score,
                threshold = self.config.pass_threshold,
                coverage,
                min_coverage = self.config.min_coverage,
                worst_severity = ?worst_severity,
                "gate blocked"
            ),
        }

        decision
    }
}
