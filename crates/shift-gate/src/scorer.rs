//! Quality scorer.
//!
//! A score is the weighted mean of the rubric components that apply to
//! the test case, renormalized over their weights:
//!
//! | component | applies when | value |
//! |---|---|---|
//! | criteria | keywords or a reference answer are given | keyword hit fraction, reference token recall (mean of both) |
//! | length | word bounds are given | 1 inside bounds, else the ratio to the nearest bound |
//! | form | always | 1 minus penalties for short, unpunctuated, or single-case text |
//! | latency | always | 1 up to the ceiling, then linear decay to 0 |
//!
//! Error and timeout results score 0 and are flagged `unavailable`.

use std::collections::BTreeSet;

use shift_core::config::ScoringConfig;
use shift_core::{Corpus, ScoreBreakdown, ScoreRecord, TestCase, TestResult};
use tracing::debug;

/// Responses shorter than this many characters lose form points.
const MIN_FORM_CHARS: usize = 20;

#[derive(Debug, Clone)]
pub struct Scorer {
    config: ScoringConfig,
}

impl Scorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Score one result against its test case. Pure function of its inputs.
    pub fn score(&self, result: &TestResult, case: &TestCase) -> ScoreRecord {
        if !result.is_success() {
            return ScoreRecord {
                key: result.key.clone(),
                score: 0.0,
                breakdown: ScoreBreakdown {
                    unavailable: true,
                    ..ScoreBreakdown::default()
                },
            };
        }

        let text = result.response.as_str();
        let breakdown = ScoreBreakdown {
            criteria: criteria_score(text, case),
            length: case.criteria.length.map(|b| length_score(word_count(text), b.min_words, b.max_words)),
            form: Some(form_score(text)),
            latency: Some(self.latency_score(result.latency_ms)),
            unavailable: false,
        };

        let components = [
            (breakdown.criteria, self.config.criteria_weight),
            (breakdown.length, self.config.length_weight),
            (breakdown.form, self.config.form_weight),
            (breakdown.latency, self.config.latency_weight),
        ];
        let (weighted, total) = components
            .iter()
            .filter_map(|(value, weight)| value.map(|v| (v * weight, *weight)))
            .fold((0.0, 0.0), |(sum, total), (v, w)| (sum + v, total + w));
        let score = if total > 0.0 {
            (weighted / total).clamp(0.0, 1.0)
        } else {
            0.0
        };

        ScoreRecord {
            key: result.key.clone(),
            score,
            breakdown,
        }
    }

    /// Score every result. Results whose case is not in the corpus are
    /// skipped with a debug line; the executor never produces them.
    pub fn score_all(&self, results: &[TestResult], corpus: &Corpus) -> Vec<ScoreRecord> {
        results
            .iter()
            .filter_map(|result| {
                let case = corpus.cases.iter().find(|c| c.id == result.key.case_id);
                if case.is_none() {
                    debug!(pair = %result.key, "result has no matching test case");
                }
                case.map(|case| self.score(result, case))
            })
            .collect()
    }

    fn latency_score(&self, latency_ms: u64) -> f64 {
        let ceiling = self.config.latency_ceiling_ms;
        if latency_ms <= ceiling {
            return 1.0;
        }
        let over = (latency_ms - ceiling) as f64;
        (1.0 - over / self.config.latency_decay_ms() as f64).max(0.0)
    }
}

fn tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn word_count(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

fn criteria_score(text: &str, case: &TestCase) -> Option<f64> {
    let criteria = &case.criteria;
    let lower = text.to_lowercase();

    let keywords = (!criteria.keywords.is_empty()).then(|| {
        let hits = criteria
            .keywords
            .iter()
            .filter(|k| lower.contains(&k.to_lowercase()))
            .count();
        hits as f64 / criteria.keywords.len() as f64
    });

    let recall = criteria.reference.as_deref().and_then(|reference| {
        let expected = tokens(reference);
        if expected.is_empty() {
            return None;
        }
        let got = tokens(text);
        Some(expected.intersection(&got).count() as f64 / expected.len() as f64)
    });

    match (keywords, recall) {
        (Some(k), Some(r)) => Some((k + r) / 2.0),
        (k, r) => k.or(r),
    }
}

fn length_score(words: u32, min: u32, max: u32) -> f64 {
    if (min..=max).contains(&words) {
        1.0
    } else if words < min {
        words as f64 / min as f64
    } else {
        max as f64 / words as f64
    }
}

fn form_score(text: &str) -> f64 {
    let trimmed = text.trim();
    let mut score = 1.0;
    if trimmed.chars().count() < MIN_FORM_CHARS {
        score -= 0.5;
    }
    if !trimmed.contains(['.', '!', '?']) {
        score -= 0.3;
    }
    let has_upper = trimmed.chars().any(char::is_uppercase);
    let has_lower = trimmed.chars().any(char::is_lowercase);
    if has_upper != has_lower {
        score -= 0.2;
    }
    f64::max(score, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shift_core::{
        Criteria, InvocationParams, InvocationStatus, LengthBounds, ModelVariant, PairKey,
        TemplateRef,
    };
    use std::collections::BTreeMap;

    fn result(text: &str, latency_ms: u64, status: InvocationStatus) -> TestResult {
        TestResult {
            key: PairKey::new("case", "bedrock/claude-v2"),
            template: TemplateRef {
                id: "support".into(),
                version: semver::Version::new(1, 0, 0),
            },
            variant: ModelVariant {
                name: None,
                provider: "bedrock".into(),
                model: "claude-v2".into(),
                params: InvocationParams {
                    temperature: 0.5,
                    max_tokens: 100,
                    top_p: None,
                    extra: BTreeMap::new(),
                },
            },
            status,
            response: text.into(),
            latency_ms,
            attempts: 1,
            tokens: None,
            error: None,
        }
    }

    fn case(criteria: Criteria) -> TestCase {
        TestCase {
            id: "case".into(),
            bindings: BTreeMap::new(),
            criteria,
            tag: None,
        }
    }

    fn ok(text: &str, latency_ms: u64) -> TestResult {
        result(text, latency_ms, InvocationStatus::Ok)
    }

    #[test]
    fn perfect_response_scores_one() {
        let scorer = Scorer::new(ScoringConfig::default());
        let c = case(Criteria {
            keywords: vec!["refund".into(), "order".into()],
            length: Some(LengthBounds { min_words: 5, max_words: 50 }),
            reference: None,
        });
        let r = ok("Your refund for the order has been issued.", 300);
        let record = scorer.score(&r, &c);
        assert_eq!(record.score, 1.0);
        assert_eq!(record.breakdown.criteria, Some(1.0));
        assert!(!record.breakdown.unavailable);
    }

    #[test]
    fn failed_results_are_unavailable_zero() {
        let scorer = Scorer::new(ScoringConfig::default());
        for status in [InvocationStatus::Error, InvocationStatus::Timeout] {
            let record = scorer.score(&result("", 0, status), &case(Criteria::default()));
            assert_eq!(record.score, 0.0);
            assert!(record.breakdown.unavailable);
            assert_eq!(record.breakdown.form, None);
        }
    }

    #[test]
    fn scoring_is_deterministic() {
        let scorer = Scorer::new(ScoringConfig::default());
        let c = case(Criteria {
            keywords: vec!["hello".into(), "missing".into()],
            length: Some(LengthBounds { min_words: 10, max_words: 20 }),
            reference: Some("Hello, how can I help you today?".into()),
        });
        let r = ok("Hello there, how are you?", 2500);
        assert_eq!(scorer.score(&r, &c), scorer.score(&r, &c));
    }

    #[test]
    fn inapplicable_components_are_renormalized() {
        let scorer = Scorer::new(ScoringConfig::default());
        // Only form (0.2) and latency (0.2) apply.
        let record = scorer.score(&ok("A well formed sentence here.", 100), &case(Criteria::default()));
        assert_eq!(record.breakdown.criteria, None);
        assert_eq!(record.breakdown.length, None);
        assert_eq!(record.score, 1.0);
    }

    #[test]
    fn keyword_and_reference_are_averaged() {
        let c = case(Criteria {
            keywords: vec!["refund".into(), "shipping".into()],
            length: None,
            reference: Some("refund issued today".into()),
        });
        // Keywords 1/2, recall 2/3.
        let got = criteria_score("Refund issued.", &c).unwrap();
        assert!((got - (0.5 + 2.0 / 3.0) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn length_ratio_outside_bounds() {
        assert_eq!(length_score(10, 5, 20), 1.0);
        assert_eq!(length_score(5, 5, 20), 1.0);
        assert_eq!(length_score(2, 4, 20), 0.5);
        assert_eq!(length_score(40, 5, 20), 0.5);
        assert_eq!(length_score(0, 4, 20), 0.0);
    }

    #[test]
    fn latency_decays_linearly_above_ceiling() {
        let scorer = Scorer::new(ScoringConfig {
            latency_ceiling_ms: 1000,
            latency_decay_ms: Some(2000),
            ..ScoringConfig::default()
        });
        assert_eq!(scorer.latency_score(800), 1.0);
        assert_eq!(scorer.latency_score(1000), 1.0);
        assert_eq!(scorer.latency_score(2000), 0.5);
        assert_eq!(scorer.latency_score(3000), 0.0);
        assert_eq!(scorer.latency_score(10_000), 0.0);
    }

    #[test]
    fn latency_decay_defaults_to_ceiling() {
        let scorer = Scorer::new(ScoringConfig::default());
        assert_eq!(scorer.latency_score(3000), 0.5);
        assert_eq!(scorer.latency_score(4000), 0.0);
    }

    #[test]
    fn form_penalties() {
        assert_eq!(form_score("This is a complete sentence."), 1.0);
        // Short.
        assert_eq!(form_score("Yes, sure."), 0.5);
        // No sentence punctuation.
        assert!((form_score("This is a complete sentence") - 0.7).abs() < 1e-12);
        // Shouting.
        assert!((form_score("THIS IS A COMPLETE SENTENCE.") - 0.8).abs() < 1e-12);
        // All three, floored.
        assert!(form_score("ok") < 1e-12);
    }
}
