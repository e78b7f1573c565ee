//! Domain types shared across PromptShift crates.
//!
//! Every record here is an immutable value once created: a new template
//! edit is a new version, a re-run produces new results, and decisions
//! are audit records.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a test case within a corpus.
pub type CaseId = String;

/// Identifier of a model variant within a candidate.
pub type VariantId = String;

// ── Templates and variants ────────────────────────────────────────

/// Pointer to one immutable version of a prompt template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TemplateRef {
    pub id: String,
    pub version: semver::Version,
}

impl fmt::Display for TemplateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}

/// Invocation parameters passed to a model backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationParams {
    pub temperature: f64,
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Provider-specific extras forwarded verbatim.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl InvocationParams {
    /// Check parameter bounds. `field` prefixes the reported field name.
    pub fn validate(&self, field: &str) -> crate::ConfigResult<()> {
        if self.max_tokens == 0 {
            return Err(crate::ConfigError::invalid(
                format!("{field}.max_tokens"),
                "must be greater than 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(crate::ConfigError::invalid(
                format!("{field}.temperature"),
                format!("{} is outside [0, 1]", self.temperature),
            ));
        }
        if let Some(top_p) = self.top_p {
            if !(0.0..=1.0).contains(&top_p) {
                return Err(crate::ConfigError::invalid(
                    format!("{field}.top_p"),
                    format!("{top_p} is outside [0, 1]"),
                ));
            }
        }
        Ok(())
    }
}

/// A model choice: provider, model, and how to invoke it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVariant {
    /// Optional display name; defaults to `provider/model`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub provider: String,
    pub model: String,
    pub params: InvocationParams,
}

impl ModelVariant {
    /// Stable identifier used in pair keys.
    pub fn id(&self) -> VariantId {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{}/{}", self.provider, self.model),
        }
    }
}

// ── Test corpus ───────────────────────────────────────────────────

/// Inclusive word-count bounds for a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthBounds {
    pub min_words: u32,
    pub max_words: u32,
}

/// What a good response to a test case looks like.
///
/// Components left empty do not contribute to the score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Criteria {
    /// Keywords expected in the response (case-insensitive).
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub length: Option<LengthBounds>,
    /// Reference answer; scored by token recall.
    #[serde(default)]
    pub reference: Option<String>,
}

/// One entry of the fixed test corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: CaseId,
    /// Values for the template's `{{variable}}` placeholders.
    #[serde(default)]
    pub bindings: BTreeMap<String, String>,
    #[serde(default)]
    pub criteria: Criteria,
    /// Optional tag such as "safety" or "functional"; drives gate weights.
    #[serde(default)]
    pub tag: Option<String>,
}

// ── Results ───────────────────────────────────────────────────────

/// Identity of one (case, variant) pair in a test run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    pub case_id: CaseId,
    pub variant_id: VariantId,
}

impl PairKey {
    pub fn new(case_id: impl Into<CaseId>, variant_id: impl Into<VariantId>) -> Self {
        Self {
            case_id: case_id.into(),
            variant_id: variant_id.into(),
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.case_id, self.variant_id)
    }
}

/// Terminal status of a single invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    Ok,
    Error,
    Timeout,
}

/// Raw outcome of one (case, variant, template version) invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub key: PairKey,
    pub template: TemplateRef,
    pub variant: ModelVariant,
    pub status: InvocationStatus,
    /// Response text (empty unless status is `Ok`).
    pub response: String,
    /// Latency of the final attempt in milliseconds.
    pub latency_ms: u64,
    /// Number of attempts made, including the final one.
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TestResult {
    pub fn is_success(&self) -> bool {
        self.status == InvocationStatus::Ok
    }
}

/// Per-component breakdown of a score. `None` means the component did
/// not apply to this test case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub criteria: Option<f64>,
    pub length: Option<f64>,
    pub form: Option<f64>,
    pub latency: Option<f64>,
    /// Set for error/timeout results, which score 0.
    #[serde(default)]
    pub unavailable: bool,
}

/// Quality score of one result, in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub key: PairKey,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

// ── Guardrails ────────────────────────────────────────────────────

/// Violation severity. `Block` outranks `Warn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warn,
    Block,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warn => f.write_str("warn"),
            Severity::Block => f.write_str("block"),
        }
    }
}

/// Kind of content a guardrail policy protects against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyCategory {
    Pii,
    Profanity,
    RestrictedTopic,
    HarmfulContent,
}

/// A policy hit on one response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub key: PairKey,
    pub policy_id: String,
    pub category: PolicyCategory,
    pub severity: Severity,
    pub description: String,
}

// ── Gate ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateOutcome {
    Pass,
    Block,
}

/// Why a gate blocked a candidate, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockCause {
    IncompleteCoverage,
    SafetyViolation,
    ScoreBelowThreshold,
}

impl BlockCause {
    pub fn tag(&self) -> &'static str {
        match self {
            BlockCause::IncompleteCoverage => "incomplete-coverage",
            BlockCause::SafetyViolation => "safety-violation",
            BlockCause::ScoreBelowThreshold => "score-below-threshold",
        }
    }
}

impl fmt::Display for BlockCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// The promote/block decision for one gating run. Immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    pub candidate_id: String,
    pub aggregate_score: f64,
    /// Fraction of expected pairs with a successful result.
    pub coverage: f64,
    pub expected_pairs: usize,
    pub successful_pairs: usize,
    pub worst_severity: Option<Severity>,
    pub outcome: GateOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<BlockCause>,
    /// Set when the decision was made on a partial result set.
    pub degraded: bool,
    pub decided_at: u64,
}

impl GateDecision {
    pub fn passed(&self) -> bool {
        self.outcome == GateOutcome::Pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> InvocationParams {
        InvocationParams {
            temperature: 0.7,
            max_tokens: 300,
            top_p: Some(0.9),
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn variant_id_defaults_to_provider_model() {
        let v = ModelVariant {
            name: None,
            provider: "bedrock".into(),
            model: "claude-v2".into(),
            params: params(),
        };
        assert_eq!(v.id(), "bedrock/claude-v2");

        let named = ModelVariant {
            name: Some("claude-cold".into()),
            ..v
        };
        assert_eq!(named.id(), "claude-cold");
    }

    #[test]
    fn params_reject_out_of_range_values() {
        let mut p = params();
        assert!(p.validate("variant").is_ok());

        p.temperature = 1.5;
        let err = p.validate("variant").unwrap_err();
        assert!(err.to_string().contains("variant.temperature"));

        let mut p = params();
        p.max_tokens = 0;
        assert!(p.validate("variant").is_err());

        let mut p = params();
        p.top_p = Some(-0.1);
        assert!(p.validate("variant").is_err());
    }

    #[test]
    fn severity_orders_block_above_warn() {
        assert!(Severity::Block > Severity::Warn);
        let worst = [Severity::Warn, Severity::Block, Severity::Warn]
            .into_iter()
            .max();
        assert_eq!(worst, Some(Severity::Block));
    }

    #[test]
    fn block_cause_serializes_as_tag() {
        let json = serde_json::to_string(&BlockCause::IncompleteCoverage).unwrap();
        assert_eq!(json, "\"incomplete-coverage\"");
        assert_eq!(BlockCause::SafetyViolation.to_string(), "safety-violation");
    }

    #[test]
    fn pair_key_display() {
        let key = PairKey::new("order-status", "bedrock/titan");
        assert_eq!(key.to_string(), "order-status@bedrock/titan");
    }
}
