//! Guardrail validator.
//!
//! Policies are compiled once per attempt from `[[guardrails.policies]]`.
//! Validation of a response is independent of every other response and
//! yields violations in policy order. Severities are kept as reported;
//! the gate only looks at the maximum.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use shift_core::config::{DetectionRule, GuardrailConfig, PiiEntity, PolicyConfig, ProbeConfig};
use shift_core::{ConfigError, ConfigResult, PairKey, PolicyCategory, Severity, TestResult, Violation};

const EMAIL: &str = r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}";
const PHONE: &str = r"(?:\+?1[-. ]?)?\(?\b\d{3}\)?[-. ]\d{3}[-. ]\d{4}\b";
const SSN: &str = r"\b\d{3}-\d{2}-\d{4}\b";
const CARD: &str = r"\b(?:\d[ -]?){12,18}\d\b";
const IPV4: &str = r"\b(?:(?:25[0-5]|2[0-4]\d|1?\d?\d)\.){3}(?:25[0-5]|2[0-4]\d|1?\d?\d)\b";

enum Matcher {
    Pattern(Regex),
    /// Alternation of escaped whole words.
    Words(Regex),
    Pii(Vec<(PiiEntity, Regex)>),
}

struct CompiledPolicy {
    id: String,
    category: PolicyCategory,
    severity: Severity,
    description: Option<String>,
    matcher: Matcher,
}

/// A compiled, immutable policy list.
pub struct PolicySet {
    policies: Vec<CompiledPolicy>,
    probes: Vec<ProbeConfig>,
}

/// A probe sample the policy list did not classify as expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeFailure {
    pub text: String,
    pub expected: Option<Severity>,
    pub found: Option<Severity>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub checked: usize,
    pub failures: Vec<ProbeFailure>,
}

impl ProbeReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

impl PolicySet {
    pub fn compile(config: &GuardrailConfig) -> ConfigResult<Self> {
        let policies = config
            .policies
            .iter()
            .map(compile_policy)
            .collect::<ConfigResult<Vec<_>>>()?;
        debug!(policies = policies.len(), probes = config.probes.len(), "guardrails compiled");
        Ok(Self {
            policies,
            probes: config.probes.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Check one response text, attributing violations to `key`.
    pub fn validate(&self, key: &PairKey, text: &str) -> Vec<Violation> {
        let mut violations = Vec::new();
        for policy in &self.policies {
            for detail in policy.matches(text) {
                let description = match &policy.description {
                    Some(d) => format!("{d} ({detail})"),
                    None => detail,
                };
                violations.push(Violation {
                    key: key.clone(),
                    policy_id: policy.id.clone(),
                    category: policy.category,
                    severity: policy.severity,
                    description,
                });
            }
        }
        violations
    }

    /// Check every successful result. Failed results have no text to check.
    pub fn validate_all(&self, results: &[TestResult]) -> Vec<Violation> {
        results
            .iter()
            .filter(|r| r.is_success())
            .flat_map(|r| self.validate(&r.key, &r.response))
            .collect()
    }

    /// Run the configured probe samples and report the ones whose worst
    /// severity differs from the expected one.
    pub fn probe(&self) -> ProbeReport {
        let key = PairKey::new("probe", "probe");
        let failures = self
            .probes
            .iter()
            .filter_map(|probe| {
                let found = self
                    .validate(&key, &probe.text)
                    .iter()
                    .map(|v| v.severity)
                    .max();
                (found != probe.expect).then(|| ProbeFailure {
                    text: probe.text.clone(),
                    expected: probe.expect,
                    found,
                })
            })
            .collect();
        ProbeReport {
            checked: self.probes.len(),
            failures,
        }
    }
}

impl CompiledPolicy {
    /// One detail string per hit.
    fn matches(&self, text: &str) -> Vec<String> {
        match &self.matcher {
            Matcher::Pattern(re) => re
                .find(text)
                .map(|_| vec![format!("matched pattern /{}/", re.as_str())])
                .unwrap_or_default(),
            Matcher::Words(re) => {
                let mut words: Vec<String> =
                    re.find_iter(text).map(|m| m.as_str().to_lowercase()).collect();
                words.sort();
                words.dedup();
                if words.is_empty() {
                    Vec::new()
                } else {
                    vec![format!("matched terms: {}", words.join(", "))]
                }
            }
            Matcher::Pii(detectors) => detectors
                .iter()
                .filter(|(entity, re)| match entity {
                    PiiEntity::CreditCard => re.find_iter(text).any(|m| luhn_valid(m.as_str())),
                    _ => re.is_match(text),
                })
                .map(|(entity, _)| format!("detected {}", entity_label(*entity)))
                .collect(),
        }
    }
}

fn compile_policy(policy: &PolicyConfig) -> ConfigResult<CompiledPolicy> {
    let field = format!("guardrails.policies.{}.rule", policy.id);
    let bad = |e: regex::Error| ConfigError::invalid(field.clone(), e.to_string());

    let matcher = match &policy.rule {
        DetectionRule::Regex {
            pattern,
            case_insensitive,
        } => Matcher::Pattern(
            RegexBuilder::new(pattern)
                .case_insensitive(*case_insensitive)
                .build()
                .map_err(bad)?,
        ),
        DetectionRule::Keywords { words } => {
            if words.is_empty() || words.iter().any(|w| w.trim().is_empty()) {
                return Err(ConfigError::invalid(
                    field.clone(),
                    "keyword list is empty or has a blank term",
                ));
            }
            let alternation = words
                .iter()
                .map(|w| regex::escape(w.trim()))
                .collect::<Vec<_>>()
                .join("|");
            Matcher::Words(
                RegexBuilder::new(&format!(r"\b(?:{alternation})\b"))
                    .case_insensitive(true)
                    .build()
                    .map_err(bad)?,
            )
        }
        DetectionRule::Pii { entities } => Matcher::Pii(
            entities
                .iter()
                .map(|entity| Ok((*entity, Regex::new(entity_pattern(*entity)).map_err(bad)?)))
                .collect::<ConfigResult<Vec<_>>>()?,
        ),
    };

    Ok(CompiledPolicy {
        id: policy.id.clone(),
        category: policy.category,
        severity: policy.severity,
        description: policy.description.clone(),
        matcher,
    })
}

fn entity_pattern(entity: PiiEntity) -> &'static str {
    match entity {
        PiiEntity::Email => EMAIL,
        PiiEntity::Phone => PHONE,
        PiiEntity::CreditCard => CARD,
        PiiEntity::Ssn => SSN,
        PiiEntity::IpAddress => IPV4,
    }
}

fn entity_label(entity: PiiEntity) -> &'static str {
    match entity {
        PiiEntity::Email => "email address",
        PiiEntity::Phone => "phone number",
        PiiEntity::CreditCard => "credit card number",
        PiiEntity::Ssn => "social security number",
        PiiEntity::IpAddress => "IP address",
    }
}

/// Luhn checksum over the digits of `candidate`.
fn luhn_valid(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if !(13..=19).contains(&digits.len()) {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}
