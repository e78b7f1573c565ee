//! shift.toml configuration parser.
//!
//! Thresholds, policies and collaborator settings are loaded once per
//! rollout attempt and treated as immutable for that attempt.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::{PolicyCategory, Severity};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShiftConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub guardrails: GuardrailConfig,
    /// Backend adapter per provider id.
    #[serde(default)]
    pub backends: BTreeMap<String, BackendConfig>,
    #[serde(default)]
    pub corpus: Option<CorpusConfig>,
    #[serde(default)]
    pub templates: Option<TemplatesConfig>,
    #[serde(default)]
    pub host: HostConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Deployment target this pipeline promotes into.
    #[serde(default = "default_target")]
    pub target: String,
    /// Where the state store lives.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target: default_target(),
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Concurrent invocations allowed per provider unless overridden.
    #[serde(default = "default_concurrency")]
    pub max_concurrency_per_provider: usize,
    #[serde(default)]
    pub provider_limits: BTreeMap<String, usize>,
    #[serde(default = "default_invocation_timeout", with = "duration_str")]
    pub invocation_timeout: Duration,
    /// Retries after the first attempt for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff", with = "duration_str")]
    pub initial_backoff: Duration,
    #[serde(default = "default_max_backoff", with = "duration_str")]
    pub max_backoff: Duration,
    /// Wall-clock cap on the whole Testing phase.
    #[serde(default = "default_testing_timeout", with = "duration_str")]
    pub testing_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency_per_provider: default_concurrency(),
            provider_limits: BTreeMap::new(),
            invocation_timeout: default_invocation_timeout(),
            max_retries: default_max_retries(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
            testing_timeout: default_testing_timeout(),
        }
    }
}

impl ExecutorConfig {
    pub fn limit_for(&self, provider: &str) -> usize {
        self.provider_limits
            .get(provider)
            .copied()
            .unwrap_or(self.max_concurrency_per_provider)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_criteria_weight")]
    pub criteria_weight: f64,
    #[serde(default = "default_component_weight")]
    pub length_weight: f64,
    #[serde(default = "default_component_weight")]
    pub form_weight: f64,
    #[serde(default = "default_component_weight")]
    pub latency_weight: f64,
    /// Latency above this decays the latency component.
    #[serde(default = "default_latency_ceiling_ms")]
    pub latency_ceiling_ms: u64,
    /// Span over which the latency component falls from 1 to 0.
    /// Defaults to the ceiling.
    #[serde(default)]
    pub latency_decay_ms: Option<u64>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            criteria_weight: default_criteria_weight(),
            length_weight: default_component_weight(),
            form_weight: default_component_weight(),
            latency_weight: default_component_weight(),
            latency_ceiling_ms: default_latency_ceiling_ms(),
            latency_decay_ms: None,
        }
    }
}

impl ScoringConfig {
    pub fn latency_decay_ms(&self) -> u64 {
        self.latency_decay_ms.unwrap_or(self.latency_ceiling_ms).max(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Inclusive lower bound on the aggregate score.
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,
    /// Minimum fraction of pairs that must succeed.
    #[serde(default = "default_min_coverage")]
    pub min_coverage: f64,
    /// Aggregation weight per test case tag; untagged and unlisted tags weigh 1.
    #[serde(default)]
    pub tag_weights: BTreeMap<String, f64>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            pass_threshold: default_pass_threshold(),
            min_coverage: default_min_coverage(),
            tag_weights: BTreeMap::new(),
        }
    }
}

impl GateConfig {
    pub fn weight_for(&self, tag: Option<&str>) -> f64 {
        tag.and_then(|t| self.tag_weights.get(t))
            .copied()
            .unwrap_or(1.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default = "default_window", with = "duration_str")]
    pub window: Duration,
    #[serde(default = "default_poll_interval", with = "duration_str")]
    pub poll_interval: Duration,
    #[serde(default = "default_probe_timeout", with = "duration_str")]
    pub probe_timeout: Duration,
    /// Error rate bound as a fraction (0.05 = 5%).
    #[serde(default = "default_max_error_rate")]
    pub max_error_rate: f64,
    #[serde(default = "default_max_latency_ms")]
    pub max_latency_ms: u64,
    #[serde(default)]
    pub min_health_score: Option<f64>,
    /// Consecutive unreachable polls treated as a breach.
    #[serde(default = "default_unreachable_threshold")]
    pub unreachable_threshold: u32,
    /// Endpoint serving health samples as JSON.
    #[serde(default)]
    pub health_url: Option<String>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            poll_interval: default_poll_interval(),
            probe_timeout: default_probe_timeout(),
            max_error_rate: default_max_error_rate(),
            max_latency_ms: default_max_latency_ms(),
            min_health_score: None,
            unreachable_threshold: default_unreachable_threshold(),
            health_url: None,
        }
    }
}

impl MonitoringConfig {
    /// Number of polls in one health window.
    pub fn poll_count(&self) -> u32 {
        let interval = self.poll_interval.as_millis().max(1);
        ((self.window.as_millis() / interval) as u32).max(1)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardrailConfig {
    #[serde(default)]
    pub policies: Vec<PolicyConfig>,
    /// Sample texts used to self-test the policy list.
    #[serde(default)]
    pub probes: Vec<ProbeConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub id: String,
    pub category: PolicyCategory,
    pub severity: Severity,
    pub rule: DetectionRule,
    #[serde(default)]
    pub description: Option<String>,
}

/// How a policy detects offending content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectionRule {
    Regex {
        pattern: String,
        #[serde(default)]
        case_insensitive: bool,
    },
    /// Whole-word, case-insensitive match on any listed term.
    Keywords { words: Vec<String> },
    Pii { entities: Vec<PiiEntity> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiEntity {
    Email,
    Phone,
    CreditCard,
    Ssn,
    IpAddress,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub text: String,
    /// Expected worst severity; absent means the text must pass clean.
    #[serde(default)]
    pub expect: Option<Severity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// JSON-over-HTTP inference endpoint.
    Http {
        /// `host:port` of the endpoint.
        address: String,
        #[serde(default = "default_invoke_path")]
        path: String,
    },
    /// Canned responses from a JSON fixture.
    Replay { fixture: PathBuf },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    pub dir: PathBuf,
}

/// Hosting layer that receives promote/rollback directives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostConfig {
    #[default]
    Log,
    /// Write the live pointer as JSON to a file.
    PointerFile { path: PathBuf },
}

impl ShiftConfig {
    /// Parse, resolve relative paths against the file's directory, and validate.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: ShiftConfig = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::invalid("config", e.to_string()))
    }

    fn resolve_paths(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        join(&mut self.pipeline.data_dir);
        if let Some(corpus) = &mut self.corpus {
            join(&mut corpus.path);
        }
        if let Some(templates) = &mut self.templates {
            join(&mut templates.dir);
        }
        for backend in self.backends.values_mut() {
            if let BackendConfig::Replay { fixture } = backend {
                join(fixture);
            }
        }
        if let HostConfig::PointerFile { path } = &mut self.host {
            join(path);
        }
    }

    /// Check every threshold and policy for internal consistency.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.pipeline.target.trim().is_empty() {
            return Err(ConfigError::invalid("pipeline.target", "must not be empty"));
        }

        let ex = &self.executor;
        if ex.max_concurrency_per_provider == 0 {
            return Err(ConfigError::invalid(
                "executor.max_concurrency_per_provider",
                "must be at least 1",
            ));
        }
        if let Some((provider, _)) = ex.provider_limits.iter().find(|(_, l)| **l == 0) {
            return Err(ConfigError::invalid(
                format!("executor.provider_limits.{provider}"),
                "must be at least 1",
            ));
        }
        non_zero("executor.invocation_timeout", ex.invocation_timeout)?;
        non_zero("executor.testing_timeout", ex.testing_timeout)?;
        at_most("executor.invocation_timeout", ex.invocation_timeout)?;
        at_most("executor.testing_timeout", ex.testing_timeout)?;
        at_most("executor.initial_backoff", ex.initial_backoff)?;
        at_most("executor.max_backoff", ex.max_backoff)?;
        if ex.initial_backoff > ex.max_backoff {
            return Err(ConfigError::invalid(
                "executor.initial_backoff",
                "exceeds executor.max_backoff",
            ));
        }

        let sc = &self.scoring;
        let weights = [
            ("scoring.criteria_weight", sc.criteria_weight),
            ("scoring.length_weight", sc.length_weight),
            ("scoring.form_weight", sc.form_weight),
            ("scoring.latency_weight", sc.latency_weight),
        ];
        for (field, w) in weights {
            if !w.is_finite() || w < 0.0 {
                return Err(ConfigError::invalid(field, format!("{w} is not a non-negative weight")));
            }
        }
        if weights.iter().map(|(_, w)| w).sum::<f64>() <= 0.0 {
            return Err(ConfigError::invalid("scoring", "all weights are zero"));
        }
        if sc.latency_ceiling_ms == 0 {
            return Err(ConfigError::invalid("scoring.latency_ceiling_ms", "must be greater than 0"));
        }

        unit_interval("gate.pass_threshold", self.gate.pass_threshold)?;
        unit_interval("gate.min_coverage", self.gate.min_coverage)?;
        for (tag, w) in &self.gate.tag_weights {
            if !w.is_finite() || *w < 0.0 {
                return Err(ConfigError::invalid(
                    format!("gate.tag_weights.{tag}"),
                    format!("{w} is not a non-negative weight"),
                ));
            }
        }

        let mon = &self.monitoring;
        non_zero("monitoring.poll_interval", mon.poll_interval)?;
        non_zero("monitoring.probe_timeout", mon.probe_timeout)?;
        at_most("monitoring.window", mon.window)?;
        at_most("monitoring.poll_interval", mon.poll_interval)?;
        at_most("monitoring.probe_timeout", mon.probe_timeout)?;
        if mon.window < mon.poll_interval {
            return Err(ConfigError::invalid(
                "monitoring.window",
                "shorter than monitoring.poll_interval",
            ));
        }
        unit_interval("monitoring.max_error_rate", mon.max_error_rate)?;
        if let Some(score) = mon.min_health_score {
            unit_interval("monitoring.min_health_score", score)?;
        }
        if mon.unreachable_threshold == 0 {
            return Err(ConfigError::invalid(
                "monitoring.unreachable_threshold",
                "must be at least 1",
            ));
        }

        let mut ids = BTreeSet::new();
        for policy in &self.guardrails.policies {
            if !ids.insert(policy.id.as_str()) {
                return Err(ConfigError::Duplicate {
                    kind: "guardrail policy",
                    id: policy.id.clone(),
                });
            }
            let empty = match &policy.rule {
                DetectionRule::Regex { pattern, .. } => pattern.is_empty(),
                DetectionRule::Keywords { words } => {
                    words.is_empty() || words.iter().any(|w| w.trim().is_empty())
                }
                DetectionRule::Pii { entities } => entities.is_empty(),
            };
            if empty {
                return Err(ConfigError::invalid(
                    format!("guardrails.policies.{}.rule", policy.id),
                    "detection rule is empty or has a blank term",
                ));
            }
        }

        Ok(())
    }
}

fn non_zero(field: &str, d: Duration) -> ConfigResult<()> {
    if d.is_zero() {
        return Err(ConfigError::invalid(field, "must be greater than 0"));
    }
    Ok(())
}

/// Longest duration any timeout, backoff or window may be configured to.
pub const MAX_DURATION: Duration = Duration::from_secs(7 * 24 * 3600);

fn at_most(field: &str, d: Duration) -> ConfigResult<()> {
    if d > MAX_DURATION {
        return Err(ConfigError::invalid(
            field,
            format!("{} exceeds the maximum of {}", format_duration(d), format_duration(MAX_DURATION)),
        ));
    }
    Ok(())
}

fn unit_interval(field: &str, v: f64) -> ConfigResult<()> {
    if !(0.0..=1.0).contains(&v) {
        return Err(ConfigError::invalid(field, format!("{v} is outside [0, 1]")));
    }
    Ok(())
}

/// Parse a duration string like "5s", "500ms", "2m", "1h".
///
/// A plain number is read as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        let m = mins.trim().parse::<u64>().ok()?;
        m.checked_mul(60).map(Duration::from_secs)
    } else if let Some(hours) = s.strip_suffix('h') {
        let h = hours.trim().parse::<u64>().ok()?;
        h.checked_mul(3600).map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

/// Format a duration in the shortest unit `parse_duration` reads back exactly.
pub fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms % 1000 != 0 {
        format!("{ms}ms")
    } else if ms % 60_000 != 0 {
        format!("{}s", ms / 1000)
    } else {
        format!("{}m", ms / 60_000)
    }
}

mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_duration(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid duration `{raw}`")))
    }
}

fn default_target() -> String {
    "default".to_string()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from(".shift")
}
fn default_concurrency() -> usize {
    4
}
fn default_invocation_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_max_retries() -> u32 {
    3
}
fn default_initial_backoff() -> Duration {
    Duration::from_millis(250)
}
fn default_max_backoff() -> Duration {
    Duration::from_secs(8)
}
fn default_testing_timeout() -> Duration {
    Duration::from_secs(600)
}
fn default_criteria_weight() -> f64 {
    0.4
}
fn default_component_weight() -> f64 {
    0.2
}
fn default_latency_ceiling_ms() -> u64 {
    2000
}
fn default_pass_threshold() -> f64 {
    0.8
}
fn default_min_coverage() -> f64 {
    0.9
}
fn default_window() -> Duration {
    Duration::from_secs(300)
}
fn default_poll_interval() -> Duration {
    Duration::from_secs(60)
}
fn default_probe_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_max_error_rate() -> f64 {
    0.05
}
fn default_max_latency_ms() -> u64 {
    3000
}
fn default_unreachable_threshold() -> u32 {
    2
}
fn default_invoke_path() -> String {
    "/invoke".to_string()
}
