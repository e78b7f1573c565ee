//! Health samples, bounds, and the source seam.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use shift_core::config::MonitoringConfig;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HealthError {
    #[error("health source unreachable: {0}")]
    Unreachable(String),

    #[error("malformed health sample: {0}")]
    Malformed(String),
}

pub type HealthResult<T> = Result<T, HealthError>;

/// One observation of live traffic. Absent signals are not checked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthSample {
    #[serde(default, alias = "errorRate")]
    pub error_rate: Option<f64>,
    #[serde(default, alias = "p99LatencyMs")]
    pub p99_latency_ms: Option<u64>,
    #[serde(default, alias = "healthScore")]
    pub health_score: Option<f64>,
}

impl HealthSample {
    pub fn with_error_rate(error_rate: f64) -> Self {
        Self {
            error_rate: Some(error_rate),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthBounds {
    pub max_error_rate: f64,
    pub max_latency_ms: u64,
    pub min_health_score: Option<f64>,
}

impl From<&MonitoringConfig> for HealthBounds {
    fn from(config: &MonitoringConfig) -> Self {
        Self {
            max_error_rate: config.max_error_rate,
            max_latency_ms: config.max_latency_ms,
            min_health_score: config.min_health_score,
        }
    }
}

impl HealthBounds {
    /// `Err` carries a human-readable breach reason.
    pub fn check(&self, sample: &HealthSample) -> Result<(), String> {
        if let Some(rate) = sample.error_rate {
            if rate > self.max_error_rate {
                return Err(format!(
                    "error rate {rate:.4} above bound {:.4}",
                    self.max_error_rate
                ));
            }
        }
        if let Some(p99) = sample.p99_latency_ms {
            if p99 > self.max_latency_ms {
                return Err(format!(
                    "p99 latency {p99}ms above bound {}ms",
                    self.max_latency_ms
                ));
            }
        }
        if let (Some(score), Some(min)) = (sample.health_score, self.min_health_score) {
            if score < min {
                return Err(format!("health score {score:.3} below bound {min:.3}"));
            }
        }
        Ok(())
    }
}

/// Supplies health samples for the live slot of a target.
pub trait HealthSource: Send + Sync {
    fn sample<'a>(&'a self, target: &'a str) -> BoxFuture<'a, HealthResult<HealthSample>>;
}

/// Always returns the same sample.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    sample: HealthSample,
}

impl StaticSource {
    pub fn new(sample: HealthSample) -> Self {
        Self { sample }
    }
}

impl HealthSource for StaticSource {
    fn sample<'a>(&'a self, _target: &'a str) -> BoxFuture<'a, HealthResult<HealthSample>> {
        let sample = self.sample.clone();
        Box::pin(async move { Ok(sample) })
    }
}

/// Plays back a fixed sequence of poll results, then repeats the fallback.
pub struct SequenceSource {
    queue: Mutex<VecDeque<HealthResult<HealthSample>>>,
    fallback: HealthSample,
}

impl SequenceSource {
    pub fn new(samples: impl IntoIterator<Item = HealthResult<HealthSample>>) -> Self {
        Self {
            queue: Mutex::new(samples.into_iter().collect()),
            fallback: HealthSample::default(),
        }
    }

    pub fn with_fallback(mut self, fallback: HealthSample) -> Self {
        self.fallback = fallback;
        self
    }
}

impl HealthSource for SequenceSource {
    fn sample<'a>(&'a self, _target: &'a str) -> BoxFuture<'a, HealthResult<HealthSample>> {
        let next = match self.queue.lock() {
            Ok(mut queue) => queue.pop_front(),
            Err(_) => None,
        };
        let next = next.unwrap_or_else(|| Ok(self.fallback.clone()));
        Box::pin(async move { next })
    }
}
