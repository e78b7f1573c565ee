//! Metrics collector: aggregates rollout events in memory.
//!
//! Scalar counters are atomics; per-model invocation stats live behind a
//! mutex together with their latency samples for percentile computation.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use shift_core::{GateOutcome, InvocationStatus};

use crate::event::RolloutEvent;
use crate::sink::MetricsSink;

#[derive(Default)]
struct ModelMetrics {
    ok: u64,
    errors: u64,
    timeouts: u64,
    retries: u64,
    tokens: u64,
    latencies_ms: Vec<u64>,
}

/// Aggregated invocation stats for one `provider/model`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationStats {
    pub provider: String,
    pub model: String,
    pub ok: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub retries: u64,
    pub tokens: u64,
    pub latency_p50_ms: f64,
    pub latency_p99_ms: f64,
}

/// Point-in-time view of everything the collector has seen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub invocations: Vec<InvocationStats>,
    pub gates_passed: u64,
    pub gates_blocked: u64,
    pub promotions: u64,
    pub rollbacks: u64,
    pub health_polls: u64,
    pub health_breaches: u64,
}

#[derive(Default)]
pub struct MetricsCollector {
    /// (provider, model) → stats.
    models: Mutex<BTreeMap<(String, String), ModelMetrics>>,
    gates_passed: AtomicU64,
    gates_blocked: AtomicU64,
    promotions: AtomicU64,
    rollbacks: AtomicU64,
    health_polls: AtomicU64,
    health_breaches: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let invocations = match self.models.lock() {
            Ok(models) => models
                .iter()
                .map(|((provider, model), m)| {
                    let (p50, p99) = compute_percentiles(&m.latencies_ms);
                    InvocationStats {
                        provider: provider.clone(),
                        model: model.clone(),
                        ok: m.ok,
                        errors: m.errors,
                        timeouts: m.timeouts,
                        retries: m.retries,
                        tokens: m.tokens,
                        latency_p50_ms: p50,
                        latency_p99_ms: p99,
                    }
                })
                .collect(),
            Err(_) => Vec::new(),
        };

        MetricsSnapshot {
            invocations,
            gates_passed: self.gates_passed.load(Ordering::Relaxed),
            gates_blocked: self.gates_blocked.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            health_polls: self.health_polls.load(Ordering::Relaxed),
            health_breaches: self.health_breaches.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSink for MetricsCollector {
    fn emit(&self, event: &RolloutEvent) {
        match event {
            RolloutEvent::Invocation {
                provider,
                model,
                status,
                latency_ms,
                attempts,
                tokens,
                ..
            } => {
                let Ok(mut models) = self.models.lock() else {
                    return;
                };
                let m = models
                    .entry((provider.clone(), model.clone()))
                    .or_default();
                match status {
                    InvocationStatus::Ok => m.ok += 1,
                    InvocationStatus::Error => m.errors += 1,
                    InvocationStatus::Timeout => m.timeouts += 1,
                }
                m.retries += u64::from(attempts.saturating_sub(1));
                m.tokens += u64::from(tokens.unwrap_or(0));
                m.latencies_ms.push(*latency_ms);
            }
            RolloutEvent::GateDecided { outcome, .. } => {
                let counter = match outcome {
                    GateOutcome::Pass => &self.gates_passed,
                    GateOutcome::Block => &self.gates_blocked,
                };
                counter.fetch_add(1, Ordering::Relaxed);
            }
            RolloutEvent::HealthPolled { within_bounds, .. } => {
                self.health_polls.fetch_add(1, Ordering::Relaxed);
                if !within_bounds {
                    self.health_breaches.fetch_add(1, Ordering::Relaxed);
                }
            }
            RolloutEvent::Promoted { .. } => {
                self.promotions.fetch_add(1, Ordering::Relaxed);
            }
            RolloutEvent::RolledBack { .. } => {
                self.rollbacks.fetch_add(1, Ordering::Relaxed);
            }
            RolloutEvent::PhaseChanged { .. } => {}
        }
    }
}

/// Compute P50 and P99 from unsorted millisecond samples.
///
/// Returns (p50, p99). If empty, returns (0.0, 0.0).
fn compute_percentiles(latencies: &[u64]) -> (f64, f64) {
    if latencies.is_empty() {
        return (0.0, 0.0);
    }

    let mut sorted = latencies.to_vec();
    sorted.sort_unstable();

    let p50_idx = (sorted.len() as f64 * 0.50) as usize;
    let p99_idx = (sorted.len() as f64 * 0.99) as usize;

    let p50 = sorted[p50_idx.min(sorted.len() - 1)] as f64;
    let p99 = sorted[p99_idx.min(sorted.len() - 1)] as f64;

    (p50, p99)
}
