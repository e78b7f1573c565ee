//! Health monitor: the bounded, cancellable post-promotion window.
//!
//! The monitor polls its source `poll_count` times, one poll per
//! `poll_interval`. Each probe has its own timeout. A sample outside the
//! bounds ends the window immediately; so does `unreachable_threshold`
//! consecutive failed probes. An abort signal ends it at the next
//! suspension point.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use shift_core::config::MonitoringConfig;
use shift_metrics::{NullSink, RolloutEvent, SharedSink};

use crate::source::{HealthBounds, HealthSample, HealthSource};

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub poll_count: u32,
    pub probe_timeout: Duration,
    pub unreachable_threshold: u32,
    pub bounds: HealthBounds,
}

impl From<&MonitoringConfig> for MonitorSettings {
    fn from(config: &MonitoringConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            poll_count: config.poll_count(),
            probe_timeout: config.probe_timeout,
            unreachable_threshold: config.unreachable_threshold.max(1),
            bounds: HealthBounds::from(config),
        }
    }
}

/// How a monitoring window ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MonitorOutcome {
    /// Every poll stayed within bounds.
    Healthy { polls: u32 },
    /// Poll `poll` (1-based) breached the bounds.
    Breached { poll: u32, reason: String },
    /// Stopped by an abort signal before the window completed.
    Aborted { polls: u32 },
}

pub struct HealthMonitor {
    source: Arc<dyn HealthSource>,
    settings: MonitorSettings,
    sink: SharedSink,
}

impl HealthMonitor {
    pub fn new(source: Arc<dyn HealthSource>, settings: MonitorSettings) -> Self {
        Self {
            source,
            settings,
            sink: Arc::new(NullSink),
        }
    }

    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Run one monitoring window for `target`.
    ///
    /// `abort` ends the window early once it reads `true`; a dropped
    /// sender is never treated as an abort.
    pub async fn watch(
        &self,
        pipeline_id: &str,
        target: &str,
        mut abort: watch::Receiver<bool>,
    ) -> MonitorOutcome {
        let s = &self.settings;
        let mut unreachable = 0u32;

        info!(
            pipeline = %pipeline_id,
            %target,
            polls = s.poll_count,
            interval_ms = s.poll_interval.as_millis() as u64,
            "health monitoring started"
        );

        for poll in 1..=s.poll_count {
            tokio::select! {
                _ = tokio::time::sleep(s.poll_interval) => {}
                _ = abort_requested(&mut abort) => {
                    info!(pipeline = %pipeline_id, %target, poll, "health monitoring aborted");
                    return MonitorOutcome::Aborted { polls: poll - 1 };
                }
            }

            let probe = tokio::time::timeout(s.probe_timeout, self.source.sample(target));
            let result = tokio::select! {
                result = probe => result,
                _ = abort_requested(&mut abort) => {
                    info!(pipeline = %pipeline_id, %target, poll, "health monitoring aborted");
                    return MonitorOutcome::Aborted { polls: poll - 1 };
                }
            };

            let sample: Option<HealthSample> = match result {
                Ok(Ok(sample)) => Some(sample),
                Ok(Err(e)) => {
                    debug!(pipeline = %pipeline_id, %target, poll, error = %e, "health probe failed");
                    None
                }
                Err(_) => {
                    debug!(pipeline = %pipeline_id, %target, poll, "health probe timed out");
                    None
                }
            };

            let verdict = match &sample {
                Some(sample) => {
                    unreachable = 0;
                    s.bounds.check(sample)
                }
                None => {
                    unreachable += 1;
                    if unreachable >= s.unreachable_threshold {
                        Err(format!(
                            "health source unreachable for {unreachable} consecutive polls"
                        ))
                    } else {
                        Ok(())
                    }
                }
            };

            self.sink.emit(&RolloutEvent::HealthPolled {
                pipeline_id: pipeline_id.to_string(),
                target: target.to_string(),
                poll,
                error_rate: sample.as_ref().and_then(|s| s.error_rate),
                p99_latency_ms: sample.as_ref().and_then(|s| s.p99_latency_ms),
                within_bounds: verdict.is_ok(),
            });

            if let Err(reason) = verdict {
                warn!(
                    pipeline = %pipeline_id,
                    %target,
                    poll,
                    of = s.poll_count,
                    %reason,
                    "health breach detected"
                );
                return MonitorOutcome::Breached { poll, reason };
            }
            debug!(pipeline = %pipeline_id, %target, poll, of = s.poll_count, "health poll within bounds");
        }

        info!(pipeline = %pipeline_id, %target, polls = s.poll_count, "health window completed");
        MonitorOutcome::Healthy {
            polls: s.poll_count,
        }
    }
}

/// Resolves once the abort flag is `true`. Never resolves if the sender
/// is gone.
pub async fn abort_requested(abort: &mut watch::Receiver<bool>) {
    if abort.wait_for(|requested| *requested).await.is_err() {
        std::future::pending::<()>().await;
    }
}
