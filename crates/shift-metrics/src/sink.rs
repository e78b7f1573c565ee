//! Event sinks.
//!
//! `emit` is synchronous and must not block: sinks aggregate in memory or
//! hand the event to the log pipeline.

use std::sync::Arc;

use tracing::debug;

use crate::event::RolloutEvent;

/// Receives structured rollout events.
pub trait MetricsSink: Send + Sync {
    fn emit(&self, event: &RolloutEvent);
}

pub type SharedSink = Arc<dyn MetricsSink>;

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl MetricsSink for NullSink {
    fn emit(&self, _event: &RolloutEvent) {}
}

/// Writes every event as a structured `debug!` line with a JSON payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn emit(&self, event: &RolloutEvent) {
        let payload = serde_json::to_string(event).unwrap_or_default();
        debug!(
            pipeline = %event.pipeline_id(),
            event = event.kind(),
            %payload,
            "rollout event"
        );
    }
}

/// Forwards each event to every inner sink, in order.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<SharedSink>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: SharedSink) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl MetricsSink for FanoutSink {
    fn emit(&self, event: &RolloutEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}
