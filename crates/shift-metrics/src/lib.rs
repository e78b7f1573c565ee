//! shift-metrics: observability for PromptShift rollouts.
//!
//! Components emit structured [`RolloutEvent`]s into a [`MetricsSink`].
//! The [`MetricsCollector`] sink aggregates them into counters and latency
//! percentiles and renders Prometheus text exposition.
//!
//! # Architecture
//!
//! ```text
//! executor / controller / monitor
//!   └── sink.emit(RolloutEvent)
//!         ├── TracingSink → structured log line
//!         └── MetricsCollector
//!               ├── snapshot() → MetricsSnapshot
//!               └── render_prometheus() → text/plain for /metrics
//! ```

pub mod collector;
pub mod event;
pub mod prometheus;
pub mod sink;

pub use collector::{InvocationStats, MetricsCollector, MetricsSnapshot};
pub use event::RolloutEvent;
pub use prometheus::render_prometheus;
pub use sink::{FanoutSink, MetricsSink, NullSink, SharedSink, TracingSink};
