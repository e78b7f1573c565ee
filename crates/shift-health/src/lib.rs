//! shift-health: post-promotion health monitoring.
//!
//! A [`HealthSource`] supplies samples (error rate, p99 latency, or an
//! external health score) for a deployment target. The [`HealthMonitor`]
//! polls it at a fixed interval for a bounded window and reports whether
//! the target stayed within bounds, breached them, or was aborted.
//!
//! # Components
//!
//! - **`source`**: sample type, bounds, and the source trait
//! - **`http`**: JSON health endpoint probe
//! - **`monitor`**: the cancellable polling window

pub mod http;
pub mod monitor;
pub mod source;

pub use http::HttpHealthSource;
pub use monitor::{abort_requested, HealthMonitor, MonitorOutcome, MonitorSettings};
pub use source::{
    BoxFuture, HealthBounds, HealthError, HealthResult, HealthSample, HealthSource,
    SequenceSource, StaticSource,
};
