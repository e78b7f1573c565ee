//! shift-executor: runs a candidate against the test corpus.
//!
//! Every (case, variant) pair becomes one task. Tasks for the same
//! provider share a semaphore sized by the provider's concurrency limit;
//! each attempt carries its own timeout and transient failures are
//! retried with exponential backoff. The whole run is capped by the
//! Testing deadline, after which unfinished pairs are recorded as
//! timeouts.
//!
//! # Components
//!
//! - **`backend`**: `ModelBackend` trait and the provider registry
//! - **`http`**: JSON-over-HTTP inference adapter
//! - **`replay`**: canned responses from a fixture file
//! - **`executor`**: fan-out, retry, and result collection

pub mod backend;
pub mod error;
pub mod executor;
pub mod http;
pub mod replay;

pub use backend::{
    estimate_tokens, BackendRegistry, BoxFuture, InvocationRequest, InvocationResponse,
    ModelBackend,
};
pub use error::{ExecutorError, ExecutorResult, InvocationError};
pub use executor::TestExecutor;
pub use http::HttpBackend;
pub use replay::ReplayBackend;
