//! Model backend seam and provider registry.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use shift_core::config::BackendConfig;
use shift_core::{CaseId, InvocationParams};
use tracing::debug;

use crate::error::{ExecutorResult, InvocationError};
use crate::http::HttpBackend;
use crate::replay::ReplayBackend;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One rendered prompt for one model.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
    pub case_id: CaseId,
    pub provider: String,
    pub model: String,
    pub prompt: String,
    pub params: InvocationParams,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvocationResponse {
    pub text: String,
    /// Token usage reported by the backend, if any.
    pub tokens: Option<u32>,
}

/// An opaque request/response inference call.
pub trait ModelBackend: Send + Sync {
    fn invoke<'a>(
        &'a self,
        request: &'a InvocationRequest,
    ) -> BoxFuture<'a, Result<InvocationResponse, InvocationError>>;
}

/// Backends keyed by provider id.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn ModelBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build adapters for every `[backends.<provider>]` entry.
    pub fn from_config(config: &BTreeMap<String, BackendConfig>) -> ExecutorResult<Self> {
        let mut registry = Self::new();
        for (provider, backend) in config {
            let adapter: Arc<dyn ModelBackend> = match backend {
                BackendConfig::Http { address, path } => {
                    Arc::new(HttpBackend::new(address, path))
                }
                BackendConfig::Replay { fixture } => Arc::new(ReplayBackend::load(fixture)?),
            };
            debug!(%provider, "backend registered");
            registry.register(provider, adapter);
        }
        Ok(registry)
    }

    pub fn register(&mut self, provider: &str, backend: Arc<dyn ModelBackend>) {
        self.backends.insert(provider.to_string(), backend);
    }

    pub fn get(&self, provider: &str) -> Option<Arc<dyn ModelBackend>> {
        self.backends.get(provider).cloned()
    }

    pub fn providers(&self) -> Vec<String> {
        let mut providers: Vec<String> = self.backends.keys().cloned().collect();
        providers.sort();
        providers
    }
}

/// Rough token count for backends that do not report usage.
pub fn estimate_tokens(text: &str) -> u32 {
    (text.split_whitespace().count() as f64 * 1.3).round() as u32
}
