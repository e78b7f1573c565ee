//! Test executor: fans a candidate out over the corpus.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use shift_core::config::ExecutorConfig;
use shift_core::{
    Candidate, ConfigResult, Corpus, InvocationStatus, ModelVariant, PairKey, PromptTemplate,
    TestResult,
};
use shift_metrics::{NullSink, RolloutEvent, SharedSink};

use crate::backend::{BackendRegistry, InvocationRequest, ModelBackend};
use crate::error::{ExecutorError, ExecutorResult, InvocationError};

/// Retry/timeout knobs for one invocation.
#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    timeout: Duration,
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl From<&ExecutorConfig> for RetryPolicy {
    fn from(config: &ExecutorConfig) -> Self {
        Self {
            timeout: config.invocation_timeout,
            max_retries: config.max_retries,
            initial_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
        }
    }
}

/// Terminal outcome of one invocation after retries.
#[derive(Debug)]
struct Attempt {
    status: InvocationStatus,
    response: String,
    latency_ms: u64,
    attempts: u32,
    tokens: Option<u32>,
    error: Option<String>,
}

pub struct TestExecutor {
    config: ExecutorConfig,
    backends: BackendRegistry,
    sink: SharedSink,
}

impl TestExecutor {
    pub fn new(config: ExecutorConfig, backends: BackendRegistry) -> Self {
        Self {
            config,
            backends,
            sink: Arc::new(NullSink),
        }
    }

    /// Emit one `Invocation` event per terminal result into `sink`.
    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    /// Every provider named by the candidate must have a backend.
    pub fn check_backends(&self, candidate: &Candidate) -> ExecutorResult<()> {
        for variant in &candidate.variants {
            if self.backends.get(&variant.provider).is_none() {
                return Err(ExecutorError::MissingBackend(variant.provider.clone()));
            }
        }
        Ok(())
    }

    /// Produce exactly one `TestResult` per (case, variant) pair, in corpus
    /// order then variant order.
    ///
    /// Returns an error only for setup problems (missing backend, unbound
    /// template variable). Invocation failures become results.
    pub async fn run(
        &self,
        pipeline_id: &str,
        candidate: &Candidate,
        template: &PromptTemplate,
        corpus: &Corpus,
    ) -> ExecutorResult<Vec<TestResult>> {
        self.check_backends(candidate)?;

        let prompts = corpus
            .cases
            .iter()
            .map(|case| template.render(case))
            .collect::<ConfigResult<Vec<String>>>()?;

        let mut limiters: HashMap<&str, Arc<Semaphore>> = HashMap::new();
        for variant in &candidate.variants {
            limiters
                .entry(variant.provider.as_str())
                .or_insert_with(|| {
                    Arc::new(Semaphore::new(self.config.limit_for(&variant.provider).max(1)))
                });
        }

        let policy = RetryPolicy::from(&self.config);
        let deadline = Instant::now() + self.config.testing_timeout;
        let mut order: Vec<(PairKey, ModelVariant)> =
            Vec::with_capacity(corpus.cases.len() * candidate.variants.len());
        let mut tasks = JoinSet::new();

        for (case, prompt) in corpus.cases.iter().zip(prompts) {
            for variant in &candidate.variants {
                let key = PairKey::new(case.id.clone(), variant.id());
                order.push((key.clone(), variant.clone()));

                let backend = self
                    .backends
                    .get(&variant.provider)
                    .ok_or_else(|| ExecutorError::MissingBackend(variant.provider.clone()))?;
                let limiter = limiters
                    .get(variant.provider.as_str())
                    .cloned()
                    .ok_or_else(|| ExecutorError::MissingBackend(variant.provider.clone()))?;
                let request = InvocationRequest {
                    case_id: case.id.clone(),
                    provider: variant.provider.clone(),
                    model: variant.model.clone(),
                    prompt: prompt.clone(),
                    params: variant.params.clone(),
                };
                let template_ref = candidate.template.clone();
                let variant = variant.clone();

                tasks.spawn(async move {
                    let attempt = invoke_with_retry(backend.as_ref(), &limiter, &request, policy).await;
                    TestResult {
                        key,
                        template: template_ref,
                        variant,
                        status: attempt.status,
                        response: attempt.response,
                        latency_ms: attempt.latency_ms,
                        attempts: attempt.attempts,
                        tokens: attempt.tokens,
                        error: attempt.error,
                    }
                });
            }
        }

        info!(
            pipeline = %pipeline_id,
            candidate = %candidate.id,
            pairs = order.len(),
            "testing started"
        );

        let mut finished: HashMap<PairKey, TestResult> = HashMap::with_capacity(order.len());
        let mut deadline_hit = false;
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok(result))) => {
                    self.emit(pipeline_id, &result);
                    finished.insert(result.key.clone(), result);
                }
                Ok(Some(Err(e))) => {
                    warn!(pipeline = %pipeline_id, error = %e, "invocation task failed");
                }
                Ok(None) => break,
                Err(_) => {
                    deadline_hit = true;
                    warn!(
                        pipeline = %pipeline_id,
                        outstanding = tasks.len(),
                        timeout_secs = self.config.testing_timeout.as_secs(),
                        "testing deadline reached, aborting outstanding invocations"
                    );
                    tasks.abort_all();
                    break;
                }
            }
        }

        let mut results = Vec::with_capacity(order.len());
        for (key, variant) in order {
            let result = match finished.remove(&key) {
                Some(result) => result,
                None => {
                    let (status, reason) = if deadline_hit {
                        (InvocationStatus::Timeout, "testing deadline exceeded")
                    } else {
                        (InvocationStatus::Error, "invocation task failed")
                    };
                    let result = TestResult {
                        key,
                        template: candidate.template.clone(),
                        variant,
                        status,
                        response: String::new(),
                        latency_ms: 0,
                        attempts: 0,
                        tokens: None,
                        error: Some(reason.to_string()),
                    };
                    self.emit(pipeline_id, &result);
                    result
                }
            };
            results.push(result);
        }

        let ok = results.iter().filter(|r| r.is_success()).count();
        info!(
            pipeline = %pipeline_id,
            candidate = %candidate.id,
            ok,
            failed = results.len() - ok,
            "testing finished"
        );
        Ok(results)
    }

    fn emit(&self, pipeline_id: &str, result: &TestResult) {
        self.sink.emit(&RolloutEvent::Invocation {
            pipeline_id: pipeline_id.to_string(),
            provider: result.variant.provider.clone(),
            model: result.variant.model.clone(),
            case_id: result.key.case_id.clone(),
            status: result.status,
            latency_ms: result.latency_ms,
            attempts: result.attempts,
            tokens: result.tokens,
        });
    }
}

/// Invoke with a per-attempt timeout, retrying transient failures and
/// timeouts with exponential backoff. The provider permit is held only
/// while a call is in flight.
async fn invoke_with_retry(
    backend: &dyn ModelBackend,
    limiter: &Semaphore,
    request: &InvocationRequest,
    policy: RetryPolicy,
) -> Attempt {
    let mut backoff = policy.initial_backoff;
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        let outcome = {
            let _permit = match limiter.acquire().await {
                Ok(permit) => permit,
                Err(_) => {
                    return Attempt::failed(InvocationStatus::Error, 0, attempts, "provider limiter closed");
                }
            };
            let started = Instant::now();
            let outcome = tokio::time::timeout(policy.timeout, backend.invoke(request)).await;
            (outcome, started.elapsed().as_millis() as u64)
        };

        let (status, latency_ms, message) = match outcome {
            (Ok(Ok(response)), latency_ms) => {
                debug!(
                    case = %request.case_id,
                    provider = %request.provider,
                    model = %request.model,
                    latency_ms,
                    attempts,
                    "invocation succeeded"
                );
                return Attempt {
                    status: InvocationStatus::Ok,
                    response: response.text,
                    latency_ms,
                    attempts,
                    tokens: response.tokens,
                    error: None,
                };
            }
            (Ok(Err(InvocationError::Fatal(message))), latency_ms) => {
                warn!(
                    case = %request.case_id,
                    model = %request.model,
                    error = %message,
                    "invocation rejected, not retrying"
                );
                return Attempt::failed(InvocationStatus::Error, latency_ms, attempts, &message);
            }
            (Ok(Err(InvocationError::Transient(message))), latency_ms) => {
                (InvocationStatus::Error, latency_ms, message)
            }
            (Err(_), latency_ms) => (
                InvocationStatus::Timeout,
                latency_ms,
                format!("timed out after {}ms", policy.timeout.as_millis()),
            ),
        };

        if attempts > policy.max_retries {
            warn!(
                case = %request.case_id,
                model = %request.model,
                attempts,
                status = status_label(status),
                error = %message,
                "invocation retries exhausted"
            );
            return Attempt::failed(status, latency_ms, attempts, &message);
        }

        debug!(
            case = %request.case_id,
            model = %request.model,
            attempt = attempts,
            backoff_ms = backoff.as_millis() as u64,
            error = %message,
            "retrying invocation"
        );
        tokio::time::sleep(backoff).await;
        // Exponential backoff: double the delay up to max.
        backoff = (backoff * 2).min(policy.max_backoff);
    }
}

fn status_label(status: InvocationStatus) -> &'static str {
    match status {
        InvocationStatus::Ok => "ok",
        InvocationStatus::Error => "error",
        InvocationStatus::Timeout => "timeout",
    }
}

impl Attempt {
    fn failed(status: InvocationStatus, latency_ms: u64, attempts: u32, message: &str) -> Self {
        Self {
            status,
            response: String::new(),
            latency_ms,
            attempts,
            tokens: None,
            error: Some(message.to_string()),
        }
    }
}
