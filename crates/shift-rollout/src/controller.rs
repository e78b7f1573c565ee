//! Rollout controller: drives one candidate through the phase machine.
//!
//! Each attempt owns its deployment target for its whole life: a second
//! request for a busy target is rejected with `TargetBusy`. State changes
//! go through `DeploymentState` transition functions and are committed
//! with a revision check, so the live pointer is never left half-written.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, warn};

use shift_core::{
    epoch_secs, BlockCause, Candidate, CandidateDescriptor, Corpus, PromptTemplate, ShiftConfig,
    TemplateStore,
};
use shift_executor::{BackendRegistry, TestExecutor};
use shift_gate::{GateEvaluator, PolicySet, Scorer};
use shift_health::{abort_requested, HealthMonitor, HealthSource, MonitorOutcome, MonitorSettings};
use shift_metrics::{NullSink, RolloutEvent, SharedSink};
use shift_state::{DeploymentState, LivePointer, SlotContent, StateResult, StateStore};

use crate::error::{RolloutError, RolloutResult};
use crate::host::{HostDirective, HostingLayer, LogHost};
use crate::phase::{RolloutPhase, TerminalCause};
use crate::report::{PhaseTransition, RolloutReport, RolloutSummary};

/// Commit attempts when undoing a promotion the hosting layer rejected.
const REVERT_ATTEMPTS: u32 = 3;

/// A request to roll a candidate out. `target` defaults to the configured
/// pipeline target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutRequest {
    #[serde(default)]
    pub target: Option<String>,
    pub candidate: CandidateDescriptor,
}

/// Everything a controller needs, loaded once and shared by every attempt.
pub struct RolloutInputs {
    pub config: ShiftConfig,
    pub templates: TemplateStore,
    pub corpus: Corpus,
    pub backends: BackendRegistry,
    pub health: Arc<dyn HealthSource>,
    pub store: StateStore,
}

/// Live view of one attempt plus its abort switch.
struct RunHandle {
    report: watch::Sender<RolloutReport>,
    abort: watch::Sender<bool>,
}

/// Exclusive hold on a deployment target. Released on drop.
struct TargetClaim {
    claims: Arc<Mutex<HashMap<String, String>>>,
    target: String,
    pipeline_id: String,
}

impl Drop for TargetClaim {
    fn drop(&mut self) {
        let mut claims = self.claims.lock().unwrap_or_else(PoisonError::into_inner);
        if claims.get(&self.target) == Some(&self.pipeline_id) {
            claims.remove(&self.target);
        }
    }
}

/// What an attempt resolved its request into before Testing.
struct Prepared {
    candidate: Candidate,
    template: PromptTemplate,
    policies: PolicySet,
}

#[derive(Clone)]
pub struct RolloutController {
    config: Arc<ShiftConfig>,
    templates: Arc<TemplateStore>,
    corpus: Arc<Corpus>,
    backends: BackendRegistry,
    health: Arc<dyn HealthSource>,
    host: Arc<dyn HostingLayer>,
    store: StateStore,
    sink: SharedSink,
    runs: Arc<RwLock<HashMap<String, Arc<RunHandle>>>>,
    /// Target → pipeline id holding it.
    claims: Arc<Mutex<HashMap<String, String>>>,
    seq: Arc<AtomicU64>,
}

impl RolloutController {
    pub fn new(inputs: RolloutInputs) -> Self {
        Self {
            config: Arc::new(inputs.config),
            templates: Arc::new(inputs.templates),
            corpus: Arc::new(inputs.corpus),
            backends: inputs.backends,
            health: inputs.health,
            host: Arc::new(LogHost),
            store: inputs.store,
            sink: Arc::new(NullSink),
            runs: Arc::new(RwLock::new(HashMap::new())),
            claims: Arc::new(Mutex::new(HashMap::new())),
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_host(mut self, host: Arc<dyn HostingLayer>) -> Self {
        self.host = host;
        self
    }

    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &ShiftConfig {
        &self.config
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    // ── Command surface ───────────────────────────────────────────

    /// Run one attempt to a terminal phase and return its report.
    pub async fn run_rollout(&self, request: RolloutRequest) -> RolloutResult<RolloutReport> {
        let (handle, claim, report) = self.begin(&request).await?;
        Ok(self.drive(handle, claim, report, request.candidate).await)
    }

    /// Start an attempt in the background and return its pipeline id.
    pub async fn spawn_rollout(&self, request: RolloutRequest) -> RolloutResult<String> {
        let (handle, claim, report) = self.begin(&request).await?;
        let pipeline_id = report.pipeline_id.clone();
        let controller = self.clone();
        tokio::spawn(async move {
            controller.drive(handle, claim, report, request.candidate).await;
        });
        Ok(pipeline_id)
    }

    /// Current report of an attempt, live or persisted.
    pub async fn get_status(&self, pipeline_id: &str) -> RolloutResult<RolloutReport> {
        if let Some(handle) = self.runs.read().await.get(pipeline_id) {
            return Ok(handle.report.borrow().clone());
        }
        self.store
            .get_report::<RolloutReport>(pipeline_id)?
            .ok_or_else(|| RolloutError::NotFound(pipeline_id.to_string()))
    }

    /// Wait until an attempt reaches a terminal phase.
    pub async fn wait(&self, pipeline_id: &str) -> RolloutResult<RolloutReport> {
        let handle = self.runs.read().await.get(pipeline_id).cloned();
        if let Some(handle) = handle {
            let mut rx = handle.report.subscribe();
            let finished = rx
                .wait_for(RolloutReport::is_finished)
                .await
                .map(|report| report.clone())
                .ok();
            if let Some(report) = finished {
                return Ok(report);
            }
        }
        self.get_status(pipeline_id).await
    }

    /// Attempts still held in memory.
    pub async fn in_flight(&self) -> usize {
        self.runs.read().await.len()
    }

    /// Every known attempt, oldest first.
    pub async fn list_rollouts(&self) -> RolloutResult<Vec<RolloutSummary>> {
        let mut reports: HashMap<String, RolloutReport> = self
            .store
            .list_reports::<RolloutReport>()?
            .into_iter()
            .map(|r| (r.pipeline_id.clone(), r))
            .collect();
        for (id, handle) in self.runs.read().await.iter() {
            reports.insert(id.clone(), handle.report.borrow().clone());
        }
        let mut summaries: Vec<RolloutSummary> = reports.values().map(RolloutReport::summary).collect();
        summaries.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.pipeline_id.cmp(&b.pipeline_id))
        });
        Ok(summaries)
    }

    pub fn deployment_state(&self, target: &str) -> RolloutResult<DeploymentState> {
        Ok(self.store.deployment(target)?)
    }

    /// Move an attempt to `RolledBack`.
    ///
    /// While deploying or monitoring this aborts the window and waits for
    /// the controller's own rollback. After promotion it restores the
    /// recorded previous pointer directly. An attempt already rolled back
    /// is returned unchanged.
    pub async fn force_rollback(&self, pipeline_id: &str) -> RolloutResult<RolloutReport> {
        let handle = self.runs.read().await.get(pipeline_id).cloned();
        if let Some(handle) = &handle {
            let phase = handle.report.borrow().phase;
            if matches!(phase, RolloutPhase::Deploying | RolloutPhase::Monitoring) {
                info!(pipeline = %pipeline_id, %phase, "manual rollback requested, aborting monitoring");
                handle.abort.send_replace(true);
                let report = self.wait(pipeline_id).await?;
                // The window may have closed healthy before the abort landed.
                if report.phase != RolloutPhase::Promoted {
                    return Ok(report);
                }
                info!(pipeline = %pipeline_id, "abort arrived after promotion, rolling back");
            } else if phase == RolloutPhase::Promoted {
                // The attempt still holds its claim on the target until finished.
                self.wait(pipeline_id).await?;
            }
        }

        let report = self.get_status(pipeline_id).await?;
        match report.phase {
            RolloutPhase::RolledBack => {
                debug!(pipeline = %pipeline_id, "already rolled back");
                Ok(report)
            }
            RolloutPhase::Promoted => self.roll_back_promoted(report, handle).await,
            phase => Err(RolloutError::NotRollbackable {
                pipeline_id: pipeline_id.to_string(),
                phase,
            }),
        }
    }

    /// Stop an attempt wherever it is.
    ///
    /// Before deployment the attempt ends `Failed` with `Interrupted` and
    /// nothing is deployed. From deploying onwards this is `force_rollback`.
    /// A finished attempt is returned unchanged.
    pub async fn cancel(&self, pipeline_id: &str) -> RolloutResult<RolloutReport> {
        let report = self.get_status(pipeline_id).await?;
        match report.phase {
            RolloutPhase::Idle | RolloutPhase::Testing | RolloutPhase::Gating => {
                let handle = self.runs.read().await.get(pipeline_id).cloned();
                if let Some(handle) = handle {
                    info!(pipeline = %pipeline_id, phase = %report.phase, "cancelling rollout");
                    handle.abort.send_replace(true);
                }
                let report = self.wait(pipeline_id).await?;
                if report.phase == RolloutPhase::Promoted {
                    return self.force_rollback(pipeline_id).await;
                }
                Ok(report)
            }
            RolloutPhase::Deploying | RolloutPhase::Monitoring | RolloutPhase::Promoted => {
                self.force_rollback(pipeline_id).await
            }
            _ => Ok(report),
        }
    }

    // ── Attempt lifecycle ─────────────────────────────────────────

    async fn begin(
        &self,
        request: &RolloutRequest,
    ) -> RolloutResult<(Arc<RunHandle>, TargetClaim, RolloutReport)> {
        let target = request
            .target
            .clone()
            .unwrap_or_else(|| self.config.pipeline.target.clone());
        let pipeline_id = self.next_pipeline_id().await?;
        let claim = self.claim(&target, &pipeline_id)?;

        let report = RolloutReport::new(
            &pipeline_id,
            &target,
            request.candidate.template.clone(),
            epoch_secs(),
        );
        let (report_tx, _) = watch::channel(report.clone());
        let (abort_tx, _) = watch::channel(false);
        let handle = Arc::new(RunHandle {
            report: report_tx,
            abort: abort_tx,
        });
        self.runs
            .write()
            .await
            .insert(pipeline_id.clone(), handle.clone());

        info!(
            pipeline = %pipeline_id,
            %target,
            template = %request.candidate.template,
            "rollout accepted"
        );
        Ok((handle, claim, report))
    }

    fn claim(&self, target: &str, pipeline_id: &str) -> RolloutResult<TargetClaim> {
        let mut claims = self.claims.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(holder) = claims.get(target) {
            warn!(%target, holder = %holder, "target busy, rejecting rollout");
            return Err(RolloutError::TargetBusy {
                target: target.to_string(),
                pipeline_id: holder.clone(),
            });
        }
        claims.insert(target.to_string(), pipeline_id.to_string());
        Ok(TargetClaim {
            claims: self.claims.clone(),
            target: target.to_string(),
            pipeline_id: pipeline_id.to_string(),
        })
    }

    async fn next_pipeline_id(&self) -> RolloutResult<String> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        loop {
            let seq = self.seq.fetch_add(1, Ordering::Relaxed);
            let id = format!("pl-{millis}-{seq}");
            if self.runs.read().await.contains_key(&id) {
                continue;
            }
            if self.store.get_report::<RolloutReport>(&id)?.is_none() {
                return Ok(id);
            }
        }
    }

    /// Run the attempt, then persist and publish its final report.
    async fn drive(
        &self,
        handle: Arc<RunHandle>,
        claim: TargetClaim,
        mut report: RolloutReport,
        descriptor: CandidateDescriptor,
    ) -> RolloutReport {
        if let Err(e) = self.execute(&handle, &mut report, &descriptor).await {
            error!(pipeline = %report.pipeline_id, error = %e, "rollout aborted by internal error");
            self.fail(
                &handle,
                &mut report,
                TerminalCause::Internal {
                    message: e.to_string(),
                },
            );
        }

        report.finished_at = Some(epoch_secs());
        let persisted = match self.store.put_report(&report.pipeline_id, &report) {
            Ok(()) => true,
            Err(e) => {
                error!(pipeline = %report.pipeline_id, error = %e, "failed to persist rollout report");
                false
            }
        };
        drop(claim);
        handle.report.send_replace(report.clone());
        // Waiters holding the handle already see the final report; later
        // lookups read it back from the store.
        if persisted {
            self.runs.write().await.remove(&report.pipeline_id);
        }

        let cause = report.cause.as_ref().map(ToString::to_string).unwrap_or_default();
        info!(
            pipeline = %report.pipeline_id,
            target = %report.target,
            phase = %report.phase,
            %cause,
            exit_code = report.exit_code(),
            "rollout finished"
        );
        report
    }

    async fn execute(
        &self,
        handle: &RunHandle,
        report: &mut RolloutReport,
        descriptor: &CandidateDescriptor,
    ) -> RolloutResult<()> {
        let pipeline_id = report.pipeline_id.clone();
        let target = report.target.clone();

        // ── Resolve ──
        let prepared = match self.prepare(descriptor) {
            Ok(prepared) => prepared,
            Err(message) => {
                warn!(pipeline = %pipeline_id, %message, "rollout rejected before testing");
                self.finish(handle, report, RolloutPhase::Failed, TerminalCause::ConfigError { message })?;
                return Ok(());
            }
        };
        let Prepared {
            candidate,
            template,
            policies,
        } = prepared;
        report.candidate_id = Some(candidate.id.clone());

        // ── Testing ──
        self.advance(handle, report, RolloutPhase::Testing)?;
        let executor =
            TestExecutor::new(self.config.executor.clone(), self.backends.clone()).with_sink(self.sink.clone());
        let mut abort = handle.abort.subscribe();
        let run = executor.run(&pipeline_id, &candidate, &template, &self.corpus);
        let outcome = tokio::select! {
            outcome = run => outcome,
            _ = abort_requested(&mut abort) => {
                info!(pipeline = %pipeline_id, "rollout cancelled during testing");
                self.finish(handle, report, RolloutPhase::Failed, TerminalCause::Interrupted)?;
                return Ok(());
            }
        };
        let results = match outcome {
            Ok(results) => results,
            Err(e) => {
                let cause = TerminalCause::ConfigError {
                    message: e.to_string(),
                };
                self.finish(handle, report, RolloutPhase::Failed, cause)?;
                return Ok(());
            }
        };

        // ── Gating ──
        report.results = results;
        self.advance(handle, report, RolloutPhase::Gating)?;
        let scores = Scorer::new(self.config.scoring.clone()).score_all(&report.results, &self.corpus);
        let violations = policies.validate_all(&report.results);
        let decision = GateEvaluator::new(self.config.gate.clone()).evaluate(
            &candidate,
            &self.corpus,
            &scores,
            &violations,
            epoch_secs(),
        );
        self.sink.emit(&RolloutEvent::GateDecided {
            pipeline_id: pipeline_id.clone(),
            candidate_id: candidate.id.clone(),
            outcome: decision.outcome,
            aggregate_score: decision.aggregate_score,
            coverage: decision.coverage,
            cause: decision.cause,
        });
        let passed = decision.passed();
        let block_cause = decision.cause.unwrap_or(BlockCause::ScoreBelowThreshold);
        report.scores = scores;
        report.violations = violations;
        report.decision = Some(decision);

        if !passed {
            warn!(pipeline = %pipeline_id, candidate = %candidate.id, cause = %block_cause, "candidate blocked");
            let cause = TerminalCause::GateBlocked { cause: block_cause };
            self.finish(handle, report, RolloutPhase::Blocked, cause)?;
            return Ok(());
        }

        if *handle.abort.borrow() {
            info!(pipeline = %pipeline_id, "rollout cancelled before deployment");
            self.finish(handle, report, RolloutPhase::Failed, TerminalCause::Interrupted)?;
            return Ok(());
        }

        // ── Deploying ──
        self.advance(handle, report, RolloutPhase::Deploying)?;
        let (before, promoted) = match self.promote(&target, &pipeline_id, &candidate) {
            Ok(states) => states,
            Err(e) => {
                error!(pipeline = %pipeline_id, %target, error = %e, "promotion write failed");
                let cause = TerminalCause::DeploymentWrite {
                    message: e.to_string(),
                };
                self.finish(handle, report, RolloutPhase::Failed, cause)?;
                return Ok(());
            }
        };
        report.previous_live = Some(before.live_pointer());

        let directive = HostDirective::Promote {
            target: target.clone(),
            pointer: promoted.live_pointer(),
        };
        if let Err(e) = self.host.apply(&directive).await {
            let detail = format!("{e:#}");
            error!(pipeline = %pipeline_id, %target, error = %detail, "hosting layer rejected promotion");
            let message = format!("hosting layer rejected promotion: {detail}");
            let cause = match self.revert_promotion(&before, &promoted, &pipeline_id, &message) {
                Ok(()) => TerminalCause::DeploymentWrite { message },
                Err(reason) => {
                    error!(pipeline = %pipeline_id, %target, %reason, "failed to revert promotion");
                    TerminalCause::LivePointerInconsistent {
                        message: format!("{message}; {reason}"),
                    }
                }
            };
            self.finish(handle, report, RolloutPhase::Failed, cause)?;
            return Ok(());
        }
        report.promoted_live = Some(promoted.live_pointer());
        info!(
            pipeline = %pipeline_id,
            %target,
            slot = %promoted.live,
            candidate = %candidate.id,
            "live pointer flipped"
        );

        // ── Monitoring ──
        self.advance(handle, report, RolloutPhase::Monitoring)?;
        let monitor = HealthMonitor::new(self.health.clone(), MonitorSettings::from(&self.config.monitoring))
            .with_sink(self.sink.clone());
        let outcome = monitor
            .watch(&pipeline_id, &target, handle.abort.subscribe())
            .await;
        report.monitor = Some(outcome.clone());

        match outcome {
            MonitorOutcome::Healthy { .. } => {
                self.advance(handle, report, RolloutPhase::Promoted)?;
                self.sink.emit(&RolloutEvent::Promoted {
                    pipeline_id: pipeline_id.clone(),
                    target: target.clone(),
                    candidate_id: candidate.id.clone(),
                });
                info!(pipeline = %pipeline_id, %target, candidate = %candidate.id, "candidate promoted");
            }
            MonitorOutcome::Breached { poll, reason } => {
                let cause = TerminalCause::HealthDegradation { poll, reason };
                self.roll_back(handle, report, cause).await?;
            }
            MonitorOutcome::Aborted { .. } => {
                self.roll_back(handle, report, TerminalCause::ManualOverride).await?;
            }
        }
        Ok(())
    }

    /// Resolve the candidate, compile policies and check backends. Any
    /// failure here is a configuration error.
    fn prepare(&self, descriptor: &CandidateDescriptor) -> Result<Prepared, String> {
        let (candidate, template) = descriptor
            .resolve(&self.templates, &self.corpus)
            .map_err(|e| e.to_string())?;
        let policies = PolicySet::compile(&self.config.guardrails).map_err(|e| e.to_string())?;
        TestExecutor::new(self.config.executor.clone(), self.backends.clone())
            .check_backends(&candidate)
            .map_err(|e| e.to_string())?;
        Ok(Prepared {
            candidate,
            template,
            policies,
        })
    }

    /// Write the candidate into the inactive slot and flip to it in one
    /// commit. Returns the state before and after.
    fn promote(
        &self,
        target: &str,
        pipeline_id: &str,
        candidate: &Candidate,
    ) -> StateResult<(DeploymentState, DeploymentState)> {
        let now = epoch_secs();
        let before = self.store.deployment(target)?;
        let content = SlotContent {
            candidate_id: candidate.id.clone(),
            template: candidate.template.clone(),
            variants: candidate.variants.clone(),
            deployed_at: now,
        };
        let next = before.promote(content, pipeline_id, "gate passed", now);
        self.store.commit_deployment(before.revision, &next)?;
        Ok((before, next))
    }

    /// Restore `previous` as the live pointer of `target`.
    ///
    /// The committed state is authoritative. A rejected hosting directive
    /// does not undo it and is returned for the report.
    async fn restore(
        &self,
        target: &str,
        previous: &LivePointer,
        pipeline_id: &str,
        cause: &str,
    ) -> StateResult<Option<String>> {
        let state = self.store.deployment(target)?;
        match state.rollback_to(previous, pipeline_id, cause, epoch_secs())? {
            Some(next) => self.store.commit_deployment(state.revision, &next)?,
            None => debug!(pipeline = %pipeline_id, %target, "previous pointer already live"),
        }

        let directive = HostDirective::Rollback {
            target: target.to_string(),
            pointer: previous.clone(),
        };
        match self.host.apply(&directive).await {
            Ok(()) => Ok(None),
            Err(e) => {
                let detail = format!("{e:#}");
                error!(pipeline = %pipeline_id, %target, error = %detail, "hosting layer rejected rollback directive");
                Ok(Some(format!("hosting layer rejected rollback: {detail}")))
            }
        }
    }

    /// Undo a committed promotion the hosting layer never applied.
    ///
    /// A failed commit is retried against a fresh read for as long as the
    /// promoted pointer is still live. Gives up if the pointer moved
    /// elsewhere or the store keeps refusing the write.
    fn revert_promotion(
        &self,
        before: &DeploymentState,
        promoted: &DeploymentState,
        pipeline_id: &str,
        cause: &str,
    ) -> Result<(), String> {
        let promoted_live = promoted.live_pointer();
        let mut current = promoted.clone();
        let mut last_error = String::new();
        for attempt in 1..=REVERT_ATTEMPTS {
            if attempt > 1 {
                current = self
                    .store
                    .deployment(&promoted.target)
                    .map_err(|e| format!("re-reading state: {e}"))?;
            }
            let live = current.live_pointer();
            if live == before.live_pointer() {
                return Ok(());
            }
            if live != promoted_live {
                return Err(format!("live pointer moved to slot {} during revert", live.slot));
            }
            let reverted = current.revert_to(before, pipeline_id, cause, epoch_secs());
            match self.store.commit_deployment(current.revision, &reverted) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(pipeline = %pipeline_id, target = %promoted.target, attempt, error = %e, "revert commit failed");
                    last_error = e.to_string();
                }
            }
        }
        Err(format!("revert failed after {REVERT_ATTEMPTS} attempts: {last_error}"))
    }

    async fn roll_back(
        &self,
        handle: &RunHandle,
        report: &mut RolloutReport,
        cause: TerminalCause,
    ) -> RolloutResult<()> {
        let Some(previous) = report.previous_live.clone() else {
            let cause = TerminalCause::Internal {
                message: "no previous live pointer recorded".into(),
            };
            return self.finish(handle, report, RolloutPhase::Failed, cause);
        };

        warn!(pipeline = %report.pipeline_id, target = %report.target, %cause, "rolling back");
        let restored = self
            .restore(&report.target, &previous, &report.pipeline_id, &cause.to_string())
            .await;
        match restored {
            Ok(host_error) => {
                report.host_error = host_error;
                self.sink.emit(&RolloutEvent::RolledBack {
                    pipeline_id: report.pipeline_id.clone(),
                    target: report.target.clone(),
                    cause: cause.to_string(),
                });
                self.finish(handle, report, RolloutPhase::RolledBack, cause)
            }
            Err(e) => {
                error!(pipeline = %report.pipeline_id, target = %report.target, error = %e, "rollback write failed");
                let cause = TerminalCause::DeploymentWrite {
                    message: format!("rollback failed: {e}"),
                };
                self.finish(handle, report, RolloutPhase::Failed, cause)
            }
        }
    }

    /// Forced rollback of an attempt that already finished promoted.
    async fn roll_back_promoted(
        &self,
        report: RolloutReport,
        handle: Option<Arc<RunHandle>>,
    ) -> RolloutResult<RolloutReport> {
        let pipeline_id = report.pipeline_id.clone();
        let target = report.target.clone();
        let _claim = self.claim(&target, &pipeline_id)?;

        // Another caller may have finished the same rollback meanwhile.
        let mut report = self.get_status(&pipeline_id).await?;
        if report.phase == RolloutPhase::RolledBack {
            return Ok(report);
        }

        let not_rollbackable = || RolloutError::NotRollbackable {
            pipeline_id: pipeline_id.clone(),
            phase: report.phase,
        };
        let previous = report.previous_live.clone().ok_or_else(not_rollbackable)?;
        let promoted = report.promoted_live.clone().ok_or_else(not_rollbackable)?;

        let state = self.store.deployment(&target)?;
        if state.live_pointer() != promoted {
            warn!(pipeline = %pipeline_id, %target, "live pointer moved on since promotion");
            return Err(RolloutError::Superseded {
                pipeline_id,
                target,
            });
        }

        let cause = TerminalCause::ManualOverride;
        report.host_error = self
            .restore(&target, &previous, &pipeline_id, &cause.to_string())
            .await?;

        self.record_transition(&mut report, RolloutPhase::RolledBack)?;
        report.cause = Some(cause.clone());
        report.finished_at = Some(epoch_secs());
        self.store.put_report(&pipeline_id, &report)?;
        if let Some(handle) = handle {
            handle.report.send_replace(report.clone());
        }
        self.sink.emit(&RolloutEvent::RolledBack {
            pipeline_id: pipeline_id.clone(),
            target: target.clone(),
            cause: cause.to_string(),
        });
        info!(pipeline = %pipeline_id, %target, "promoted rollout rolled back by operator");
        Ok(report)
    }

    // ── Phase bookkeeping ─────────────────────────────────────────

    fn record_transition(&self, report: &mut RolloutReport, to: RolloutPhase) -> RolloutResult<()> {
        let from = report.phase;
        if !from.can_transition_to(to) {
            return Err(RolloutError::InvalidTransition { from, to });
        }
        report.phase = to;
        report.transitions.push(PhaseTransition {
            from,
            to,
            at: epoch_secs(),
        });
        self.sink.emit(&RolloutEvent::PhaseChanged {
            pipeline_id: report.pipeline_id.clone(),
            target: report.target.clone(),
            from: from.to_string(),
            to: to.to_string(),
        });
        info!(
            pipeline = %report.pipeline_id,
            target = %report.target,
            %from,
            %to,
            "rollout phase changed"
        );
        Ok(())
    }

    fn advance(&self, handle: &RunHandle, report: &mut RolloutReport, to: RolloutPhase) -> RolloutResult<()> {
        self.record_transition(report, to)?;
        handle.report.send_replace(report.clone());
        Ok(())
    }

    fn finish(
        &self,
        handle: &RunHandle,
        report: &mut RolloutReport,
        to: RolloutPhase,
        cause: TerminalCause,
    ) -> RolloutResult<()> {
        report.cause = Some(cause);
        self.advance(handle, report, to)
    }

    /// Force a non-terminal attempt into `Failed`.
    fn fail(&self, handle: &RunHandle, report: &mut RolloutReport, cause: TerminalCause) {
        if report.phase.is_terminal() {
            return;
        }
        if let Err(e) = self.finish(handle, report, RolloutPhase::Failed, cause) {
            error!(pipeline = %report.pipeline_id, error = %e, "could not mark rollout failed");
        }
    }
}
