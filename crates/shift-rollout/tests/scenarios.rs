//! End-to-end rollout attempts against replayed models and scripted health.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use shift_core::config::{DetectionRule, PiiEntity, PolicyConfig};
use shift_core::{
    BlockCause, CandidateDescriptor, Corpus, Criteria, InvocationParams, LengthBounds,
    PolicyCategory, PromptTemplate, Severity, ShiftConfig, TemplateRef, TemplateStore, TestCase,
    VariantSpec,
};
use shift_executor::replay::ReplayEntry;
use shift_executor::{BackendRegistry, ReplayBackend};
use shift_health::{HealthSample, HealthSource, MonitorOutcome, SequenceSource, StaticSource};
use shift_metrics::MetricsCollector;
use shift_rollout::host::BoxFuture;
use shift_rollout::{
    HostDirective, HostingLayer, RolloutController, RolloutError, RolloutInputs,
    RolloutPhase, RolloutRequest, TerminalCause,
};
use shift_state::{LivePointer, SlotContent, StateStore, TransitionKind};

const TARGET: &str = "customer-support";
const GOOD: &str = "Your refund has been issued and should arrive within five business days.";
const LEAK: &str = "Your refund was sent to jane.doe@example.com and will arrive this week.";
const CASES: usize = 20;

// ── Fixtures ──────────────────────────────────────────────────────

fn params() -> InvocationParams {
    InvocationParams {
        temperature: 0.5,
        max_tokens: 200,
        top_p: None,
        extra: BTreeMap::new(),
    }
}

fn template(minor: u64) -> PromptTemplate {
    PromptTemplate {
        id: "support".into(),
        version: semver::Version::new(1, minor, 0),
        body: "You are a support agent. Answer: {{question}}".into(),
        parameters: params(),
        created_at: 0,
        model_preferences: None,
    }
}

fn corpus() -> Corpus {
    Corpus {
        cases: (0..CASES)
            .map(|i| TestCase {
                id: format!("case-{i:02}"),
                bindings: BTreeMap::from([("question".to_string(), format!("Where is refund {i}?"))]),
                criteria: Criteria {
                    keywords: vec!["refund".into()],
                    length: Some(LengthBounds {
                        min_words: 5,
                        max_words: 60,
                    }),
                    reference: None,
                },
                tag: None,
            })
            .collect(),
    }
}

fn config() -> ShiftConfig {
    let mut config = ShiftConfig::default();
    config.pipeline.target = TARGET.into();
    config.executor.invocation_timeout = Duration::from_secs(2);
    config.executor.max_retries = 0;
    config.monitoring.window = Duration::from_secs(300);
    config.monitoring.poll_interval = Duration::from_secs(60);
    config.guardrails.policies = vec![PolicyConfig {
        id: "no-pii".into(),
        category: PolicyCategory::Pii,
        severity: Severity::Block,
        rule: DetectionRule::Pii {
            entities: vec![PiiEntity::Email, PiiEntity::Ssn],
        },
        description: Some("response leaks personal data".into()),
    }];
    config
}

fn replay(overrides: &[(&str, ReplayEntry)]) -> BackendRegistry {
    let mut backend = ReplayBackend::default();
    backend.insert(
        "bedrock/claude-v2/*",
        ReplayEntry {
            text: GOOD.into(),
            ..ReplayEntry::default()
        },
    );
    for (case, entry) in overrides {
        backend.insert(&format!("bedrock/claude-v2/{case}"), entry.clone());
    }
    let mut registry = BackendRegistry::new();
    registry.register("bedrock", Arc::new(backend));
    registry
}

fn healthy() -> HealthSample {
    HealthSample::with_error_rate(0.01)
}

struct Harness {
    store: StateStore,
    metrics: Arc<MetricsCollector>,
}

impl Harness {
    fn new() -> Self {
        Self {
            store: StateStore::open_in_memory().unwrap(),
            metrics: Arc::new(MetricsCollector::new()),
        }
    }

    fn controller(&self, backends: BackendRegistry, health: Arc<dyn HealthSource>) -> RolloutController {
        self.controller_with(config(), backends, health)
    }

    fn controller_with(
        &self,
        config: ShiftConfig,
        backends: BackendRegistry,
        health: Arc<dyn HealthSource>,
    ) -> RolloutController {
        RolloutController::new(RolloutInputs {
            config,
            templates: TemplateStore::from_templates([template(0), template(1), template(2)]).unwrap(),
            corpus: corpus(),
            backends,
            health,
            store: self.store.clone(),
        })
        .with_sink(self.metrics.clone())
    }

    fn healthy_controller(&self) -> RolloutController {
        self.controller(replay(&[]), Arc::new(StaticSource::new(healthy())))
    }

    fn live(&self) -> LivePointer {
        self.store.deployment(TARGET).unwrap().live_pointer()
    }
}

fn request(minor: u64) -> RolloutRequest {
    RolloutRequest {
        target: None,
        candidate: CandidateDescriptor {
            id: Some(format!("support-1.{minor}")),
            template: TemplateRef {
                id: "support".into(),
                version: semver::Version::new(1, minor, 0),
            },
            variants: vec![VariantSpec {
                name: None,
                provider: "bedrock".into(),
                model: "claude-v2".into(),
                params: None,
            }],
        },
    }
}

async fn wait_for_phase(controller: &RolloutController, id: &str, phase: RolloutPhase) {
    for _ in 0..1000 {
        if controller.get_status(id).await.unwrap().phase == phase {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("{id} never reached {phase}");
}

struct RejectingHost;

impl HostingLayer for RejectingHost {
    fn apply<'a>(&'a self, directive: &'a HostDirective) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            match directive {
                HostDirective::Promote { .. } => anyhow::bail!("router refused the new slot"),
                HostDirective::Rollback { .. } => Ok(()),
            }
        })
    }
}

/// Accepts promotions, refuses to roll back.
struct StuckHost;

impl HostingLayer for StuckHost {
    fn apply<'a>(&'a self, directive: &'a HostDirective) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            match directive {
                HostDirective::Promote { .. } => Ok(()),
                HostDirective::Rollback { .. } => anyhow::bail!("router unreachable"),
            }
        })
    }
}

/// Rejects promotions after another writer touched the target.
struct ContendedHost {
    store: StateStore,
    /// Deploy something else instead of only bumping the revision.
    takeover: bool,
}

impl HostingLayer for ContendedHost {
    fn apply<'a>(&'a self, directive: &'a HostDirective) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            if let HostDirective::Promote { target, .. } = directive {
                let state = self.store.deployment(target)?;
                let next = if self.takeover {
                    let content = SlotContent {
                        candidate_id: "hotfix".into(),
                        template: TemplateRef {
                            id: "support".into(),
                            version: semver::Version::new(1, 0, 1),
                        },
                        variants: Vec::new(),
                        deployed_at: 0,
                    };
                    state.promote(content, "pl-external", "manual deploy", 0)
                } else {
                    let mut next = state.clone();
                    next.revision += 1;
                    next
                };
                self.store.commit_deployment(state.revision, &next)?;
                anyhow::bail!("router refused the new slot");
            }
            Ok(())
        })
    }
}

// ── Scenarios ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn clean_candidate_is_promoted_after_a_quiet_window() {
    let h = Harness::new();
    let controller = h.healthy_controller();

    let report = controller.run_rollout(request(0)).await.unwrap();

    assert_eq!(report.phase, RolloutPhase::Promoted);
    assert_eq!(report.exit_code(), 0);
    let decision = report.decision.as_ref().unwrap();
    assert!(decision.passed());
    assert!(decision.aggregate_score >= 0.95);
    assert_eq!(decision.coverage, 1.0);
    assert_eq!(report.results.len(), CASES);
    assert_eq!(report.monitor, Some(MonitorOutcome::Healthy { polls: 5 }));

    let phases: Vec<RolloutPhase> = report.transitions.iter().map(|t| t.to).collect();
    assert_eq!(
        phases,
        vec![
            RolloutPhase::Testing,
            RolloutPhase::Gating,
            RolloutPhase::Deploying,
            RolloutPhase::Monitoring,
            RolloutPhase::Promoted,
        ]
    );

    let live = h.live();
    assert_eq!(live.content.as_ref().unwrap().candidate_id, "support-1.0");
    assert_eq!(Some(live), report.promoted_live);

    let persisted = controller.get_status(&report.pipeline_id).await.unwrap();
    assert_eq!(persisted, report);

    let snapshot = h.metrics.snapshot();
    assert_eq!(snapshot.promotions, 1);
    assert_eq!(snapshot.gates_passed, 1);
    assert_eq!(snapshot.health_polls, 5);
}

#[tokio::test(start_paused = true)]
async fn pii_leak_blocks_and_leaves_live_slot_alone() {
    let h = Harness::new();
    h.healthy_controller().run_rollout(request(0)).await.unwrap();
    let before = h.store.deployment(TARGET).unwrap();

    let leaky = h.controller(
        replay(&[(
            "case-03",
            ReplayEntry {
                text: LEAK.into(),
                ..ReplayEntry::default()
            },
        )]),
        Arc::new(StaticSource::new(healthy())),
    );
    let report = leaky.run_rollout(request(1)).await.unwrap();

    assert_eq!(report.phase, RolloutPhase::Blocked);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(
        report.cause,
        Some(TerminalCause::GateBlocked {
            cause: BlockCause::SafetyViolation
        })
    );
    assert!(report.decision.as_ref().unwrap().aggregate_score >= 0.95);
    assert_eq!(report.violations.len(), 1);
    assert_eq!(report.violations[0].key.case_id, "case-03");
    assert_eq!(report.previous_live, None);
    assert_eq!(h.store.deployment(TARGET).unwrap(), before);
}

#[tokio::test(start_paused = true)]
async fn health_breach_on_third_poll_restores_previous_pointer() {
    let h = Harness::new();
    h.healthy_controller().run_rollout(request(0)).await.unwrap();
    let before_deploy = h.live();

    let health = SequenceSource::new([
        Ok(healthy()),
        Ok(healthy()),
        Ok(HealthSample::with_error_rate(0.20)),
    ])
    .with_fallback(healthy());
    let controller = h.controller(replay(&[]), Arc::new(health));
    let report = controller.run_rollout(request(1)).await.unwrap();

    assert_eq!(report.phase, RolloutPhase::RolledBack);
    assert_eq!(report.exit_code(), 2);
    match &report.cause {
        Some(TerminalCause::HealthDegradation { poll, .. }) => assert_eq!(*poll, 3),
        other => panic!("unexpected cause {other:?}"),
    }
    assert_eq!(report.previous_live.as_ref(), Some(&before_deploy));
    assert_eq!(h.live(), before_deploy);

    let state = h.store.deployment(TARGET).unwrap();
    let last = state.history.last().unwrap();
    assert_eq!(last.kind, TransitionKind::Rollback);
    assert_eq!(last.pipeline_id, report.pipeline_id);
    assert_eq!(h.metrics.snapshot().rollbacks, 1);
}

#[tokio::test(start_paused = true)]
async fn timeouts_below_coverage_floor_block_as_incomplete() {
    let h = Harness::new();
    let slow = ReplayEntry {
        text: GOOD.into(),
        delay_ms: 10_000,
        ..ReplayEntry::default()
    };
    let controller = h.controller(
        replay(&[
            ("case-04", slow.clone()),
            ("case-09", slow.clone()),
            ("case-15", slow),
        ]),
        Arc::new(StaticSource::new(healthy())),
    );

    let report = controller.run_rollout(request(0)).await.unwrap();

    assert_eq!(report.phase, RolloutPhase::Blocked);
    assert_eq!(
        report.cause,
        Some(TerminalCause::GateBlocked {
            cause: BlockCause::IncompleteCoverage
        })
    );
    let decision = report.decision.as_ref().unwrap();
    assert!((decision.coverage - 0.85).abs() < 1e-9);
    assert_eq!(report.results.len(), CASES);
    assert_eq!(h.store.deployment(TARGET).unwrap().revision, 0);
}

#[tokio::test(start_paused = true)]
async fn unknown_template_fails_before_testing() {
    let h = Harness::new();
    let controller = h.healthy_controller();

    let report = controller.run_rollout(request(9)).await.unwrap();

    assert_eq!(report.phase, RolloutPhase::Failed);
    assert_eq!(report.exit_code(), 3);
    assert!(matches!(report.cause, Some(TerminalCause::ConfigError { .. })));
    assert_eq!(report.transitions.len(), 1);
    assert_eq!(report.transitions[0].from, RolloutPhase::Idle);
    assert!(report.results.is_empty());
    assert_eq!(report.candidate_id, None);
}

#[tokio::test(start_paused = true)]
async fn missing_backend_is_a_config_error() {
    let h = Harness::new();
    let controller = h.controller(BackendRegistry::new(), Arc::new(StaticSource::new(healthy())));

    let report = controller.run_rollout(request(0)).await.unwrap();

    assert_eq!(report.phase, RolloutPhase::Failed);
    match report.cause {
        Some(TerminalCause::ConfigError { message }) => assert!(message.contains("bedrock")),
        other => panic!("unexpected cause {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn rejected_host_directive_reverts_the_flip() {
    let h = Harness::new();
    h.healthy_controller().run_rollout(request(0)).await.unwrap();
    let before = h.store.deployment(TARGET).unwrap();

    let controller = h.healthy_controller().with_host(Arc::new(RejectingHost));
    let report = controller.run_rollout(request(1)).await.unwrap();

    assert_eq!(report.phase, RolloutPhase::Failed);
    assert_eq!(report.exit_code(), 3);
    match &report.cause {
        Some(TerminalCause::DeploymentWrite { message }) => {
            assert!(message.contains("router refused"))
        }
        other => panic!("unexpected cause {other:?}"),
    }

    let after = h.store.deployment(TARGET).unwrap();
    assert_eq!(after.live_pointer(), before.live_pointer());
    assert_eq!(after.blue, before.blue);
    assert_eq!(after.green, before.green);
    assert_eq!(after.revision, before.revision + 2);
    assert_eq!(after.history.last().unwrap().kind, TransitionKind::Revert);
}

#[tokio::test(start_paused = true)]
async fn rejected_rollback_directive_is_recorded() {
    let h = Harness::new();
    h.healthy_controller().run_rollout(request(0)).await.unwrap();
    let before_deploy = h.live();

    let health = SequenceSource::new([Ok(HealthSample::with_error_rate(0.30))]).with_fallback(healthy());
    let controller = h
        .controller(replay(&[]), Arc::new(health))
        .with_host(Arc::new(StuckHost));
    let report = controller.run_rollout(request(1)).await.unwrap();

    assert_eq!(report.phase, RolloutPhase::RolledBack);
    assert!(matches!(report.cause, Some(TerminalCause::HealthDegradation { poll: 1, .. })));
    let host_error = report.host_error.as_deref().unwrap();
    assert!(host_error.contains("router unreachable"));
    assert_eq!(h.live(), before_deploy);

    let persisted = h.healthy_controller().get_status(&report.pipeline_id).await.unwrap();
    assert_eq!(persisted.host_error, report.host_error);
}

#[tokio::test(start_paused = true)]
async fn revert_retries_after_a_concurrent_write() {
    let h = Harness::new();
    h.healthy_controller().run_rollout(request(0)).await.unwrap();
    let before = h.store.deployment(TARGET).unwrap();

    let host = ContendedHost {
        store: h.store.clone(),
        takeover: false,
    };
    let controller = h.healthy_controller().with_host(Arc::new(host));
    let report = controller.run_rollout(request(1)).await.unwrap();

    assert!(matches!(report.cause, Some(TerminalCause::DeploymentWrite { .. })));
    let after = h.store.deployment(TARGET).unwrap();
    assert_eq!(after.live_pointer(), before.live_pointer());
    assert_eq!(after.revision, before.revision + 3);
    assert_eq!(after.history.last().unwrap().kind, TransitionKind::Revert);
}

#[tokio::test(start_paused = true)]
async fn unrevertable_promotion_is_reported_inconsistent() {
    let h = Harness::new();
    h.healthy_controller().run_rollout(request(0)).await.unwrap();

    let host = ContendedHost {
        store: h.store.clone(),
        takeover: true,
    };
    let controller = h.healthy_controller().with_host(Arc::new(host));
    let report = controller.run_rollout(request(1)).await.unwrap();

    assert_eq!(report.phase, RolloutPhase::Failed);
    assert_eq!(report.exit_code(), 3);
    match &report.cause {
        Some(TerminalCause::LivePointerInconsistent { message }) => {
            assert!(message.contains("router refused"));
            assert!(message.contains("moved"));
        }
        other => panic!("unexpected cause {other:?}"),
    }
    assert_eq!(h.live().content.unwrap().candidate_id, "hotfix");
}

// ── Concurrency and manual override ───────────────────────────────

#[tokio::test(start_paused = true)]
async fn second_request_for_busy_target_is_rejected() {
    let h = Harness::new();
    let controller = h.healthy_controller();

    let first = controller.spawn_rollout(request(0)).await.unwrap();
    let err = controller.run_rollout(request(1)).await.unwrap_err();
    match err {
        RolloutError::TargetBusy { target, pipeline_id } => {
            assert_eq!(target, TARGET);
            assert_eq!(pipeline_id, first);
        }
        other => panic!("unexpected error {other}"),
    }

    let mut other_target = request(1);
    other_target.target = Some("billing".into());
    let report = controller.run_rollout(other_target).await.unwrap();
    assert_eq!(report.phase, RolloutPhase::Promoted);

    let done = controller.wait(&first).await.unwrap();
    assert_eq!(done.phase, RolloutPhase::Promoted);
    let next = controller.run_rollout(request(1)).await.unwrap();
    assert_eq!(next.phase, RolloutPhase::Promoted);
}

#[tokio::test(start_paused = true)]
async fn manual_override_during_monitoring_rolls_back_once() {
    let h = Harness::new();
    h.healthy_controller().run_rollout(request(0)).await.unwrap();
    let before_deploy = h.live();

    let controller = h.healthy_controller();
    let id = controller.spawn_rollout(request(1)).await.unwrap();
    wait_for_phase(&controller, &id, RolloutPhase::Monitoring).await;

    let report = controller.force_rollback(&id).await.unwrap();
    assert_eq!(report.phase, RolloutPhase::RolledBack);
    assert_eq!(report.cause, Some(TerminalCause::ManualOverride));
    assert!(matches!(report.monitor, Some(MonitorOutcome::Aborted { .. })));
    assert_eq!(h.live(), before_deploy);

    let state = h.store.deployment(TARGET).unwrap();
    let again = controller.force_rollback(&id).await.unwrap();
    assert_eq!(again, report);
    assert_eq!(h.store.deployment(TARGET).unwrap(), state);
}

#[tokio::test(start_paused = true)]
async fn forced_rollback_after_promotion_is_idempotent() {
    let h = Harness::new();
    h.healthy_controller().run_rollout(request(0)).await.unwrap();
    let before_deploy = h.live();

    let controller = h.healthy_controller();
    let promoted = controller.run_rollout(request(1)).await.unwrap();
    assert_eq!(promoted.phase, RolloutPhase::Promoted);

    let once = controller.force_rollback(&promoted.pipeline_id).await.unwrap();
    assert_eq!(once.phase, RolloutPhase::RolledBack);
    assert_eq!(once.cause, Some(TerminalCause::ManualOverride));
    assert_eq!(once.transitions.last().unwrap().from, RolloutPhase::Promoted);
    assert_eq!(h.live(), before_deploy);
    let state = h.store.deployment(TARGET).unwrap();

    let twice = controller.force_rollback(&promoted.pipeline_id).await.unwrap();
    assert_eq!(twice, once);
    assert_eq!(h.store.deployment(TARGET).unwrap(), state);
}

#[tokio::test(start_paused = true)]
async fn blocked_rollout_cannot_be_rolled_back() {
    let h = Harness::new();
    let controller = h.controller(
        replay(&[(
            "case-00",
            ReplayEntry {
                text: LEAK.into(),
                ..ReplayEntry::default()
            },
        )]),
        Arc::new(StaticSource::new(healthy())),
    );
    let report = controller.run_rollout(request(0)).await.unwrap();

    let err = controller.force_rollback(&report.pipeline_id).await.unwrap_err();
    assert!(matches!(
        err,
        RolloutError::NotRollbackable {
            phase: RolloutPhase::Blocked,
            ..
        }
    ));
    assert!(matches!(
        controller.force_rollback("pl-missing").await,
        Err(RolloutError::NotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn superseded_promotion_is_not_rolled_back() {
    let h = Harness::new();
    let controller = h.healthy_controller();
    let first = controller.run_rollout(request(0)).await.unwrap();
    controller.run_rollout(request(1)).await.unwrap();
    controller.run_rollout(request(2)).await.unwrap();

    let err = controller.force_rollback(&first.pipeline_id).await.unwrap_err();
    assert!(matches!(err, RolloutError::Superseded { .. }));
    assert_eq!(h.live().content.unwrap().candidate_id, "support-1.2");
}

#[tokio::test(start_paused = true)]
async fn history_lists_every_attempt_in_order() {
    let h = Harness::new();
    let controller = h.healthy_controller();
    let a = controller.run_rollout(request(0)).await.unwrap();
    let b = controller.run_rollout(request(9)).await.unwrap();

    let listed = controller.list_rollouts().await.unwrap();
    let ids: Vec<&str> = listed.iter().map(|s| s.pipeline_id.as_str()).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&a.pipeline_id.as_str()));
    assert!(ids.contains(&b.pipeline_id.as_str()));
    assert!(listed.iter().any(|s| s.phase == RolloutPhase::Failed));

    let fresh = h.healthy_controller();
    assert_eq!(fresh.list_rollouts().await.unwrap().len(), 2);
    assert_eq!(fresh.get_status(&a.pipeline_id).await.unwrap(), a);
}

#[tokio::test(start_paused = true)]
async fn finished_attempts_leave_memory() {
    let h = Harness::new();
    let controller = h.healthy_controller();

    let id = controller.spawn_rollout(request(0)).await.unwrap();
    assert_eq!(controller.in_flight().await, 1);
    let report = controller.wait(&id).await.unwrap();
    assert_eq!(controller.in_flight().await, 0);

    assert_eq!(controller.get_status(&id).await.unwrap(), report);
    assert_eq!(controller.wait(&id).await.unwrap(), report);
    assert_eq!(controller.list_rollouts().await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_testing_deploys_nothing() {
    let h = Harness::new();
    h.healthy_controller().run_rollout(request(0)).await.unwrap();
    let before = h.store.deployment(TARGET).unwrap();

    let slow = ReplayEntry {
        text: GOOD.into(),
        delay_ms: 1_500,
        ..ReplayEntry::default()
    };
    let controller = h.controller(replay(&[("case-07", slow)]), Arc::new(StaticSource::new(healthy())));
    let id = controller.spawn_rollout(request(1)).await.unwrap();
    wait_for_phase(&controller, &id, RolloutPhase::Testing).await;

    let report = controller.cancel(&id).await.unwrap();
    assert_eq!(report.phase, RolloutPhase::Failed);
    assert_eq!(report.cause, Some(TerminalCause::Interrupted));
    assert_eq!(report.exit_code(), 3);
    assert_eq!(report.decision, None);
    assert_eq!(h.store.deployment(TARGET).unwrap(), before);

    let persisted = h.healthy_controller().get_status(&id).await.unwrap();
    assert_eq!(persisted, report);
    assert_eq!(controller.cancel(&id).await.unwrap(), report);
}

#[tokio::test(start_paused = true)]
async fn cancel_after_promotion_rolls_back() {
    let h = Harness::new();
    h.healthy_controller().run_rollout(request(0)).await.unwrap();
    let before_deploy = h.live();

    let controller = h.healthy_controller();
    let promoted = controller.run_rollout(request(1)).await.unwrap();
    let report = controller.cancel(&promoted.pipeline_id).await.unwrap();

    assert_eq!(report.phase, RolloutPhase::RolledBack);
    assert_eq!(h.live(), before_deploy);
}

/// Real clock on several workers: the abort can land after the window has
/// already closed healthy. Either way the candidate must not stay live.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn force_rollback_racing_the_window_end_never_leaves_candidate_live() {
    for _ in 0..20 {
        let h = Harness::new();
        let mut config = config();
        config.monitoring.poll_interval = Duration::from_millis(2);
        config.monitoring.window = Duration::from_millis(6);
        let controller = h.controller_with(config, replay(&[]), Arc::new(StaticSource::new(healthy())));
        controller.run_rollout(request(0)).await.unwrap();
        let before_deploy = h.live();

        let id = controller.spawn_rollout(request(1)).await.unwrap();
        loop {
            let phase = controller.get_status(&id).await.unwrap().phase;
            if matches!(phase, RolloutPhase::Monitoring | RolloutPhase::Promoted) {
                break;
            }
            tokio::task::yield_now().await;
        }

        let report = controller.force_rollback(&id).await.unwrap();
        assert_eq!(report.phase, RolloutPhase::RolledBack);
        assert_eq!(h.live(), before_deploy);
    }
}
