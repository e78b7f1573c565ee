use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use shift_core::CandidateDescriptor;
use shift_metrics::MetricsCollector;
use shift_rollout::{RolloutReport, RolloutRequest, TerminalCause};

use crate::OutputFormat;

pub async fn run(
    config_path: &Path,
    candidate_path: &Path,
    target: Option<String>,
    format: OutputFormat,
) -> anyhow::Result<u8> {
    let config = super::load_config(config_path)?;
    let candidate = CandidateDescriptor::load(candidate_path)?;
    let controller = super::build_controller(config, Arc::new(MetricsCollector::new()))?;

    let pipeline_id = controller
        .spawn_rollout(RolloutRequest { target, candidate })
        .await?;

    let report = tokio::select! {
        report = controller.wait(&pipeline_id) => report?,
        _ = tokio::signal::ctrl_c() => {
            warn!(pipeline = %pipeline_id, "interrupted, cancelling rollout");
            let report = controller.cancel(&pipeline_id).await?;
            if report.cause == Some(TerminalCause::Interrupted) {
                eprintln!("interrupted: {pipeline_id} stopped before deployment, live pointer untouched");
            }
            report
        }
    };

    print_report(&report, format)?;
    Ok(report.exit_code() as u8)
}

pub fn print_report(report: &RolloutReport, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Text => println!("{}", format_report(report)),
    }
    Ok(())
}

pub fn format_report(report: &RolloutReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("pipeline   {}\n", report.pipeline_id));
    out.push_str(&format!("target     {}\n", report.target));
    out.push_str(&format!(
        "candidate  {} ({})\n",
        report.candidate_id.as_deref().unwrap_or("-"),
        report.template
    ));
    out.push_str(&format!("phase      {}\n", report.phase));
    if let Some(cause) = &report.cause {
        out.push_str(&format!("cause      {cause}\n"));
    }
    if let Some(host_error) = &report.host_error {
        out.push_str(&format!("host       {host_error}\n"));
    }
    if let Some(d) = &report.decision {
        out.push_str(&format!(
            "gate       {:?}  score {:.3}  coverage {:.1}% ({}/{})\n",
            d.outcome,
            d.aggregate_score,
            d.coverage * 100.0,
            d.successful_pairs,
            d.expected_pairs
        ));
    }
    for v in &report.violations {
        out.push_str(&format!(
            "  {} {} [{}] {}\n",
            v.severity, v.key, v.policy_id, v.description
        ));
    }
    if let Some(previous) = &report.previous_live {
        let serving = previous
            .content
            .as_ref()
            .map(|c| c.candidate_id.as_str())
            .unwrap_or("empty");
        out.push_str(&format!("previous   {} ({serving})\n", previous.slot));
    }
    out.push_str(&format!("exit code  {}", report.exit_code()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use shift_core::TemplateRef;
    use shift_rollout::{RolloutPhase, TerminalCause};

    #[test]
    fn text_report_names_phase_and_cause() {
        let mut report = RolloutReport::new(
            "pl-1",
            "support",
            TemplateRef {
                id: "support".into(),
                version: "1.0.0".parse().unwrap(),
            },
            0,
        );
        report.phase = RolloutPhase::Failed;
        report.cause = Some(TerminalCause::ConfigError {
            message: "template not found: support@1.0.0".into(),
        });

        let text = format_report(&report);
        assert!(text.contains("phase      failed"));
        assert!(text.contains("cause      config error: template not found"));
        assert!(text.ends_with("exit code  3"));
    }

    #[test]
    fn text_report_shows_interrupt_and_host_failure() {
        let mut report = RolloutReport::new(
            "pl-2",
            "support",
            TemplateRef {
                id: "support".into(),
                version: "1.0.0".parse().unwrap(),
            },
            0,
        );
        report.phase = RolloutPhase::RolledBack;
        report.cause = Some(TerminalCause::ManualOverride);
        report.host_error = Some("hosting layer rejected rollback: connection refused".into());
        let text = format_report(&report);
        assert!(text.contains("host       hosting layer rejected rollback: connection refused"));

        report.phase = RolloutPhase::Failed;
        report.cause = Some(TerminalCause::Interrupted);
        report.host_error = None;
        let text = format_report(&report);
        assert!(text.contains("cause      interrupted before deployment"));
        assert!(text.contains("exit code  3"));
    }
}
