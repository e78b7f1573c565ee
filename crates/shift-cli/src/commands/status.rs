use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use shift_metrics::MetricsCollector;
use shift_rollout::{RolloutReport, RolloutSummary};

use super::run::print_report;
use crate::OutputFormat;

pub fn status(config_path: &Path, pipeline_id: &str, format: OutputFormat) -> anyhow::Result<u8> {
    let config = super::load_config(config_path)?;
    let store = super::open_store(&config)?;
    let report: RolloutReport = store
        .get_report(pipeline_id)?
        .with_context(|| format!("rollout not found: {pipeline_id}"))?;
    print_report(&report, format)?;
    Ok(0)
}

pub async fn rollback(config_path: &Path, pipeline_id: &str) -> anyhow::Result<u8> {
    let config = super::load_config(config_path)?;
    let controller = super::build_controller(config, Arc::new(MetricsCollector::new()))?;
    let report = controller.force_rollback(pipeline_id).await?;
    print_report(&report, crate::OutputFormat::Text)?;
    Ok(0)
}

pub fn history(config_path: &Path, format: OutputFormat) -> anyhow::Result<u8> {
    let config = super::load_config(config_path)?;
    let store = super::open_store(&config)?;
    let mut summaries: Vec<RolloutSummary> = store
        .list_reports::<RolloutReport>()?
        .iter()
        .map(RolloutReport::summary)
        .collect();
    summaries.sort_by(|a, b| {
        a.started_at
            .cmp(&b.started_at)
            .then_with(|| a.pipeline_id.cmp(&b.pipeline_id))
    });

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summaries)?),
        OutputFormat::Text => {
            if summaries.is_empty() {
                println!("no rollouts recorded");
            }
            for s in &summaries {
                println!("{}", format_summary(s));
            }
        }
    }
    Ok(0)
}

fn format_summary(s: &RolloutSummary) -> String {
    let score = s
        .aggregate_score
        .map(|v| format!("{v:.3}"))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{:<24} {:<18} {:<28} {:<12} score {:<6} {}",
        s.pipeline_id,
        s.target,
        s.template,
        s.phase.to_string(),
        score,
        s.cause.as_deref().unwrap_or("")
    )
    .trim_end()
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shift_rollout::RolloutPhase;

    #[test]
    fn summary_line_without_decision() {
        let s = RolloutSummary {
            pipeline_id: "pl-1-0".into(),
            target: "support".into(),
            candidate_id: None,
            template: "support@1.0.0".into(),
            phase: RolloutPhase::Failed,
            cause: Some("config error: bad".into()),
            aggregate_score: None,
            coverage: None,
            violations: 0,
            started_at: 0,
            finished_at: Some(1),
        };
        let line = format_summary(&s);
        assert!(line.starts_with("pl-1-0"));
        assert!(line.contains("failed"));
        assert!(line.contains("score -"));
        assert!(line.ends_with("config error: bad"));
    }
}
