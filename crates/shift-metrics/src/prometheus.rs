//! Prometheus text exposition format.

use crate::collector::MetricsSnapshot;

/// Render a collector snapshot into Prometheus text format.
///
/// Per-model series carry `provider` and `model` labels.
pub fn render_prometheus(snapshot: &MetricsSnapshot) -> String {
    let mut out = String::new();

    out.push_str("# HELP shift_invocations_total Model invocations by terminal status.\n");
    out.push_str("# TYPE shift_invocations_total counter\n");
    for s in &snapshot.invocations {
        for (status, value) in [("ok", s.ok), ("error", s.errors), ("timeout", s.timeouts)] {
            out.push_str(&format!(
                "shift_invocations_total{{provider=\"{}\",model=\"{}\",status=\"{}\"}} {}\n",
                s.provider, s.model, status, value
            ));
        }
    }

    out.push_str("# HELP shift_invocation_retries_total Retried invocation attempts.\n");
    out.push_str("# TYPE shift_invocation_retries_total counter\n");
    for s in &snapshot.invocations {
        out.push_str(&format!(
            "shift_invocation_retries_total{{provider=\"{}\",model=\"{}\"}} {}\n",
            s.provider, s.model, s.retries
        ));
    }

    out.push_str("# HELP shift_invocation_tokens_total Estimated tokens produced.\n");
    out.push_str("# TYPE shift_invocation_tokens_total counter\n");
    for s in &snapshot.invocations {
        out.push_str(&format!(
            "shift_invocation_tokens_total{{provider=\"{}\",model=\"{}\"}} {}\n",
            s.provider, s.model, s.tokens
        ));
    }

    out.push_str("# HELP shift_invocation_latency_p50_ms P50 invocation latency in milliseconds.\n");
    out.push_str("# TYPE shift_invocation_latency_p50_ms gauge\n");
    for s in &snapshot.invocations {
        out.push_str(&format!(
            "shift_invocation_latency_p50_ms{{provider=\"{}\",model=\"{}\"}} {:.2}\n",
            s.provider, s.model, s.latency_p50_ms
        ));
    }

    out.push_str("# HELP shift_invocation_latency_p99_ms P99 invocation latency in milliseconds.\n");
    out.push_str("# TYPE shift_invocation_latency_p99_ms gauge\n");
    for s in &snapshot.invocations {
        out.push_str(&format!(
            "shift_invocation_latency_p99_ms{{provider=\"{}\",model=\"{}\"}} {:.2}\n",
            s.provider, s.model, s.latency_p99_ms
        ));
    }

    out.push_str("# HELP shift_gate_decisions_total Gate decisions by outcome.\n");
    out.push_str("# TYPE shift_gate_decisions_total counter\n");
    out.push_str(&format!(
        "shift_gate_decisions_total{{outcome=\"pass\"}} {}\n",
        snapshot.gates_passed
    ));
    out.push_str(&format!(
        "shift_gate_decisions_total{{outcome=\"block\"}} {}\n",
        snapshot.gates_blocked
    ));

    for (name, help, value) in [
        ("shift_promotions_total", "Candidates promoted after a clean health window.", snapshot.promotions),
        ("shift_rollbacks_total", "Live-slot rollbacks.", snapshot.rollbacks),
        ("shift_health_polls_total", "Health polls during monitoring.", snapshot.health_polls),
        ("shift_health_breaches_total", "Health polls outside configured bounds.", snapshot.health_breaches),
    ] {
        out.push_str(&format!("# HELP {name} {help}\n"));
        out.push_str(&format!("# TYPE {name} counter\n"));
        out.push_str(&format!("{name} {value}\n"));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::InvocationStats;

    fn test_snapshot() -> MetricsSnapshot {
        MetricsSnapshot {
            invocations: vec![InvocationStats {
                provider: "bedrock".into(),
                model: "claude-v2".into(),
                ok: 9,
                errors: 1,
                timeouts: 0,
                retries: 2,
                tokens: 1200,
                latency_p50_ms: 420.0,
                latency_p99_ms: 1850.5,
            }],
            gates_passed: 3,
            gates_blocked: 1,
            promotions: 2,
            rollbacks: 1,
            health_polls: 10,
            health_breaches: 1,
        }
    }

    #[test]
    fn renders_labeled_series() {
        let text = render_prometheus(&test_snapshot());
        assert!(text.contains(
            "shift_invocations_total{provider=\"bedrock\",model=\"claude-v2\",status=\"ok\"} 9"
        ));
        assert!(text.contains(
            "shift_invocation_latency_p99_ms{provider=\"bedrock\",model=\"claude-v2\"} 1850.50"
        ));
        assert!(text.contains("shift_gate_decisions_total{outcome=\"block\"} 1"));
        assert!(text.contains("shift_rollbacks_total 1"));
    }

    #[test]
    fn empty_snapshot_still_has_type_lines() {
        let text = render_prometheus(&MetricsSnapshot::default());
        assert!(text.contains("# TYPE shift_invocations_total counter"));
        assert!(text.contains("shift_promotions_total 0"));
    }
}
