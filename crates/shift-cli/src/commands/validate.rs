use std::path::{Path, PathBuf};

use shift_core::{Corpus, PromptTemplate, ShiftConfig, TemplateStore};
use shift_executor::BackendRegistry;
use shift_gate::PolicySet;
use shift_health::HttpHealthSource;

/// One line of the validation report.
#[derive(Debug)]
pub struct Check {
    pub subject: String,
    pub error: Option<String>,
}

impl Check {
    fn ok(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            error: None,
        }
    }

    fn failed(subject: impl Into<String>, error: impl ToString) -> Self {
        Self {
            subject: subject.into(),
            error: Some(error.to_string()),
        }
    }

    fn from_result<T, E: ToString>(subject: impl Into<String>, result: Result<T, E>) -> Self {
        match result {
            Ok(_) => Self::ok(subject),
            Err(e) => Self::failed(subject, e),
        }
    }
}

pub fn validate(config_path: &Path, templates: Option<PathBuf>) -> anyhow::Result<u8> {
    let config = super::load_config(config_path)?;
    println!("✓ {}", config_path.display());

    let checks = run_checks(&config, templates.as_deref());
    let mut failed = 0;
    for check in &checks {
        match &check.error {
            None => println!("✓ {}", check.subject),
            Some(e) => {
                failed += 1;
                println!("✗ {}: {e}", check.subject);
            }
        }
    }

    if failed > 0 {
        println!("{failed} of {} checks failed", checks.len());
        return Ok(3);
    }
    println!("all {} checks passed", checks.len());
    Ok(0)
}

pub fn run_checks(config: &ShiftConfig, templates_override: Option<&Path>) -> Vec<Check> {
    let mut checks = Vec::new();

    // ── Templates ──
    let templates_dir = templates_override
        .map(Path::to_path_buf)
        .or_else(|| config.templates.as_ref().map(|t| t.dir.clone()));
    let mut templates: Vec<PromptTemplate> = Vec::new();
    match templates_dir {
        None => checks.push(Check::failed("templates", "[templates] dir is not configured")),
        Some(dir) => match TemplateStore::validate_dir(&dir) {
            Err(e) => checks.push(Check::failed(dir.display().to_string(), e)),
            Ok(files) if files.is_empty() => {
                checks.push(Check::failed(dir.display().to_string(), "no templates found"))
            }
            Ok(files) => {
                for file in files {
                    let subject = file.path.display().to_string();
                    match file.result {
                        Ok(reference) => {
                            checks.push(Check::ok(format!("{subject} ({reference})")));
                            if let Ok(content) = std::fs::read_to_string(&file.path) {
                                if let Ok(t) = PromptTemplate::from_json(&file.path, &content) {
                                    templates.push(t);
                                }
                            }
                        }
                        Err(e) => checks.push(Check::failed(subject, e)),
                    }
                }
            }
        },
    }

    // ── Corpus ──
    match &config.corpus {
        None => checks.push(Check::failed("corpus", "[corpus] path is not configured")),
        Some(corpus) => match Corpus::load(&corpus.path) {
            Err(e) => checks.push(Check::failed(corpus.path.display().to_string(), e)),
            Ok(loaded) => {
                checks.push(Check::ok(format!(
                    "{} ({} cases)",
                    corpus.path.display(),
                    loaded.cases.len()
                )));
                for t in &templates {
                    checks.push(Check::from_result(
                        format!("bindings for {}", t.reference()),
                        t.check_bindings(&loaded.cases),
                    ));
                }
            }
        },
    }

    // ── Guardrails ──
    match PolicySet::compile(&config.guardrails) {
        Err(e) => checks.push(Check::failed("guardrail policies", e)),
        Ok(policies) => {
            checks.push(Check::ok(format!("{} guardrail policies", policies.len())));
            let report = policies.probe();
            if report.passed() {
                checks.push(Check::ok(format!("{} guardrail probes", report.checked)));
            }
            for failure in report.failures {
                checks.push(Check::failed(
                    format!("probe {:?}", failure.text),
                    format!(
                        "expected {}, found {}",
                        severity_label(failure.expected),
                        severity_label(failure.found)
                    ),
                ));
            }
        }
    }

    // ── Collaborators ──
    checks.push(Check::from_result(
        format!("backends {:?}", config.backends.keys().collect::<Vec<_>>()),
        BackendRegistry::from_config(&config.backends),
    ));
    if let Some(url) = &config.monitoring.health_url {
        checks.push(Check::from_result(
            format!("health endpoint {url}"),
            HttpHealthSource::from_url(url),
        ));
    }

    checks
}

fn severity_label(severity: Option<shift_core::Severity>) -> String {
    severity.map_or_else(|| "clean".to_string(), |s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const TEMPLATE: &str = r#"{
        "template_name": "support",
        "version": "1.0.0",
        "prompt": "Answer the customer: {{question}}",
        "parameters": { "temperature": 0.3, "max_tokens": 150 }
    }"#;

    const CORPUS: &str = r#"
[[cases]]
id = "refund-status"
bindings = { question = "Where is my refund?" }
criteria = { keywords = ["refund"] }
"#;

    fn write_config(dir: &Path, extra: &str) -> ShiftConfig {
        fs::create_dir_all(dir.join("templates")).unwrap();
        fs::write(dir.join("templates/support-1.0.0.json"), TEMPLATE).unwrap();
        fs::write(dir.join("corpus.toml"), CORPUS).unwrap();
        fs::write(dir.join("replay.json"), r#"{ "bedrock/claude-v2/*": "Your refund is on its way." }"#)
            .unwrap();
        let config = format!(
            r#"
[templates]
dir = "templates"

[corpus]
path = "corpus.toml"

[backends.bedrock]
kind = "replay"
fixture = "replay.json"
{extra}
"#
        );
        let path = dir.join("shift.toml");
        fs::write(&path, config).unwrap();
        ShiftConfig::from_file(&path).unwrap()
    }

    #[test]
    fn complete_setup_passes() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(dir.path(), "");
        let checks = run_checks(&config, None);
        let failures: Vec<&Check> = checks.iter().filter(|c| c.error.is_some()).collect();
        assert!(failures.is_empty(), "{failures:?}");
    }

    #[test]
    fn probe_that_slips_through_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(
            dir.path(),
            r#"
[[guardrails.policies]]
id = "no-email"
category = "pii"
severity = "block"
rule = { kind = "pii", entities = ["email"] }

[[guardrails.probes]]
text = "call me at 555-867-5309"
expect = "block"
"#,
        );
        let checks = run_checks(&config, None);
        let failed: Vec<&Check> = checks.iter().filter(|c| c.error.is_some()).collect();
        assert_eq!(failed.len(), 1);
        assert!(failed[0].subject.starts_with("probe"));
        assert_eq!(failed[0].error.as_deref(), Some("expected block, found clean"));
    }

    #[test]
    fn missing_template_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(dir.path(), "");
        let checks = run_checks(&config, Some(&dir.path().join("nowhere")));
        assert!(checks.iter().any(|c| c.error.is_some()));
    }
}
