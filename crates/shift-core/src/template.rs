//! Prompt template store: read-only artifact store for template versions.
//!
//! Templates live as JSON documents in a directory:
//!
//! ```json
//! {
//!   "template_name": "customer_service",
//!   "version": "1.2.0",
//!   "prompt": "You are a support agent. Customer says: {{message}}",
//!   "parameters": { "max_tokens": 300, "temperature": 0.7, "top_p": 0.9 }
//! }
//! ```
//!
//! A template is immutable once loaded; an edit ships as a new version.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{ConfigError, ConfigResult};
use crate::types::{InvocationParams, TemplateRef, TestCase};

const REQUIRED_FIELDS: [&str; 4] = ["template_name", "version", "prompt", "parameters"];

/// Model preferences recorded alongside a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPreferences {
    pub primary: String,
    #[serde(default)]
    pub fallback: Option<String>,
}

/// One immutable version of a prompt template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: String,
    pub version: semver::Version,
    /// Templated text with `{{variable}}` placeholders.
    pub body: String,
    /// Default invocation parameters for variants that don't set their own.
    pub parameters: InvocationParams,
    pub created_at: u64,
    #[serde(default)]
    pub model_preferences: Option<ModelPreferences>,
}

/// On-disk template document.
#[derive(Debug, Deserialize)]
struct TemplateFile {
    template_name: String,
    version: String,
    prompt: String,
    parameters: InvocationParams,
    #[serde(default)]
    created_at: Option<u64>,
    #[serde(default)]
    model_preferences: Option<ModelPreferences>,
}

impl PromptTemplate {
    pub fn reference(&self) -> TemplateRef {
        TemplateRef {
            id: self.id.clone(),
            version: self.version.clone(),
        }
    }

    /// Parse and validate a template document.
    pub fn from_json(path: &Path, content: &str) -> ConfigResult<Self> {
        let template_err = |reason: String| ConfigError::Template {
            path: path.to_path_buf(),
            reason,
        };

        let raw: serde_json::Value =
            serde_json::from_str(content).map_err(|e| template_err(format!("invalid JSON: {e}")))?;
        for field in REQUIRED_FIELDS {
            if raw.get(field).is_none() {
                return Err(template_err(format!("missing required field `{field}`")));
            }
        }

        let file: TemplateFile =
            serde_json::from_value(raw).map_err(|e| template_err(e.to_string()))?;
        let version = semver::Version::parse(&file.version)
            .map_err(|e| template_err(format!("version `{}`: {e}", file.version)))?;
        if file.template_name.trim().is_empty() {
            return Err(template_err("template_name is empty".into()));
        }
        file.parameters
            .validate("parameters")
            .map_err(|e| template_err(e.to_string()))?;

        Ok(Self {
            id: file.template_name,
            version,
            body: file.prompt,
            parameters: file.parameters,
            created_at: file.created_at.unwrap_or_else(|| modified_secs(path)),
            model_preferences: file.model_preferences,
        })
    }

    /// Names of all `{{variable}}` placeholders in the body.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut vars = BTreeSet::new();
        let mut rest = self.body.as_str();
        while let Some(start) = rest.find("{{") {
            let after = &rest[start + 2..];
            match after.find("}}") {
                Some(end) => {
                    let name = after[..end].trim();
                    if !name.is_empty() {
                        vars.insert(name.to_string());
                    }
                    rest = &after[end + 2..];
                }
                None => break,
            }
        }
        vars
    }

    /// Substitute the case's bindings into the body.
    pub fn render(&self, case: &TestCase) -> ConfigResult<String> {
        let mut out = String::with_capacity(self.body.len());
        let mut rest = self.body.as_str();
        while let Some(start) = rest.find("{{") {
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                break;
            };
            out.push_str(&rest[..start]);
            let name = after[..end].trim();
            let value = case
                .bindings
                .get(name)
                .ok_or_else(|| ConfigError::UnboundVariable {
                    case: case.id.clone(),
                    variable: name.to_string(),
                })?;
            out.push_str(value);
            rest = &after[end + 2..];
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Verify every corpus case binds every placeholder.
    pub fn check_bindings(&self, cases: &[TestCase]) -> ConfigResult<()> {
        let vars = self.variables();
        for case in cases {
            if let Some(missing) = vars.iter().find(|v| !case.bindings.contains_key(*v)) {
                return Err(ConfigError::UnboundVariable {
                    case: case.id.clone(),
                    variable: missing.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Outcome of validating one template file.
#[derive(Debug)]
pub struct TemplateCheck {
    pub path: PathBuf,
    pub result: ConfigResult<TemplateRef>,
}

/// All template versions found in a directory.
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    templates: BTreeMap<TemplateRef, PromptTemplate>,
}

impl TemplateStore {
    /// Load every `*.json` template under `dir`. Any invalid file fails the load.
    pub fn open(dir: &Path) -> ConfigResult<Self> {
        let mut store = Self::default();
        for check in Self::validate_dir(dir)? {
            check.result?;
            let content = read(&check.path)?;
            store.insert(PromptTemplate::from_json(&check.path, &content)?)?;
        }
        debug!(dir = %dir.display(), templates = store.len(), "template store loaded");
        Ok(store)
    }

    /// Validate each template file independently, reporting per-file results.
    pub fn validate_dir(dir: &Path) -> ConfigResult<Vec<TemplateCheck>> {
        if !dir.is_dir() {
            return Err(ConfigError::Io {
                path: dir.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "template directory not found",
                ),
            });
        }

        let mut checks = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| ConfigError::Io {
                path: dir.to_path_buf(),
                source: e.into(),
            })?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some("json")
            {
                continue;
            }
            let result = read(path)
                .and_then(|content| PromptTemplate::from_json(path, &content))
                .map(|t| t.reference());
            if let Err(e) = &result {
                warn!(path = %path.display(), error = %e, "invalid prompt template");
            }
            checks.push(TemplateCheck {
                path: path.to_path_buf(),
                result,
            });
        }
        Ok(checks)
    }

    /// Build a store from already-parsed templates.
    pub fn from_templates(templates: impl IntoIterator<Item = PromptTemplate>) -> ConfigResult<Self> {
        let mut store = Self::default();
        for t in templates {
            store.insert(t)?;
        }
        Ok(store)
    }

    fn insert(&mut self, template: PromptTemplate) -> ConfigResult<()> {
        let key = template.reference();
        if self.templates.contains_key(&key) {
            return Err(ConfigError::Duplicate {
                kind: "template version",
                id: key.to_string(),
            });
        }
        self.templates.insert(key, template);
        Ok(())
    }

    pub fn get(&self, reference: &TemplateRef) -> ConfigResult<&PromptTemplate> {
        self.templates
            .get(reference)
            .ok_or_else(|| ConfigError::TemplateNotFound(reference.to_string()))
    }

    /// Highest version of a template id.
    pub fn latest(&self, id: &str) -> Option<&PromptTemplate> {
        self.templates
            .values()
            .filter(|t| t.id == id)
            .max_by(|a, b| a.version.cmp(&b.version))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

fn read(path: &Path) -> ConfigResult<String> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn modified_secs(path: &Path) -> u64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
