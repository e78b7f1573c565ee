//! Candidate descriptors and the test corpus.

use std::collections::BTreeSet;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ConfigError, ConfigResult};
use crate::template::{PromptTemplate, TemplateStore};
use crate::types::{InvocationParams, ModelVariant, TemplateRef, TestCase};

/// A model variant as written in a candidate descriptor. Parameters
/// fall back to the template's defaults when omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantSpec {
    #[serde(default)]
    pub name: Option<String>,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub params: Option<InvocationParams>,
}

/// Externally supplied rollout request: a template version plus the
/// model variants to run it against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateDescriptor {
    #[serde(default)]
    pub id: Option<String>,
    pub template: TemplateRef,
    pub variants: Vec<VariantSpec>,
}

/// A resolved candidate: every variant carries concrete parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub template: TemplateRef,
    pub variants: Vec<ModelVariant>,
}

impl CandidateDescriptor {
    /// Load a descriptor from a `.toml` or `.json` file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        load_structured(path)
    }

    /// Resolve against the template store and check the corpus binds
    /// every template variable.
    pub fn resolve(
        &self,
        templates: &TemplateStore,
        corpus: &Corpus,
    ) -> ConfigResult<(Candidate, PromptTemplate)> {
        let template = templates.get(&self.template)?;
        template.check_bindings(&corpus.cases)?;

        if self.variants.is_empty() {
            return Err(ConfigError::invalid("variants", "candidate has no model variants"));
        }

        let mut seen = BTreeSet::new();
        let mut variants = Vec::with_capacity(self.variants.len());
        for (i, spec) in self.variants.iter().enumerate() {
            if spec.provider.trim().is_empty() || spec.model.trim().is_empty() {
                return Err(ConfigError::invalid(
                    format!("variants[{i}]"),
                    "provider and model are required",
                ));
            }
            let variant = ModelVariant {
                name: spec.name.clone(),
                provider: spec.provider.clone(),
                model: spec.model.clone(),
                params: spec
                    .params
                    .clone()
                    .unwrap_or_else(|| template.parameters.clone()),
            };
            variant.params.validate(&format!("variants[{i}].params"))?;
            if !seen.insert(variant.id()) {
                return Err(ConfigError::Duplicate {
                    kind: "model variant",
                    id: variant.id(),
                });
            }
            variants.push(variant);
        }

        let id = match &self.id {
            Some(id) if !id.trim().is_empty() => id.clone(),
            _ => fingerprint(&self.template, &variants),
        };

        Ok((
            Candidate {
                id,
                template: self.template.clone(),
                variants,
            },
            template.clone(),
        ))
    }
}

/// Content-derived candidate id: `cand-` + 12 hex chars of SHA-256.
fn fingerprint(template: &TemplateRef, variants: &[ModelVariant]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(template.to_string().as_bytes());
    for v in variants {
        hasher.update(b"\0");
        hasher.update(serde_json::to_vec(v).unwrap_or_default());
    }
    let digest = hex::encode(hasher.finalize());
    format!("cand-{}", &digest[..12])
}

/// The fixed test corpus a candidate is evaluated against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Corpus {
    pub cases: Vec<TestCase>,
}

impl Corpus {
    /// Load a corpus from a `.toml` (`[[cases]]`) or `.json` file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let corpus: Corpus = load_structured(path)?;
        corpus.validate()?;
        Ok(corpus)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.cases.is_empty() {
            return Err(ConfigError::invalid("cases", "corpus is empty"));
        }
        let mut seen = BTreeSet::new();
        for case in &self.cases {
            if !seen.insert(case.id.as_str()) {
                return Err(ConfigError::Duplicate {
                    kind: "test case",
                    id: case.id.clone(),
                });
            }
            if let Some(len) = case.criteria.length {
                if len.min_words > len.max_words {
                    return Err(ConfigError::invalid(
                        format!("cases.{}.criteria.length", case.id),
                        "min_words exceeds max_words",
                    ));
                }
            }
        }
        Ok(())
    }
}

pub(crate) fn load_structured<T: DeserializeOwned>(path: &Path) -> ConfigResult<T> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parse_err = |message: String| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    };
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content).map_err(|e| parse_err(e.to_string())),
        _ => toml::from_str(&content).map_err(|e| parse_err(e.to_string())),
    }
}
