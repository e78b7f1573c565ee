//! Replay adapter: serves canned responses from a JSON fixture.
//!
//! The fixture is an object keyed by `provider/model/case_id`; a
//! `provider/model/*` entry matches any case of that model. Values are
//! either the response text or an object:
//!
//! ```json
//! {
//!   "bedrock/claude-v2/greeting": "Hello! How can I help you today?",
//!   "bedrock/claude-v2/*": { "text": "Sure.", "delay_ms": 40, "tokens": 2 },
//!   "bedrock/titan/greeting": { "error": "throttled", "transient": true }
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::backend::{estimate_tokens, BoxFuture, InvocationRequest, InvocationResponse, ModelBackend};
use crate::error::{ExecutorError, ExecutorResult, InvocationError};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReplayEntry {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub tokens: Option<u32>,
    /// Simulated latency.
    #[serde(default)]
    pub delay_ms: u64,
    /// Fail instead of answering.
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub transient: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FixtureValue {
    Text(String),
    Entry(ReplayEntry),
}

#[derive(Debug, Clone, Default)]
pub struct ReplayBackend {
    entries: HashMap<String, ReplayEntry>,
}

impl ReplayBackend {
    pub fn load(path: &Path) -> ExecutorResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ExecutorError::Fixture {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_json(&content).map_err(|reason| ExecutorError::Fixture {
            path: path.to_path_buf(),
            reason,
        })
    }

    pub fn from_json(content: &str) -> Result<Self, String> {
        let raw: HashMap<String, FixtureValue> =
            serde_json::from_str(content).map_err(|e| e.to_string())?;
        let entries = raw
            .into_iter()
            .map(|(key, value)| {
                let entry = match value {
                    FixtureValue::Text(text) => ReplayEntry {
                        text,
                        ..ReplayEntry::default()
                    },
                    FixtureValue::Entry(entry) => entry,
                };
                (key, entry)
            })
            .collect();
        Ok(Self { entries })
    }

    pub fn insert(&mut self, key: &str, entry: ReplayEntry) {
        self.entries.insert(key.to_string(), entry);
    }

    fn lookup(&self, request: &InvocationRequest) -> Option<&ReplayEntry> {
        let exact = format!("{}/{}/{}", request.provider, request.model, request.case_id);
        let wildcard = format!("{}/{}/*", request.provider, request.model);
        self.entries
            .get(&exact)
            .or_else(|| self.entries.get(&wildcard))
    }
}

impl ModelBackend for ReplayBackend {
    fn invoke<'a>(
        &'a self,
        request: &'a InvocationRequest,
    ) -> BoxFuture<'a, Result<InvocationResponse, InvocationError>> {
        Box::pin(async move {
            let entry = self.lookup(request).ok_or_else(|| {
                InvocationError::Fatal(format!(
                    "no replay entry for {}/{}/{}",
                    request.provider, request.model, request.case_id
                ))
            })?;

            if entry.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(entry.delay_ms)).await;
            }

            if let Some(message) = &entry.error {
                return Err(if entry.transient {
                    InvocationError::Transient(message.clone())
                } else {
                    InvocationError::Fatal(message.clone())
                });
            }

            Ok(InvocationResponse {
                text: entry.text.clone(),
                tokens: entry.tokens.or_else(|| Some(estimate_tokens(&entry.text))),
            })
        })
    }
}
