//! Hosting layer: where promote/rollback directives take effect.
//!
//! The state store is the source of truth for the live pointer; the
//! hosting layer is told about each committed change so the serving side
//! can follow it.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use shift_core::config::HostConfig;
use shift_state::LivePointer;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "directive", rename_all = "snake_case")]
pub enum HostDirective {
    Promote { target: String, pointer: LivePointer },
    Rollback { target: String, pointer: LivePointer },
}

impl HostDirective {
    pub fn target(&self) -> &str {
        match self {
            HostDirective::Promote { target, .. } | HostDirective::Rollback { target, .. } => {
                target
            }
        }
    }

    pub fn pointer(&self) -> &LivePointer {
        match self {
            HostDirective::Promote { pointer, .. } | HostDirective::Rollback { pointer, .. } => {
                pointer
            }
        }
    }
}

/// Receives live-pointer changes after they are committed.
pub trait HostingLayer: Send + Sync {
    fn apply<'a>(&'a self, directive: &'a HostDirective) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Logs every directive and does nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHost;

impl HostingLayer for LogHost {
    fn apply<'a>(&'a self, directive: &'a HostDirective) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let pointer = directive.pointer();
            info!(
                target_name = %directive.target(),
                slot = %pointer.slot,
                candidate = pointer.content.as_ref().map(|c| c.candidate_id.as_str()).unwrap_or("-"),
                ?directive,
                "host directive"
            );
            Ok(())
        })
    }
}

/// Keeps a JSON file mapping each target to its live pointer.
///
/// The file is rewritten through a temporary sibling and a rename, so
/// readers never observe a partial write.
pub struct PointerFileHost {
    path: PathBuf,
    lock: Mutex<()>,
}

impl PointerFileHost {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub async fn read(&self) -> anyhow::Result<BTreeMap<String, LivePointer>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("parsing pointer file {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e).with_context(|| format!("reading {}", self.path.display())),
        }
    }

    async fn write(&self, directive: &HostDirective) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let mut pointers = self.read().await?;
        pointers.insert(directive.target().to_string(), directive.pointer().clone());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(&pointers)?;
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("renaming into {}", self.path.display()))?;
        Ok(())
    }
}

impl HostingLayer for PointerFileHost {
    fn apply<'a>(&'a self, directive: &'a HostDirective) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.write(directive).await?;
            info!(
                target_name = %directive.target(),
                slot = %directive.pointer().slot,
                path = %self.path.display(),
                "live pointer file updated"
            );
            Ok(())
        })
    }
}

pub fn host_from_config(config: &HostConfig) -> Arc<dyn HostingLayer> {
    match config {
        HostConfig::Log => Arc::new(LogHost),
        HostConfig::PointerFile { path } => Arc::new(PointerFileHost::new(path.clone())),
    }
}
