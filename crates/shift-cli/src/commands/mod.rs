pub mod run;
pub mod serve;
pub mod status;
pub mod validate;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use shift_core::{Corpus, ShiftConfig, TemplateStore};
use shift_executor::BackendRegistry;
use shift_health::{HealthSample, HealthSource, HttpHealthSource, StaticSource};
use shift_metrics::{FanoutSink, MetricsCollector, TracingSink};
use shift_rollout::{host_from_config, RolloutController, RolloutInputs};
use shift_state::StateStore;

const DB_FILE: &str = "promptshift.redb";

pub fn load_config(path: &Path) -> anyhow::Result<ShiftConfig> {
    let config = ShiftConfig::from_file(path)?;
    info!(path = %path.display(), target = %config.pipeline.target, "configuration loaded");
    Ok(config)
}

pub fn open_store(config: &ShiftConfig) -> anyhow::Result<StateStore> {
    let dir = &config.pipeline.data_dir;
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(DB_FILE);
    let store = StateStore::open(&path)?;
    info!(path = %path.display(), "state store opened");
    Ok(store)
}

pub fn health_source(config: &ShiftConfig) -> anyhow::Result<Arc<dyn HealthSource>> {
    match &config.monitoring.health_url {
        Some(url) => Ok(Arc::new(HttpHealthSource::from_url(url)?)),
        None => {
            warn!("no monitoring.health_url configured, monitoring windows will always pass");
            Ok(Arc::new(StaticSource::new(HealthSample::default())))
        }
    }
}

/// Assemble a controller from the configuration file's collaborators.
pub fn build_controller(
    config: ShiftConfig,
    metrics: Arc<MetricsCollector>,
) -> anyhow::Result<RolloutController> {
    let templates_dir = config
        .templates
        .as_ref()
        .map(|t| t.dir.clone())
        .context("[templates] dir is not configured")?;
    let corpus_path = config
        .corpus
        .as_ref()
        .map(|c| c.path.clone())
        .context("[corpus] path is not configured")?;

    let templates = TemplateStore::open(&templates_dir)?;
    let corpus = Corpus::load(&corpus_path)?;
    let backends = BackendRegistry::from_config(&config.backends)?;
    let health = health_source(&config)?;
    let store = open_store(&config)?;
    let host = host_from_config(&config.host);
    info!(
        templates = templates.len(),
        cases = corpus.cases.len(),
        providers = ?backends.providers(),
        "rollout inputs loaded"
    );

    let sink = FanoutSink::new()
        .with(Arc::new(TracingSink))
        .with(metrics);
    Ok(RolloutController::new(RolloutInputs {
        config,
        templates,
        corpus,
        backends,
        health,
        store,
    })
    .with_host(host)
    .with_sink(Arc::new(sink)))
}
