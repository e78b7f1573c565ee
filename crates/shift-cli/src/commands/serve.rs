use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tracing::{error, info};

use shift_api::{build_router, ApiState};
use shift_metrics::MetricsCollector;

pub async fn serve(config_path: &Path, port: u16) -> anyhow::Result<u8> {
    info!("PromptShift API server starting");
    let config = super::load_config(config_path)?;
    let metrics = Arc::new(MetricsCollector::new());
    let controller = super::build_controller(config, metrics.clone())?;

    let router = build_router(ApiState {
        controller,
        metrics,
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to install CTRL+C handler");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    info!("API server stopped");
    Ok(0)
}
