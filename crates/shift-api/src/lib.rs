//! shift-api: REST API for PromptShift.
//!
//! Exposes the rollout controller's command surface over HTTP.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/v1/rollouts` | Start a rollout (202, 409 if the target is busy) |
//! | GET | `/api/v1/rollouts` | List rollout summaries |
//! | GET | `/api/v1/rollouts/{id}` | Rollout status and full report |
//! | POST | `/api/v1/rollouts/{id}/rollback` | Force a rollback |
//! | GET | `/api/v1/targets/{target}` | Blue/green state of a target |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use shift_metrics::MetricsCollector;
use shift_rollout::RolloutController;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub controller: RolloutController,
    pub metrics: Arc<MetricsCollector>,
}

/// Build the complete API router (REST + metrics).
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route(
            "/rollouts",
            get(handlers::list_rollouts).post(handlers::start_rollout),
        )
        .route("/rollouts/{id}", get(handlers::get_rollout))
        .route("/rollouts/{id}/rollback", post(handlers::rollback_rollout))
        .route("/targets/{target}", get(handlers::get_target))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::prometheus_metrics).with_state(state))
}
