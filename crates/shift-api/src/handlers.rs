//! REST API handlers for rollouts and deployment targets.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::{info, warn};

use shift_rollout::{RolloutError, RolloutRequest};

use crate::ApiState;

/// Response wrapper for every JSON endpoint.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn api_error(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn error_status(e: &RolloutError) -> StatusCode {
    match e {
        RolloutError::NotFound(_) => StatusCode::NOT_FOUND,
        RolloutError::TargetBusy { .. }
        | RolloutError::NotRollbackable { .. }
        | RolloutError::Superseded { .. } => StatusCode::CONFLICT,
        RolloutError::InvalidTransition { .. } | RolloutError::State(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn rollout_error(e: &RolloutError) -> axum::response::Response {
    api_error(&e.to_string(), error_status(e)).into_response()
}

/// Body of a 202 response.
#[derive(serde::Serialize)]
pub struct Accepted {
    pub pipeline_id: String,
}

/// POST /api/v1/rollouts
pub async fn start_rollout(
    State(state): State<ApiState>,
    Json(req): Json<RolloutRequest>,
) -> impl IntoResponse {
    match state.controller.spawn_rollout(req).await {
        Ok(pipeline_id) => {
            info!(pipeline = %pipeline_id, "rollout started via API");
            (StatusCode::ACCEPTED, ApiResponse::ok(Accepted { pipeline_id })).into_response()
        }
        Err(e) => {
            warn!(error = %e, "rollout request rejected");
            rollout_error(&e)
        }
    }
}

/// GET /api/v1/rollouts
pub async fn list_rollouts(State(state): State<ApiState>) -> impl IntoResponse {
    match state.controller.list_rollouts().await {
        Ok(summaries) => ApiResponse::ok(summaries).into_response(),
        Err(e) => rollout_error(&e),
    }
}

/// GET /api/v1/rollouts/{id}
pub async fn get_rollout(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.controller.get_status(&id).await {
        Ok(report) => ApiResponse::ok(report).into_response(),
        Err(e) => rollout_error(&e),
    }
}

/// POST /api/v1/rollouts/{id}/rollback
pub async fn rollback_rollout(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.controller.force_rollback(&id).await {
        Ok(report) => ApiResponse::ok(report).into_response(),
        Err(e) => {
            warn!(pipeline = %id, error = %e, "forced rollback refused");
            rollout_error(&e)
        }
    }
}

/// GET /api/v1/targets/{target}
pub async fn get_target(
    State(state): State<ApiState>,
    Path(target): Path<String>,
) -> impl IntoResponse {
    match state.controller.deployment_state(&target) {
        Ok(deployment) => ApiResponse::ok(deployment).into_response(),
        Err(e) => rollout_error(&e),
    }
}

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let body = shift_metrics::render_prometheus(&state.metrics.snapshot());
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use shift_core::{Corpus, ShiftConfig, TemplateStore};
    use shift_executor::BackendRegistry;
    use shift_health::{HealthSample, StaticSource};
    use shift_metrics::MetricsCollector;
    use shift_rollout::{RolloutController, RolloutInputs, RolloutPhase};
    use shift_state::StateStore;

    fn test_state() -> ApiState {
        let controller = RolloutController::new(RolloutInputs {
            config: ShiftConfig::default(),
            templates: TemplateStore::from_templates(Vec::new()).unwrap(),
            corpus: Corpus { cases: Vec::new() },
            backends: BackendRegistry::new(),
            health: Arc::new(StaticSource::new(HealthSample::default())),
            store: StateStore::open_in_memory().unwrap(),
        });
        ApiState {
            controller,
            metrics: Arc::new(MetricsCollector::new()),
        }
    }

    #[test]
    fn errors_map_to_status_codes() {
        let busy = RolloutError::TargetBusy {
            target: "cs".into(),
            pipeline_id: "pl-1".into(),
        };
        assert_eq!(error_status(&busy), StatusCode::CONFLICT);
        assert_eq!(
            error_status(&RolloutError::NotFound("pl-2".into())),
            StatusCode::NOT_FOUND
        );
        let blocked = RolloutError::NotRollbackable {
            pipeline_id: "pl-3".into(),
            phase: RolloutPhase::Blocked,
        };
        assert_eq!(error_status(&blocked), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn list_rollouts_empty() {
        let resp = list_rollouts(State(test_state())).await;
        assert_eq!(resp.into_response().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn get_nonexistent_rollout() {
        let resp = get_rollout(State(test_state()), Path("nope".to_string())).await;
        assert_eq!(resp.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rollback_nonexistent_rollout() {
        let resp = rollback_rollout(State(test_state()), Path("nope".to_string())).await;
        assert_eq!(resp.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn fresh_target_reports_empty_blue() {
        let resp = get_target(State(test_state()), Path("cs".to_string())).await;
        assert_eq!(resp.into_response().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_endpoint_is_plain_text() {
        let resp = prometheus_metrics(State(test_state())).await;
        let resp = resp.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers().get("content-type").unwrap().to_str().unwrap();
        assert!(content_type.contains("text/plain"));
    }
}
