//! Health check endpoint

use axum::{Json, extract::State};

use crate::api::state::ApiState;
use crate::api::types::HealthResponse;

/// GET /api/v1/health
///
/// Reports the store's health and whether the scheduler is still running
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    let (status, storage) = match state.ctx.store.health_check().await {
        Ok(health) if health.healthy => ("ok", health.message),
        Ok(health) => ("degraded", health.message),
        Err(e) => ("degraded", e.to_string()),
    };

    Json(HealthResponse {
        status: status.to_string(),
        storage,
        scheduler: state.scheduler.as_ref().is_some_and(|s| s.is_running()),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
