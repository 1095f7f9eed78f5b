//! Host registry endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::ApiState;
use crate::api::types::{SamplesQuery, SamplesResponse};
use crate::storage::{Host, HostStatsSnapshot};

const DEFAULT_SAMPLE_LIMIT: u32 = 100;
const MAX_SAMPLE_LIMIT: u32 = 10_000;

/// GET /api/v1/hosts
pub async fn list_hosts(State(state): State<ApiState>) -> ApiResult<Json<Vec<Host>>> {
    Ok(Json(state.ctx.store.get_hosts().await?))
}

/// POST /api/v1/hosts
pub async fn add_host(
    State(state): State<ApiState>,
    Json(host): Json<Host>,
) -> ApiResult<(StatusCode, Json<Host>)> {
    state.ctx.store.add_host(&host).await?;
    info!("host {} added ({})", host.name, host.url);
    Ok((StatusCode::CREATED, Json(host)))
}

/// PUT /api/v1/hosts/:name
///
/// The body may carry a new name.
pub async fn update_host(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Json(host): Json<Host>,
) -> ApiResult<Json<Host>> {
    state.ctx.store.update_host(&name, &host).await?;
    info!("host {} updated", name);
    Ok(Json(host))
}

/// DELETE /api/v1/hosts/:name
pub async fn delete_host(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    state.ctx.store.delete_host(&name).await?;
    info!("host {} deleted", name);
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/hosts/:name/stats
///
/// Latest engine snapshot of the host
pub async fn get_host_stats(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> ApiResult<Json<HostStatsSnapshot>> {
    state
        .ctx
        .store
        .get_host_stats(&name)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no stats recorded for host {name}")))
}

/// GET /api/v1/stats
pub async fn list_host_stats(
    State(state): State<ApiState>,
) -> ApiResult<Json<Vec<HostStatsSnapshot>>> {
    Ok(Json(state.ctx.store.get_all_host_stats().await?))
}

/// GET /api/v1/hosts/:name/samples?container=&limit=
///
/// Newest samples first
pub async fn get_host_samples(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Query(query): Query<SamplesQuery>,
) -> ApiResult<Json<SamplesResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_SAMPLE_LIMIT);
    if limit == 0 || limit > MAX_SAMPLE_LIMIT {
        return Err(ApiError::InvalidRequest(format!(
            "limit must be between 1 and {MAX_SAMPLE_LIMIT}"
        )));
    }

    let samples = state
        .ctx
        .store
        .get_container_samples(&name, query.container.as_deref(), limit as usize)
        .await?;

    Ok(Json(SamplesResponse {
        host: name,
        count: samples.len(),
        samples,
    }))
}
