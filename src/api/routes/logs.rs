//! Stored log endpoints

use axum::{
    Json,
    extract::{Query, State},
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::ApiState;
use crate::api::types::{ClearedResponse, LogsQuery, LogsResponse};
use crate::storage::LogLevel;

fn parse_level(query: &LogsQuery) -> ApiResult<Option<LogLevel>> {
    query
        .level
        .as_deref()
        .filter(|level| !level.trim().is_empty())
        .map(|level| level.parse::<LogLevel>().map_err(ApiError::from))
        .transpose()
}

/// GET /api/v1/logs?level=
pub async fn get_logs(
    State(state): State<ApiState>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<Json<LogsResponse>> {
    let level = parse_level(&query)?;
    let logs = state.ctx.store.get_logs(level).await?;
    Ok(Json(LogsResponse {
        count: logs.len(),
        logs,
    }))
}

/// DELETE /api/v1/logs?level=
pub async fn clear_logs(
    State(state): State<ApiState>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<Json<ClearedResponse>> {
    let level = parse_level(&query)?;
    let deleted = state.ctx.store.clear_logs(level).await?;
    Ok(Json(ClearedResponse { deleted }))
}
