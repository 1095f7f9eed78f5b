//! Live container listing

use axum::{Json, extract::State};

use crate::api::error::ApiResult;
use crate::api::state::ApiState;
use crate::api::types::ContainersResponse;

/// GET /api/v1/containers
///
/// Asks every engine right now; nothing is written to the store.
pub async fn list_containers(State(state): State<ApiState>) -> ApiResult<Json<ContainersResponse>> {
    let collection = state.poller.collect_containers().await?;
    Ok(Json(ContainersResponse {
        containers: collection.samples,
        report: collection.report,
    }))
}
