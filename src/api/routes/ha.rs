//! HA peer protocol endpoints

use axum::{Json, extract::State};
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::ApiState;
use crate::api::types::SyncResponse;
use crate::ha::{HaConfig, HealthReply, SyncPayload};

/// GET /health
///
/// Reachability probe used by the master before every push
pub async fn peer_health() -> Json<HealthReply> {
    Json(HealthReply {
        api_reachable: true,
    })
}

/// POST /sync
pub async fn receive_sync(
    State(state): State<ApiState>,
    Json(payload): Json<SyncPayload>,
) -> ApiResult<Json<SyncResponse>> {
    let ha = state
        .ha
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("HA is not enabled on this node".to_string()))?;

    let applied = ha.apply_sync(&payload.files).await?;
    info!("applied {} files from the master", applied);
    Ok(Json(SyncResponse { applied }))
}

/// GET /ha/config
pub async fn get_ha_config(State(state): State<ApiState>) -> ApiResult<Json<HaConfig>> {
    let ha = state
        .ha
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("HA is not enabled on this node".to_string()))?;

    Ok(Json(ha.read_config().await?.unwrap_or_default()))
}

/// GET /ha/prepare-sync
///
/// The file map the next sync pass would push
pub async fn prepare_sync(State(state): State<ApiState>) -> ApiResult<Json<SyncPayload>> {
    let ha = state
        .ha
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("HA is not enabled on this node".to_string()))?;

    Ok(Json(SyncPayload {
        files: ha.prepare_files().await?,
    }))
}
