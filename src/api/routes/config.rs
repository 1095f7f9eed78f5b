//! Runtime configuration endpoints

use axum::{Json, extract::State};
use tracing::{info, warn};

use crate::api::error::ApiResult;
use crate::api::state::ApiState;
use crate::storage::Config;

/// GET /api/v1/config
pub async fn get_config(State(state): State<ApiState>) -> ApiResult<Json<Config>> {
    Ok(Json(state.ctx.store.get_config().await?))
}

/// PUT /api/v1/config
///
/// A changed fetching interval is handed to the running scheduler.
pub async fn update_config(
    State(state): State<ApiState>,
    Json(config): Json<Config>,
) -> ApiResult<Json<Config>> {
    let previous = state.ctx.store.get_config().await?;
    state.ctx.store.update_config(&config).await?;
    info!("configuration updated: {:?}", config);

    if previous.fetching_interval != config.fetching_interval {
        if let Some(scheduler) = &state.scheduler {
            if let Err(e) = scheduler.update_interval(config.fetching_interval).await {
                warn!("scheduler did not take the new interval: {}", e);
            }
        }
    }

    Ok(Json(config))
}
