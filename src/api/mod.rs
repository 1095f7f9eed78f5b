//! HTTP surface of the hub
//!
//! ## Endpoints
//!
//! Management (bearer token protected when a token is configured):
//!
//! - `GET /api/v1/health` - Health check
//! - `GET/POST /api/v1/hosts` - Host registry
//! - `PUT/DELETE /api/v1/hosts/:name` - Update or remove a host
//! - `GET /api/v1/hosts/:name/stats` - Latest engine snapshot
//! - `GET /api/v1/hosts/:name/samples` - Stored container samples
//! - `GET /api/v1/stats` - Latest snapshot of every host
//! - `GET/PUT /api/v1/config` - Runtime configuration
//! - `GET/DELETE /api/v1/logs?level=` - Stored logs
//! - `GET /api/v1/containers` - Live container listing
//! - `WS /docker/stats` - Live telemetry
//! - `GET /ha/prepare-sync` - Files the next sync pass would push
//!
//! Peer protocol (never token protected):
//!
//! - `GET /health` - `{"ApiReachable": true}`
//! - `POST /sync` - Receive replicated files
//! - `GET /ha/config` - HA configuration of this node

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod types;
pub mod websocket;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;
pub use types::{ContainersResponse, HealthResponse, LogsResponse, SamplesResponse};

use std::net::SocketAddr;

use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,

    /// Optional authentication token
    pub auth_token: Option<String>,

    /// Enable CORS for dashboards
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], crate::util::get_default_port())),
            auth_token: None,
            enable_cors: true,
        }
    }
}

/// Build the full router
pub fn router(config: &ApiConfig, state: ApiState) -> Router {
    let mut management = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route(
            "/api/v1/hosts",
            get(routes::hosts::list_hosts).post(routes::hosts::add_host),
        )
        .route(
            "/api/v1/hosts/:name",
            put(routes::hosts::update_host).delete(routes::hosts::delete_host),
        )
        .route("/api/v1/hosts/:name/stats", get(routes::hosts::get_host_stats))
        .route(
            "/api/v1/hosts/:name/samples",
            get(routes::hosts::get_host_samples),
        )
        .route("/api/v1/stats", get(routes::hosts::list_host_stats))
        .route(
            "/api/v1/config",
            get(routes::config::get_config).put(routes::config::update_config),
        )
        .route(
            "/api/v1/logs",
            get(routes::logs::get_logs).delete(routes::logs::clear_logs),
        )
        .route("/api/v1/containers", get(routes::containers::list_containers))
        .route("/docker/stats", get(websocket::stats_handler))
        .route("/ha/prepare-sync", get(routes::ha::prepare_sync));

    if let Some(token) = config.auth_token.clone() {
        management = management.layer(axum::middleware::from_fn_with_state(
            token,
            middleware::auth::require_token,
        ));
    }

    let peers = Router::new()
        .route("/health", get(routes::ha::peer_health))
        .route("/sync", post(routes::ha::receive_sync))
        .route("/ha/config", get(routes::ha::get_ha_config));

    let mut app = management
        .merge(peers)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", config.bind_addr);

    let app = router(&config, state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
