use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use fleet_monitoring::{
    ServiceContext,
    actors::{FleetPoller, SchedulerHandle},
    api::{ApiConfig, ApiState, spawn_api_server},
    config::{HubConfig, read_config_file},
    ha::HaManager,
    logging::{LOG_CHANNEL_CAPACITY, StoreLogLayer, spawn_log_writer},
    storage::{StorageBackend, sqlite::SqliteBackend},
};
use tracing::{error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: Option<String>,
}

fn init(store_layer: StoreLogLayer) {
    let filter = filter::Targets::new().with_targets(vec![
        ("fleet_monitoring", LevelFilter::DEBUG),
        ("fleet_hub", LevelFilter::TRACE),
        ("tower_http", LevelFilter::INFO),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(store_layer)
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let (store_layer, log_rx) = StoreLogLayer::channel(LOG_CHANNEL_CAPACITY);
    init(store_layer);

    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(file) => read_config_file(file)?,
        None => HubConfig::default(),
    }
    .apply_env();

    let store: Arc<dyn StorageBackend> = Arc::new(
        SqliteBackend::new(&config.database)
            .await
            .with_context(|| format!("failed to open {}", config.database.display()))?,
    );
    store.init().await.context("failed to initialize the store")?;
    spawn_log_writer(store.clone(), log_rx);

    let ctx = ServiceContext::with_docker(store.clone(), config.engine_settings())?;
    let poller = Arc::new(FleetPoller::new(ctx));
    let scheduler = SchedulerHandle::start(poller.clone())
        .await
        .context("failed to start the scheduler")?;

    let mut state = ApiState::new(poller, config.gateway_settings()).with_scheduler(scheduler.clone());

    if let Some(settings) = config.ha.clone() {
        let ha = Arc::new(HaManager::new(settings)?);
        ha.start().await.context("failed to start HA replication")?;
        state = state.with_ha(ha);
    }

    let api_config = ApiConfig {
        bind_addr: config.bind_addr(),
        auth_token: config.token.clone(),
        enable_cors: config.cors,
    };
    let addr = spawn_api_server(api_config, state).await?;
    info!("hub ready on {addr}");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    if let Err(e) = scheduler.shutdown().await {
        warn!("scheduler already stopped: {e}");
    }
    if let Err(e) = store.close().await {
        error!("failed to close the store: {e}");
    }

    Ok(())
}
