//! Master to slave replication over the peer protocol
//!
//! These tests verify that:
//! - A master pushes its monitored files to a slave on startup
//! - A changed file reaches the slave without a restart
//! - Unreachable peers are reported and skipped
//! - Only monitored files can be written through `/sync`
//! - A held lock makes the slave give up within the backoff budget

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use fleet_monitoring::{
    actors::FleetPoller,
    api::{ApiConfig, ApiState, spawn_api_server},
    gateway::GatewaySettings,
    ha::{
        AdvisoryLock, HaError, HaManager, HaRole, HaSettings, LOCK_FILE, LockSettings, SyncFiles,
    },
};
use pretty_assertions::assert_eq;

use crate::helpers::{FakeConnector, context, empty_store};

fn fast_lock() -> LockSettings {
    LockSettings {
        max_retries: 3,
        base_delay: Duration::from_millis(5),
        jitter: 0.3,
    }
}

fn ha_settings(dir: &Path, role: HaRole, nodes: Vec<String>) -> HaSettings {
    HaSettings {
        role,
        master_address: Some("127.0.0.1:9876".to_string()),
        nodes,
        data_dir: dir.to_path_buf(),
        unsafe_http: true,
        watch_interval_ms: 20,
        lock: fast_lock(),
        ..HaSettings::default()
    }
}

/// Slave hub serving the peer protocol on a random port
async fn spawn_slave(dir: &Path) -> (SocketAddr, Arc<HaManager>, tempfile::TempDir) {
    let (db_dir, store) = empty_store().await;
    let poller = Arc::new(FleetPoller::new(context(store, FakeConnector::new())));

    let ha = Arc::new(HaManager::new(ha_settings(dir, HaRole::Slave, vec![])).unwrap());
    ha.start().await.unwrap();

    let state = ApiState::new(poller, GatewaySettings::default()).with_ha(ha.clone());
    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        auth_token: Some("management-only".to_string()),
        enable_cors: false,
    };
    let addr = spawn_api_server(config, state).await.unwrap();
    (addr, ha, db_dir)
}

async fn wait_for_content(path: &Path, expected: &str) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if std::fs::read_to_string(path).ok().as_deref() == Some(expected) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{} never became {expected:?}", path.display()));
}

#[tokio::test]
async fn test_master_replicates_to_slave() {
    let master_dir = tempfile::tempdir().unwrap();
    let slave_dir = tempfile::tempdir().unwrap();
    let (slave_addr, _slave, _db) = spawn_slave(slave_dir.path()).await;

    std::fs::write(master_dir.path().join("states.json"), r#"{"web":"up"}"#).unwrap();
    std::fs::write(master_dir.path().join("template.json"), "[]").unwrap();

    let master = Arc::new(
        HaManager::new(ha_settings(
            master_dir.path(),
            HaRole::Master,
            vec![slave_addr.to_string()],
        ))
        .unwrap(),
    );
    master.start().await.unwrap();

    // startup sync
    wait_for_content(&slave_dir.path().join("states.json"), r#"{"web":"up"}"#).await;
    wait_for_content(&slave_dir.path().join("template.json"), "[]").await;
    assert!(slave_dir.path().join("nodeCache.json").exists());
    assert!(!slave_dir.path().join("password.json").exists());

    // change detected by the watcher
    std::fs::write(
        master_dir.path().join("states.json"),
        r#"{"web":"down","db":"up"}"#,
    )
    .unwrap();
    wait_for_content(
        &slave_dir.path().join("states.json"),
        r#"{"web":"down","db":"up"}"#,
    )
    .await;

    let report = master.synchronize().await.unwrap();
    assert_eq!(report.synced, vec![slave_addr.to_string()]);
    assert_eq!(report.files, 3);
}

#[tokio::test]
async fn test_unreachable_peer_is_skipped() {
    let master_dir = tempfile::tempdir().unwrap();
    let slave_dir = tempfile::tempdir().unwrap();
    let (slave_addr, _slave, _db) = spawn_slave(slave_dir.path()).await;

    std::fs::write(master_dir.path().join("states.json"), "{}").unwrap();

    let master = Arc::new(
        HaManager::new(ha_settings(
            master_dir.path(),
            HaRole::Master,
            vec!["127.0.0.1:1".to_string(), slave_addr.to_string()],
        ))
        .unwrap(),
    );
    master.start().await.unwrap();

    let report = master.synchronize().await.unwrap();
    assert_eq!(report.unreachable, vec!["127.0.0.1:1".to_string()]);
    assert_eq!(report.synced, vec![slave_addr.to_string()]);
    assert!(report.failed.is_empty());
}

#[tokio::test]
async fn test_sync_rejects_paths_outside_data_dir() {
    let slave_dir = tempfile::tempdir().unwrap();
    let (slave_addr, _slave, _db) = spawn_slave(slave_dir.path()).await;

    let response = reqwest::Client::new()
        .post(format!("http://{slave_addr}/sync"))
        .json(&serde_json::json!({"files": {"../escape.json": "{}", "ok.json": "{}"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    assert!(!slave_dir.path().join("ok.json").exists());

    let reply: serde_json::Value = reqwest::get(format!("http://{slave_addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reply, serde_json::json!({"ApiReachable": true}));
}

#[tokio::test]
async fn test_sync_cannot_rewrite_ha_records() {
    let slave_dir = tempfile::tempdir().unwrap();
    let (slave_addr, slave, _db) = spawn_slave(slave_dir.path()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{slave_addr}/sync"))
        .json(&serde_json::json!({"files": {
            "haConfig.json": r#"{"active":true,"master":true,"nodes":["6.6.6.6:1"]}"#,
            "arbitrary/unlisted.bin": "payload"
        }}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    assert!(slave.read_config().await.unwrap().is_none());
    assert!(!slave_dir.path().join("arbitrary").exists());

    let response = client
        .post(format!("http://{slave_addr}/sync"))
        .json(&serde_json::json!({"files": {"states.json": "{}"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert!(slave_dir.path().join("states.json").exists());
}

#[tokio::test]
async fn test_prepare_sync_lists_monitored_files() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, _ha, _db) = spawn_slave(dir.path()).await;
    std::fs::write(dir.path().join("states.json"), r#"{"web":"up"}"#).unwrap();
    std::fs::write(dir.path().join("unrelated.json"), "{}").unwrap();
    let client = reqwest::Client::new();

    // file contents stay behind the management token
    let response = client
        .get(format!("http://{addr}/ha/prepare-sync"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);

    let body: serde_json::Value = client
        .get(format!("http://{addr}/ha/prepare-sync"))
        .bearer_auth("management-only")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        body,
        serde_json::json!({"files": {"states.json": r#"{"web":"up"}"#}})
    );
}

#[tokio::test]
async fn test_held_lock_times_out_within_budget() {
    let dir = tempfile::tempdir().unwrap();
    let manager = HaManager::new(ha_settings(dir.path(), HaRole::Slave, vec![])).unwrap();

    let lock = AdvisoryLock::new(dir.path().join(LOCK_FILE), fast_lock());
    let _held = lock.acquire().await.unwrap();

    let mut files = SyncFiles::new();
    files.insert("states.json".to_string(), "{}".to_string());

    let started = Instant::now();
    assert_matches!(
        manager.apply_sync(&files).await,
        Err(HaError::LockTimeout { attempts: 4 })
    );
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(5 + 10 + 20));
    assert!(elapsed < fast_lock().max_total_wait() + Duration::from_secs(1));
    assert!(!dir.path().join("states.json").exists());
}
