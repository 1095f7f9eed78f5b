//! Integration tests for API endpoints
//!
//! These tests verify that:
//! - Host, config and log routes read and write the store
//! - Store errors map to 400 and 404
//! - The bearer token guards management routes only
//! - The websocket endpoint streams live container stats

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use fleet_monitoring::{
    actors::{FleetPoller, SchedulerHandle, SchedulerSettings, TaskKind},
    api::{ApiConfig, ApiState, spawn_api_server},
    gateway::GatewaySettings,
    storage::{LogEntry, LogLevel, StorageBackend, sqlite::SqliteBackend},
};
use futures::StreamExt;
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;

use crate::helpers::{FakeConnector, FakeEngine, container, context, empty_store, host};

const TOKEN: &str = "test-token";

struct TestApi {
    addr: SocketAddr,
    store: Arc<SqliteBackend>,
    scheduler: SchedulerHandle,
    client: reqwest::Client,
    _dir: tempfile::TempDir,
}

impl TestApi {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(self.url(path)).bearer_auth(TOKEN)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.post(self.url(path)).bearer_auth(TOKEN)
    }

    fn put(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.put(self.url(path)).bearer_auth(TOKEN)
    }

    fn delete(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.delete(self.url(path)).bearer_auth(TOKEN)
    }
}

/// Hosts are registered before the scheduler's warm-up poll runs
async fn spawn_test_api(
    connector: Arc<FakeConnector>,
    token: Option<&str>,
    hosts: &[&str],
) -> TestApi {
    let (dir, store) = empty_store().await;
    for name in hosts {
        store.add_host(&host(name)).await.unwrap();
    }
    let poller = Arc::new(FleetPoller::new(context(store.clone(), connector)));
    let scheduler = SchedulerHandle::spawn_with_settings(
        poller.clone(),
        SchedulerSettings {
            poll_interval: Duration::from_secs(3600),
            cleanup_interval: Duration::from_secs(3600),
        },
    );

    let state = ApiState::new(
        poller,
        GatewaySettings {
            heartbeat_interval: Duration::from_secs(30),
            outbound_capacity: 64,
        },
    )
    .with_scheduler(scheduler.clone());

    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(), // Random port
        auth_token: token.map(str::to_string),
        enable_cors: true,
    };

    TestApi {
        addr: spawn_api_server(config, state).await.unwrap(),
        store,
        scheduler,
        client: reqwest::Client::new(),
        _dir: dir,
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let api = spawn_test_api(FakeConnector::new(), Some(TOKEN), &[]).await;

    let body: Value = api
        .get("/api/v1/health")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["scheduler"], true);
}

#[tokio::test]
async fn test_auth_guards_management_routes_only() {
    let api = spawn_test_api(FakeConnector::new(), Some(TOKEN), &[]).await;

    let response = api.client.get(api.url("/api/v1/hosts")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = api
        .client
        .get(api.url("/api/v1/hosts"))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // peer probe stays open
    let response = api.client.get(api.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // without HA the peer routes exist but are unavailable
    let response = api.client.get(api.url("/ha/config")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_host_crud() {
    let api = spawn_test_api(FakeConnector::new(), Some(TOKEN), &[]).await;

    let response = api
        .post("/api/v1/hosts")
        .json(&json!({"name": "edge", "url": "10.0.0.5:2375"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // duplicate
    let response = api
        .post("/api/v1/hosts")
        .json(&json!({"name": "edge", "url": "10.0.0.6:2375"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // invalid url
    let response = api
        .post("/api/v1/hosts")
        .json(&json!({"name": "bad", "url": "ftp://10.0.0.7"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = api
        .put("/api/v1/hosts/edge")
        .json(&json!({"name": "edge-2", "url": "10.0.0.5:2376", "secure": true}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let hosts: Value = api.get("/api/v1/hosts").send().await.unwrap().json().await.unwrap();
    assert_eq!(
        hosts,
        json!([{"name": "edge-2", "url": "10.0.0.5:2376", "secure": true}])
    );

    let response = api
        .put("/api/v1/hosts/missing")
        .json(&json!({"name": "missing", "url": "10.0.0.8:2375"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = api.delete("/api/v1/hosts/edge-2").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(api.store.get_hosts().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_config_round_trip() {
    let api = spawn_test_api(FakeConnector::new(), Some(TOKEN), &[]).await;

    let config: Value = api.get("/api/v1/config").send().await.unwrap().json().await.unwrap();
    assert_eq!(
        config,
        json!({"fetching_interval": 5, "keep_data_for": 7, "polling_rate": 5})
    );

    let response = api
        .put("/api/v1/config")
        .json(&json!({"fetching_interval": 10, "keep_data_for": 3, "polling_rate": 2}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(api.store.get_config().await.unwrap().fetching_interval, 10);

    let response = api
        .put("/api/v1/config")
        .json(&json!({"fetching_interval": 0, "keep_data_for": 3, "polling_rate": 2}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(api.store.get_config().await.unwrap().fetching_interval, 10);
}

#[tokio::test]
async fn test_logs_filter_and_clear() {
    let api = spawn_test_api(FakeConnector::new(), Some(TOKEN), &[]).await;
    for (level, message) in [
        (LogLevel::Error, "engine gone"),
        (LogLevel::Info, "poll done"),
        (LogLevel::Error, "engine still gone"),
    ] {
        api.store.append_log(&LogEntry::new(level, message)).await.unwrap();
    }

    let body: Value = api
        .get("/api/v1/logs?level=error")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["count"], 2);

    let response = api.get("/api/v1/logs?level=loud").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: Value = api
        .delete("/api/v1/logs?level=error")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["deleted"], 2);

    let body: Value = api.get("/api/v1/logs").send().await.unwrap().json().await.unwrap();
    assert_eq!(body["count"], 1);
    assert_eq!(body["logs"][0]["message"], "poll done");
}

#[tokio::test]
async fn test_live_containers_and_stored_stats() {
    let connector = FakeConnector::new();
    connector.insert(
        "alpha",
        FakeEngine::new(vec![
            container("a1", "web", "running"),
            container("a2", "db", "exited"),
        ]),
    );
    let api = spawn_test_api(connector, Some(TOKEN), &["alpha"]).await;

    // commands are served once the warm-up poll has finished
    api.scheduler.run_now(TaskKind::Cleanup).await.unwrap();
    let stored = api.store.get_container_samples("alpha", None, 100).await.unwrap();
    assert_eq!(stored.len(), 2);

    let body: Value = api
        .get("/api/v1/containers")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["containers"].as_array().unwrap().len(), 2);
    assert_eq!(body["report"]["hosts_ok"], 1);
    // listing does not write samples
    assert_eq!(
        api.store
            .get_container_samples("alpha", None, 100)
            .await
            .unwrap()
            .len(),
        stored.len()
    );

    let body: Value = api
        .get("/api/v1/hosts/alpha/stats")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["host_id"], "alpha");

    let response = api.get("/api/v1/hosts/ghost/stats").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body: Value = api
        .get("/api/v1/hosts/alpha/samples?limit=1")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["count"], 1);

    let response = api.get("/api/v1/hosts/alpha/samples?limit=0").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_websocket_streams_stats() {
    let connector = FakeConnector::new();
    let alpha = FakeEngine::new(vec![container("a1", "web", "running")]);
    connector.insert("alpha", alpha.clone());
    let api = spawn_test_api(connector, None, &["alpha"]).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/docker/stats", api.addr))
        .await
        .unwrap();

    let mut texts = Vec::new();
    while texts.len() < 2 {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let Message::Text(text) = message {
            texts.push(serde_json::from_str::<Value>(&text).unwrap());
        }
    }

    assert_eq!(texts[0], json!({"message": "Connection established"}));
    assert_eq!(texts[1]["id"], "a1");
    assert_eq!(texts[1]["hostId"], "alpha");
    assert_eq!(texts[1]["name"], "web");
    assert_eq!(texts[1]["cpuUsage"], 25.0);
    assert_eq!(texts[1]["memoryUsage"], 50.0);

    socket.close(None).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while alpha.live_streams() != 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}
