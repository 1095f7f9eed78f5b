//! Shared fixtures: a temporary store and in-process fake engines

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use fleet_monitoring::{
    ServiceContext,
    engine::{
        ContainerStats, ContainerSummary, EngineClient, EngineConnector, EngineError, EngineInfo,
        EngineResult, StatsStream,
    },
    plugins::PluginRegistry,
    storage::{Host, StorageBackend, sqlite::SqliteBackend},
};
use futures::StreamExt;
use tempfile::TempDir;

/// Fresh initialized store without the seeded default host
pub async fn empty_store() -> (TempDir, Arc<SqliteBackend>) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteBackend::new(dir.path().join("fleet.db")).await.unwrap();
    store.init().await.unwrap();
    store.delete_host("local").await.unwrap();
    (dir, Arc::new(store))
}

pub fn host(name: &str) -> Host {
    Host::new(name, format!("{name}:2375"), false)
}

pub fn container(id: &str, name: &str, state: &str) -> ContainerSummary {
    ContainerSummary {
        id: id.to_string(),
        names: vec![format!("/{name}")],
        image: format!("{name}:latest"),
        state: state.to_string(),
        status: if state == "running" {
            "Up 2 minutes".to_string()
        } else {
            "Exited (0)".to_string()
        },
    }
}

/// Stats frame yielding 25% cpu and 50% memory
pub fn stats_frame(id: &str) -> ContainerStats {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "cpu_stats": {
            "cpu_usage": {"total_usage": 2_000},
            "system_cpu_usage": 20_000,
            "online_cpus": 2
        },
        "precpu_stats": {
            "cpu_usage": {"total_usage": 1_000},
            "system_cpu_usage": 16_000
        },
        "memory_stats": {"usage": 512, "limit": 1024}
    }))
    .unwrap()
}

pub fn stats_line(id: &str) -> String {
    let mut line = serde_json::to_string(&stats_frame(id)).unwrap();
    line.push('\n');
    line
}

/// Decrements the live stream counter when the stream is dropped
struct LiveStream(Arc<AtomicUsize>);

impl Drop for LiveStream {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Scriptable engine
#[derive(Default)]
pub struct FakeEngine {
    pub reachable: AtomicBool,
    pub containers: Mutex<Vec<ContainerSummary>>,

    /// Containers whose one-shot stats request fails
    pub failing_stats: Mutex<HashSet<String>>,

    /// Containers whose stream breaks after the first frame
    pub breaking_streams: Mutex<HashSet<String>>,

    /// Containers whose subscription cannot be opened
    pub refused_streams: Mutex<HashSet<String>>,

    /// Extra raw chunks sent after the first frame of every stream
    pub extra_chunks: Mutex<Vec<String>>,

    /// Time every container listing takes
    pub list_delay: Mutex<Duration>,

    pub info: Mutex<EngineInfo>,
    pub live_streams: Arc<AtomicUsize>,
    pub opened_streams: AtomicUsize,
}

impl FakeEngine {
    pub fn new(containers: Vec<ContainerSummary>) -> Arc<Self> {
        let engine = Self::default();
        engine.reachable.store(true, Ordering::SeqCst);
        *engine.containers.lock().unwrap() = containers;
        Arc::new(engine)
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn live_streams(&self) -> usize {
        self.live_streams.load(Ordering::SeqCst)
    }

    fn check(&self) -> EngineResult<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EngineError::Unreachable("connection refused".to_string()))
        }
    }
}

#[async_trait]
impl EngineClient for FakeEngine {
    async fn ping(&self) -> EngineResult<()> {
        self.check()
    }

    async fn list_containers(&self, all: bool) -> EngineResult<Vec<ContainerSummary>> {
        self.check()?;
        let delay = *self.list_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let containers = self.containers.lock().unwrap().clone();
        Ok(containers
            .into_iter()
            .filter(|c| all || c.is_running())
            .collect())
    }

    async fn container_stats(&self, id: &str) -> EngineResult<ContainerStats> {
        self.check()?;
        if self.failing_stats.lock().unwrap().contains(id) {
            return Err(EngineError::Request("no such container".to_string()));
        }
        Ok(stats_frame(id))
    }

    async fn stream_container_stats(&self, id: &str) -> EngineResult<StatsStream> {
        self.check()?;
        if self.refused_streams.lock().unwrap().contains(id) {
            return Err(EngineError::Request("subscription refused".to_string()));
        }

        let mut chunks: Vec<EngineResult<Bytes>> = vec![Ok(Bytes::from(stats_line(id)))];
        chunks.extend(
            self.extra_chunks
                .lock()
                .unwrap()
                .iter()
                .map(|chunk| Ok(Bytes::from(chunk.clone()))),
        );
        let breaks = self.breaking_streams.lock().unwrap().contains(id);
        if breaks {
            chunks.push(Err(EngineError::Stream("connection reset".to_string())));
        }

        self.live_streams.fetch_add(1, Ordering::SeqCst);
        self.opened_streams.fetch_add(1, Ordering::SeqCst);
        let guard = LiveStream(self.live_streams.clone());

        let body = futures::stream::iter(chunks)
            .chain(futures::stream::pending())
            .map(move |chunk| {
                let _live = &guard;
                chunk
            });
        Ok(body.boxed())
    }

    async fn host_info(&self) -> EngineResult<EngineInfo> {
        self.check()?;
        Ok(self.info.lock().unwrap().clone())
    }
}

/// Resolves hosts by name to fake engines; unknown hosts are unreachable
#[derive(Default)]
pub struct FakeConnector {
    engines: Mutex<HashMap<String, Arc<FakeEngine>>>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, host: &str, engine: Arc<FakeEngine>) {
        self.engines.lock().unwrap().insert(host.to_string(), engine);
    }
}

impl EngineConnector for FakeConnector {
    fn connect(&self, host: &Host) -> EngineResult<Arc<dyn EngineClient>> {
        self.engines
            .lock()
            .unwrap()
            .get(&host.name)
            .cloned()
            .map(|engine| engine as Arc<dyn EngineClient>)
            .ok_or_else(|| EngineError::Unreachable(format!("no engine for {}", host.name)))
    }
}

pub fn context(store: Arc<SqliteBackend>, connector: Arc<FakeConnector>) -> ServiceContext {
    ServiceContext::new(store, connector, Arc::new(PluginRegistry::new()))
}
