//! Engine client for local unix sockets, backed by bollard

use std::path::Path;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{ListContainersOptions, Stats, StatsOptions};
use bytes::Bytes;
use futures::StreamExt;

use super::error::{EngineError, EngineResult};
use super::stats::{ContainerStats, ContainerSummary, EngineInfo};
use super::{EngineClient, StatsStream};

/// Seconds bollard waits on a single request
const SOCKET_TIMEOUT_SECS: u64 = 120;

pub struct SocketEngine {
    docker: Docker,
}

impl SocketEngine {
    pub fn connect(path: &Path) -> EngineResult<Self> {
        let path = path
            .to_str()
            .ok_or_else(|| EngineError::InvalidHost(format!("{} is not utf-8", path.display())))?;

        let docker =
            Docker::connect_with_unix(path, SOCKET_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)?;
        Ok(Self { docker })
    }
}

/// Re-encode a bollard frame into the engine's own JSON shape
fn convert_stats(stats: &Stats) -> EngineResult<ContainerStats> {
    Ok(serde_json::from_value(serde_json::to_value(stats)?)?)
}

fn convert_summary(summary: bollard::models::ContainerSummary) -> ContainerSummary {
    ContainerSummary {
        id: summary.id.unwrap_or_default(),
        names: summary.names.unwrap_or_default(),
        image: summary.image.unwrap_or_default(),
        state: summary.state.unwrap_or_default(),
        status: summary.status.unwrap_or_default(),
    }
}

fn convert_info(info: bollard::models::SystemInfo) -> EngineInfo {
    EngineInfo {
        server_version: info.server_version.unwrap_or_default(),
        driver: info.driver.unwrap_or_default(),
        operating_system: info.operating_system.unwrap_or_default(),
        architecture: info.architecture.unwrap_or_default(),
        mem_total: info.mem_total.unwrap_or_default(),
        ncpu: info.ncpu.unwrap_or_default(),
        labels: info.labels.unwrap_or_default(),
        containers: info.containers.unwrap_or_default(),
        containers_running: info.containers_running.unwrap_or_default(),
        containers_paused: info.containers_paused.unwrap_or_default(),
        containers_stopped: info.containers_stopped.unwrap_or_default(),
        images: info.images.unwrap_or_default(),
    }
}

#[async_trait]
impl EngineClient for SocketEngine {
    async fn ping(&self) -> EngineResult<()> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| EngineError::Unreachable(e.to_string()))
    }

    async fn list_containers(&self, all: bool) -> EngineResult<Vec<ContainerSummary>> {
        let options = ListContainersOptions::<String> {
            all,
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(options)).await?;
        Ok(containers.into_iter().map(convert_summary).collect())
    }

    async fn container_stats(&self, id: &str) -> EngineResult<ContainerStats> {
        let options = StatsOptions {
            stream: false,
            one_shot: false,
        };
        let mut stream = Box::pin(self.docker.stats(id, Some(options)));
        match stream.next().await {
            Some(frame) => convert_stats(&frame?),
            None => Err(EngineError::Stream(format!(
                "engine closed stats for {id} without a frame"
            ))),
        }
    }

    async fn stream_container_stats(&self, id: &str) -> EngineResult<StatsStream> {
        let options = StatsOptions {
            stream: true,
            one_shot: false,
        };

        // frames are turned back into NDJSON so both transports feed the same splitter
        let stream = self.docker.stats(id, Some(options)).map(|frame| {
            let frame = frame.map_err(|e| EngineError::Stream(e.to_string()))?;
            let mut line = serde_json::to_vec(&frame)?;
            line.push(b'\n');
            Ok(Bytes::from(line))
        });

        Ok(stream.boxed())
    }

    async fn host_info(&self) -> EngineResult<EngineInfo> {
        Ok(convert_info(self.docker.info().await?))
    }
}
