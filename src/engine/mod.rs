//! Container engine access
//!
//! Everything the hub knows about an engine goes through [`EngineClient`].
//! Clients are built per host by an [`EngineConnector`], which lets tests
//! replace real engines with in-process fakes.
//!
//! ## Transports
//!
//! - `host[:port]` and `http(s)://host[:port]` use reqwest ([`http::HttpEngine`])
//! - `unix:///path` uses bollard ([`socket::SocketEngine`])

pub mod endpoint;
pub mod error;
pub mod http;
pub mod socket;
pub mod stats;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::storage::Host;

pub use endpoint::EngineEndpoint;
pub use error::{EngineError, EngineResult};
pub use stats::{ContainerStats, ContainerSummary, EngineInfo, cpu_percent, memory_percent};

/// Raw body of a continuous stats subscription (newline-delimited JSON)
pub type StatsStream = BoxStream<'static, EngineResult<Bytes>>;

/// Operations the hub needs from a container engine
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Liveness probe
    async fn ping(&self) -> EngineResult<()>;

    async fn list_containers(&self, all: bool) -> EngineResult<Vec<ContainerSummary>>;

    /// One non-streaming stats sample
    async fn container_stats(&self, id: &str) -> EngineResult<ContainerStats>;

    /// Continuous stats feed; dropping the stream closes the subscription
    async fn stream_container_stats(&self, id: &str) -> EngineResult<StatsStream>;

    async fn host_info(&self) -> EngineResult<EngineInfo>;
}

/// Builds an engine client for a registered host
pub trait EngineConnector: Send + Sync {
    fn connect(&self, host: &Host) -> EngineResult<Arc<dyn EngineClient>>;
}

/// Timeouts applied to engine traffic
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// Total timeout of a one-shot request
    pub request_timeout: Duration,

    /// Connect timeout, also applied to streaming requests
    pub connect_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Connector for real engines
pub struct DockerConnector {
    client: reqwest::Client,
    streaming_client: reqwest::Client,
}

impl DockerConnector {
    pub fn new(settings: EngineSettings) -> EngineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .connect_timeout(settings.connect_timeout)
            .build()?;

        let streaming_client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()?;

        Ok(Self {
            client,
            streaming_client,
        })
    }
}

impl EngineConnector for DockerConnector {
    fn connect(&self, host: &Host) -> EngineResult<Arc<dyn EngineClient>> {
        match EngineEndpoint::from_host(host)? {
            EngineEndpoint::Unix { path } => Ok(Arc::new(socket::SocketEngine::connect(&path)?)),
            endpoint => Ok(Arc::new(http::HttpEngine::new(
                endpoint,
                self.client.clone(),
                self.streaming_client.clone(),
            )?)),
        }
    }
}
