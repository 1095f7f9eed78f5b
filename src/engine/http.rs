//! Engine client speaking the engine API over HTTP(S)

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use tracing::trace;

use super::endpoint::EngineEndpoint;
use super::error::{EngineError, EngineResult};
use super::stats::{ContainerStats, ContainerSummary, EngineInfo};
use super::{EngineClient, StatsStream};

/// HTTP(S) engine client
///
/// Holds two reqwest clients: one with a total request timeout for the
/// one-shot calls and one without (only a connect timeout) for the
/// continuous stats streams.
pub struct HttpEngine {
    endpoint: EngineEndpoint,
    client: reqwest::Client,
    streaming_client: reqwest::Client,
}

impl HttpEngine {
    pub fn new(
        endpoint: EngineEndpoint,
        client: reqwest::Client,
        streaming_client: reqwest::Client,
    ) -> EngineResult<Self> {
        if endpoint.api_url("").is_none() {
            return Err(EngineError::InvalidHost(format!(
                "{endpoint} is not an HTTP endpoint"
            )));
        }
        Ok(Self {
            endpoint,
            client,
            streaming_client,
        })
    }

    fn url(&self, path: &str) -> EngineResult<String> {
        self.endpoint
            .api_url(path)
            .ok_or_else(|| EngineError::InvalidHost(self.endpoint.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> EngineResult<T> {
        let url = self.url(path)?;
        trace!("GET {url}");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Request(format!("{url} returned {status}")));
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl EngineClient for HttpEngine {
    async fn ping(&self) -> EngineResult<()> {
        let url = self.url("_ping")?;
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::Unreachable(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(EngineError::Unreachable(format!(
                "ping returned {}",
                response.status()
            )))
        }
    }

    async fn list_containers(&self, all: bool) -> EngineResult<Vec<ContainerSummary>> {
        self.get_json(&format!("containers/json?all={all}")).await
    }

    async fn container_stats(&self, id: &str) -> EngineResult<ContainerStats> {
        self.get_json(&format!("containers/{id}/stats?stream=false"))
            .await
    }

    async fn stream_container_stats(&self, id: &str) -> EngineResult<StatsStream> {
        let url = self.url(&format!("containers/{id}/stats?stream=true"))?;
        trace!("opening stats stream {url}");

        let response = self.streaming_client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Request(format!("{url} returned {status}")));
        }

        Ok(response
            .bytes_stream()
            .map_err(|e| EngineError::Stream(e.to_string()))
            .boxed())
    }

    async fn host_info(&self) -> EngineResult<EngineInfo> {
        self.get_json("info").await
    }
}
