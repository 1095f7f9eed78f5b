//! HTTP client side of the peer protocol
//!
//! ```text
//! GET  /health  -> {"ApiReachable": true}
//! POST /sync    <- {"files": {"relative/path": "content", ...}}
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::error::{HaError, HaResult};

/// Timeout of a reachability probe
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout of a file push
pub const PUSH_TIMEOUT: Duration = Duration::from_secs(30);

/// Files keyed by their path relative to the data directory
pub type SyncFiles = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReply {
    #[serde(rename = "ApiReachable")]
    pub api_reachable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPayload {
    pub files: SyncFiles,
}

pub struct PeerClient {
    probe_client: reqwest::Client,
    push_client: reqwest::Client,
    scheme: &'static str,
}

impl PeerClient {
    /// `use_http` talks plain HTTP to peers instead of HTTPS
    pub fn new(use_http: bool) -> HaResult<Self> {
        Self::with_timeouts(use_http, PROBE_TIMEOUT, PUSH_TIMEOUT)
    }

    pub fn with_timeouts(use_http: bool, probe: Duration, push: Duration) -> HaResult<Self> {
        Ok(Self {
            probe_client: reqwest::Client::builder().timeout(probe).build()?,
            push_client: reqwest::Client::builder().timeout(push).build()?,
            scheme: if use_http { "http" } else { "https" },
        })
    }

    fn url(&self, node: &str, path: &str) -> String {
        format!("{}://{}/{}", self.scheme, node.trim_end_matches('/'), path)
    }

    /// Whether the peer answers its health endpoint with `ApiReachable: true`
    pub async fn probe(&self, node: &str) -> HaResult<bool> {
        let url = self.url(node, "health");
        debug!("checking node {} reachability", url);

        let response = self.probe_client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(HaError::Peer(format!(
                "{} answered {}",
                url,
                response.status()
            )));
        }

        let reply: HealthReply = response.json().await?;
        Ok(reply.api_reachable)
    }

    pub async fn push(&self, node: &str, files: &SyncFiles) -> HaResult<()> {
        let url = self.url(node, "sync");
        info!("synchronizing {} files with node {}", files.len(), node);

        let response = self
            .push_client
            .post(&url)
            .json(&SyncPayload {
                files: files.clone(),
            })
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(HaError::Peer(format!(
                "{} answered {}",
                url,
                response.status()
            )))
        }
    }
}
