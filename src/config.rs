//! Hub bootstrap configuration
//!
//! Read once at startup from a JSON file; every field has a default so the
//! hub also starts without one. Environment variables (see [`crate::util`])
//! override the file.
//!
//! ```json
//! {
//!   "database": "./fleet.db",
//!   "addr": "0.0.0.0",
//!   "port": 9876,
//!   "token": "secret",
//!   "heartbeat_interval": 30,
//!   "ha": { "role": "master", "masterAddress": "10.0.0.1:9876", "nodes": ["10.0.0.2:9876"] }
//! }
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use tracing::trace;

use crate::engine::EngineSettings;
use crate::gateway::GatewaySettings;
use crate::ha::{HaRole, HaSettings};
use crate::util;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct HubConfig {
    /// SQLite database file
    #[serde(default = "default_database")]
    pub database: PathBuf,

    #[serde(default = "crate::util::get_default_addr")]
    pub addr: IpAddr,

    #[serde(default = "crate::util::get_default_port")]
    pub port: u16,

    /// Bearer token required on every API request
    pub token: Option<String>,

    /// Enable CORS for browser dashboards
    #[serde(default = "default_cors")]
    pub cors: bool,

    /// Gateway heartbeat in seconds
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,

    #[serde(default)]
    pub engine: EngineConfig,

    /// Replication, disabled when absent
    pub ha: Option<HaSettings>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct EngineConfig {
    /// Timeout of one-shot engine requests in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

fn default_database() -> PathBuf {
    PathBuf::from("./fleet.db")
}

fn default_cors() -> bool {
    true
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            addr: util::get_default_addr(),
            port: util::get_default_port(),
            token: None,
            cors: default_cors(),
            heartbeat_interval: default_heartbeat_interval(),
            engine: EngineConfig::default(),
            ha: None,
        }
    }
}

impl HubConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.port)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            request_timeout: Duration::from_secs(self.engine.request_timeout.max(1)),
            connect_timeout: Duration::from_secs(self.engine.connect_timeout.max(1)),
        }
    }

    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval.max(1)),
            ..GatewaySettings::default()
        }
    }

    /// Apply `HUB_*` and `HA_*` environment variables
    pub fn apply_env(mut self) -> Self {
        if let Some(addr) = util::get_addr() {
            self.addr = addr;
        }
        if let Some(port) = util::get_port() {
            self.port = port;
        }
        if let Some(database) = util::get_database() {
            self.database = database;
        }

        let master = util::get_ha_master();
        let master_ip = util::get_ha_master_ip();
        let nodes = util::get_ha_nodes();
        let unsafe_http = util::get_ha_unsafe();

        if master.is_some() || master_ip.is_some() || nodes.is_some() || unsafe_http.is_some() {
            let ha = self.ha.get_or_insert_with(HaSettings::default);
            if let Some(master) = master {
                ha.role = if master { HaRole::Master } else { HaRole::Slave };
            }
            if master_ip.is_some() {
                ha.master_address = master_ip;
            }
            if let Some(nodes) = nodes {
                ha.nodes = nodes;
            }
            if let Some(unsafe_http) = unsafe_http {
                ha.unsafe_http = unsafe_http;
            }
        }

        self
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<HubConfig> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
