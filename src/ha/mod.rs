//! High availability replication of the hub's data files
//!
//! A master node pushes its monitored files to every configured peer on
//! startup and whenever one of them changes. Slaves accept the pushes over
//! `POST /sync` and write them atomically below their data directory.
//! All HA metadata access goes through a file based advisory lock (`ha.lock`)
//! that is only honored inside this process.

pub mod error;
pub mod lock;
pub mod manager;
pub mod peer;
pub mod records;
pub mod watcher;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use error::{HaError, HaResult};
pub use lock::{AdvisoryLock, LockGuard, LockSettings};
pub use manager::{HaManager, SyncReport, SyncSkip};
pub use peer::{HealthReply, PeerClient, SyncFiles, SyncPayload};
pub use records::{HaConfig, HaNodeConfig, NodeAddress, NodeCache};

pub const LOCK_FILE: &str = "ha.lock";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HaRole {
    Master,
    #[default]
    Slave,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_monitored_files() -> Vec<String> {
    [
        "dockerConfig.json",
        "states.json",
        "template.json",
        "frontendConfiguration.json",
        "nodeCache.json",
        "usePassword.txt",
        "password.json",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn default_watch_interval_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HaSettings {
    #[serde(default)]
    pub role: HaRole,

    /// `ip:port` of the master, required on a master node
    #[serde(default)]
    pub master_address: Option<String>,

    /// Peers to replicate to (`ip:port`)
    #[serde(default)]
    pub nodes: Vec<String>,

    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Replicated files, relative to `data_dir`
    #[serde(default = "default_monitored_files")]
    pub monitored_files: Vec<String>,

    /// Talk plain HTTP to peers
    #[serde(default)]
    pub unsafe_http: bool,

    #[serde(default = "default_watch_interval_ms")]
    pub watch_interval_ms: u64,

    #[serde(skip)]
    pub lock: LockSettings,
}

impl Default for HaSettings {
    fn default() -> Self {
        Self {
            role: HaRole::default(),
            master_address: None,
            nodes: Vec::new(),
            data_dir: default_data_dir(),
            monitored_files: default_monitored_files(),
            unsafe_http: false,
            watch_interval_ms: default_watch_interval_ms(),
            lock: LockSettings::default(),
        }
    }
}

impl HaSettings {
    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms.max(10))
    }
}
