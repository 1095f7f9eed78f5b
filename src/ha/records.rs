//! HA metadata records and atomic file writes

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::error::{HaError, HaResult};
use super::lock::AdvisoryLock;

pub const HA_CONFIG_FILE: &str = "haConfig.json";
pub const HA_NODE_FILE: &str = "haNode.json";
pub const NODE_CACHE_FILE: &str = "nodeCache.json";

/// Replication role and peers of this node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaConfig {
    pub active: bool,
    pub master: bool,

    /// Peer addresses (`ip:port`)
    pub nodes: Vec<String>,
}

/// Address of the master, as known to this node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaNodeConfig {
    pub master: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddress {
    pub ip: String,
    pub port: u16,
}

/// Peer aliases (`node-1`, `node-2`, ...) to addresses
pub type NodeCache = BTreeMap<String, NodeAddress>;

/// Build the alias cache from `ip:port` peer entries.
///
/// Aliases follow the position in the list; entries without a usable
/// `ip:port` keep their number but are left out.
pub fn build_node_cache(nodes: &[String]) -> NodeCache {
    nodes
        .iter()
        .enumerate()
        .filter_map(|(index, node)| {
            let (ip, port) = node.trim().rsplit_once(':')?;
            let port = port.parse().ok()?;
            if ip.is_empty() {
                return None;
            }
            Some((
                format!("node-{}", index + 1),
                NodeAddress {
                    ip: ip.to_string(),
                    port,
                },
            ))
        })
        .collect()
}

/// Split a comma separated peer list
pub fn parse_node_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolve a relative sync path inside `root`.
///
/// Absolute paths, `..` and empty paths are rejected.
pub fn resolve_relative(root: &Path, relative: &str) -> HaResult<PathBuf> {
    let candidate = Path::new(relative);
    let mut resolved = root.to_path_buf();
    let mut parts = 0;

    for component in candidate.components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                parts += 1;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(HaError::InvalidPath(relative.to_string()));
            }
        }
    }

    if parts == 0 {
        return Err(HaError::InvalidPath(relative.to_string()));
    }
    Ok(resolved)
}

/// Write through a sibling temp file and rename, readers never see a torn file
pub async fn write_atomic(path: &Path, contents: &[u8]) -> HaResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let file_name = path
        .file_name()
        .ok_or_else(|| HaError::InvalidPath(path.display().to_string()))?
        .to_string_lossy();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    tokio::fs::write(&tmp, contents).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    trace!("wrote {}", path.display());
    Ok(())
}

/// Reads and writes of the HA records, each under the advisory lock
#[derive(Debug, Clone)]
pub struct HaRecords {
    dir: PathBuf,
    lock: Arc<AdvisoryLock>,
}

impl HaRecords {
    pub fn new(dir: impl Into<PathBuf>, lock: Arc<AdvisoryLock>) -> Self {
        Self {
            dir: dir.into(),
            lock,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn read_config(&self) -> HaResult<Option<HaConfig>> {
        self.read(HA_CONFIG_FILE).await
    }

    pub async fn write_config(&self, config: &HaConfig) -> HaResult<()> {
        self.write(HA_CONFIG_FILE, config).await
    }

    pub async fn read_node(&self) -> HaResult<Option<HaNodeConfig>> {
        self.read(HA_NODE_FILE).await
    }

    pub async fn write_node(&self, node: &HaNodeConfig) -> HaResult<()> {
        self.write(HA_NODE_FILE, node).await
    }

    pub async fn read_node_cache(&self) -> HaResult<Option<NodeCache>> {
        self.read(NODE_CACHE_FILE).await
    }

    pub async fn write_node_cache(&self, cache: &NodeCache) -> HaResult<()> {
        self.write(NODE_CACHE_FILE, cache).await
    }

    async fn read<T: DeserializeOwned>(&self, name: &str) -> HaResult<Option<T>> {
        let path = self.dir.join(name);
        self.lock.with_lock(|| read_json(&path)).await
    }

    async fn write<T: Serialize>(&self, name: &str, value: &T) -> HaResult<()> {
        let path = self.dir.join(name);
        let json = serde_json::to_vec_pretty(value)?;
        debug!("writing {}", path.display());
        self.lock.with_lock(|| write_atomic(&path, &json)).await
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> HaResult<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
