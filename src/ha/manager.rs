//! Master side replication and slave side apply

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use super::error::{HaError, HaResult};
use super::lock::AdvisoryLock;
use super::peer::{PeerClient, SyncFiles};
use super::records::{
    HA_CONFIG_FILE, HA_NODE_FILE, HaConfig, HaNodeConfig, HaRecords, build_node_cache,
    resolve_relative, write_atomic,
};
use super::watcher::FileWatcher;
use super::{HaRole, HaSettings, LOCK_FILE};

/// Why a sync pass did not contact any peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncSkip {
    NoConfig,
    Inactive,
    NotMaster,
    NoPeers,
}

/// Outcome of one sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SyncSkip>,
    pub files: usize,
    pub synced: Vec<String>,
    pub unreachable: Vec<String>,
    pub failed: Vec<String>,
}

impl SyncReport {
    fn skipped(reason: SyncSkip) -> Self {
        Self {
            skipped: Some(reason),
            ..Default::default()
        }
    }
}

pub struct HaManager {
    settings: HaSettings,
    records: HaRecords,
    peers: PeerClient,
    lock: Arc<AdvisoryLock>,
}

impl HaManager {
    pub fn new(settings: HaSettings) -> HaResult<Self> {
        let peers = PeerClient::new(settings.unsafe_http)?;
        Ok(Self::with_peers(settings, peers))
    }

    pub fn with_peers(settings: HaSettings, peers: PeerClient) -> Self {
        let lock = Arc::new(AdvisoryLock::new(
            settings.data_dir.join(LOCK_FILE),
            settings.lock,
        ));
        let records = HaRecords::new(settings.data_dir.clone(), lock.clone());
        Self {
            settings,
            records,
            peers,
            lock,
        }
    }

    pub fn settings(&self) -> &HaSettings {
        &self.settings
    }

    pub fn records(&self) -> &HaRecords {
        &self.records
    }

    pub async fn read_config(&self) -> HaResult<Option<HaConfig>> {
        self.records.read_config().await
    }

    /// Persist the node records and, on a master, replicate now and on every
    /// change of a monitored file.
    pub async fn start(self: &Arc<Self>) -> HaResult<()> {
        match self.settings.role {
            HaRole::Slave => {
                info!("HA slave, waiting for sync requests from the master");
                Ok(())
            }
            HaRole::Master => {
                self.write_master_records().await?;

                match self.synchronize().await {
                    Ok(report) => debug!("initial sync finished: {:?}", report),
                    Err(e) => error!("initial sync failed: {}", e),
                }

                self.spawn_sync_loop().await;
                Ok(())
            }
        }
    }

    async fn write_master_records(&self) -> HaResult<()> {
        let master = self
            .settings
            .master_address
            .clone()
            .ok_or_else(|| HaError::Config("master node needs a master address".to_string()))?;

        let nodes = self.settings.nodes.clone();
        info!("HA master {} with {} peers", master, nodes.len());

        self.records
            .write_config(&HaConfig {
                active: true,
                master: true,
                nodes: nodes.clone(),
            })
            .await?;
        self.records.write_node(&HaNodeConfig { master }).await?;
        self.records
            .write_node_cache(&build_node_cache(&nodes))
            .await?;
        Ok(())
    }

    async fn spawn_sync_loop(self: &Arc<Self>) {
        let paths = self.monitored_paths();
        let watcher = FileWatcher::new(
            paths.iter().map(|(_, path)| path.clone()).collect(),
            self.settings.watch_interval(),
        )
        .await;

        let (tx, mut rx) = mpsc::channel(64);
        watcher.spawn(tx);

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(path) = rx.recv().await {
                info!("{} changed, synchronizing", path.display());
                if let Err(e) = manager.synchronize().await {
                    error!("sync after change of {} failed: {}", path.display(), e);
                }
            }
            debug!("sync loop stopped");
        });
    }

    fn monitored_paths(&self) -> Vec<(String, PathBuf)> {
        let root = &self.settings.data_dir;
        self.settings
            .monitored_files
            .iter()
            .filter_map(|name| match resolve_relative(root, name) {
                Ok(path) if is_node_local(root, &path) => {
                    warn!("not monitoring {}: node local HA record", name);
                    None
                }
                Ok(path) => Some((name.clone(), path)),
                Err(e) => {
                    warn!("not monitoring {}: {}", name, e);
                    None
                }
            })
            .collect()
    }

    /// Read every monitored file; missing ones are skipped
    pub async fn prepare_files(&self) -> HaResult<SyncFiles> {
        let mut files = BTreeMap::new();
        for (name, path) in self.monitored_paths() {
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => {
                    files.insert(name, content);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("{} does not exist, skipping", path.display());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(files)
    }

    /// Push the monitored files to every reachable peer
    #[instrument(skip(self))]
    pub async fn synchronize(&self) -> HaResult<SyncReport> {
        let Some(config) = self.records.read_config().await? else {
            info!("no HA config, nothing to synchronize");
            return Ok(SyncReport::skipped(SyncSkip::NoConfig));
        };
        if !config.active {
            info!("HA inactive, nothing to synchronize");
            return Ok(SyncReport::skipped(SyncSkip::Inactive));
        }
        if !config.master {
            info!("not the master node, nothing to synchronize");
            return Ok(SyncReport::skipped(SyncSkip::NotMaster));
        }
        if config.nodes.is_empty() {
            info!("no peers configured, nothing to synchronize");
            return Ok(SyncReport::skipped(SyncSkip::NoPeers));
        }

        let files = self.prepare_files().await?;
        let mut report = SyncReport {
            files: files.len(),
            ..Default::default()
        };

        for node in config.nodes {
            match self.peers.probe(&node).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!("node {} reports its API as unreachable, skipping", node);
                    report.unreachable.push(node);
                    continue;
                }
                Err(e) => {
                    warn!("node {} is unreachable: {}", node, e);
                    report.unreachable.push(node);
                    continue;
                }
            }

            match self.peers.push(&node, &files).await {
                Ok(()) => {
                    info!("node {} synchronized", node);
                    report.synced.push(node);
                }
                Err(e) => {
                    error!("failed to synchronize node {}: {}", node, e);
                    report.failed.push(node);
                }
            }
        }

        Ok(report)
    }

    /// Write files received from the master. Every path is checked before
    /// the first write.
    #[instrument(skip_all, fields(files = files.len()))]
    pub async fn apply_sync(&self, files: &SyncFiles) -> HaResult<usize> {
        let accepted = self.monitored_paths();
        let resolved = files
            .iter()
            .map(|(name, content)| {
                let path = resolve_relative(&self.settings.data_dir, name)?;
                if !accepted.iter().any(|(_, monitored)| *monitored == path) {
                    warn!("rejecting unmonitored sync file {}", name);
                    return Err(HaError::InvalidPath(name.clone()));
                }
                Ok((path, content))
            })
            .collect::<HaResult<Vec<_>>>()?;

        self.lock
            .with_lock(|| async {
                for (path, content) in &resolved {
                    write_atomic(path, content.as_bytes()).await?;
                    debug!("applied {}", path.display());
                }
                Ok(resolved.len())
            })
            .await
    }
}

/// HA records and the lock marker describe this node only and never replicate
fn is_node_local(root: &Path, path: &Path) -> bool {
    [HA_CONFIG_FILE, HA_NODE_FILE, LOCK_FILE]
        .iter()
        .any(|name| root.join(name) == path)
}
