//! Polling watcher for the replicated files
//!
//! Each scan compares modification time and length of every watched file
//! with the previous scan. Appearing and disappearing files count as changes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    modified: Option<SystemTime>,
    len: u64,
}

pub struct FileWatcher {
    paths: Vec<PathBuf>,
    interval: Duration,
    seen: HashMap<PathBuf, Option<Fingerprint>>,
}

async fn fingerprint(path: &PathBuf) -> Option<Fingerprint> {
    let meta = tokio::fs::metadata(path).await.ok()?;
    Some(Fingerprint {
        modified: meta.modified().ok(),
        len: meta.len(),
    })
}

impl FileWatcher {
    /// Record the current state of `paths`; only later changes are reported
    pub async fn new(paths: Vec<PathBuf>, interval: Duration) -> Self {
        let mut seen = HashMap::with_capacity(paths.len());
        for path in &paths {
            seen.insert(path.clone(), fingerprint(path).await);
        }
        Self {
            paths,
            interval,
            seen,
        }
    }

    /// Paths that changed since the last scan
    pub async fn scan(&mut self) -> Vec<PathBuf> {
        let mut changed = Vec::new();
        for path in &self.paths {
            let current = fingerprint(path).await;
            let previous = self.seen.insert(path.clone(), current);
            if previous.flatten() != current {
                trace!("{} changed", path.display());
                changed.push(path.clone());
            }
        }
        changed
    }

    /// Scan forever, sending every changed path; stops when the receiver is gone
    pub fn spawn(mut self, changes: mpsc::Sender<PathBuf>) -> JoinHandle<()> {
        tokio::spawn(async move {
            debug!("watching {} files", self.paths.len());
            loop {
                tokio::time::sleep(self.interval).await;
                for path in self.scan().await {
                    if changes.send(path).await.is_err() {
                        debug!("change receiver closed, watcher stopped");
                        return;
                    }
                }
            }
        })
    }
}
