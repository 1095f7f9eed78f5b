//! File based advisory lock
//!
//! The lock is a marker file created with `create_new`. It only coordinates
//! HA operations of cooperating code paths; nothing stops an unrelated
//! process from touching the guarded files.

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, warn};

use super::error::{HaError, HaResult};

/// Retry policy of [`AdvisoryLock::acquire`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LockSettings {
    /// Waits before giving up
    pub max_retries: u32,

    /// Delay of the first wait; doubled on every further attempt
    pub base_delay: Duration,

    /// Upper bound of the random extra delay, as a fraction of the backoff
    pub jitter: f64,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
            jitter: 0.3,
        }
    }
}

impl LockSettings {
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// `base * 2^attempt` plus up to `jitter` of it
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let backoff = self.backoff(attempt);
        backoff + backoff.mul_f64(rand::random::<f64>() * self.jitter)
    }

    /// Longest time `acquire` can wait before it fails
    pub fn max_total_wait(&self) -> Duration {
        (0..self.max_retries)
            .map(|attempt| self.backoff(attempt).mul_f64(1.0 + self.jitter))
            .sum()
    }
}

#[derive(Debug, Clone)]
pub struct AdvisoryLock {
    path: PathBuf,
    settings: LockSettings,
}

impl AdvisoryLock {
    pub fn new(path: impl Into<PathBuf>, settings: LockSettings) -> Self {
        Self {
            path: path.into(),
            settings,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &LockSettings {
        &self.settings
    }

    /// Take the lock, waiting with exponential backoff while it is held
    pub async fn acquire(&self) -> HaResult<LockGuard> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut attempt = 0;
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.path)
                .await
            {
                Ok(mut file) => {
                    file.write_all(b"locked").await?;
                    debug!("lock acquired: {}", self.path.display());
                    return Ok(LockGuard {
                        path: Some(self.path.clone()),
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if attempt >= self.settings.max_retries {
                        error!(
                            "lock {} still held after {} retries",
                            self.path.display(),
                            attempt
                        );
                        return Err(HaError::LockTimeout { attempts: attempt + 1 });
                    }

                    let delay = self.settings.delay_for(attempt);
                    warn!(
                        "lock file exists, waiting {}ms before retry {}/{}",
                        delay.as_millis(),
                        attempt + 1,
                        self.settings.max_retries
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Acquire, run `op`, release; the lock is released on every path
    pub async fn with_lock<F, Fut, T>(&self, op: F) -> HaResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = HaResult<T>>,
    {
        let guard = self.acquire().await?;
        let result = op().await;
        guard.release().await;
        result
    }
}

/// Held advisory lock; removes the marker on release or drop
#[derive(Debug)]
pub struct LockGuard {
    path: Option<PathBuf>,
}

impl LockGuard {
    pub async fn release(mut self) {
        if let Some(path) = self.path.take() {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!("lock released: {}", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => error!("failed to release lock {}: {}", path.display(), e),
            }
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != ErrorKind::NotFound {
                    error!("failed to release lock {}: {}", path.display(), e);
                }
            }
        }
    }
}
