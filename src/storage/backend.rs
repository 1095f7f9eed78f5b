//! Storage backend trait definition
//!
//! This module defines the `StorageBackend` trait the rest of the hub talks to.
//! The poller writes through it, the gateway and the API read the host registry
//! from it, and the tracing layer appends log entries to it.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::error::StorageResult;
use super::schema::{
    Config, ContainerSample, Host, HostStatsSnapshot, LogEntry, LogLevel, PruneReport,
};

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,
}

/// Trait for the telemetry store
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync` as they are shared across the
/// scheduler, every gateway session and the API handlers.
///
/// ## Error Handling
///
/// Every write validates its input first and fails with
/// `StorageError::Validation` without touching storage. Backend failures are
/// returned as-is and must not be swallowed by the implementation.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Create the schema if absent and seed the singleton config row and a
    /// default host when none exist. Safe to call on every start.
    async fn init(&self) -> StorageResult<()>;

    // ========================================================================
    // Host registry
    // ========================================================================

    async fn get_hosts(&self) -> StorageResult<Vec<Host>>;

    async fn get_host(&self, name: &str) -> StorageResult<Option<Host>>;

    /// Register a new host; fails with `Validation` if the name is taken
    async fn add_host(&self, host: &Host) -> StorageResult<()>;

    /// Replace the host registered under `name` (renames are allowed)
    async fn update_host(&self, name: &str, host: &Host) -> StorageResult<()>;

    /// Remove a host and its stats snapshot; samples age out via retention
    async fn delete_host(&self, name: &str) -> StorageResult<()>;

    // ========================================================================
    // Telemetry
    // ========================================================================

    /// Append one sample. Samples are never updated once written.
    async fn append_container_sample(&self, sample: &ContainerSample) -> StorageResult<()> {
        self.append_container_samples(std::slice::from_ref(sample))
            .await
    }

    /// Append a batch of samples in a single transaction
    async fn append_container_samples(&self, samples: &[ContainerSample]) -> StorageResult<()>;

    /// Samples of a host, newest first
    async fn get_container_samples(
        &self,
        host_id: &str,
        container_id: Option<&str>,
        limit: usize,
    ) -> StorageResult<Vec<ContainerSample>>;

    /// Replace the stats snapshot of a host (latest wins)
    async fn upsert_host_stats(&self, snapshot: &HostStatsSnapshot) -> StorageResult<()>;

    async fn get_host_stats(&self, host_id: &str) -> StorageResult<Option<HostStatsSnapshot>>;

    async fn get_all_host_stats(&self) -> StorageResult<Vec<HostStatsSnapshot>>;

    // ========================================================================
    // Configuration
    // ========================================================================

    async fn get_config(&self) -> StorageResult<Config>;

    async fn update_config(&self, config: &Config) -> StorageResult<()>;

    // ========================================================================
    // Logs
    // ========================================================================

    async fn append_log(&self, entry: &LogEntry) -> StorageResult<()>;

    /// Log entries, newest first, optionally filtered by level
    async fn get_logs(&self, level: Option<LogLevel>) -> StorageResult<Vec<LogEntry>>;

    /// Delete log entries, optionally only those of one level.
    /// Returns the number of deleted entries.
    async fn clear_logs(&self, level: Option<LogLevel>) -> StorageResult<u64>;

    // ========================================================================
    // Retention
    // ========================================================================

    /// Delete samples and logs with a timestamp strictly before `cutoff`.
    /// Rows exactly at the cutoff are kept.
    async fn prune_before(&self, cutoff: DateTime<Utc>) -> StorageResult<PruneReport>;

    /// Delete samples and logs older than `days` days
    async fn prune_older_than(&self, days: u32) -> StorageResult<PruneReport> {
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        self.prune_before(cutoff).await
    }

    /// Check backend health
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
