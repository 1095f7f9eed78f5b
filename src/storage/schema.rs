//! Row definitions for the telemetry store
//!
//! ## Tables
//!
//! - `hosts` - registered engines, keyed by their unique name
//! - `container_samples` - append-only time series, one row per container per poll cycle
//! - `host_stats` - latest engine information per host (overwritten every cycle)
//! - `config` - singleton runtime configuration
//! - `log_entries` - application log, written by the tracing layer
//!
//! Every row type knows how to validate itself. Validation runs before any
//! statement touches the database so a rejected write never leaves partial state.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{StorageError, StorageResult};
use crate::engine::EngineEndpoint;

/// A monitored container engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// Unique name; the join key used by poller, gateway and API
    pub name: String,

    /// Engine address (`host:port`, `http(s)://host:port` or `unix:///path`)
    pub url: String,

    /// Talk TLS to the engine
    #[serde(default)]
    pub secure: bool,
}

impl Host {
    pub fn new(name: impl Into<String>, url: impl Into<String>, secure: bool) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            secure,
        }
    }

    pub fn validate(&self) -> StorageResult<()> {
        validate_name("host name", &self.name)?;
        if self.url.trim().is_empty() {
            return Err(StorageError::validation("host url must not be empty"));
        }
        EngineEndpoint::from_host(self)
            .map(|_| ())
            .map_err(|e| StorageError::validation(format!("invalid host url: {e}")))
    }
}

/// One point-in-time measurement of a container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSample {
    /// Engine container id
    pub id: String,

    /// Name of the host the container runs on
    pub host_id: String,

    pub name: String,
    pub image: String,
    pub status: String,
    pub state: String,

    /// CPU usage in percent (0 when no system delta is available)
    pub cpu_percent: f64,

    /// Memory usage relative to the container limit (0-100)
    pub memory_percent: f64,

    /// When the sample was taken (always UTC)
    pub timestamp: DateTime<Utc>,
}

impl ContainerSample {
    pub fn validate(&self) -> StorageResult<()> {
        validate_name("container id", &self.id)?;
        validate_name("host id", &self.host_id)?;
        validate_percent("cpu_percent", self.cpu_percent)?;
        validate_percent("memory_percent", self.memory_percent)?;
        Ok(())
    }
}

/// Container counters reported by an engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerCounts {
    pub total: i64,
    pub running: i64,
    pub stopped: i64,
    pub paused: i64,
}

/// Latest known engine state of a host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostStatsSnapshot {
    pub host_id: String,
    pub engine_version: String,
    pub driver: String,
    pub os: String,
    pub architecture: String,

    /// Total memory in bytes
    pub total_memory: i64,

    /// Number of CPUs visible to the engine
    pub total_cpu: i64,

    pub labels: Vec<String>,
    pub containers: ContainerCounts,
    pub images: i64,
    pub updated_at: DateTime<Utc>,
}

impl HostStatsSnapshot {
    pub fn validate(&self) -> StorageResult<()> {
        validate_name("host id", &self.host_id)?;
        let counts = [
            self.total_memory,
            self.total_cpu,
            self.images,
            self.containers.total,
            self.containers.running,
            self.containers.stopped,
            self.containers.paused,
        ];
        if counts.iter().any(|v| *v < 0) {
            return Err(StorageError::validation(format!(
                "negative counter in stats for host {}",
                self.host_id
            )));
        }
        Ok(())
    }
}

/// Singleton runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Poll cycle interval in minutes
    pub fetching_interval: u32,

    /// Retention for samples and logs in days
    pub keep_data_for: u32,

    /// Streaming refresh rate in seconds
    pub polling_rate: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fetching_interval: 5,
            keep_data_for: 7,
            polling_rate: 5,
        }
    }
}

impl Config {
    pub fn validate(&self) -> StorageResult<()> {
        if self.fetching_interval == 0 {
            return Err(StorageError::validation(
                "fetching_interval must be at least one minute",
            ));
        }
        if self.polling_rate == 0 {
            return Err(StorageError::validation(
                "polling_rate must be at least one second",
            ));
        }
        Ok(())
    }
}

/// Severity of a stored log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(StorageError::validation(format!("unknown log level: {other}"))),
        }
    }
}

impl From<tracing::Level> for LogLevel {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::ERROR => LogLevel::Error,
            tracing::Level::WARN => LogLevel::Warn,
            tracing::Level::INFO => LogLevel::Info,
            tracing::Level::DEBUG => LogLevel::Debug,
            tracing::Level::TRACE => LogLevel::Trace,
        }
    }
}

/// One application log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Assigned by the database, `None` before insertion
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub file: String,
    pub line: u32,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            id: None,
            timestamp: Utc::now(),
            level,
            message: message.into(),
            file: "unknown".to_string(),
            line: 0,
        }
    }

    pub fn validate(&self) -> StorageResult<()> {
        if self.file.trim().is_empty() {
            return Err(StorageError::validation("log entry file must not be empty"));
        }
        Ok(())
    }
}

/// Rows removed by a retention pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub samples: u64,
    pub logs: u64,
}

fn validate_name(what: &str, value: &str) -> StorageResult<()> {
    if value.trim().is_empty() {
        return Err(StorageError::validation(format!("{what} must not be empty")));
    }
    if value.trim() != value {
        return Err(StorageError::validation(format!(
            "{what} must not have leading or trailing whitespace"
        )));
    }
    Ok(())
}

fn validate_percent(what: &str, value: f64) -> StorageResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(StorageError::validation(format!(
            "{what} must be a finite, non-negative number (got {value})"
        )));
    }
    Ok(())
}
