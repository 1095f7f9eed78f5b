//! Engine payloads and the derived container metrics
//!
//! The structs mirror the subset of the engine API JSON the hub reads. Every
//! field the engine may omit is optional so partial payloads (stopped
//! containers, first stream frames) still decode.

use serde::{Deserialize, Serialize};

/// Entry of `GET /containers/json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSummary {
    pub id: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub names: Vec<String>,

    #[serde(default)]
    pub image: String,

    #[serde(default)]
    pub state: String,

    #[serde(default)]
    pub status: String,
}

impl ContainerSummary {
    /// First container name without the engine's leading `/`
    pub fn display_name(&self) -> String {
        self.names
            .first()
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_else(|| self.id.chars().take(12).collect())
    }

    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuUsage {
    #[serde(default)]
    pub total_usage: u64,

    #[serde(default)]
    pub percpu_usage: Option<Vec<u64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuStats {
    #[serde(default)]
    pub cpu_usage: CpuUsage,

    #[serde(default)]
    pub system_cpu_usage: Option<u64>,

    #[serde(default)]
    pub online_cpus: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    #[serde(default)]
    pub usage: Option<u64>,

    #[serde(default)]
    pub limit: Option<u64>,
}

/// One frame of `GET /containers/{id}/stats`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerStats {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub cpu_stats: CpuStats,

    #[serde(default)]
    pub precpu_stats: CpuStats,

    #[serde(default)]
    pub memory_stats: MemoryStats,
}

impl ContainerStats {
    pub fn cpu_percent(&self) -> f64 {
        cpu_percent(self)
    }

    pub fn memory_percent(&self) -> f64 {
        memory_percent(self)
    }
}

/// Reply of `GET /info`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EngineInfo {
    pub server_version: String,
    pub driver: String,
    pub operating_system: String,
    pub architecture: String,
    pub mem_total: i64,

    #[serde(rename = "NCPU")]
    pub ncpu: i64,

    #[serde(deserialize_with = "null_as_default")]
    pub labels: Vec<String>,
    pub containers: i64,
    pub containers_running: i64,
    pub containers_paused: i64,
    pub containers_stopped: i64,
    pub images: i64,
}

/// Engines send `null` instead of an empty list for some fields
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Number of CPUs the percentage may scale up to (at least one)
fn online_cpus(stats: &ContainerStats) -> u64 {
    stats
        .cpu_stats
        .online_cpus
        .filter(|n| *n > 0)
        .or_else(|| {
            stats
                .cpu_stats
                .cpu_usage
                .percpu_usage
                .as_ref()
                .map(|v| v.len() as u64)
        })
        .unwrap_or(1)
        .max(1)
}

/// CPU usage between the previous and the current frame.
///
/// `cpu_delta / system_delta * 100`, zero when either delta is not positive.
/// The result is always finite and lies in `[0, 100 * online_cpus]`.
pub fn cpu_percent(stats: &ContainerStats) -> f64 {
    let cpu_delta = stats.cpu_stats.cpu_usage.total_usage as f64
        - stats.precpu_stats.cpu_usage.total_usage as f64;
    let system_delta = stats.cpu_stats.system_cpu_usage.unwrap_or(0) as f64
        - stats.precpu_stats.system_cpu_usage.unwrap_or(0) as f64;

    if system_delta <= 0.0 || cpu_delta <= 0.0 {
        return 0.0;
    }

    let percent = cpu_delta / system_delta * 100.0;
    clamp_finite(percent, 100.0 * online_cpus(stats) as f64)
}

/// Memory usage relative to the container limit, in `[0, 100]`.
pub fn memory_percent(stats: &ContainerStats) -> f64 {
    let usage = stats.memory_stats.usage.unwrap_or(0) as f64;
    match stats.memory_stats.limit {
        Some(limit) if limit > 0 => clamp_finite(usage / limit as f64 * 100.0, 100.0),
        _ => 0.0,
    }
}

fn clamp_finite(value: f64, max: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, max)
    } else {
        0.0
    }
}
