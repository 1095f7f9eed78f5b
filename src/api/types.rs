//! API request and response types

use serde::{Deserialize, Serialize};

use crate::actors::poller::PollReport;
use crate::storage::{ContainerSample, LogEntry};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub storage: String,
    pub scheduler: bool,
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogsQuery {
    pub level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsResponse {
    pub logs: Vec<LogEntry>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearedResponse {
    pub deleted: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SamplesQuery {
    pub container: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplesResponse {
    pub host: String,
    pub samples: Vec<ContainerSample>,
    pub count: usize,
}

/// Live view of every container in the fleet
#[derive(Debug, Clone, Serialize)]
pub struct ContainersResponse {
    pub containers: Vec<ContainerSample>,
    pub report: PollReport,
}

/// Files written by `POST /sync`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    pub applied: usize,
}
