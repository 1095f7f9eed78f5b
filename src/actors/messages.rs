//! Message types for actor communication
//!
//! ## Design Principles
//!
//! 1. **Commands**: Request/response messages sent to the scheduler via mpsc
//! 2. **Events**: Lifecycle notifications handed to the plugin registry
//! 3. **Immutability**: All events are cloneable

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Lifecycle change of a container between two poll cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerEventKind {
    Created,
    Started,
    Stopped,
    Paused,
    Unpaused,
    Removed,
}

/// Event dispatched to plugins when a container changes state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerEvent {
    pub kind: ContainerEventKind,
    pub host_id: String,
    pub container_id: String,
    pub container_name: String,

    /// Engine state after the change (`None` once removed)
    pub state: Option<String>,

    pub timestamp: DateTime<Utc>,
}

/// Reachability change of a host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostEvent {
    Unreachable { host_id: String, error: String },
    ReachableAgain { host_id: String },
}

impl HostEvent {
    pub fn host_id(&self) -> &str {
        match self {
            HostEvent::Unreachable { host_id, .. } | HostEvent::ReachableAgain { host_id } => {
                host_id
            }
        }
    }
}

/// Periodic jobs driven by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    PollContainers,
    PollHostInfo,
    Cleanup,
}

impl TaskKind {
    pub const ALL: [TaskKind; 3] = [
        TaskKind::PollContainers,
        TaskKind::PollHostInfo,
        TaskKind::Cleanup,
    ];
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::PollContainers => write!(f, "container poll"),
            TaskKind::PollHostInfo => write!(f, "host info poll"),
            TaskKind::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// Result of one task run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,

    /// The previous run of the same task was still in flight
    Skipped,

    Failed(String),
}

/// Commands that can be sent to the scheduler actor
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Run a task immediately, respecting the in-flight guard
    RunNow {
        task: TaskKind,
        respond_to: oneshot::Sender<TaskOutcome>,
    },

    /// Change the poll interval (minutes); cleanup keeps its own period
    UpdateInterval { minutes: u32 },

    /// Stop all tickers; in-flight runs finish on their own
    Shutdown,
}
