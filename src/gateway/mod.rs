//! Live telemetry gateway
//!
//! One [`GatewaySession`] per subscriber connection. The session opens one
//! continuous stats subscription per running container on every reachable
//! host and pushes each decoded frame to the subscriber.
//!
//! The session is transport agnostic: it talks to the connection through an
//! [`Outbound`] sender and an [`Inbound`] receiver. The websocket adapter
//! lives in the API module.

pub mod session;
pub mod subscription;

use std::time::Duration;

use serde::Serialize;

use crate::engine::{ContainerStats, ContainerSummary};

pub use session::{CloseReason, GatewaySession, SessionState, SessionSummary};
pub use subscription::{SubscriptionKey, SubscriptionSet};

/// First frame of every session
pub const CONNECTION_ESTABLISHED: &str = "Connection established";

#[derive(Debug, Clone, Copy)]
pub struct GatewaySettings {
    /// Interval between pings; an unanswered ping at the next tick closes the session
    pub heartbeat_interval: Duration,

    /// Capacity of the outbound queue towards the subscriber
    pub outbound_capacity: usize,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            outbound_capacity: 256,
        }
    }
}

/// Decoded stats frame of one container
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStatsEvent {
    pub id: String,
    pub host_id: String,
    pub name: String,
    pub image: String,
    pub status: String,
    pub state: String,
    pub cpu_usage: f64,
    pub memory_usage: f64,
}

/// A host or a single subscription failed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamErrorEvent {
    pub host_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,

    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionEvent {
    pub message: String,
}

/// Everything pushed to a subscriber
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GatewayEvent {
    Connection(ConnectionEvent),
    Stats(ContainerStatsEvent),
    Error(StreamErrorEvent),
}

impl GatewayEvent {
    pub fn connected() -> Self {
        GatewayEvent::Connection(ConnectionEvent {
            message: CONNECTION_ESTABLISHED.to_string(),
        })
    }

    pub fn host_error(host_id: &str, error: impl ToString) -> Self {
        GatewayEvent::Error(StreamErrorEvent {
            host_id: host_id.to_string(),
            container_id: None,
            error: error.to_string(),
        })
    }

    pub fn stream_error(key: &SubscriptionKey, error: impl ToString) -> Self {
        GatewayEvent::Error(StreamErrorEvent {
            host_id: key.host_id.clone(),
            container_id: Some(key.container_id.clone()),
            error: error.to_string(),
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Frames the session hands to the transport
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Event(GatewayEvent),
    Ping,
    Close,
}

/// Frames the transport hands to the session
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Pong,
    Text(String),
    Close,
}

/// Decode one line of an engine stats body.
///
/// Blank lines yield `Ok(None)`.
pub fn line_to_event(
    key: &SubscriptionKey,
    container: &ContainerSummary,
    line: &str,
) -> serde_json::Result<Option<ContainerStatsEvent>> {
    if line.trim().is_empty() {
        return Ok(None);
    }

    let stats: ContainerStats = serde_json::from_str(line)?;
    Ok(Some(ContainerStatsEvent {
        id: key.container_id.clone(),
        host_id: key.host_id.clone(),
        name: container.display_name(),
        image: container.image.clone(),
        status: container.status.clone(),
        state: container.state.clone(),
        cpu_usage: stats.cpu_percent(),
        memory_usage: stats.memory_percent(),
    }))
}
