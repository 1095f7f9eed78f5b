//! Monitoring hub for a fleet of Docker engines
//!
//! The hub polls every registered engine for container and host statistics,
//! stores them in SQLite, pushes live container stats to websocket
//! subscribers and replicates its data files to peer hubs.

pub mod actors;
#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod context;
pub mod engine;
pub mod gateway;
pub mod ha;
pub mod logging;
pub mod plugins;
pub mod storage;
pub mod util;

pub use context::ServiceContext;
