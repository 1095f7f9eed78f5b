//! Telemetry store
//!
//! Durable persistence for the host registry, container samples, per-host
//! engine snapshots, application logs and the runtime configuration.
//!
//! ## Design
//!
//! - **Trait-based**: everything talks to `dyn StorageBackend`
//! - **Async**: all operations are async for compatibility with Tokio actors
//! - **Validate first**: writes reject bad input before touching the database
//!
//! ## Usage
//!
//! ```no_run
//! use fleet_monitoring::storage::{StorageBackend, sqlite::SqliteBackend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = SqliteBackend::new("./fleet.db").await?;
//!     backend.init().await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod schema;
pub mod sqlite;

pub use backend::{HealthStatus, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use schema::{
    Config, ContainerCounts, ContainerSample, Host, HostStatsSnapshot, LogEntry, LogLevel,
    PruneReport,
};
