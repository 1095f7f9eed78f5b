//! Batch side of the hub
//!
//! ## Architecture Overview
//!
//! ```text
//!        ┌──────────────────┐   commands   ┌───────────────┐
//!        │ SchedulerHandle  │ ───────────► │   Scheduler   │
//!        └──────────────────┘              └───────┬───────┘
//!                                                  │ spawns guarded tasks
//!                                          ┌───────▼───────┐
//!                                          │  FleetPoller  │──► PluginRegistry
//!                                          └───────┬───────┘
//!                                                  │ batch writes
//!                                          ┌───────▼───────┐
//!                                          │ StorageBackend│
//!                                          └───────────────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: the scheduler has an mpsc command channel for control messages
//! 2. **Request/Response**: oneshot channels carry task outcomes back to callers
//! 3. **Events**: lifecycle changes go to plugins through the registry

pub mod messages;
pub mod poller;
pub mod scheduler;

pub use messages::{ContainerEvent, ContainerEventKind, HostEvent, TaskKind, TaskOutcome};
pub use poller::{ContainerCollection, FleetPoller, PollReport};
pub use scheduler::{SchedulerError, SchedulerHandle, SchedulerSettings};
