//! Plugin hooks for container and host lifecycle events
//!
//! Plugins implement [`Plugin`] and are registered with the
//! [`PluginRegistry`] held by the service context. Every hook is optional.
//! A panicking hook is logged and never reaches the poller.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tracing::{debug, error, info};

use crate::actors::messages::{ContainerEvent, ContainerEventKind, HostEvent};
use crate::engine::ContainerSummary;

/// Receiver of lifecycle events
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn on_container_event(&self, _event: &ContainerEvent) {}

    fn on_host_event(&self, _event: &HostEvent) {}
}

/// Set of registered plugins
#[derive(Default)]
pub struct PluginRegistry {
    plugins: RwLock<Vec<Arc<dyn Plugin>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin; a plugin with the same name is replaced
    pub fn register(&self, plugin: Arc<dyn Plugin>) {
        let mut plugins = self.plugins.write().unwrap_or_else(|e| e.into_inner());
        plugins.retain(|p| p.name() != plugin.name());
        info!("registered plugin {}", plugin.name());
        plugins.push(plugin);
    }

    /// Returns whether a plugin was removed
    pub fn unregister(&self, name: &str) -> bool {
        let mut plugins = self.plugins.write().unwrap_or_else(|e| e.into_inner());
        let before = plugins.len();
        plugins.retain(|p| p.name() != name);
        before != plugins.len()
    }

    pub fn names(&self) -> Vec<String> {
        self.snapshot()
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dispatch_container_event(&self, event: &ContainerEvent) {
        debug!(
            "container {} on {} {:?}",
            event.container_id, event.host_id, event.kind
        );
        for plugin in self.snapshot() {
            Self::guarded(plugin.name(), || plugin.on_container_event(event));
        }
    }

    pub fn dispatch_host_event(&self, event: &HostEvent) {
        for plugin in self.snapshot() {
            Self::guarded(plugin.name(), || plugin.on_host_event(event));
        }
    }

    // hooks run without the lock held so a plugin may (un)register others
    fn snapshot(&self) -> Vec<Arc<dyn Plugin>> {
        self.plugins
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn guarded(name: &str, hook: impl FnOnce()) {
        if catch_unwind(AssertUnwindSafe(hook)).is_err() {
            error!("plugin {} panicked while handling an event", name);
        }
    }
}

/// Last observed engine state per container id
pub type ContainerStates = HashMap<String, ObservedContainer>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedContainer {
    pub name: String,
    pub state: String,
}

/// Compare two observations of one host and derive lifecycle events.
///
/// `previous == None` means the host has not been observed yet; the current
/// listing then becomes the baseline without emitting anything.
pub fn diff_states(
    host_id: &str,
    previous: Option<&ContainerStates>,
    current: &[ContainerSummary],
) -> (ContainerStates, Vec<ContainerEvent>) {
    let next: ContainerStates = current
        .iter()
        .map(|c| {
            (
                c.id.clone(),
                ObservedContainer {
                    name: c.display_name(),
                    state: c.state.to_ascii_lowercase(),
                },
            )
        })
        .collect();

    let Some(previous) = previous else {
        return (next, Vec::new());
    };

    let now = Utc::now();
    let event = |kind, id: &str, observed: &ObservedContainer, state: Option<&str>| ContainerEvent {
        kind,
        host_id: host_id.to_string(),
        container_id: id.to_string(),
        container_name: observed.name.clone(),
        state: state.map(str::to_string),
        timestamp: now,
    };

    let mut events = Vec::new();

    for container in current {
        let Some(observed) = next.get(&container.id) else {
            continue;
        };
        let state = observed.state.as_str();

        match previous.get(&container.id) {
            None => {
                events.push(event(ContainerEventKind::Created, &container.id, observed, Some(state)));
                if state == "running" {
                    events.push(event(
                        ContainerEventKind::Started,
                        &container.id,
                        observed,
                        Some(state),
                    ));
                }
            }
            Some(before) if before.state != observed.state => {
                let kind = match (before.state.as_str(), state) {
                    ("paused", "running") => Some(ContainerEventKind::Unpaused),
                    (_, "running") => Some(ContainerEventKind::Started),
                    (_, "paused") => Some(ContainerEventKind::Paused),
                    ("running" | "paused" | "restarting", "exited" | "dead" | "created") => {
                        Some(ContainerEventKind::Stopped)
                    }
                    _ => None,
                };
                if let Some(kind) = kind {
                    events.push(event(kind, &container.id, observed, Some(state)));
                }
            }
            Some(_) => {}
        }
    }

    let mut removed: Vec<_> = previous
        .iter()
        .filter(|(id, _)| !next.contains_key(*id))
        .collect();
    removed.sort_by(|a, b| a.0.cmp(b.0));
    for (id, observed) in removed {
        events.push(event(ContainerEventKind::Removed, id, observed, None));
    }

    (next, events)
}
