//! FleetPoller - collects container and host statistics from every engine
//!
//! ## Message Flow
//!
//! ```text
//! get_hosts → join_all(per host: connect → ping → list → join_all(stats)) → append batch
//!                               │
//!                               └── lifecycle diff → PluginRegistry
//! ```
//!
//! Hosts are the unit of failure isolation: an unreachable engine is logged,
//! reported in the [`PollReport`] and skipped, every other host still
//! completes. Only store failures abort a cycle.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::messages::HostEvent;
use crate::context::ServiceContext;
use crate::engine::{ContainerSummary, EngineClient, EngineError, EngineInfo};
use crate::plugins::{ContainerStates, diff_states};
use crate::storage::{
    ContainerCounts, ContainerSample, Host, HostStatsSnapshot, StorageError, StorageResult,
};

/// Counters of one poll cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollReport {
    pub hosts_ok: usize,
    pub hosts_failed: usize,

    /// Rows written (samples or host snapshots)
    pub records_written: usize,

    /// Containers whose stats could not be fetched
    pub containers_failed: usize,
}

/// Samples gathered from the fleet, not yet persisted
#[derive(Debug, Clone, Default)]
pub struct ContainerCollection {
    pub samples: Vec<ContainerSample>,
    pub report: PollReport,
}

impl ContainerCollection {
    fn add(&mut self, outcome: HostOutcome<Vec<ContainerSample>>) {
        match outcome {
            HostOutcome::Collected {
                value,
                containers_failed,
                ..
            } => {
                self.report.hosts_ok += 1;
                self.report.containers_failed += containers_failed;
                self.samples.extend(value);
            }
            HostOutcome::Unreachable { .. } => self.report.hosts_failed += 1,
        }
    }
}

/// What happened to one host during a cycle
enum HostOutcome<T> {
    Collected {
        host: String,
        value: T,
        containers: Vec<ContainerSummary>,
        containers_failed: usize,
    },
    Unreachable {
        host: String,
        error: EngineError,
    },
}

pub struct FleetPoller {
    ctx: ServiceContext,

    /// Last observed container states per host, for lifecycle events
    container_states: Mutex<HashMap<String, ContainerStates>>,

    /// Hosts that failed their last probe
    unreachable: Mutex<HashSet<String>>,
}

impl FleetPoller {
    pub fn new(ctx: ServiceContext) -> Self {
        Self {
            ctx,
            container_states: Mutex::new(HashMap::new()),
            unreachable: Mutex::new(HashSet::new()),
        }
    }

    pub fn context(&self) -> &ServiceContext {
        &self.ctx
    }

    /// Poll every host and append one sample per container.
    ///
    /// The only path that advances lifecycle and reachability tracking.
    #[instrument(skip(self))]
    pub async fn poll_containers(&self) -> StorageResult<PollReport> {
        let hosts = self.ctx.store.get_hosts().await?;
        if hosts.is_empty() {
            debug!("no hosts registered, nothing to poll");
            return Ok(PollReport::default());
        }

        let mut collection = ContainerCollection::default();
        for outcome in self.gather_containers(&hosts).await {
            match &outcome {
                HostOutcome::Collected {
                    host, containers, ..
                } => {
                    self.mark_reachable(host).await;
                    self.observe_containers(host, containers).await;
                }
                HostOutcome::Unreachable { host, error } => {
                    self.mark_unreachable(host, error).await;
                }
            }
            collection.add(outcome);
        }
        self.forget_unknown_hosts(&hosts).await;

        let ContainerCollection {
            samples,
            mut report,
        } = collection;

        let (valid, invalid): (Vec<_>, Vec<_>) =
            samples.into_iter().partition(|s| s.validate().is_ok());
        for sample in &invalid {
            warn!(
                "dropping invalid sample for container {:?} on {}",
                sample.id, sample.host_id
            );
        }
        report.containers_failed += invalid.len();

        self.ctx.store.append_container_samples(&valid).await?;
        report.records_written = valid.len();

        info!(
            "container poll done: {} hosts ok, {} failed, {} samples",
            report.hosts_ok, report.hosts_failed, report.records_written
        );
        Ok(report)
    }

    /// Gather container samples from every host without writing them or
    /// touching lifecycle tracking
    #[instrument(skip(self))]
    pub async fn collect_containers(&self) -> StorageResult<ContainerCollection> {
        let hosts = self.ctx.store.get_hosts().await?;
        let mut collection = ContainerCollection::default();
        for outcome in self.gather_containers(&hosts).await {
            collection.add(outcome);
        }
        Ok(collection)
    }

    async fn gather_containers(&self, hosts: &[Host]) -> Vec<HostOutcome<Vec<ContainerSample>>> {
        let timestamp = Utc::now();
        join_all(
            hosts
                .iter()
                .map(|host| self.collect_host_containers(host, timestamp)),
        )
        .await
    }

    /// Poll every host for engine information and upsert its snapshot
    #[instrument(skip(self))]
    pub async fn poll_host_info(&self) -> StorageResult<PollReport> {
        let hosts = self.ctx.store.get_hosts().await?;
        let mut report = PollReport::default();
        if hosts.is_empty() {
            debug!("no hosts registered, nothing to poll");
            return Ok(report);
        }

        let outcomes = join_all(hosts.iter().map(|host| self.collect_host_info(host))).await;

        for outcome in outcomes {
            match outcome {
                HostOutcome::Collected { host, value, .. } => {
                    self.mark_reachable(&host).await;
                    match self.ctx.store.upsert_host_stats(&value).await {
                        Ok(()) => {
                            report.hosts_ok += 1;
                            report.records_written += 1;
                        }
                        Err(StorageError::Validation(msg)) => {
                            warn!("engine info of {} rejected: {}", host, msg);
                            report.hosts_failed += 1;
                        }
                        Err(e) => return Err(e),
                    }
                }
                HostOutcome::Unreachable { host, error } => {
                    self.mark_unreachable(&host, &error).await;
                    report.hosts_failed += 1;
                }
            }
        }

        info!(
            "host info poll done: {} hosts ok, {} failed",
            report.hosts_ok, report.hosts_failed
        );
        Ok(report)
    }

    async fn connect(&self, host: &Host) -> Result<Arc<dyn EngineClient>, EngineError> {
        let engine = self.ctx.engines.connect(host)?;
        engine.ping().await?;
        Ok(engine)
    }

    async fn collect_host_containers(
        &self,
        host: &Host,
        timestamp: DateTime<Utc>,
    ) -> HostOutcome<Vec<ContainerSample>> {
        let unreachable = |error| HostOutcome::Unreachable {
            host: host.name.clone(),
            error,
        };

        let engine = match self.connect(host).await {
            Ok(engine) => engine,
            Err(e) => return unreachable(e),
        };

        let containers = match engine.list_containers(true).await {
            Ok(containers) => containers,
            Err(e) => return unreachable(e),
        };

        let stats = join_all(containers.iter().map(|c| {
            let engine = engine.clone();
            async move { engine.container_stats(&c.id).await }
        }))
        .await;

        let mut samples = Vec::with_capacity(containers.len());
        let mut containers_failed = 0;

        for (container, stats) in containers.iter().zip(stats) {
            match stats {
                Ok(stats) => samples.push(ContainerSample {
                    id: container.id.clone(),
                    host_id: host.name.clone(),
                    name: container.display_name(),
                    image: container.image.clone(),
                    status: container.status.clone(),
                    state: container.state.clone(),
                    cpu_percent: stats.cpu_percent(),
                    memory_percent: stats.memory_percent(),
                    timestamp,
                }),
                Err(e) => {
                    warn!(
                        "failed to fetch stats of {} on {}: {}",
                        container.display_name(),
                        host.name,
                        e
                    );
                    containers_failed += 1;
                }
            }
        }

        debug!("{}: {} samples", host.name, samples.len());
        HostOutcome::Collected {
            host: host.name.clone(),
            value: samples,
            containers,
            containers_failed,
        }
    }

    async fn collect_host_info(&self, host: &Host) -> HostOutcome<HostStatsSnapshot> {
        let result: Result<EngineInfo, EngineError> = async {
            let engine = self.connect(host).await?;
            engine.host_info().await
        }
        .await;

        match result {
            Ok(info) => HostOutcome::Collected {
                host: host.name.clone(),
                value: snapshot_from_info(&host.name, info),
                containers: Vec::new(),
                containers_failed: 0,
            },
            Err(error) => HostOutcome::Unreachable {
                host: host.name.clone(),
                error,
            },
        }
    }

    async fn mark_unreachable(&self, host: &str, error: &EngineError) {
        warn!("host {} unreachable: {}", host, error);
        let newly = self.unreachable.lock().await.insert(host.to_string());
        if newly {
            self.ctx.plugins.dispatch_host_event(&HostEvent::Unreachable {
                host_id: host.to_string(),
                error: error.to_string(),
            });
        }
    }

    async fn mark_reachable(&self, host: &str) {
        let recovered = self.unreachable.lock().await.remove(host);
        if recovered {
            info!("host {} reachable again", host);
            self.ctx
                .plugins
                .dispatch_host_event(&HostEvent::ReachableAgain {
                    host_id: host.to_string(),
                });
        }
    }

    async fn observe_containers(&self, host: &str, containers: &[ContainerSummary]) {
        let mut states = self.container_states.lock().await;
        let (next, events) = diff_states(host, states.get(host), containers);
        states.insert(host.to_string(), next);
        drop(states);

        for event in &events {
            self.ctx.plugins.dispatch_container_event(event);
        }
    }

    async fn forget_unknown_hosts(&self, hosts: &[Host]) {
        let known: HashSet<&str> = hosts.iter().map(|h| h.name.as_str()).collect();
        self.container_states
            .lock()
            .await
            .retain(|name, _| known.contains(name.as_str()));
        self.unreachable
            .lock()
            .await
            .retain(|name| known.contains(name.as_str()));
    }
}

fn snapshot_from_info(host_id: &str, info: EngineInfo) -> HostStatsSnapshot {
    HostStatsSnapshot {
        host_id: host_id.to_string(),
        engine_version: info.server_version,
        driver: info.driver,
        os: info.operating_system,
        architecture: info.architecture,
        total_memory: info.mem_total,
        total_cpu: info.ncpu,
        labels: info.labels,
        containers: ContainerCounts {
            total: info.containers,
            running: info.containers_running,
            stopped: info.containers_stopped,
            paused: info.containers_paused,
        },
        images: info.images,
        updated_at: Utc::now(),
    }
}
