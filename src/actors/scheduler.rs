//! Scheduler - drives poll cycles and retention cleanup
//!
//! ## Message Flow
//!
//! ```text
//! start → warm-up (containers, host info, cleanup)
//!       → loop { poll ticker | host ticker | cleanup ticker | command }
//!                      │
//!                      └── spawn task (skipped while the previous run is in flight)
//! ```
//!
//! Each task has its own in-flight flag. A tick that fires while the previous
//! run of the same task is still running is logged and skipped, so slow
//! engines never pile up concurrent cycles.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, instrument, warn};

use super::messages::{SchedulerCommand, TaskKind, TaskOutcome};
use super::poller::FleetPoller;
use crate::storage::{Config, StorageError};

/// Period of the retention cleanup
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug)]
pub enum SchedulerError {
    /// Stored configuration cannot drive the scheduler
    InvalidConfig(String),

    /// Configuration could not be read
    Storage(StorageError),
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::InvalidConfig(msg) => write!(f, "invalid scheduler config: {}", msg),
            SchedulerError::Storage(err) => write!(f, "failed to read scheduler config: {}", err),
        }
    }
}

impl std::error::Error for SchedulerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SchedulerError::Storage(err) => Some(err),
            SchedulerError::InvalidConfig(_) => None,
        }
    }
}

impl From<StorageError> for SchedulerError {
    fn from(err: StorageError) -> Self {
        SchedulerError::Storage(err)
    }
}

/// Periods of the scheduled tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Period of the container and host info polls
    pub poll_interval: Duration,

    pub cleanup_interval: Duration,
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Result<Self, SchedulerError> {
        if config.fetching_interval == 0 {
            return Err(SchedulerError::InvalidConfig(
                "fetching_interval must be positive".to_string(),
            ));
        }
        Ok(Self {
            poll_interval: Duration::from_secs(u64::from(config.fetching_interval) * 60),
            cleanup_interval: CLEANUP_INTERVAL,
        })
    }
}

/// Clears an in-flight flag when the run ends, panics included
struct InFlight(Arc<AtomicBool>);

impl InFlight {
    fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag.clone()))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Scheduler {
    poller: Arc<FleetPoller>,
    command_rx: mpsc::Receiver<SchedulerCommand>,
    settings: SchedulerSettings,
    in_flight: HashMap<TaskKind, Arc<AtomicBool>>,
}

fn ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

impl Scheduler {
    fn new(
        poller: Arc<FleetPoller>,
        command_rx: mpsc::Receiver<SchedulerCommand>,
        settings: SchedulerSettings,
    ) -> Self {
        let in_flight = TaskKind::ALL
            .iter()
            .map(|task| (*task, Arc::new(AtomicBool::new(false))))
            .collect();

        Self {
            poller,
            command_rx,
            settings,
            in_flight,
        }
    }

    #[instrument(skip(self))]
    async fn run(mut self) {
        info!(
            "starting scheduler (poll every {:?}, cleanup every {:?})",
            self.settings.poll_interval, self.settings.cleanup_interval
        );

        for task in TaskKind::ALL {
            let outcome = run_guarded(self.poller.clone(), self.flag(task), task).await;
            debug!("warm-up {}: {:?}", task, outcome);
        }

        let mut container_ticker = ticker(self.settings.poll_interval);
        let mut host_ticker = ticker(self.settings.poll_interval);
        let mut cleanup_ticker = ticker(self.settings.cleanup_interval);

        loop {
            tokio::select! {
                _ = container_ticker.tick() => self.spawn_task(TaskKind::PollContainers, None),
                _ = host_ticker.tick() => self.spawn_task(TaskKind::PollHostInfo, None),
                _ = cleanup_ticker.tick() => self.spawn_task(TaskKind::Cleanup, None),

                cmd = self.command_rx.recv() => match cmd {
                    Some(SchedulerCommand::RunNow { task, respond_to }) => {
                        debug!("received RunNow({}) command", task);
                        self.spawn_task(task, Some(respond_to));
                    }

                    Some(SchedulerCommand::UpdateInterval { minutes }) => {
                        if minutes == 0 {
                            warn!("ignoring poll interval of zero minutes");
                        } else {
                            info!("updating poll interval to {} minutes", minutes);
                            self.settings.poll_interval =
                                Duration::from_secs(u64::from(minutes) * 60);
                            container_ticker = ticker(self.settings.poll_interval);
                            host_ticker = ticker(self.settings.poll_interval);
                        }
                    }

                    Some(SchedulerCommand::Shutdown) => {
                        debug!("received shutdown command");
                        break;
                    }

                    None => {
                        warn!("command channel closed, shutting down");
                        break;
                    }
                },
            }
        }

        info!("scheduler stopped");
    }

    fn flag(&self, task: TaskKind) -> Arc<AtomicBool> {
        self.in_flight
            .get(&task)
            .cloned()
            .unwrap_or_else(|| Arc::new(AtomicBool::new(false)))
    }

    fn spawn_task(&self, task: TaskKind, respond_to: Option<oneshot::Sender<TaskOutcome>>) {
        let poller = self.poller.clone();
        let flag = self.flag(task);

        tokio::spawn(async move {
            let outcome = run_guarded(poller, flag, task).await;
            if let Some(respond_to) = respond_to {
                let _ = respond_to.send(outcome);
            }
        });
    }
}

async fn run_guarded(poller: Arc<FleetPoller>, flag: Arc<AtomicBool>, task: TaskKind) -> TaskOutcome {
    let Some(_guard) = InFlight::try_acquire(&flag) else {
        warn!("{} still running, skipping this tick", task);
        return TaskOutcome::Skipped;
    };

    info!("{} started", task);
    let outcome = execute(&poller, task).await;
    match &outcome {
        TaskOutcome::Failed(msg) => error!("{} failed: {}", task, msg),
        _ => info!("{} finished", task),
    }
    outcome
}

async fn execute(poller: &FleetPoller, task: TaskKind) -> TaskOutcome {
    let result = match task {
        TaskKind::PollContainers => poller.poll_containers().await.map(|_| ()),
        TaskKind::PollHostInfo => poller.poll_host_info().await.map(|_| ()),
        TaskKind::Cleanup => cleanup(poller).await,
    };

    match result {
        Ok(()) => TaskOutcome::Completed,
        Err(e) => TaskOutcome::Failed(e.to_string()),
    }
}

async fn cleanup(poller: &FleetPoller) -> Result<(), StorageError> {
    let store = &poller.context().store;
    let config = store.get_config().await?;
    let report = store.prune_older_than(config.keep_data_for).await?;
    info!(
        "retention ({} days) removed {} samples and {} log entries",
        config.keep_data_for, report.samples, report.logs
    );
    Ok(())
}

/// Handle for controlling the scheduler actor
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Read the stored configuration and spawn the scheduler.
    ///
    /// Fails without spawning anything when the configuration is unusable.
    pub async fn start(poller: Arc<FleetPoller>) -> Result<Self, SchedulerError> {
        let config = poller.context().store.get_config().await?;
        let settings = SchedulerSettings::from_config(&config)?;
        Ok(Self::spawn_with_settings(poller, settings))
    }

    pub fn spawn_with_settings(poller: Arc<FleetPoller>, settings: SchedulerSettings) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        tokio::spawn(Scheduler::new(poller, cmd_rx, settings).run());
        Self { sender: cmd_tx }
    }

    /// Run a task now and wait for its outcome
    pub async fn run_now(&self, task: TaskKind) -> Result<TaskOutcome> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::RunNow {
                task,
                respond_to: tx,
            })
            .await
            .context("failed to send RunNow command")?;

        rx.await.context("failed to receive task outcome")
    }

    pub async fn update_interval(&self, minutes: u32) -> Result<()> {
        self.sender
            .send(SchedulerCommand::UpdateInterval { minutes })
            .await
            .context("failed to send UpdateInterval command")?;
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(SchedulerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }
}
