//! API shared state

use std::sync::Arc;

use crate::actors::{poller::FleetPoller, scheduler::SchedulerHandle};
use crate::context::ServiceContext;
use crate::gateway::GatewaySettings;
use crate::ha::HaManager;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    pub ctx: ServiceContext,

    /// Used for live container listings
    pub poller: Arc<FleetPoller>,

    /// Told about interval changes; absent when no scheduler runs
    pub scheduler: Option<SchedulerHandle>,

    /// Receiving side of replication; absent when HA is disabled
    pub ha: Option<Arc<HaManager>>,

    /// Settings of every live telemetry session
    pub gateway: GatewaySettings,
}

impl ApiState {
    pub fn new(poller: Arc<FleetPoller>, gateway: GatewaySettings) -> Self {
        Self {
            ctx: poller.context().clone(),
            poller,
            scheduler: None,
            ha: None,
            gateway,
        }
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerHandle) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_ha(mut self, ha: Arc<HaManager>) -> Self {
        self.ha = Some(ha);
        self
    }
}
