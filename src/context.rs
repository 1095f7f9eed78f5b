//! Service context shared by every component
//!
//! Built once by the binary (or a test) and cloned into the poller, the
//! scheduler, the gateway sessions and the API state.

use std::sync::Arc;

use crate::engine::{DockerConnector, EngineConnector, EngineResult, EngineSettings};
use crate::plugins::PluginRegistry;
use crate::storage::StorageBackend;

#[derive(Clone)]
pub struct ServiceContext {
    pub store: Arc<dyn StorageBackend>,
    pub engines: Arc<dyn EngineConnector>,
    pub plugins: Arc<PluginRegistry>,
}

impl ServiceContext {
    pub fn new(
        store: Arc<dyn StorageBackend>,
        engines: Arc<dyn EngineConnector>,
        plugins: Arc<PluginRegistry>,
    ) -> Self {
        Self {
            store,
            engines,
            plugins,
        }
    }

    /// Context talking to real engines with an empty plugin registry
    pub fn with_docker(
        store: Arc<dyn StorageBackend>,
        settings: EngineSettings,
    ) -> EngineResult<Self> {
        Ok(Self::new(
            store,
            Arc::new(DockerConnector::new(settings)?),
            Arc::new(PluginRegistry::new()),
        ))
    }
}
