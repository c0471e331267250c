// Wiring: storage, usage worker, registries and sensor ingest

use crate::config::Config;
use crate::node::NodeRegistry;
use crate::registry::MachineRegistry;
use crate::sensor::SensorIngest;
use crate::store::{self, Stores};
use crate::usage_log::UsageLog;
use crate::worker::{spawn_usage_worker, UsageDispatcher};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Everything a front end needs, built on one storage backend.
pub struct LaundryService {
    pub registry: MachineRegistry,
    pub usage: Arc<UsageLog>,
    pub nodes: Arc<NodeRegistry>,
    pub sensors: Arc<SensorIngest>,
    dispatcher: UsageDispatcher,
    worker: JoinHandle<()>,
}

impl LaundryService {
    /// Spawn the usage worker on the current tokio runtime and wire the
    /// components around `stores`.
    pub fn start(stores: Stores, config: &Config) -> Self {
        let usage = Arc::new(UsageLog::new(stores.usage));
        let (dispatcher, worker) = spawn_usage_worker(usage.clone(), config.usage_worker);
        let registry = MachineRegistry::new(stores.machines, dispatcher.clone());
        let sensors = Arc::new(SensorIngest::new(registry.clone(), config.sensor));

        LaundryService {
            registry,
            usage,
            nodes: Arc::new(NodeRegistry::new(stores.nodes)),
            sensors,
            dispatcher,
            worker,
        }
    }

    /// Open the configured storage backend, then start.
    pub fn open(config: &Config) -> crate::error::Result<Self> {
        let stores = store::open(&config.storage)?;
        Ok(Self::start(stores, config))
    }

    pub fn in_memory(config: &Config) -> Self {
        Self::start(Stores::in_memory(), config)
    }

    /// Wait for queued usage writes to be handled.
    pub async fn flush(&self) {
        self.dispatcher.flush().await;
    }

    /// Drain the usage queue and stop the worker.
    pub async fn shutdown(self) {
        self.dispatcher.shutdown();
        if let Err(err) = self.worker.await {
            warn!(error = %err, "usage worker ended abnormally");
        }
        info!("laundry service stopped");
    }
}
