//! Storage adapters.
//!
//! The registry, the usage log and the node registry only talk to these
//! traits. Two adapters implement all of them: [`MemoryStore`] (sharded
//! concurrent maps) and [`SqliteStore`] (rusqlite, WAL). The adapter is
//! picked from [`StorageConfig`] by [`open`].
//!
//! Atomicity contract: `insert_*` is insert-if-absent and fails with
//! `Conflict`; `replace_*` writes a whole entity at an existing key and fails
//! with `NotFound`. There is no optimistic-concurrency token, so concurrent
//! read-modify-write on one key is last-writer-wins.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{setup_database, SqliteStore};

use crate::config::{StorageBackend, StorageConfig};
use crate::error::Result;
use crate::filter::{MachineFilter, NodeFilter, Page, PageRequest, UsageFilter};
use crate::machine::{Machine, MachineKey};
use crate::node::SensorNode;
use crate::usage::UsageRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[async_trait]
pub trait MachineStore: Send + Sync {
    /// Insert a new machine. `Conflict` if the key is taken.
    async fn insert_machine(&self, machine: &Machine) -> Result<()>;

    async fn get_machine(&self, key: MachineKey) -> Result<Option<Machine>>;

    /// Overwrite the machine stored at `machine.key()`. `NotFound` if absent.
    async fn replace_machine(&self, machine: &Machine) -> Result<Machine>;

    /// Matching machines ordered by `(floor, pos)`.
    async fn find_machines(&self, filter: &MachineFilter, page: PageRequest)
        -> Result<Page<Machine>>;
}

#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Append a record. Returns `false` when a record with the same id is
    /// already stored, which makes redelivered appends harmless.
    async fn append_usage(&self, record: &UsageRecord) -> Result<bool>;

    /// Most recent record of this machine that has no `stopped_at`.
    async fn latest_open_usage(&self, key: MachineKey) -> Result<Option<UsageRecord>>;

    /// Fill `stopped_at` of a record that is still open. Returns `None` if
    /// the record is unknown or was closed in the meantime.
    async fn close_usage(&self, id: Uuid, stopped_at: DateTime<Utc>)
        -> Result<Option<UsageRecord>>;

    /// Matching records ordered by `(started_at, id)`.
    async fn find_usage(&self, filter: &UsageFilter, page: PageRequest)
        -> Result<Page<UsageRecord>>;
}

#[async_trait]
pub trait NodeStore: Send + Sync {
    async fn insert_node(&self, node: &SensorNode) -> Result<()>;

    async fn upsert_node(&self, node: &SensorNode) -> Result<()>;

    async fn get_node(&self, floor: i64) -> Result<Option<SensorNode>>;

    async fn replace_node(&self, node: &SensorNode) -> Result<SensorNode>;

    async fn find_nodes(&self, filter: &NodeFilter, page: PageRequest) -> Result<Page<SensorNode>>;
}

/// One backend seen through each of the storage traits.
#[derive(Clone)]
pub struct Stores {
    pub machines: Arc<dyn MachineStore>,
    pub usage: Arc<dyn UsageStore>,
    pub nodes: Arc<dyn NodeStore>,
}

impl Stores {
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: MachineStore + UsageStore + NodeStore + 'static,
    {
        Stores {
            machines: backend.clone(),
            usage: backend.clone(),
            nodes: backend,
        }
    }

    pub fn in_memory() -> Self {
        Stores::from_backend(Arc::new(MemoryStore::new()))
    }
}

/// Open the configured backend.
pub fn open(config: &StorageConfig) -> Result<Stores> {
    match config.backend {
        StorageBackend::Memory => {
            info!("using in-memory storage");
            Ok(Stores::in_memory())
        }
        StorageBackend::Sqlite => {
            let store = SqliteStore::open(&config.path)?;
            info!(path = %config.path.display(), "using sqlite storage");
            Ok(Stores::from_backend(Arc::new(store)))
        }
    }
}
