// Laundry Tracker - Core Library
// Exposes all modules for use in the CLI, the API server and tests

pub mod config;
pub mod error;
pub mod filter;
pub mod machine;
pub mod node;
pub mod notify;
pub mod registry;
pub mod seed;
pub mod sensor;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod usage;
pub mod usage_log;
pub mod worker;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use config::{Config, QueryConfig, SensorConfig, StorageBackend, StorageConfig, UsageWorkerConfig};
pub use error::{LaundryError, Result};
pub use filter::{
    Filter, MachineFilter, NodeFilter, Page, PageRequest, UsageFilter, DEFAULT_PAGE_SIZE,
    MAX_PAGE_SIZE,
};
pub use machine::{Machine, MachineKey, MachineStatus, MachineType, MachineUpdate};
pub use node::{NodeRegistry, NodeUpdate, SensorNode};
pub use notify::{FloorSummary, MachineSummary};
pub use registry::MachineRegistry;
pub use seed::{default_layout, load_csv, seed_machines, SeedReport};
pub use sensor::{SensorIngest, SensorSample, SensorTracker};
pub use service::LaundryService;
pub use store::{MachineStore, MemoryStore, NodeStore, SqliteStore, Stores, UsageStore};
pub use usage::{StopOutcome, UsageRecord};
pub use usage_log::UsageLog;
pub use worker::{spawn_usage_worker, UsageDispatcher, UsageEvent};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
