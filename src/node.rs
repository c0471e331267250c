// Sensor nodes: one reporting device per floor, kept alive by heartbeats

use crate::error::{LaundryError, Result};
use crate::filter::{NodeFilter, Page, PageRequest};
use crate::store::NodeStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorNode {
    /// There is one node on each floor.
    pub floor: i64,
    /// Local IP address of the node.
    pub ip_addr: String,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl SensorNode {
    pub fn new(floor: i64, ip_addr: impl Into<String>) -> Self {
        SensorNode {
            floor,
            ip_addr: ip_addr.into(),
            updated_at: Utc::now(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_ip(&self.ip_addr)
    }

    /// Seconds since the last heartbeat.
    pub fn silence(&self, now: DateTime<Utc>) -> i64 {
        (now - self.updated_at).num_seconds().max(0)
    }
}

fn validate_ip(ip_addr: &str) -> Result<()> {
    ip_addr
        .parse::<IpAddr>()
        .map(|_| ())
        .map_err(|_| LaundryError::Validation(format!("'{}' is not an IP address", ip_addr)))
}

/// Partial update of a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeUpdate {
    #[serde(default)]
    pub ip_addr: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

// ============================================================================
// NODE REGISTRY
// ============================================================================

pub struct NodeRegistry {
    store: Arc<dyn NodeStore>,
}

impl NodeRegistry {
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        NodeRegistry { store }
    }

    /// Register a node. Fails with `Conflict` if the floor already has one.
    pub async fn create(&self, node: SensorNode) -> Result<SensorNode> {
        node.validate()?;
        self.store.insert_node(&node).await?;
        info!(floor = node.floor, ip_addr = %node.ip_addr, "sensor node registered");
        Ok(node)
    }

    /// Heartbeat: create or replace the node for its floor, stamped now.
    pub async fn upsert(&self, mut node: SensorNode) -> Result<SensorNode> {
        node.validate()?;
        node.updated_at = Utc::now();
        self.store.upsert_node(&node).await?;
        debug!(floor = node.floor, ip_addr = %node.ip_addr, "sensor node heartbeat");
        Ok(node)
    }

    pub async fn find(&self, filter: &NodeFilter, page: PageRequest) -> Result<Page<SensorNode>> {
        self.store.find_nodes(filter, page).await
    }

    pub async fn update(&self, floor: i64, update: NodeUpdate) -> Result<SensorNode> {
        let mut node = self
            .store
            .get_node(floor)
            .await?
            .ok_or_else(|| LaundryError::NotFound(format!("Sensor node at floor {}", floor)))?;

        if let Some(ip_addr) = update.ip_addr {
            validate_ip(&ip_addr)?;
            node.ip_addr = ip_addr;
        }
        node.updated_at = update.updated_at.unwrap_or_else(Utc::now);

        self.store.replace_node(&node).await
    }
}
