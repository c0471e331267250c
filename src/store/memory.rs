// In-memory adapter
//
// Every entity lives in a sharded `DashMap`, so writers on different keys
// never wait on a common lock. Map references are never held across an
// insert into the same map.

use super::{MachineStore, NodeStore, UsageStore};
use crate::error::{LaundryError, Result};
use crate::filter::{
    sort_machines, sort_nodes, sort_usage, Filter, MachineFilter, NodeFilter, Page, PageRequest,
    UsageFilter,
};
use crate::machine::{Machine, MachineKey};
use crate::node::SensorNode;
use crate::usage::UsageRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    machines: DashMap<MachineKey, Machine>,
    usage: DashMap<Uuid, UsageRecord>,
    /// Open record per machine key.
    open_usage: DashMap<MachineKey, Uuid>,
    nodes: DashMap<i64, SensorNode>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn machine_count(&self) -> usize {
        self.machines.len()
    }

    pub fn usage_count(&self) -> usize {
        self.usage.len()
    }
}

#[async_trait]
impl MachineStore for MemoryStore {
    async fn insert_machine(&self, machine: &Machine) -> Result<()> {
        match self.machines.entry(machine.key()) {
            Entry::Occupied(_) => Err(LaundryError::machine_exists(machine.key())),
            Entry::Vacant(slot) => {
                slot.insert(machine.clone());
                Ok(())
            }
        }
    }

    async fn get_machine(&self, key: MachineKey) -> Result<Option<Machine>> {
        Ok(self.machines.get(&key).map(|m| m.value().clone()))
    }

    async fn replace_machine(&self, machine: &Machine) -> Result<Machine> {
        match self.machines.get_mut(&machine.key()) {
            Some(mut current) => {
                *current = machine.clone();
                Ok(machine.clone())
            }
            None => Err(LaundryError::machine_not_found(machine.key())),
        }
    }

    async fn find_machines(
        &self,
        filter: &MachineFilter,
        page: PageRequest,
    ) -> Result<Page<Machine>> {
        let mut matching: Vec<Machine> = self
            .machines
            .iter()
            .filter(|m| filter.matches(m.value()))
            .map(|m| m.value().clone())
            .collect();

        sort_machines(&mut matching);
        Ok(Page::slice(matching, page))
    }
}

#[async_trait]
impl UsageStore for MemoryStore {
    async fn append_usage(&self, record: &UsageRecord) -> Result<bool> {
        match self.usage.entry(record.id) {
            Entry::Occupied(_) => return Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
            }
        }

        if record.is_open() {
            self.open_usage.insert(record.key(), record.id);
        }
        Ok(true)
    }

    async fn latest_open_usage(&self, key: MachineKey) -> Result<Option<UsageRecord>> {
        let id = match self.open_usage.get(&key) {
            Some(id) => *id,
            None => return Ok(None),
        };

        Ok(self
            .usage
            .get(&id)
            .filter(|r| r.is_open())
            .map(|r| r.value().clone()))
    }

    async fn close_usage(
        &self,
        id: Uuid,
        stopped_at: DateTime<Utc>,
    ) -> Result<Option<UsageRecord>> {
        let closed = match self.usage.get_mut(&id) {
            Some(mut record) if record.is_open() => {
                record.stopped_at = Some(stopped_at);
                record.value().clone()
            }
            _ => return Ok(None),
        };

        self.open_usage.remove_if(&closed.key(), |_, open| *open == id);
        Ok(Some(closed))
    }

    async fn find_usage(
        &self,
        filter: &UsageFilter,
        page: PageRequest,
    ) -> Result<Page<UsageRecord>> {
        let mut matching: Vec<UsageRecord> = self
            .usage
            .iter()
            .filter(|r| filter.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();

        sort_usage(&mut matching);
        Ok(Page::slice(matching, page))
    }
}

#[async_trait]
impl NodeStore for MemoryStore {
    async fn insert_node(&self, node: &SensorNode) -> Result<()> {
        match self.nodes.entry(node.floor) {
            Entry::Occupied(_) => Err(LaundryError::Conflict(format!(
                "Sensor node at floor {}",
                node.floor
            ))),
            Entry::Vacant(slot) => {
                slot.insert(node.clone());
                Ok(())
            }
        }
    }

    async fn upsert_node(&self, node: &SensorNode) -> Result<()> {
        self.nodes.insert(node.floor, node.clone());
        Ok(())
    }

    async fn get_node(&self, floor: i64) -> Result<Option<SensorNode>> {
        Ok(self.nodes.get(&floor).map(|n| n.value().clone()))
    }

    async fn replace_node(&self, node: &SensorNode) -> Result<SensorNode> {
        match self.nodes.get_mut(&node.floor) {
            Some(mut current) => {
                *current = node.clone();
                Ok(node.clone())
            }
            None => Err(LaundryError::NotFound(format!("Sensor node at floor {}", node.floor))),
        }
    }

    async fn find_nodes(&self, filter: &NodeFilter, page: PageRequest) -> Result<Page<SensorNode>> {
        let mut matching: Vec<SensorNode> = self
            .nodes
            .iter()
            .filter(|n| filter.matches(n.value()))
            .map(|n| n.value().clone())
            .collect();

        sort_nodes(&mut matching);
        Ok(Page::slice(matching, page))
    }
}
