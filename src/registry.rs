//! Machine Registry.
//!
//! Owns the machine state machine. Every status change, whether it comes
//! from `start`, `stop` or a partial `update`, goes through one transition
//! path which validates the move, stamps `last_started_at` and queues the
//! matching usage write.

use crate::error::{LaundryError, Result};
use crate::filter::{MachineFilter, Page, PageRequest};
use crate::machine::{Machine, MachineKey, MachineStatus, MachineUpdate};
use crate::store::MachineStore;
use crate::usage::UsageRecord;
use crate::worker::{UsageDispatcher, UsageEvent};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// What asked for a transition. Explicit start/stop always produce usage
/// events, a plain status update only when the status actually changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Start,
    Stop,
    Update,
}

#[derive(Clone)]
pub struct MachineRegistry {
    machines: Arc<dyn MachineStore>,
    usage: UsageDispatcher,
}

impl MachineRegistry {
    pub fn new(machines: Arc<dyn MachineStore>, usage: UsageDispatcher) -> Self {
        MachineRegistry { machines, usage }
    }

    /// Register a machine. It always starts out idle.
    pub async fn create(&self, mut machine: Machine) -> Result<Machine> {
        machine.validate()?;
        machine.status = MachineStatus::Idle;
        if machine.id.is_none() {
            machine.id = Some(Uuid::new_v4().to_string());
        }

        self.machines.insert_machine(&machine).await?;
        info!(machine = %machine.key(), kind = %machine.machine_type, "machine registered");
        Ok(machine)
    }

    pub async fn get(&self, key: MachineKey) -> Result<Machine> {
        self.machines
            .get_machine(key)
            .await?
            .ok_or_else(|| LaundryError::machine_not_found(key))
    }

    pub async fn find(&self, filter: &MachineFilter, page: PageRequest) -> Result<Page<Machine>> {
        self.machines.find_machines(filter, page).await
    }

    /// Apply a partial update. A status in the update is a transition.
    pub async fn update(&self, key: MachineKey, update: MachineUpdate) -> Result<Machine> {
        if let Some(status) = update.status {
            return self.transition(key, status, &update, Trigger::Update).await;
        }

        let mut machine = self.get(key).await?;
        if update.is_empty() {
            return Ok(machine);
        }

        machine.apply(&update);
        machine.validate()?;
        let machine = self.machines.replace_machine(&machine).await?;
        debug!(machine = %key, "machine updated");
        Ok(machine)
    }

    /// Begin a cycle. Starting a running machine restarts its cycle.
    pub async fn start(&self, key: MachineKey) -> Result<Machine> {
        self.transition(key, MachineStatus::InUse, &MachineUpdate::default(), Trigger::Start)
            .await
    }

    pub async fn stop(&self, key: MachineKey) -> Result<Machine> {
        self.transition(key, MachineStatus::Idle, &MachineUpdate::default(), Trigger::Stop)
            .await
    }

    pub async fn delete(&self, _key: MachineKey) -> Result<()> {
        Err(LaundryError::NotImplemented("machine deletion"))
    }

    async fn transition(
        &self,
        key: MachineKey,
        next: MachineStatus,
        update: &MachineUpdate,
        trigger: Trigger,
    ) -> Result<Machine> {
        let mut machine = self.get(key).await?;
        let from = machine.status;

        if !from.can_transition_to(next) {
            return Err(LaundryError::InvalidTransition { key, from, to: next });
        }

        machine.apply(update);
        machine.validate()?;
        machine.status = next;

        let now = Utc::now();
        let starts = next == MachineStatus::InUse && (from != next || trigger == Trigger::Start);
        let stops = next == MachineStatus::Idle && (from != next || trigger == Trigger::Stop);
        if starts {
            machine.last_started_at = now;
        }

        let machine = self.machines.replace_machine(&machine).await?;

        if starts {
            self.usage
                .dispatch(UsageEvent::Started(UsageRecord::open(&machine, now)));
        }
        if stops {
            self.usage.dispatch(UsageEvent::Stopped { key, stopped_at: now });
        }

        if from != next {
            info!(machine = %key, %from, to = %next, "machine status changed");
        }
        Ok(machine)
    }
}
