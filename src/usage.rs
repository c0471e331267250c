// Usage records: one start/stop interval of machine activity

use crate::machine::{Machine, MachineKey, MachineType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One interval of machine activity.
///
/// Floor, position and type are copied from the machine when the record is
/// written; they never change after creation so the snapshot stays valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: Uuid,
    pub machine_id: String,
    pub floor: i64,
    pub pos: i64,
    #[serde(rename = "type")]
    pub machine_type: MachineType,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
}

impl UsageRecord {
    /// Open a new record for `machine`, started at `started_at`.
    pub fn open(machine: &Machine, started_at: DateTime<Utc>) -> Self {
        UsageRecord {
            id: Uuid::new_v4(),
            machine_id: machine.machine_id(),
            floor: machine.floor,
            pos: machine.pos,
            machine_type: machine.machine_type,
            started_at,
            stopped_at: None,
        }
    }

    pub fn key(&self) -> MachineKey {
        MachineKey::new(self.floor, self.pos)
    }

    pub fn is_open(&self) -> bool {
        self.stopped_at.is_none()
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.stopped_at.map(|stopped| stopped - self.started_at)
    }
}

/// Result of finalizing the open record of a machine.
#[derive(Debug, Clone, PartialEq)]
pub enum StopOutcome {
    Finalized(UsageRecord),
    /// Nothing to close: double stop, a stop racing a sensor stop, or a
    /// start that was never recorded.
    NoOpenRecord(MachineKey),
}

impl StopOutcome {
    pub fn record(&self) -> Option<&UsageRecord> {
        match self {
            StopOutcome::Finalized(record) => Some(record),
            StopOutcome::NoOpenRecord(_) => None,
        }
    }
}
