// Notification adapter: per-floor status summaries for chat bots and the board

use crate::error::Result;
use crate::filter::{MachineFilter, PageRequest, MAX_PAGE_SIZE};
use crate::machine::{Machine, MachineKey, MachineStatus, MachineType};
use crate::registry::MachineRegistry;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MachineSummary {
    pub key: MachineKey,
    /// Human label such as "Washer 2", numbered per type within a floor.
    pub label: String,
    pub machine_type: MachineType,
    pub status: MachineStatus,
    /// Whole minutes left in the current cycle, rounded up.
    pub minutes_left: u64,
}

impl MachineSummary {
    pub fn is_available(&self) -> bool {
        self.status == MachineStatus::Idle
    }

    pub fn status_text(&self) -> String {
        match self.status {
            MachineStatus::Idle => "available".to_string(),
            MachineStatus::InUse if self.minutes_left > 0 => {
                format!("in use ({} min left)", self.minutes_left)
            }
            MachineStatus::InUse => "in use (almost done)".to_string(),
            MachineStatus::Finishing => "finishing, ready for pickup".to_string(),
            MachineStatus::Error => "out of order".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FloorSummary {
    pub floor: i64,
    pub machines: Vec<MachineSummary>,
    pub generated_at: DateTime<Utc>,
}

impl FloorSummary {
    pub fn available(&self, machine_type: MachineType) -> usize {
        self.machines
            .iter()
            .filter(|m| m.machine_type == machine_type && m.is_available())
            .count()
    }

    pub fn render_text(&self) -> String {
        let mut text = format!("Level {} status:\n", self.floor);
        for machine in &self.machines {
            let _ = writeln!(text, "{}: {}", machine.label, machine.status_text());
        }
        let _ = writeln!(
            text,
            "\n{} washer(s) and {} dryer(s) available",
            self.available(MachineType::Washer),
            self.available(MachineType::Dryer)
        );
        let _ = write!(
            text,
            "Last updated: {}",
            self.generated_at.format("%d %B %Y %H:%M:%S")
        );
        text
    }
}

fn minutes_left(machine: &Machine, now: DateTime<Utc>) -> u64 {
    let secs = machine.time_left(now).as_secs();
    (secs + 59) / 60
}

/// Group machines by floor. Machines are labelled in position order.
pub fn summarize(machines: &[Machine], now: DateTime<Utc>) -> Vec<FloorSummary> {
    let mut floors: BTreeMap<i64, Vec<&Machine>> = BTreeMap::new();
    for machine in machines {
        floors.entry(machine.floor).or_default().push(machine);
    }

    floors
        .into_iter()
        .map(|(floor, mut on_floor)| {
            on_floor.sort_by_key(|m| m.pos);

            let mut counters: BTreeMap<MachineType, usize> = BTreeMap::new();
            let machines = on_floor
                .into_iter()
                .map(|m| {
                    let n = counters.entry(m.machine_type).or_insert(0);
                    *n += 1;
                    MachineSummary {
                        key: m.key(),
                        label: format!("{} {}", m.machine_type.label(), n),
                        machine_type: m.machine_type,
                        status: m.status,
                        minutes_left: minutes_left(m, now),
                    }
                })
                .collect();

            FloorSummary {
                floor,
                machines,
                generated_at: now,
            }
        })
        .collect()
}

/// Every machine matching `filter`, walking all pages.
pub async fn collect_all(registry: &MachineRegistry, filter: &MachineFilter) -> Result<Vec<Machine>> {
    let mut machines = Vec::new();
    let mut offset = 0;

    loop {
        let page = registry
            .find(filter, PageRequest::new(MAX_PAGE_SIZE, offset))
            .await?;
        let more = page.next_offset;
        machines.extend(page.items);

        match more {
            Some(next) => offset = next,
            None => return Ok(machines),
        }
    }
}

/// Current summaries for the machines matching `filter`.
pub async fn snapshot(registry: &MachineRegistry, filter: &MachineFilter) -> Result<Vec<FloorSummary>> {
    let machines = collect_all(registry, filter).await?;
    Ok(summarize(&machines, Utc::now()))
}
