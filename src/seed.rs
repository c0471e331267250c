// Machine seeding: CSV import and the default building layout

use crate::error::{LaundryError, Result};
use crate::machine::{Machine, MachineType};
use crate::registry::MachineRegistry;
use anyhow::Context;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Floors that have a laundry room.
pub const LAUNDRY_FLOORS: [i64; 5] = [5, 8, 11, 14, 17];
pub const WASHER_MINUTES: u64 = 30;
pub const DRYER_MINUTES: u64 = 40;

/// One CSV line: `floor,pos,type,duration_minutes`.
#[derive(Debug, Deserialize)]
struct SeedRow {
    floor: i64,
    #[serde(alias = "position")]
    pos: i64,
    #[serde(rename = "type")]
    machine_type: String,
    duration_minutes: u64,
}

impl SeedRow {
    fn into_machine(self) -> Result<Machine> {
        let secs = self.duration_minutes.checked_mul(60).ok_or_else(|| {
            LaundryError::Validation(format!("{} minutes is too long", self.duration_minutes))
        })?;
        let machine = Machine::new(
            self.floor,
            self.pos,
            self.machine_type.parse()?,
            Duration::from_secs(secs),
        );
        machine.validate()?;
        Ok(machine)
    }
}

pub fn load_csv(csv_path: &Path) -> anyhow::Result<Vec<Machine>> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("Failed to open CSV file {}", csv_path.display()))?;
    read_csv(file)
}

pub fn read_csv(reader: impl Read) -> anyhow::Result<Vec<Machine>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut machines = Vec::new();

    for (line, result) in rdr.deserialize::<SeedRow>().enumerate() {
        // Header is line 1
        let row = result.with_context(|| format!("Failed to parse machine on line {}", line + 2))?;
        let machine = row
            .into_machine()
            .with_context(|| format!("Invalid machine on line {}", line + 2))?;
        machines.push(machine);
    }

    Ok(machines)
}

/// Two washers (positions 0 and 1) and two dryers (2 and 3) per laundry floor.
pub fn default_layout() -> Vec<Machine> {
    let washer = Duration::from_secs(WASHER_MINUTES * 60);
    let dryer = Duration::from_secs(DRYER_MINUTES * 60);

    LAUNDRY_FLOORS
        .iter()
        .flat_map(|&floor| {
            [
                Machine::new(floor, 0, MachineType::Washer, washer),
                Machine::new(floor, 1, MachineType::Washer, washer),
                Machine::new(floor, 2, MachineType::Dryer, dryer),
                Machine::new(floor, 3, MachineType::Dryer, dryer),
            ]
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub inserted: usize,
    pub skipped: usize,
}

/// Register machines, skipping keys that already exist.
pub async fn seed_machines(registry: &MachineRegistry, machines: Vec<Machine>) -> Result<SeedReport> {
    let mut report = SeedReport::default();

    for machine in machines {
        match registry.create(machine).await {
            Ok(_) => report.inserted += 1,
            Err(LaundryError::Conflict(_)) => report.skipped += 1,
            Err(e) => return Err(e),
        }
    }

    info!(inserted = report.inserted, skipped = report.skipped, "seeded machines");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UsageWorkerConfig;
    use crate::filter::{MachineFilter, PageRequest};
    use crate::store::MemoryStore;
    use crate::usage_log::UsageLog;
    use crate::worker::spawn_usage_worker;
    use std::sync::Arc;

    #[test]
    fn test_default_layout() {
        let layout = default_layout();

        assert_eq!(layout.len(), 20);
        let floor_14: Vec<_> = layout.iter().filter(|m| m.floor == 14).collect();
        assert_eq!(floor_14[0].machine_type, MachineType::Washer);
        assert_eq!(floor_14[3].machine_type, MachineType::Dryer);
        assert_eq!(floor_14[3].cycle_duration, Duration::from_secs(2400));
    }

    #[test]
    fn test_read_csv() {
        let data = "floor,pos,type,duration_minutes\n14, 0, Washer, 30\n14,2,dryer,45\n";
        let machines = read_csv(data.as_bytes()).unwrap();

        assert_eq!(machines.len(), 2);
        assert_eq!(machines[0].machine_type, MachineType::Washer);
        assert_eq!(machines[1].cycle_duration, Duration::from_secs(45 * 60));
    }

    #[test]
    fn test_read_csv_reports_bad_line() {
        let data = "floor,pos,type,duration_minutes\n14,0,washer,30\n14,1,boiler,30\n";
        let err = read_csv(data.as_bytes()).unwrap_err();

        assert!(format!("{:#}", err).contains("line 3"));
    }

    #[test]
    fn test_read_csv_rejects_overlong_cycles() {
        let overflow = format!("floor,pos,type,duration_minutes\n14,0,washer,{}\n", u64::MAX);
        let err = read_csv(overflow.as_bytes()).unwrap_err();
        assert!(format!("{:#}", err).contains("line 2"));

        let too_long = "floor,pos,type,duration_minutes\n14,0,washer,1441\n";
        assert!(read_csv(too_long.as_bytes()).is_err());
    }

    #[tokio::test]
    async fn test_seeding_twice_skips_existing() {
        let store = Arc::new(MemoryStore::new());
        let (usage, _handle) = spawn_usage_worker(
            Arc::new(UsageLog::new(store.clone())),
            UsageWorkerConfig::default(),
        );
        let registry = MachineRegistry::new(store, usage);

        let first = seed_machines(&registry, default_layout()).await.unwrap();
        let second = seed_machines(&registry, default_layout()).await.unwrap();

        assert_eq!(first, SeedReport { inserted: 20, skipped: 0 });
        assert_eq!(second, SeedReport { inserted: 0, skipped: 20 });

        let page = registry
            .find(&MachineFilter::floor(17), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.len(), 4);
    }
}
