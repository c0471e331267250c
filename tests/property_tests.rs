//! Property-based tests for the filter engine and the status state machine.

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use laundry_tracker::{
    Filter, Machine, MachineFilter, MachineStatus, MachineStore, MachineType, MemoryStore,
    PageRequest, SensorConfig, SensorTracker, SqliteStore, UsageFilter, UsageRecord, UsageStore,
};
use proptest::prelude::*;
use std::time::Duration;

prop_compose! {
    fn arbitrary_status()(variant in 0..4u8) -> MachineStatus {
        MachineStatus::ALL[variant as usize]
    }
}

prop_compose! {
    fn arbitrary_type()(washer in any::<bool>()) -> MachineType {
        if washer { MachineType::Washer } else { MachineType::Dryer }
    }
}

prop_compose! {
    fn arbitrary_machine()(
        floor in 0..6i64,
        pos in 0..4i64,
        machine_type in arbitrary_type(),
        status in arbitrary_status(),
        started_minute in 0..600i64,
    ) -> Machine {
        let mut m = Machine::new(floor, pos, machine_type, Duration::from_secs(1800));
        m.status = status;
        m.last_started_at = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap()
            + ChronoDuration::minutes(started_minute);
        m
    }
}

prop_compose! {
    fn arbitrary_filter()(
        floor in proptest::option::of(0..6i64),
        pos in proptest::option::of(0..4i64),
        machine_type in proptest::option::of(arbitrary_type()),
        status in proptest::option::of(arbitrary_status()),
        after in proptest::option::of(0..600i64),
    ) -> MachineFilter {
        MachineFilter {
            floor,
            pos,
            machine_type,
            status,
            last_started_after: after.map(|m| {
                Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap() + ChronoDuration::minutes(m)
            }),
            ..Default::default()
        }
    }
}

fn morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap()
}

prop_compose! {
    // Sub-second offsets so bounds fall between and exactly on stored times
    fn arbitrary_usage()(
        machine in arbitrary_machine(),
        started_ms in 0..7_200_000i64,
        extra_nanos in 0..1_000_000i64,
        closed_after_ms in proptest::option::of(1..3_600_000i64),
    ) -> UsageRecord {
        let started_at = morning()
            + ChronoDuration::milliseconds(started_ms)
            + ChronoDuration::nanoseconds(extra_nanos);
        let mut record = UsageRecord::open(&machine, started_at);
        record.stopped_at = closed_after_ms.map(|ms| started_at + ChronoDuration::milliseconds(ms));
        record
    }
}

prop_compose! {
    fn arbitrary_usage_filter()(
        floor in proptest::option::of(0..6i64),
        machine_type in proptest::option::of(arbitrary_type()),
        lower_ms in proptest::option::of(0..7_200_000i64),
        upper_ms in proptest::option::of(0..7_200_000i64),
    ) -> UsageFilter {
        UsageFilter {
            floor,
            machine_type,
            time_lower: lower_ms.map(|ms| morning() + ChronoDuration::milliseconds(ms)),
            time_upper: upper_ms.map(|ms| morning() + ChronoDuration::milliseconds(ms)),
            ..Default::default()
        }
    }
}

fn keys(machines: &[Machine]) -> Vec<(i64, i64)> {
    machines.iter().map(|m| (m.floor, m.pos)).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn adapters_agree_on_every_filter(
        machines in proptest::collection::vec(arbitrary_machine(), 0..24),
        filter in arbitrary_filter(),
        limit in 1..10usize,
        offset in 0..12usize,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let (memory_page, sqlite_page) = rt.block_on(async {
            let memory = MemoryStore::new();
            let sqlite = SqliteStore::open_in_memory().unwrap();
            for m in &machines {
                // Duplicate keys fail the same way on both adapters
                let _ = memory.insert_machine(m).await;
                let _ = sqlite.insert_machine(m).await;
            }

            let page = PageRequest::new(limit, offset);
            (
                memory.find_machines(&filter, page).await.unwrap(),
                sqlite.find_machines(&filter, page).await.unwrap(),
            )
        });

        prop_assert_eq!(keys(&memory_page.items), keys(&sqlite_page.items));
        prop_assert_eq!(memory_page.has_more, sqlite_page.has_more);
        prop_assert_eq!(memory_page.next_offset, sqlite_page.next_offset);
    }

    #[test]
    fn found_machines_match_and_are_ordered(
        machines in proptest::collection::vec(arbitrary_machine(), 0..24),
        filter in arbitrary_filter(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let page = rt.block_on(async {
            let memory = MemoryStore::new();
            for m in &machines {
                let _ = memory.insert_machine(m).await;
            }
            memory.find_machines(&filter, PageRequest::new(100, 0)).await.unwrap()
        });

        prop_assert!(page.items.iter().all(|m| filter.matches(m)));
        let found = keys(&page.items);
        let mut sorted = found.clone();
        sorted.sort();
        prop_assert_eq!(found, sorted);
    }

    #[test]
    fn adapters_agree_on_usage_time_bounds(
        mut records in proptest::collection::vec(arbitrary_usage(), 0..24),
        filter in arbitrary_usage_filter(),
        pick_bound in any::<prop::sample::Index>(),
    ) {
        // One upper bound sits exactly on a stored start time
        let mut filter = filter;
        if !records.is_empty() && filter.time_upper.is_none() {
            filter.time_upper = Some(records[pick_bound.index(records.len())].started_at);
        }

        let rt = tokio::runtime::Runtime::new().unwrap();
        let (memory_page, sqlite_page) = rt.block_on(async {
            let memory = MemoryStore::new();
            let sqlite = SqliteStore::open_in_memory().unwrap();
            for r in &records {
                memory.append_usage(r).await.unwrap();
                sqlite.append_usage(r).await.unwrap();
            }

            let page = PageRequest::new(100, 0);
            (
                memory.find_usage(&filter, page).await.unwrap(),
                sqlite.find_usage(&filter, page).await.unwrap(),
            )
        });

        prop_assert_eq!(&memory_page.items, &sqlite_page.items);
        prop_assert!(memory_page.items.iter().all(|r| filter.matches(r)));

        records.retain(|r| {
            filter.floor.map_or(true, |f| r.floor == f)
                && filter.machine_type.map_or(true, |t| r.machine_type == t)
                && filter.time_lower.map_or(true, |t| r.started_at >= t)
                && filter.time_upper.map_or(true, |t| r.started_at <= t)
        });
        prop_assert_eq!(memory_page.len(), records.len());
    }

    #[test]
    fn truncation_is_always_signaled(total in 0..30usize, limit in 1..10usize) {
        let items: Vec<usize> = (0..total).collect();
        let page = laundry_tracker::Page::slice(items, PageRequest::new(limit, 0));

        prop_assert_eq!(page.has_more, total > limit);
        prop_assert_eq!(page.len(), total.min(limit));
    }

    #[test]
    fn sensor_only_emits_allowed_transitions(
        samples in proptest::collection::vec((any::<bool>(), 0..5000i64), 1..60),
    ) {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let mut tracker = SensorTracker::new(&SensorConfig::default(), MachineStatus::Idle, t0);
        let mut at = t0;

        for (active, step_ms) in samples {
            at = at + ChronoDuration::milliseconds(step_ms);
            let before = tracker.state();
            if let Some(after) = tracker.observe(active, at) {
                prop_assert!(before.can_transition_to(after), "{} -> {}", before, after);
            }

            let before = tracker.state();
            if let Some(after) = tracker.tick(at + ChronoDuration::seconds(4000)) {
                prop_assert!(before.can_transition_to(after), "{} -> {}", before, after);
            }
        }
    }

    #[test]
    fn same_state_is_always_allowed(status in arbitrary_status()) {
        prop_assert!(status.can_transition_to(status));
        prop_assert!(status.can_transition_to(MachineStatus::Idle));
    }
}
