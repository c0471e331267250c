// Sensor adapter
//
// Turns raw on/off samples from a machine's indicator into status changes.
// `SensorTracker` is a pure state machine driven by explicit timestamps;
// `SensorIngest` keeps one tracker per machine and forwards the changes it
// emits to the registry.

use crate::config::SensorConfig;
use crate::error::Result;
use crate::machine::{Machine, MachineKey, MachineStatus, MachineUpdate};
use crate::registry::MachineRegistry;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

// ============================================================================
// TRACKER
// ============================================================================

/// Debounced indicator state of one machine.
///
/// - held active for `hold` → `in_use`
/// - released, then active again within `hold` → `finishing`
/// - released and quiet for `hold` → `idle`
/// - `in_use` or `finishing` for longer than `timeout` → `error`
#[derive(Debug, Clone)]
pub struct SensorTracker {
    hold: Duration,
    timeout: Duration,
    state: MachineStatus,
    state_since: DateTime<Utc>,
    active: bool,
    active_since: Option<DateTime<Utc>>,
    /// The current activation already counted as a hold.
    held: bool,
    released_at: Option<DateTime<Utc>>,
}

impl SensorTracker {
    pub fn new(config: &SensorConfig, state: MachineStatus, at: DateTime<Utc>) -> Self {
        SensorTracker {
            hold: config.hold(),
            timeout: config.timeout(),
            state,
            state_since: at,
            active: false,
            active_since: None,
            held: false,
            released_at: None,
        }
    }

    pub fn state(&self) -> MachineStatus {
        self.state
    }

    /// Feed one sample. Returns the new state when it changed.
    pub fn observe(&mut self, active: bool, at: DateTime<Utc>) -> Option<MachineStatus> {
        let mut changed = None;

        if active && !self.active {
            self.active_since = Some(at);
            self.held = false;

            if let Some(released) = self.released_at.take() {
                if elapsed(released, at) < self.hold && self.state.is_active() {
                    changed = self.set(MachineStatus::Finishing, at);
                }
            }
        } else if !active && self.active {
            self.active_since = None;
            if self.state != MachineStatus::Idle {
                self.released_at = Some(at);
            }
        }
        self.active = active;

        self.tick(at).or(changed)
    }

    /// Advance time without a new sample.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<MachineStatus> {
        let mut changed = None;

        if let Some(since) = self.active_since {
            if !self.held && elapsed(since, now) >= self.hold {
                self.held = true;
                if self.state != MachineStatus::Error {
                    changed = self.set(MachineStatus::InUse, now).or(changed);
                }
            }
        }

        if let Some(released) = self.released_at {
            if !self.active && elapsed(released, now) >= self.hold {
                self.released_at = None;
                changed = self.set(MachineStatus::Idle, now).or(changed);
            }
        }

        if self.state.is_active() && elapsed(self.state_since, now) > self.timeout {
            changed = self.set(MachineStatus::Error, now).or(changed);
        }

        changed
    }

    /// Force a state, e.g. after an operator action.
    pub fn set(&mut self, state: MachineStatus, at: DateTime<Utc>) -> Option<MachineStatus> {
        if self.state == state {
            return None;
        }
        self.state = state;
        self.state_since = at;
        Some(state)
    }
}

// ============================================================================
// INGEST
// ============================================================================

/// One raw sample as reported by a sensor node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorSample {
    pub floor: i64,
    #[serde(alias = "position")]
    pub pos: i64,
    pub active: bool,
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

impl SensorSample {
    pub fn key(&self) -> MachineKey {
        MachineKey::new(self.floor, self.pos)
    }
}

pub struct SensorIngest {
    registry: MachineRegistry,
    config: SensorConfig,
    trackers: DashMap<MachineKey, SensorTracker>,
}

impl SensorIngest {
    pub fn new(registry: MachineRegistry, config: SensorConfig) -> Self {
        SensorIngest {
            registry,
            config,
            trackers: DashMap::new(),
        }
    }

    /// Forward a detected status to the registry.
    pub async fn apply(&self, key: MachineKey, status: MachineStatus) -> Result<Machine> {
        match status {
            MachineStatus::InUse => self.registry.start(key).await,
            MachineStatus::Idle => self.registry.stop(key).await,
            other => self.registry.update(key, MachineUpdate::status(other)).await,
        }
    }

    /// Feed a sample; returns the machine when its status changed.
    pub async fn report(&self, sample: SensorSample) -> Result<Option<Machine>> {
        let key = sample.key();
        let at = sample.at.unwrap_or_else(Utc::now);

        if !self.trackers.contains_key(&key) {
            let machine = self.registry.get(key).await?;
            self.trackers
                .entry(key)
                .or_insert_with(|| SensorTracker::new(&self.config, machine.status, at));
        }

        // The map guard is released before awaiting the registry
        let changed = match self.trackers.get_mut(&key) {
            Some(mut tracker) => tracker.observe(sample.active, at),
            None => None,
        };

        match changed {
            Some(status) => {
                debug!(machine = %key, %status, "sensor detected status change");
                self.apply(key, status).await.map(Some)
            }
            None => Ok(None),
        }
    }

    /// Advance every tracker to `now` and apply the resulting changes.
    /// Failures are logged; one machine never blocks the others.
    pub async fn tick_all(&self, now: DateTime<Utc>) -> usize {
        let changes: Vec<(MachineKey, MachineStatus)> = self
            .trackers
            .iter_mut()
            .filter_map(|mut entry| {
                let key = *entry.key();
                entry.value_mut().tick(now).map(|status| (key, status))
            })
            .collect();

        let mut applied = 0;
        for (key, status) in changes {
            match self.apply(key, status).await {
                Ok(_) => applied += 1,
                Err(err) => warn!(machine = %key, %status, error = %err, "sensor status not applied"),
            }
        }
        applied
    }

    pub fn tracked(&self) -> usize {
        self.trackers.len()
    }
}
