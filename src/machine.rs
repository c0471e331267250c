// Machine entity, its location key and the status state machine

use crate::error::{LaundryError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// MACHINE TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineType {
    Washer,
    Dryer,
}

impl MachineType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineType::Washer => "washer",
            MachineType::Dryer => "dryer",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MachineType::Washer => "Washer",
            MachineType::Dryer => "Dryer",
        }
    }
}

impl fmt::Display for MachineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MachineType {
    type Err = LaundryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "washer" => Ok(MachineType::Washer),
            "dryer" => Ok(MachineType::Dryer),
            other => Err(LaundryError::Validation(format!(
                "unknown machine type '{}'",
                other
            ))),
        }
    }
}

// ============================================================================
// MACHINE STATUS
// ============================================================================

/// Lifecycle of a machine:
/// `idle -> in_use -> {finishing, error} -> idle`.
///
/// There is no terminal state; machines cycle indefinitely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MachineStatus {
    #[default]
    Idle,
    InUse,
    Finishing,
    Error,
}

impl MachineStatus {
    pub const ALL: [MachineStatus; 4] = [
        MachineStatus::Idle,
        MachineStatus::InUse,
        MachineStatus::Finishing,
        MachineStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MachineStatus::Idle => "idle",
            MachineStatus::InUse => "in_use",
            MachineStatus::Finishing => "finishing",
            MachineStatus::Error => "error",
        }
    }

    /// Whether a machine in `self` may move to `next`.
    ///
    /// Staying in the same state is always allowed. `in_use -> in_use` is a
    /// restart of the cycle. A machine in `error` only leaves through an
    /// operator stop.
    pub fn can_transition_to(&self, next: MachineStatus) -> bool {
        use MachineStatus::*;

        if *self == next {
            return true;
        }

        match (self, next) {
            (_, Idle) => true,
            (Idle, InUse) => true,
            (InUse, Finishing) | (InUse, Error) => true,
            (Finishing, InUse) | (Finishing, Error) => true,
            _ => false,
        }
    }

    /// Active machines are running or holding a finished load.
    pub fn is_active(&self) -> bool {
        matches!(self, MachineStatus::InUse | MachineStatus::Finishing)
    }
}

impl fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MachineStatus {
    type Err = LaundryError;

    fn from_str(s: &str) -> Result<Self> {
        MachineStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| LaundryError::Validation(format!("unknown machine status '{}'", s)))
    }
}

// ============================================================================
// MACHINE KEY
// ============================================================================

/// Physical location of a machine. This is the machine's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MachineKey {
    pub floor: i64,
    #[serde(alias = "position")]
    pub pos: i64,
}

impl MachineKey {
    pub fn new(floor: i64, pos: i64) -> Self {
        MachineKey { floor, pos }
    }
}

impl fmt::Display for MachineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "machine:{}:{}", self.floor, self.pos)
    }
}

// ============================================================================
// MACHINE ENTITY
// ============================================================================

/// No laundry cycle runs for a whole day.
pub const MAX_CYCLE_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    /// Synthetic id, generated on creation when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub floor: i64,

    /// Position in the laundry room, counted from 0 left to right.
    #[serde(alias = "position")]
    pub pos: i64,

    #[serde(rename = "type")]
    pub machine_type: MachineType,

    #[serde(default)]
    pub status: MachineStatus,

    /// Approximate length of one cycle.
    #[serde(with = "duration_secs", alias = "duration")]
    pub cycle_duration: Duration,

    /// Epoch means the machine has never been started.
    #[serde(default = "epoch")]
    pub last_started_at: DateTime<Utc>,
}

pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

impl Machine {
    pub fn new(floor: i64, pos: i64, machine_type: MachineType, cycle_duration: Duration) -> Self {
        Machine {
            id: None,
            floor,
            pos,
            machine_type,
            status: MachineStatus::Idle,
            cycle_duration,
            last_started_at: epoch(),
        }
    }

    pub fn key(&self) -> MachineKey {
        MachineKey::new(self.floor, self.pos)
    }

    /// Id used to reference this machine from usage records.
    pub fn machine_id(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| format!("{}:{}", self.floor, self.pos))
    }

    pub fn has_started(&self) -> bool {
        self.last_started_at > epoch()
    }

    /// Remaining time of the current cycle, zero unless the machine is running.
    pub fn time_left(&self, now: DateTime<Utc>) -> Duration {
        if self.status != MachineStatus::InUse {
            return Duration::ZERO;
        }

        let elapsed = (now - self.last_started_at).to_std().unwrap_or(Duration::ZERO);
        self.cycle_duration.saturating_sub(elapsed)
    }

    pub fn validate(&self) -> Result<()> {
        if self.floor < 0 || self.pos < 0 {
            return Err(LaundryError::Validation(format!(
                "floor and position must be non-negative (got {}, {})",
                self.floor, self.pos
            )));
        }
        if self.cycle_duration.is_zero() {
            return Err(LaundryError::Validation(
                "cycle_duration must be greater than zero".to_string(),
            ));
        }
        if self.cycle_duration > MAX_CYCLE_DURATION {
            return Err(LaundryError::Validation(format!(
                "cycle_duration must be at most {} seconds",
                MAX_CYCLE_DURATION.as_secs()
            )));
        }
        Ok(())
    }

    /// Apply the non-status fields of a partial update.
    pub fn apply(&mut self, update: &MachineUpdate) {
        if let Some(duration) = update.cycle_duration {
            self.cycle_duration = duration;
        }
    }
}

// ============================================================================
// PARTIAL UPDATE
// ============================================================================

/// Partial update of a machine. Absent fields are left untouched.
///
/// Location and type are immutable, and `last_started_at` only moves when
/// the machine transitions into `in_use`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MachineUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MachineStatus>,

    #[serde(
        default,
        with = "duration_secs_opt",
        alias = "duration",
        skip_serializing_if = "Option::is_none"
    )]
    pub cycle_duration: Option<Duration>,
}

impl MachineUpdate {
    pub fn status(status: MachineStatus) -> Self {
        MachineUpdate {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.cycle_duration.is_none()
    }
}

// ============================================================================
// SERDE HELPERS
// ============================================================================

pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

pub(crate) mod duration_secs_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}

// ============================================================================
// TESTS
// ============================================================================
